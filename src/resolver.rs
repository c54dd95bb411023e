// src/resolver.rs

//! Dependency resolution: expand a root package to its transitive closure
//!
//! An explicit work list replaces recursion; the persisted processed set is
//! the only termination guarantee, which makes cycles safe by construction
//! and re-runs idempotent. Fetch failures never stop the walk: the failed
//! name is recorded and every package queued before the failure was known
//! is still expanded, since it may resolve through an independent path.

use crate::backend::PackageBackend;
use crate::error::Result;
use crate::fetch::{FetchEngine, FetchOutcome};
use crate::store::ArtifactStore;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

/// Accounting for one resolution run
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    /// Full processed set after the run (persisted names included)
    pub processed: HashSet<String>,
    /// Names expanded by this run (empty on an idempotent re-run)
    pub expanded: Vec<String>,
    /// Artifacts actually downloaded by this run
    pub fetched: usize,
    /// Full unfetchable set after the run, in recording order
    pub unfetchable: Vec<String>,
}

/// Walks the dependency graph from a root to a fixed point
pub struct DependencyResolver<'a> {
    store: &'a ArtifactStore,
    backend: &'a dyn PackageBackend,
    fetcher: FetchEngine<'a>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        store: &'a ArtifactStore,
        backend: &'a dyn PackageBackend,
        fetcher: FetchEngine<'a>,
    ) -> Self {
        Self {
            store,
            backend,
            fetcher,
        }
    }

    /// Expand `root`'s dependency closure, fetching every artifact once
    ///
    /// Termination is guaranteed solely by the processed-set membership
    /// check; work-list depth exists for log indentation only.
    pub fn resolve(&self, root: &str) -> Result<ResolveOutcome> {
        let mut processed = self.store.processed()?;
        // Names fetched-and-queued this run; guards against a dependency
        // appearing twice in one package's declared list
        let mut queued: HashSet<String> = HashSet::new();
        let mut work: VecDeque<(String, usize)> = VecDeque::new();

        let mut outcome = ResolveOutcome::default();

        work.push_back((root.to_string(), 0));
        queued.insert(root.to_string());

        while let Some((name, depth)) = work.pop_front() {
            if processed.contains(&name) {
                debug!("{:indent$}{} already processed", "", name, indent = depth * 2);
                continue;
            }

            processed.insert(name.clone());
            self.store.mark_processed(&name)?;
            outcome.expanded.push(name.clone());
            debug!("{:indent$}expanding {}", "", name, indent = depth * 2);

            let dependencies = self.backend.direct_dependencies(&name)?;
            for dependency in dependencies {
                if dependency == root || dependency == name {
                    continue;
                }
                if processed.contains(&dependency) || !queued.insert(dependency.clone()) {
                    continue;
                }

                match self.fetcher.fetch(&dependency)? {
                    FetchOutcome::Fetched(_) => outcome.fetched += 1,
                    FetchOutcome::AlreadyPresent(_) | FetchOutcome::Unfetchable => {}
                }
                work.push_back((dependency, depth + 1));
            }
        }

        outcome.processed = processed;
        outcome.unfetchable = self.store.unfetchable()?;

        info!(
            "Resolution complete: {} expanded this run, {} fetched, {} unfetchable",
            outcome.expanded.len(),
            outcome.fetched,
            outcome.unfetchable.len()
        );
        Ok(outcome)
    }
}
