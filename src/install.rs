// src/install.rs

//! Installation scheduling on the target host
//!
//! Rebuilds the dependency graph from the artifacts that actually made the
//! transfer, orders it dependencies-first, and drives sequential installs
//! through the conflict resolver. Individual install failures queue for one
//! retry and are then reported, never fatal; a package whose conflict check
//! cannot be answered is reported the same way. The root package is excluded
//! from the computed order and installed last, unconditionally attempted.
//! Once the structural checks pass, the dependency-repair and maintenance
//! passes run on every exit path of the install phase.

use crate::backend::PackageBackend;
use crate::conflict::{ConflictDecision, ConflictResolver};
use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, PackageNode};
use crate::retry::{self, with_retry};
use crate::store::ArtifactStore;
use indicatif::ProgressBar;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Accounting for one installation run
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// The root package, installed last
    pub root: String,
    /// Computed installation order, root excluded
    pub order: Vec<String>,
    /// Successfully installed packages
    pub installed: Vec<String>,
    /// Packages skipped because the target's installed version is newer
    pub kept: Vec<String>,
    /// Packages that failed install and the single retry
    pub failed: Vec<String>,
    /// Full unfetchable set at the end of the run
    pub unfetchable: Vec<String>,
    /// Repair/maintenance steps that exhausted their budget; operator
    /// attention, not process failure
    pub maintenance_errors: Vec<String>,
}

impl InstallReport {
    /// True when nothing needs operator attention
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.unfetchable.is_empty() && self.maintenance_errors.is_empty()
    }
}

/// Sequentially installs a transferred store onto the target
pub struct Installer<'a> {
    store: &'a ArtifactStore,
    backend: &'a dyn PackageBackend,
    fix_attempts: u32,
    fix_delay: Duration,
}

impl<'a> Installer<'a> {
    pub fn new(store: &'a ArtifactStore, backend: &'a dyn PackageBackend) -> Self {
        Self {
            store,
            backend,
            fix_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            fix_delay: retry::DEFAULT_INITIAL_DELAY,
        }
    }

    /// Override the retry policy for the dependency-repair passes
    pub fn with_fix_retry_policy(mut self, max_attempts: u32, initial_delay: Duration) -> Self {
        self.fix_attempts = max_attempts;
        self.fix_delay = initial_delay;
        self
    }

    /// Install every ported package in dependency order, root last
    pub fn run(&self, progress: Option<&ProgressBar>) -> Result<InstallReport> {
        // Structural prerequisites: without a root there is no meaningful
        // partial result
        let root = self.store.main_package()?;
        if self.store.find_artifact(&root)?.is_none() {
            return Err(Error::RootArtifactMissing(root));
        }

        let graph = self.build_graph()?;
        let order: Vec<String> = graph
            .installation_order()
            .into_iter()
            .filter(|name| *name != root)
            .collect();
        info!(
            "Installing {} packages before root '{}'",
            order.len(),
            root
        );

        // Keep the scratch plan alive for the duration of the run
        let _scratch = self.dump_plan(&graph, &order);

        let mut report = InstallReport {
            root: root.clone(),
            order: order.clone(),
            ..Default::default()
        };

        let sequence = self.install_sequence(&graph, &order, &root, &mut report, progress);

        // Final sweep and cleanup happen regardless of how the sequence went
        if let Err(e) = with_retry(
            "final dependency sweep",
            self.fix_attempts,
            self.fix_delay,
            || self.backend.fix_broken_dependencies(),
        ) {
            report
                .maintenance_errors
                .push(format!("final dependency sweep: {e}"));
        }
        if let Err(e) = self.backend.post_install_maintenance() {
            report
                .maintenance_errors
                .push(format!("post-install maintenance: {e}"));
        }

        report.unfetchable = self.store.unfetchable()?;
        sequence?;
        Ok(report)
    }

    /// Steps 5-8: ordered installs, retry queue, repair, then the root
    fn install_sequence(
        &self,
        graph: &DependencyGraph,
        order: &[String],
        root: &str,
        report: &mut InstallReport,
        progress: Option<&ProgressBar>,
    ) -> Result<()> {
        let conflicts = ConflictResolver::new(self.store, self.backend);
        let mut retry_queue: Vec<&PackageNode> = Vec::new();

        for name in order {
            if let Some(pb) = progress {
                pb.set_message(name.clone());
                pb.inc(1);
            }

            let Some(node) = graph.node(name) else {
                continue;
            };

            match conflicts.resolve(name, &node.version) {
                Ok(ConflictDecision::Keep) => {
                    report.kept.push(name.clone());
                    continue;
                }
                Ok(ConflictDecision::Proceed) => {}
                Err(e) => {
                    warn!("Conflict check for {} failed ({}), reported and skipped", name, e);
                    report.failed.push(name.clone());
                    continue;
                }
            }

            match self.backend.install_artifact(&node.artifact) {
                Ok(()) => report.installed.push(name.clone()),
                Err(e) => {
                    warn!("Install of {} failed ({}), queued for retry", name, e);
                    retry_queue.push(node);
                }
            }
        }

        // Each queued failure gets exactly one more attempt
        for node in retry_queue {
            match self.backend.install_artifact(&node.artifact) {
                Ok(()) => {
                    info!("Install of {} succeeded on retry", node.name);
                    report.installed.push(node.name.clone());
                }
                Err(e) => {
                    warn!("Install of {} failed again: {}", node.name, e);
                    report.failed.push(node.name.clone());
                }
            }
        }

        // Repair broken dependencies before the root goes on
        if let Err(e) = with_retry(
            "fix broken dependencies",
            self.fix_attempts,
            self.fix_delay,
            || self.backend.fix_broken_dependencies(),
        ) {
            report
                .maintenance_errors
                .push(format!("dependency repair: {e}"));
        }

        self.install_root(graph, root, report, progress)
    }

    /// Step 8: the root installs last, even when dependencies failed
    fn install_root(
        &self,
        graph: &DependencyGraph,
        root: &str,
        report: &mut InstallReport,
        progress: Option<&ProgressBar>,
    ) -> Result<()> {
        if let Some(pb) = progress {
            pb.set_message(root.to_string());
            pb.inc(1);
        }

        let (version, artifact) = match graph.node(root) {
            Some(node) => (node.version.clone(), node.artifact.clone()),
            None => {
                // The artifact exists (structural check) but its metadata
                // did not read back during graph construction
                let Some(path) = self.store.find_artifact(root)? else {
                    report.failed.push(root.to_string());
                    return Ok(());
                };
                match self.backend.artifact_metadata(&path) {
                    Ok(metadata) => (metadata.version, path),
                    Err(e) => {
                        warn!("Cannot read root artifact metadata: {}", e);
                        report.failed.push(root.to_string());
                        return Ok(());
                    }
                }
            }
        };

        match ConflictResolver::new(self.store, self.backend).resolve(root, &version) {
            Ok(ConflictDecision::Keep) => {
                report.kept.push(root.to_string());
                return Ok(());
            }
            Ok(ConflictDecision::Proceed) => {}
            Err(e) => {
                // The root attempt is unconditional; an unanswerable check
                // does not change that
                warn!("Conflict check for root '{}' failed: {}", root, e);
            }
        }

        match self.backend.install_artifact(&artifact) {
            Ok(()) => report.installed.push(root.to_string()),
            Err(e) => {
                warn!("Install of root '{}' failed: {}", root, e);
                report.failed.push(root.to_string());
            }
        }
        Ok(())
    }

    /// Read every artifact's metadata into a dependency graph
    fn build_graph(&self) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();

        for path in self.store.artifacts()? {
            let metadata = match self.backend.artifact_metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping unreadable artifact {}: {}", path.display(), e);
                    continue;
                }
            };

            graph.add_node(PackageNode {
                name: metadata.name.clone(),
                version: metadata.version,
                artifact: path,
            });
            for dependency in &metadata.depends {
                graph.add_dependency(&metadata.name, dependency);
            }
        }

        debug!("Dependency graph holds {} packages", graph.len());
        Ok(graph)
    }

    /// Dump graph edges and the computed order into a scratch area
    ///
    /// Working data only; deleted with the returned handle. Failures here
    /// never affect the run.
    fn dump_plan(&self, graph: &DependencyGraph, order: &[String]) -> Option<tempfile::TempDir> {
        let scratch = tempfile::Builder::new()
            .prefix("aptferry-plan-")
            .tempdir()
            .ok()?;

        let write = |name: &str, lines: Vec<String>| -> std::io::Result<()> {
            let mut file = std::fs::File::create(scratch.path().join(name))?;
            for line in lines {
                writeln!(file, "{line}")?;
            }
            Ok(())
        };

        let edges = graph
            .edge_list()
            .into_iter()
            .map(|(from, to)| format!("{from} {to}"))
            .collect();
        if let Err(e) = write("edges.list", edges).and_then(|_| write("order.list", order.to_vec()))
        {
            debug!("Could not write install plan scratch files: {}", e);
        } else {
            debug!("Install plan dumped to {}", scratch.path().display());
        }
        Some(scratch)
    }
}
