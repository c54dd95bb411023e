// src/verify.rs

//! Artifact integrity verification
//!
//! Runs on the target host after transfer, before installation. Every
//! artifact gets a structural validity check; failures are deleted and sent
//! back through the full fetch tier chain. A package that fails both
//! verification and re-fetch joins the unfetchable set.

use crate::backend::PackageBackend;
use crate::error::Result;
use crate::fetch::{FetchEngine, FetchOutcome};
use crate::store::{self, ArtifactStore};
use indicatif::ProgressBar;
use tracing::{info, warn};

/// Accounting for one verification pass
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    /// Artifacts checked
    pub checked: usize,
    /// Packages whose artifact was re-fetched after a failed check
    pub refetched: Vec<String>,
    /// Packages that failed the check and exhausted re-fetch
    pub unfetchable: Vec<String>,
    /// Invalid artifacts whose package name could not be recovered
    pub unrecognized: Vec<String>,
}

/// Validates every artifact in the store, repairing what it can
pub struct IntegrityVerifier<'a> {
    store: &'a ArtifactStore,
    backend: &'a dyn PackageBackend,
    fetcher: FetchEngine<'a>,
}

impl<'a> IntegrityVerifier<'a> {
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

    /// Check every artifact; delete and re-fetch the invalid ones
    pub fn verify_all(&self, progress: Option<&ProgressBar>) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();

        for path in self.store.artifacts()? {
            report.checked += 1;
            if let Some(pb) = progress {
                pb.inc(1);
            }

            if self.backend.validate_artifact(&path) {
                continue;
            }

            let file_name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or_default()
                .to_string();
            warn!("Artifact {} failed validation, removing", file_name);
            self.store.remove_artifact(&path)?;

            let Some((package, _version)) = store::parse_artifact_file_name(&file_name) else {
                warn!("Cannot recover a package name from '{}'", file_name);
                report.unrecognized.push(file_name);
                continue;
            };

            match self.fetcher.fetch(&package)? {
                FetchOutcome::Fetched(_) | FetchOutcome::AlreadyPresent(_) => {
                    info!("Re-fetched {} after failed validation", package);
                    report.refetched.push(package);
                }
                FetchOutcome::Unfetchable => {
                    report.unfetchable.push(package);
                }
            }
        }

        info!(
            "Verified {} artifacts: {} re-fetched, {} unfetchable",
            report.checked,
            report.refetched.len(),
            report.unfetchable.len()
        );
        Ok(report)
    }
}
