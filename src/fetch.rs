// src/fetch.rs

//! Tiered artifact fetching with bounded retry
//!
//! Obtains an artifact for a package name by trying the source tiers in
//! fixed priority order (primary, backports, updates), each attempt wrapped
//! in the shared backoff policy. Only after every tier is exhausted does a
//! package enter the unfetchable set; that outcome is recorded, surfaced,
//! and never fatal to the surrounding run.

use crate::backend::{PackageBackend, Tier};
use crate::error::{Error, Result};
use crate::retry::{self, with_retry};
use crate::store::ArtifactStore;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a fetch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Artifact downloaded and stored at the given path
    Fetched(PathBuf),
    /// A matching artifact was already in the store; nothing was fetched
    AlreadyPresent(PathBuf),
    /// Every tier was exhausted; the name is recorded as unfetchable
    Unfetchable,
}

/// Fetches artifacts into the store through the tier chain
pub struct FetchEngine<'a> {
    store: &'a ArtifactStore,
    backend: &'a dyn PackageBackend,
    max_attempts: u32,
    initial_delay: Duration,
}

impl<'a> FetchEngine<'a> {
    pub fn new(store: &'a ArtifactStore, backend: &'a dyn PackageBackend) -> Self {
        Self {
            store,
            backend,
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            initial_delay: retry::DEFAULT_INITIAL_DELAY,
        }
    }

    /// Override the per-attempt retry policy
    pub fn with_retry_policy(mut self, max_attempts: u32, initial_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.initial_delay = initial_delay;
        self
    }

    /// Obtain an artifact for `package`, trying each tier in priority order
    pub fn fetch(&self, package: &str) -> Result<FetchOutcome> {
        if let Some(existing) = self.store.find_artifact(package)? {
            debug!("Artifact for {} already in store, skipping fetch", package);
            return Ok(FetchOutcome::AlreadyPresent(existing));
        }

        for tier in Tier::ALL {
            let label = format!("fetch {package} from {tier}");
            let attempt = with_retry(&label, self.max_attempts, self.initial_delay, || {
                self.backend.fetch_from_tier(package, tier)
            });

            match attempt {
                Ok(bytes) => match self.ingest(package, &bytes) {
                    Ok(path) => {
                        info!("Fetched {} from {} tier", package, tier);
                        return Ok(FetchOutcome::Fetched(path));
                    }
                    Err(e) => {
                        // Bytes that fail to ingest are as good as a failed
                        // tier; the next tier may serve an intact artifact.
                        warn!("Discarding unusable artifact for {} from {}: {}", package, tier, e);
                    }
                },
                Err(e) => {
                    debug!("Tier {} exhausted for {}: {}", tier, package, e);
                }
            }
        }

        warn!("All tiers exhausted for {}; recording as unfetchable", package);
        self.store.record_unfetchable(package)?;
        Ok(FetchOutcome::Unfetchable)
    }

    /// Land fetched bytes in the store under the canonical artifact name
    ///
    /// The canonical name needs the version, which lives inside the
    /// artifact, so the bytes go to a partial file first and are renamed
    /// once the metadata reads back cleanly.
    fn ingest(&self, package: &str, bytes: &[u8]) -> Result<PathBuf> {
        let partial = self.store.root().join(format!("{package}.partial"));
        fs::write(&partial, bytes)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {e}", partial.display())))?;

        let metadata = match self.backend.artifact_metadata(&partial) {
            Ok(metadata) => metadata,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };

        let dest = self.store.artifact_path(&metadata.name, &metadata.version);
        fs::rename(&partial, &dest).map_err(|e| {
            Error::IoError(format!(
                "Failed to move {} to {}: {e}",
                partial.display(),
                dest.display()
            ))
        })?;
        Ok(dest)
    }
}
