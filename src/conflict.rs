// src/conflict.rs

//! Version-conflict resolution against the live target
//!
//! Decides, per package, whether the install proceeds or the target's
//! existing state wins. The target's installed version is queried fresh on
//! every run (decisions are never cached), and each decision that involves
//! an installed version is appended to the write-once conflict log.

use crate::backend::PackageBackend;
use crate::error::Result;
use crate::store::ArtifactStore;
use std::cmp::Ordering;
use tracing::{debug, info};

/// What the scheduler should do with a candidate package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    /// The installed version is newer; skip the install
    Keep,
    /// Nothing installed, or the candidate is the same or newer; install
    Proceed,
}

/// Compares candidates against installed state and logs the outcome
pub struct ConflictResolver<'a> {
    store: &'a ArtifactStore,
    backend: &'a dyn PackageBackend,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(store: &'a ArtifactStore, backend: &'a dyn PackageBackend) -> Self {
        Self { store, backend }
    }

    /// Decide whether installing `candidate_version` of `package` is safe
    ///
    /// A newer installed version always wins: downgrading a package the
    /// target may depend on elsewhere is worse than skipping one port.
    pub fn resolve(&self, package: &str, candidate_version: &str) -> Result<ConflictDecision> {
        let Some(installed) = self.backend.installed_version(package)? else {
            debug!("{} not installed on target, proceeding", package);
            return Ok(ConflictDecision::Proceed);
        };

        match self.backend.compare_versions(&installed, candidate_version) {
            Ordering::Greater => {
                info!(
                    "Keeping installed {} {} over candidate {}",
                    package, installed, candidate_version
                );
                self.store.append_conflict_line(&format!(
                    "Kept: {package} {installed} (installed) over {candidate_version}"
                ))?;
                Ok(ConflictDecision::Keep)
            }
            Ordering::Less | Ordering::Equal => {
                self.store.append_conflict_line(&format!(
                    "Updated: {package} {installed} -> {candidate_version}"
                ))?;
                Ok(ConflictDecision::Proceed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn fixture() -> (tempfile::TempDir, ArtifactStore, MemoryBackend) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(dir.path()).unwrap();
        (dir, store, MemoryBackend::new())
    }

    #[test]
    fn test_not_installed_proceeds_without_record() {
        let (_dir, store, backend) = fixture();
        let resolver = ConflictResolver::new(&store, &backend);

        assert_eq!(
            resolver.resolve("foo", "1.0").unwrap(),
            ConflictDecision::Proceed
        );
        assert!(store.conflict_log().unwrap().is_empty());
    }

    #[test]
    fn test_newer_installed_is_kept() {
        let (_dir, store, backend) = fixture();
        backend.set_installed("foo", "2.0");
        let resolver = ConflictResolver::new(&store, &backend);

        assert_eq!(
            resolver.resolve("foo", "1.5").unwrap(),
            ConflictDecision::Keep
        );
        assert_eq!(
            store.conflict_log().unwrap(),
            vec!["Kept: foo 2.0 (installed) over 1.5".to_string()]
        );
    }

    #[test]
    fn test_older_installed_is_updated() {
        let (_dir, store, backend) = fixture();
        backend.set_installed("foo", "1.0");
        let resolver = ConflictResolver::new(&store, &backend);

        assert_eq!(
            resolver.resolve("foo", "2.0").unwrap(),
            ConflictDecision::Proceed
        );
        assert_eq!(
            store.conflict_log().unwrap(),
            vec!["Updated: foo 1.0 -> 2.0".to_string()]
        );
    }

    #[test]
    fn test_equal_version_proceeds() {
        let (_dir, store, backend) = fixture();
        backend.set_installed("foo", "1.0");
        let resolver = ConflictResolver::new(&store, &backend);

        assert_eq!(
            resolver.resolve("foo", "1.0").unwrap(),
            ConflictDecision::Proceed
        );
    }

    #[test]
    fn test_comparison_is_native_not_lexical() {
        let (_dir, store, backend) = fixture();
        backend.set_installed("foo", "1.10");
        let resolver = ConflictResolver::new(&store, &backend);

        // Lexically "1.9" > "1.10", but Debian ordering says 1.10 is newer
        assert_eq!(
            resolver.resolve("foo", "1.9").unwrap(),
            ConflictDecision::Keep
        );
    }
}
