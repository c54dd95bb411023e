// tests/common/mod.rs

//! Shared test fixtures for integration tests.

use aptferry::backend::MemoryBackend;
use aptferry::fetch::{FetchEngine, FetchOutcome};
use aptferry::resolver::{DependencyResolver, ResolveOutcome};
use aptferry::store::ArtifactStore;
use std::time::Duration;
use tempfile::TempDir;

/// Create an empty artifact store in a temp directory.
///
/// Returns (TempDir, store) - keep the TempDir alive to prevent cleanup.
pub fn temp_store() -> (TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::create(dir.path()).unwrap();
    (dir, store)
}

/// Fetch engine that never sleeps between attempts.
pub fn no_wait_fetcher<'a>(
    store: &'a ArtifactStore,
    backend: &'a MemoryBackend,
) -> FetchEngine<'a> {
    FetchEngine::new(store, backend).with_retry_policy(2, Duration::ZERO)
}

/// Run the full build phase: fetch the root artifact, record it as the main
/// package, then resolve and fetch the dependency closure.
pub fn build_store(store: &ArtifactStore, backend: &MemoryBackend, root: &str) -> ResolveOutcome {
    let outcome = no_wait_fetcher(store, backend).fetch(root).unwrap();
    assert_ne!(
        outcome,
        FetchOutcome::Unfetchable,
        "fixture root '{root}' must be fetchable"
    );
    store.set_main_package(root).unwrap();

    DependencyResolver::new(store, backend, no_wait_fetcher(store, backend))
        .resolve(root)
        .unwrap()
}
