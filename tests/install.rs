// tests/install.rs

//! Install-phase properties: ordering, root deferral, conflict policy,
//! degraded end-to-end runs.

mod common;

use aptferry::backend::MemoryBackend;
use aptferry::PackageBackend;
use aptferry::fetch::FetchEngine;
use aptferry::install::Installer;
use aptferry::verify::IntegrityVerifier;
use common::{build_store, temp_store};
use std::time::Duration;

fn run_install(store: &aptferry::ArtifactStore, backend: &MemoryBackend) -> aptferry::InstallReport {
    Installer::new(store, backend)
        .with_fix_retry_policy(1, Duration::ZERO)
        .run(None)
        .unwrap()
}

#[test]
fn happy_path_installs_in_order_with_root_last() {
    let mut backend = MemoryBackend::new();
    backend.add_package("foo", "1.0", &["bar"]);
    backend.add_package("bar", "1.0", &["baz"]);
    backend.add_package("baz", "1.0", &[]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "foo");

    let report = run_install(&store, &backend);

    assert_eq!(report.order, vec!["baz", "bar"]);
    assert_eq!(backend.install_attempts(), vec!["baz", "bar", "foo"]);
    assert!(report.unfetchable.is_empty());
    assert!(report.failed.is_empty());
    assert!(report.is_clean());
}

#[test]
fn dependencies_precede_dependents_for_every_edge() {
    let mut backend = MemoryBackend::new();
    backend.add_package("app", "1.0", &["liba", "libb"]);
    backend.add_package("liba", "1.0", &["libc"]);
    backend.add_package("libb", "1.0", &["libc"]);
    backend.add_package("libc", "1.0", &[]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "app");

    let report = run_install(&store, &backend);
    let attempts = backend.install_attempts();
    let position = |name: &str| attempts.iter().position(|n| n == name).unwrap();

    assert!(position("libc") < position("liba"));
    assert!(position("libc") < position("libb"));
    assert_eq!(attempts.last().map(String::as_str), Some("app"));
    assert!(report.is_clean());
}

#[test]
fn root_is_deferred_even_when_depended_upon() {
    // tool depends on the root package; the root still goes last
    let mut backend = MemoryBackend::new();
    backend.add_package("root", "1.0", &["tool"]);
    backend.add_package("tool", "1.0", &["root"]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "root");

    run_install(&store, &backend);
    assert_eq!(backend.install_attempts(), vec!["tool", "root"]);
}

#[test]
fn dependency_cycle_installs_best_effort() {
    let mut backend = MemoryBackend::new();
    backend.add_package("foo", "1.0", &["a"]);
    backend.add_package("a", "1.0", &["b"]);
    backend.add_package("b", "1.0", &["a"]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "foo");

    let report = run_install(&store, &backend);

    // The a <-> b cycle cannot be strictly ordered but still installs,
    // first-seen order, root last
    assert_eq!(report.order.len(), 2);
    assert_eq!(backend.install_attempts().len(), 3);
    assert_eq!(
        backend.install_attempts().last().map(String::as_str),
        Some("foo")
    );
    assert!(report.failed.is_empty());
}

#[test]
fn acyclic_dependent_of_a_cycle_installs_after_it() {
    // aa sorts first in the store but depends into the yy <-> zz cycle;
    // its edge is not part of the cycle, so zz must still precede it
    let mut backend = MemoryBackend::new();
    backend.add_package("app", "1.0", &["aa"]);
    backend.add_package("aa", "1.0", &["zz"]);
    backend.add_package("zz", "1.0", &["yy"]);
    backend.add_package("yy", "1.0", &["zz"]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "app");

    let report = run_install(&store, &backend);
    let attempts = backend.install_attempts();
    let position = |name: &str| attempts.iter().position(|n| n == name).unwrap();

    assert!(position("zz") < position("aa"));
    assert_eq!(attempts.last().map(String::as_str), Some("app"));
    assert!(report.failed.is_empty());
}

#[test]
fn newer_installed_version_is_kept_and_skipped() {
    let mut backend = MemoryBackend::new();
    backend.add_package("foo", "1.0", &["bar"]);
    backend.add_package("bar", "1.5", &[]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "foo");
    backend.set_installed("bar", "2.0");

    let report = run_install(&store, &backend);

    assert_eq!(report.kept, vec!["bar"]);
    assert_eq!(backend.install_attempts(), vec!["foo"]);
    assert_eq!(backend.installed_version("bar").unwrap().unwrap(), "2.0");
    assert_eq!(
        store.conflict_log().unwrap(),
        vec!["Kept: bar 2.0 (installed) over 1.5".to_string()]
    );
}

#[test]
fn older_installed_version_is_updated() {
    let mut backend = MemoryBackend::new();
    backend.add_package("foo", "2.0", &[]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "foo");
    backend.set_installed("foo", "1.0");

    let report = run_install(&store, &backend);

    assert_eq!(report.installed, vec!["foo"]);
    assert_eq!(backend.installed_version("foo").unwrap().unwrap(), "2.0");
    assert_eq!(
        store.conflict_log().unwrap(),
        vec!["Updated: foo 1.0 -> 2.0".to_string()]
    );
}

#[test]
fn uninstalled_packages_always_proceed() {
    let mut backend = MemoryBackend::new();
    backend.add_package("foo", "1.0", &["bar"]);
    backend.add_package("bar", "1.0", &[]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "foo");

    let report = run_install(&store, &backend);

    assert_eq!(report.installed, vec!["bar", "foo"]);
    assert!(report.kept.is_empty());
    assert!(store.conflict_log().unwrap().is_empty());
}

#[test]
fn unfetchable_dependency_degrades_but_run_completes() {
    // bar never arrived; baz (declared only by bar) was still ported and
    // must still be attempted, and foo's own failure is reported, not fatal
    let mut backend = MemoryBackend::new();
    backend.add_package("foo", "1.0", &["bar"]);
    backend.add_unfetchable_package("bar", &["baz"]);
    backend.add_package("baz", "1.0", &[]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "foo");
    backend.set_install_failures("foo", u32::MAX);

    let report = run_install(&store, &backend);

    assert!(backend.install_attempts().contains(&"baz".to_string()));
    assert_eq!(report.unfetchable, vec!["bar".to_string()]);
    assert_eq!(report.failed, vec!["foo".to_string()]);
    assert!(report.installed.contains(&"baz".to_string()));
}

#[test]
fn corrupt_artifact_is_repaired_before_install() {
    let mut backend = MemoryBackend::new();
    backend.add_package("foo", "1.0", &["bar"]);
    backend.add_package("bar", "1.0", &[]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "foo");

    // Corrupt bar's artifact in transit
    let path = store.find_artifact("bar").unwrap().unwrap();
    std::fs::write(&path, b"flipped bits").unwrap();

    let fetcher = FetchEngine::new(&store, &backend).with_retry_policy(1, Duration::ZERO);
    let integrity = IntegrityVerifier::new(&store, &backend, fetcher)
        .verify_all(None)
        .unwrap();
    assert_eq!(integrity.refetched, vec!["bar".to_string()]);

    let report = run_install(&store, &backend);
    assert_eq!(report.installed, vec!["bar", "foo"]);
    assert!(report.is_clean());
}

#[test]
fn repair_passes_run_even_when_installs_fail() {
    let mut backend = MemoryBackend::new();
    backend.add_package("foo", "1.0", &["bar"]);
    backend.add_package("bar", "1.0", &[]);
    let (_dir, store) = temp_store();
    build_store(&store, &backend, "foo");
    backend.set_install_failures("bar", u32::MAX);
    backend.set_install_failures("foo", u32::MAX);

    let report = run_install(&store, &backend);

    assert_eq!(report.failed, vec!["bar", "foo"]);
    // Pre-root repair and the final sweep both ran despite the failures
    assert_eq!(backend.fix_call_count(), 2);
    assert_eq!(backend.maintenance_call_count(), 1);
}
