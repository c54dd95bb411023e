// src/commands.rs
//! Command handlers for the aptferry CLI

use anyhow::Result;
use aptferry::backend::AptBackend;
use aptferry::fetch::{FetchEngine, FetchOutcome};
use aptferry::install::{InstallReport, Installer};
use aptferry::resolver::DependencyResolver;
use aptferry::store::ArtifactStore;
use aptferry::verify::{IntegrityReport, IntegrityVerifier};
use aptferry::Error;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Styled progress bar for fixed-length package loops
fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .expect("Invalid progress bar template")
            .progress_chars("#>-"),
    );
    pb
}

/// Spinner for the open-ended resolution walk
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Build phase: fetch the root, then expand and fetch its closure
pub fn build(package: &str, store_dir: &Path) -> Result<()> {
    let store = ArtifactStore::create(store_dir)?;
    let backend = AptBackend::new()?;

    println!(
        "Porting '{}' and its dependencies into {}",
        package,
        store_dir.display()
    );

    // The root artifact comes first: without it no partial result is
    // meaningful on the target
    let fetcher = FetchEngine::new(&store, &backend);
    if fetcher.fetch(package)? == FetchOutcome::Unfetchable {
        return Err(Error::RootUnresolvable(package.to_string()).into());
    }
    store.set_main_package(package)?;

    let spinner = create_spinner("Resolving dependency closure...");
    let resolver = DependencyResolver::new(&store, &backend, FetchEngine::new(&store, &backend));
    let outcome = resolver.resolve(package)?;
    spinner.finish_and_clear();

    println!(
        "Resolved {} packages ({} expanded this run, {} artifacts fetched)",
        outcome.processed.len(),
        outcome.expanded.len(),
        outcome.fetched
    );
    print_unfetchable(&outcome.unfetchable);
    println!(
        "Transfer {} to the target host and run 'aptferry install'",
        store_dir.display()
    );
    Ok(())
}

/// Install phase: verify the transferred artifacts, then install in order
pub fn install(store_dir: &Path) -> Result<()> {
    let store = ArtifactStore::open(store_dir)?;
    let backend = AptBackend::new()?;
    let artifact_count = store.artifacts()?.len() as u64;

    let pb = create_progress_bar(artifact_count);
    pb.set_message("verifying");
    let verifier = IntegrityVerifier::new(&store, &backend, FetchEngine::new(&store, &backend));
    let integrity = verifier.verify_all(Some(&pb))?;
    pb.finish_and_clear();

    let pb = create_progress_bar(artifact_count);
    pb.set_message("installing");
    let report = Installer::new(&store, &backend).run(Some(&pb))?;
    pb.finish_and_clear();

    print_install_summary(&report, &integrity, &store)?;
    Ok(())
}

/// Standalone integrity pass over the store
pub fn verify(store_dir: &Path) -> Result<()> {
    let store = ArtifactStore::open(store_dir)?;
    let backend = AptBackend::new()?;

    let pb = create_progress_bar(store.artifacts()?.len() as u64);
    let verifier = IntegrityVerifier::new(&store, &backend, FetchEngine::new(&store, &backend));
    let report = verifier.verify_all(Some(&pb))?;
    pb.finish_and_clear();

    println!("Verified {} artifacts", report.checked);
    if !report.refetched.is_empty() {
        println!(
            "  Re-fetched after failed validation: {}",
            report.refetched.join(", ")
        );
    }
    if !report.unrecognized.is_empty() {
        println!(
            "  Removed unrecognizable files: {}",
            report.unrecognized.join(", ")
        );
    }
    print_unfetchable(&report.unfetchable);
    Ok(())
}

/// Store summary; touches nothing on the target
pub fn status(store_dir: &Path) -> Result<()> {
    let store = ArtifactStore::open(store_dir)?;

    println!("Artifact store: {}", store_dir.display());
    match store.main_package() {
        Ok(root) => println!("  Main package: {}", root),
        Err(_) => println!("  Main package: (not recorded)"),
    }
    println!("  Artifacts: {}", store.artifacts()?.len());
    println!("  Processed packages: {}", store.processed()?.len());

    print_unfetchable(&store.unfetchable()?);

    let conflicts = store.conflict_log()?;
    if !conflicts.is_empty() {
        println!("  Conflict decisions ({}):", conflicts.len());
        for line in conflicts {
            println!("    {}", line);
        }
    }
    Ok(())
}

fn print_unfetchable(unfetchable: &[String]) {
    if unfetchable.is_empty() {
        return;
    }
    println!("  Unfetchable packages ({}):", unfetchable.len());
    for name in unfetchable {
        println!("    {}", name);
    }
}

/// The single end-of-run summary: every non-structural failure lands here
fn print_install_summary(
    report: &InstallReport,
    integrity: &IntegrityReport,
    store: &ArtifactStore,
) -> Result<()> {
    println!(
        "Installed {} packages, root '{}' last",
        report.installed.len(),
        report.root
    );

    if !integrity.refetched.is_empty() {
        println!(
            "  Re-fetched before install: {}",
            integrity.refetched.join(", ")
        );
    }
    if !report.kept.is_empty() {
        println!(
            "  Kept existing versions (skipped): {}",
            report.kept.join(", ")
        );
    }
    if !report.failed.is_empty() {
        println!("  Failed installs ({}):", report.failed.len());
        for name in &report.failed {
            println!("    {}", name);
        }
    }
    print_unfetchable(&report.unfetchable);
    for issue in &report.maintenance_errors {
        println!("  Needs operator attention: {}", issue);
    }

    let conflicts = store.conflict_log()?;
    if !conflicts.is_empty() {
        println!("  Conflict log:");
        for line in conflicts {
            println!("    {}", line);
        }
    }

    if report.is_clean() {
        println!("Port complete: zero unfetchable and zero failed packages");
    } else {
        info!("Port finished with items needing attention; see summary above");
    }
    Ok(())
}
