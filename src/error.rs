// src/error.rs

//! Central error type for aptferry
//!
//! Operational failures (fetch, parse, subprocess, IO) carry a message and
//! are accumulated by the callers into end-of-run reports. Structural
//! failures name the missing prerequisite and stop the run immediately.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// Download failure (HTTP status, network, or empty response)
    #[error("Download error: {0}")]
    DownloadError(String),

    /// External command failed or produced unusable output
    #[error("Command error: {0}")]
    CommandError(String),

    /// Malformed data (artifact filename, metadata field, version string)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A package or artifact could not be found where it was expected
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// A single package install was rejected by the target's package manager
    #[error("Install error: {0}")]
    InstallError(String),

    /// The artifact store does not exist at install time
    #[error("Artifact store missing at {}: run 'build' on the source host and transfer the store first", .0.display())]
    StoreMissing(PathBuf),

    /// The store has no recorded main package
    #[error("No main package recorded in {}: the store was not produced by 'build'", .0.display())]
    MainPackageMissing(PathBuf),

    /// The root package's artifact is absent from the store
    #[error("Artifact for main package '{0}' is missing from the store")]
    RootArtifactMissing(String),

    /// The root package could not be fetched from any tier at build time
    #[error("Main package '{0}' could not be fetched from any repository tier")]
    RootUnresolvable(String),
}
