// src/lib.rs

//! aptferry: offline package porting for Debian-family hosts
//!
//! Moves a package and its full transitive dependency set from a connected
//! source host to an offline target, then reproduces a correct,
//! conflict-aware install there.
//!
//! # Architecture
//!
//! - Artifact store: a flat directory of `.deb` files plus three
//!   append-only logs (processed set, unfetchable set, conflict log)
//! - Build phase (source host): work-list dependency resolution to a fixed
//!   point, tiered fetching with exponential-backoff retry
//! - Install phase (target host): integrity verification, cycle-tolerant
//!   topological ordering, conflict-gated sequential installs, root last
//! - One sequential flow throughout; persisted state makes interrupted runs
//!   resumable

pub mod backend;
pub mod conflict;
mod error;
pub mod fetch;
pub mod graph;
pub mod install;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod verify;
pub mod version;

pub use backend::{ArtifactMetadata, PackageBackend, Tier};
pub use conflict::{ConflictDecision, ConflictResolver};
pub use error::{Error, Result};
pub use fetch::{FetchEngine, FetchOutcome};
pub use graph::{DependencyGraph, PackageNode};
pub use install::{InstallReport, Installer};
pub use resolver::{DependencyResolver, ResolveOutcome};
pub use store::ArtifactStore;
pub use verify::{IntegrityReport, IntegrityVerifier};
pub use version::DebVersion;
