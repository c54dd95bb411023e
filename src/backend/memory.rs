// src/backend/memory.rs

//! Deterministic in-memory backend for tests
//!
//! Builds a scripted world: declared dependency lists, per-tier artifact
//! availability, transient fetch failures, an installed-version table, and
//! install failure budgets. Call counters let tests assert properties like
//! "the second resolution performs zero fetches" without touching a real
//! package manager.
//!
//! Artifacts are serialized as three text lines (name, version,
//! space-separated dependencies), which keeps metadata reading and
//! validation honest: corrupt bytes genuinely fail to parse.

use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use super::{ArtifactMetadata, PackageBackend, Tier};

#[derive(Debug, Clone)]
struct ScriptedPackage {
    version: String,
    depends: Vec<String>,
    tiers: HashSet<Tier>,
}

/// Scriptable fake of the apt/dpkg toolchain
#[derive(Debug, Default)]
pub struct MemoryBackend {
    packages: HashMap<String, ScriptedPackage>,
    /// Fetch attempts that fail before the first success, per package
    transient_failures: Mutex<HashMap<String, u32>>,
    /// Install attempts that fail before the first success, per package
    install_failures: Mutex<HashMap<String, u32>>,
    /// Packages whose installed-version query always errors
    installed_version_errors: Mutex<HashSet<String>>,
    installed: Mutex<HashMap<String, String>>,
    fetch_calls: Mutex<Vec<String>>,
    install_calls: Mutex<Vec<String>>,
    fix_calls: Mutex<u32>,
    maintenance_calls: Mutex<u32>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package available from the primary tier
    pub fn add_package(&mut self, name: &str, version: &str, depends: &[&str]) {
        self.add_package_in_tiers(name, version, depends, &[Tier::Primary]);
    }

    /// Register a package available from the given tiers only
    pub fn add_package_in_tiers(
        &mut self,
        name: &str,
        version: &str,
        depends: &[&str],
        tiers: &[Tier],
    ) {
        self.packages.insert(
            name.to_string(),
            ScriptedPackage {
                version: version.to_string(),
                depends: depends.iter().map(|d| d.to_string()).collect(),
                tiers: tiers.iter().copied().collect(),
            },
        );
    }

    /// Register a package whose metadata is known but whose artifact is not
    /// carried by any tier (every fetch fails)
    pub fn add_unfetchable_package(&mut self, name: &str, depends: &[&str]) {
        self.add_package_in_tiers(name, "0", depends, &[]);
    }

    /// Make the first `count` fetch attempts for a package fail
    pub fn set_transient_fetch_failures(&self, name: &str, count: u32) {
        self.transient_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), count);
    }

    /// Make the first `count` install attempts for a package fail
    pub fn set_install_failures(&self, name: &str, count: u32) {
        self.install_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), count);
    }

    /// Make installed-version queries for a package fail
    pub fn set_installed_version_error(&self, name: &str) {
        self.installed_version_errors
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    /// Pre-populate the target's installed-version table
    pub fn set_installed(&self, name: &str, version: &str) {
        self.installed
            .lock()
            .unwrap()
            .insert(name.to_string(), version.to_string());
    }

    /// Total fetch attempts across all tiers
    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.lock().unwrap().len()
    }

    /// Fetch attempts for one package
    pub fn fetch_call_count_for(&self, name: &str) -> usize {
        self.fetch_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|n| *n == name)
            .count()
    }

    /// Package names in install-attempt order (retries appear again)
    pub fn install_attempts(&self) -> Vec<String> {
        self.install_calls.lock().unwrap().clone()
    }

    pub fn fix_call_count(&self) -> u32 {
        *self.fix_calls.lock().unwrap()
    }

    pub fn maintenance_call_count(&self) -> u32 {
        *self.maintenance_calls.lock().unwrap()
    }

    fn serialize(name: &str, version: &str, depends: &[String]) -> Vec<u8> {
        format!("{name}\n{version}\n{}\n", depends.join(" ")).into_bytes()
    }

    fn parse(content: &str) -> Option<ArtifactMetadata> {
        let mut lines = content.lines();
        let name = lines.next()?.trim();
        let version = lines.next()?.trim();
        if name.is_empty() || version.is_empty() {
            return None;
        }
        let depends = lines
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(|d| d.to_string())
            .collect();
        Some(ArtifactMetadata {
            name: name.to_string(),
            version: version.to_string(),
            depends,
        })
    }
}

impl PackageBackend for MemoryBackend {
    fn direct_dependencies(&self, package: &str) -> Result<Vec<String>> {
        Ok(self
            .packages
            .get(package)
            .map(|p| p.depends.clone())
            .unwrap_or_default())
    }

    fn fetch_from_tier(&self, package: &str, tier: Tier) -> Result<Vec<u8>> {
        self.fetch_calls.lock().unwrap().push(package.to_string());

        let mut transient = self.transient_failures.lock().unwrap();
        if let Some(remaining) = transient.get_mut(package) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::DownloadError(format!(
                    "scripted transient failure for '{package}'"
                )));
            }
        }
        drop(transient);

        match self.packages.get(package) {
            Some(p) if p.tiers.contains(&tier) => {
                Ok(Self::serialize(package, &p.version, &p.depends))
            }
            _ => Err(Error::NotFoundError(format!(
                "'{package}' not available from {tier} tier"
            ))),
        }
    }

    fn artifact_metadata(&self, artifact: &Path) -> Result<ArtifactMetadata> {
        let content = std::fs::read_to_string(artifact)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {e}", artifact.display())))?;
        Self::parse(&content).ok_or_else(|| {
            Error::ParseError(format!("Malformed artifact {}", artifact.display()))
        })
    }

    fn validate_artifact(&self, artifact: &Path) -> bool {
        std::fs::read_to_string(artifact)
            .ok()
            .and_then(|content| Self::parse(&content))
            .is_some()
    }

    fn installed_version(&self, package: &str) -> Result<Option<String>> {
        if self
            .installed_version_errors
            .lock()
            .unwrap()
            .contains(package)
        {
            return Err(Error::CommandError(format!(
                "scripted installed-version failure for '{package}'"
            )));
        }
        Ok(self.installed.lock().unwrap().get(package).cloned())
    }

    fn install_artifact(&self, artifact: &Path) -> Result<()> {
        let metadata = self.artifact_metadata(artifact)?;
        self.install_calls.lock().unwrap().push(metadata.name.clone());

        let mut failures = self.install_failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&metadata.name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::InstallError(format!(
                    "scripted install failure for '{}'",
                    metadata.name
                )));
            }
        }
        drop(failures);

        self.installed
            .lock()
            .unwrap()
            .insert(metadata.name, metadata.version);
        Ok(())
    }

    fn fix_broken_dependencies(&self) -> Result<()> {
        *self.fix_calls.lock().unwrap() += 1;
        Ok(())
    }

    fn post_install_maintenance(&self) -> Result<()> {
        *self.maintenance_calls.lock().unwrap() += 1;
        Ok(())
    }
}
