// src/backend/apt.rs

//! Real backend driving the apt/dpkg toolchain
//!
//! Dependency metadata comes from `apt-cache`, artifacts from
//! `apt-get download` (with a direct-URI fallback over HTTP when the
//! subprocess path yields nothing), artifact inspection from `dpkg-deb`,
//! installed state from `dpkg-query`, and installation from `dpkg -i`.
//! All subprocess output parsing is tolerant: missing fields degrade to
//! empty results rather than run-stopping errors.

use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ArtifactMetadata, PackageBackend, Tier};

/// Timeout for direct-URI artifact downloads
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend for Debian-family targets
pub struct AptBackend {
    /// Release codename (e.g. "bookworm"), used to address pockets
    release: String,
    http: reqwest::blocking::Client,
}

impl AptBackend {
    /// Create a backend, detecting the running release codename
    pub fn new() -> Result<Self> {
        let release = detect_release()?;
        let http = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::CommandError(format!("Failed to create HTTP client: {e}")))?;
        debug!("apt backend for release '{}'", release);
        Ok(Self { release, http })
    }

    /// `--target-release` argument for a tier, if the tier needs one
    fn target_release(&self, tier: Tier) -> Option<String> {
        match tier {
            Tier::Primary => None,
            Tier::Backports => Some(format!("{}-backports", self.release)),
            Tier::Updates => Some(format!("{}-updates", self.release)),
        }
    }

    /// Fallback path: resolve the artifact URI and download it directly
    fn fetch_via_uri(&self, package: &str, tier: Tier) -> Result<Vec<u8>> {
        let mut cmd = Command::new("apt-get");
        cmd.args(["download", "--print-uris"]);
        if let Some(release) = self.target_release(tier) {
            cmd.args(["-t", &release]);
        }
        cmd.arg(package);

        let output = cmd
            .output()
            .map_err(|e| Error::CommandError(format!("Failed to run apt-get: {e}")))?;
        if !output.status.success() {
            return Err(Error::DownloadError(format!(
                "apt-get --print-uris failed for '{package}': {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let uri = parse_print_uris(&stdout).ok_or_else(|| {
            Error::DownloadError(format!("No download URI for '{package}' from {tier} tier"))
        })?;

        info!("Downloading {} directly from {}", package, uri);
        let response = self
            .http
            .get(&uri)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {uri}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {uri}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| Error::DownloadError(format!("Failed to read response: {e}")))?;
        Ok(bytes.to_vec())
    }
}

impl PackageBackend for AptBackend {
    fn direct_dependencies(&self, package: &str) -> Result<Vec<String>> {
        debug!("Querying direct dependencies of {}", package);

        let output = Command::new("apt-cache")
            .args(["depends", package])
            .output()
            .map_err(|e| Error::CommandError(format!("Failed to run apt-cache: {e}")))?;

        if !output.status.success() {
            return Err(Error::NotFoundError(format!(
                "apt-cache knows no package '{package}': {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let deps = parse_apt_cache_depends(&String::from_utf8_lossy(&output.stdout));
        debug!("{} direct dependencies for {}", deps.len(), package);
        Ok(deps)
    }

    fn fetch_from_tier(&self, package: &str, tier: Tier) -> Result<Vec<u8>> {
        // apt-get download writes into the current directory, so point it at
        // a scratch dir and pick up whatever .deb it produced.
        let scratch = tempfile::tempdir()
            .map_err(|e| Error::IoError(format!("Failed to create scratch dir: {e}")))?;

        let mut cmd = Command::new("apt-get");
        cmd.arg("download");
        if let Some(release) = self.target_release(tier) {
            cmd.args(["-t", &release]);
        }
        cmd.arg(package).current_dir(scratch.path());

        let output = cmd
            .output()
            .map_err(|e| Error::CommandError(format!("Failed to run apt-get: {e}")))?;

        if output.status.success() {
            let produced = std::fs::read_dir(scratch.path())
                .map_err(|e| Error::IoError(format!("Failed to read scratch dir: {e}")))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .find(|p| p.extension().map(|ext| ext == "deb").unwrap_or(false));

            if let Some(path) = produced {
                return std::fs::read(&path).map_err(|e| {
                    Error::IoError(format!("Failed to read {}: {e}", path.display()))
                });
            }
        } else {
            debug!(
                "apt-get download failed for '{}' from {} tier: {}",
                package,
                tier,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        // Subprocess path produced nothing; try resolving the URI ourselves
        self.fetch_via_uri(package, tier)
    }

    fn artifact_metadata(&self, artifact: &Path) -> Result<ArtifactMetadata> {
        let output = Command::new("dpkg-deb")
            .args(["--field"])
            .arg(artifact)
            .args(["Package", "Version", "Depends", "Pre-Depends"])
            .output()
            .map_err(|e| Error::CommandError(format!("Failed to run dpkg-deb: {e}")))?;

        if !output.status.success() {
            return Err(Error::ParseError(format!(
                "dpkg-deb could not read {}: {}",
                artifact.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut name = String::new();
        let mut version = String::new();
        let mut depends = Vec::new();

        for line in stdout.lines() {
            if let Some(value) = line.strip_prefix("Package:") {
                name = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("Version:") {
                version = value.trim().to_string();
            } else if let Some(value) = line
                .strip_prefix("Depends:")
                .or_else(|| line.strip_prefix("Pre-Depends:"))
            {
                depends.extend(parse_depends_field(value));
            }
        }

        if name.is_empty() || version.is_empty() {
            return Err(Error::ParseError(format!(
                "Artifact {} lacks Package/Version fields",
                artifact.display()
            )));
        }

        Ok(ArtifactMetadata {
            name,
            version,
            depends,
        })
    }

    fn validate_artifact(&self, artifact: &Path) -> bool {
        Command::new("dpkg-deb")
            .arg("--info")
            .arg(artifact)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn installed_version(&self, package: &str) -> Result<Option<String>> {
        let output = Command::new("dpkg-query")
            .args(["-W", "-f", "${Status}|${Version}\n", package])
            .output()
            .map_err(|e| Error::CommandError(format!("Failed to run dpkg-query: {e}")))?;

        if !output.status.success() {
            // dpkg-query exits nonzero for unknown packages
            return Ok(None);
        }

        Ok(installed_from_status(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    fn install_artifact(&self, artifact: &Path) -> Result<()> {
        info!("Installing {}", artifact.display());

        let output = Command::new("dpkg")
            .arg("-i")
            .arg(artifact)
            .output()
            .map_err(|e| Error::CommandError(format!("Failed to run dpkg: {e}")))?;

        if !output.status.success() {
            return Err(Error::InstallError(format!(
                "dpkg -i {} failed: {}",
                artifact.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn fix_broken_dependencies(&self) -> Result<()> {
        info!("Running dependency repair (apt-get -f install)");

        let output = Command::new("apt-get")
            .args(["-f", "install", "-y"])
            .output()
            .map_err(|e| Error::CommandError(format!("Failed to run apt-get: {e}")))?;

        if !output.status.success() {
            return Err(Error::CommandError(format!(
                "apt-get -f install failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn post_install_maintenance(&self) -> Result<()> {
        info!("Removing orphaned packages (apt-get autoremove)");

        let output = Command::new("apt-get")
            .args(["autoremove", "-y"])
            .output()
            .map_err(|e| Error::CommandError(format!("Failed to run apt-get: {e}")))?;

        if !output.status.success() {
            warn!(
                "apt-get autoremove failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        info!("Target system may benefit from a full 'apt-get upgrade' at the operator's discretion");
        Ok(())
    }
}

/// Detect the running release codename
fn detect_release() -> Result<String> {
    if let Ok(output) = Command::new("lsb_release").args(["-cs"]).output() {
        if output.status.success() {
            let codename = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !codename.is_empty() {
                return Ok(codename);
            }
        }
    }

    // Fall back to /etc/os-release
    let content = std::fs::read_to_string("/etc/os-release")
        .map_err(|e| Error::CommandError(format!("Cannot detect release codename: {e}")))?;
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("VERSION_CODENAME=") {
            let codename = value.trim().trim_matches('"').to_string();
            if !codename.is_empty() {
                return Ok(codename);
            }
        }
    }
    Err(Error::CommandError(
        "Cannot detect release codename from lsb_release or /etc/os-release".to_string(),
    ))
}

/// Extract dependency names from `apt-cache depends` output
///
/// Virtual packages are printed as `<name>` and skipped; alternative
/// branches (`|Depends:`) are kept, matching the closure the resolver is
/// expected to try.
fn parse_apt_cache_depends(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix("Depends:")
                .or_else(|| line.strip_prefix("|Depends:"))
                .or_else(|| line.strip_prefix("PreDepends:"))
                .or_else(|| line.strip_prefix("|PreDepends:"))
        })
        .map(str::trim)
        .filter(|dep| !dep.is_empty() && !dep.starts_with('<'))
        .map(|dep| dep.to_string())
        .collect()
}

/// Split a control-file Depends field into bare package names
///
/// "libc6 (>= 2.34), libssl3 | libssl1.1" -> ["libc6", "libssl3", "libssl1.1"]
fn parse_depends_field(field: &str) -> Vec<String> {
    field
        .split(',')
        .flat_map(|dep| dep.split('|'))
        .filter_map(|dep| dep.split_whitespace().next())
        .map(|dep| dep.split(':').next().unwrap_or(dep).to_string())
        .filter(|dep| !dep.is_empty())
        .collect()
}

/// Parse `dpkg-query -W -f '${Status}|${Version}'` output
fn installed_from_status(output: &str) -> Option<String> {
    let line = output.lines().next()?;
    let (status, version) = line.rsplit_once('|')?;
    if status.split_whitespace().last() == Some("installed") && !version.trim().is_empty() {
        Some(version.trim().to_string())
    } else {
        None
    }
}

/// Extract the first quoted URI from `apt-get download --print-uris` output
fn parse_print_uris(output: &str) -> Option<String> {
    let line = output.lines().find(|l| l.contains('\''))?;
    let start = line.find('\'')? + 1;
    let end = line[start..].find('\'')? + start;
    let uri = &line[start..end];
    if uri.is_empty() {
        None
    } else {
        Some(uri.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apt_cache_depends() {
        let output = "\
nginx
  Depends: nginx-common
  Depends: libc6
 |Depends: libssl3
  Depends: <perl:any>
  Suggests: fcgiwrap
  Conflicts: nginx-core
";
        assert_eq!(
            parse_apt_cache_depends(output),
            vec!["nginx-common", "libc6", "libssl3"]
        );
    }

    #[test]
    fn test_parse_depends_field_strips_constraints_and_alternatives() {
        let deps = parse_depends_field(" libc6 (>= 2.34), libssl3 | libssl1.1, perl:any ");
        assert_eq!(deps, vec!["libc6", "libssl3", "libssl1.1", "perl"]);
    }

    #[test]
    fn test_parse_depends_field_empty() {
        assert!(parse_depends_field("").is_empty());
    }

    #[test]
    fn test_installed_from_status() {
        assert_eq!(
            installed_from_status("install ok installed|1.24.0-1\n"),
            Some("1.24.0-1".to_string())
        );
        assert_eq!(installed_from_status("deinstall ok config-files|1.0\n"), None);
        assert_eq!(installed_from_status(""), None);
    }

    #[test]
    fn test_parse_print_uris() {
        let output = "'http://deb.debian.org/debian/pool/main/n/nginx/nginx_1.24.0-1_amd64.deb' nginx_1.24.0-1_amd64.deb 561234 SHA256:abcd\n";
        assert_eq!(
            parse_print_uris(output),
            Some(
                "http://deb.debian.org/debian/pool/main/n/nginx/nginx_1.24.0-1_amd64.deb"
                    .to_string()
            )
        );
        assert_eq!(parse_print_uris("no uris here\n"), None);
    }
}
