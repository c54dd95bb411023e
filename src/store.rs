// src/store.rs

//! Artifact store: copied/downloaded package artifacts plus persisted logs
//!
//! The store is a flat directory of `.deb` artifacts alongside three
//! append-only text logs (processed set, unfetchable set, conflict log) and
//! the recorded main package name. The logs survive process restarts; a
//! resumed run picks up exactly where the previous one stopped. One process
//! mutates the store at a time; concurrent runs are unsupported.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Newline-delimited names already expanded by the resolver
pub const PROCESSED_FILE: &str = "processed_dependencies.txt";
/// Newline-delimited names for which every fetch tier was exhausted
pub const UNFETCHABLE_FILE: &str = "unfetchable_packages.txt";
/// Write-once conflict decisions, one per line
pub const CONFLICT_LOG_FILE: &str = "conflict_resolution.log";
/// Single line naming the root package
pub const MAIN_PACKAGE_FILE: &str = "main_package.txt";

const ARTIFACT_EXTENSION: &str = "deb";

/// Build the canonical artifact file name for a package
///
/// apt encodes the epoch colon as `%3a` in downloaded filenames; the same
/// convention keeps name and version recoverable from the filename here.
pub fn artifact_file_name(name: &str, version: &str) -> String {
    format!(
        "{}_{}.{}",
        name,
        version.replace(':', "%3a"),
        ARTIFACT_EXTENSION
    )
}

/// Recover (name, version) from an artifact file name
///
/// Returns None for files that do not follow the `name_version.deb`
/// convention.
pub fn parse_artifact_file_name(file_name: &str) -> Option<(String, String)> {
    let stem = file_name.strip_suffix(&format!(".{ARTIFACT_EXTENSION}"))?;
    let (name, version) = stem.split_once('_')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.replace("%3a", ":")))
}

/// On-disk artifact store
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create the store directory if needed and open it (build phase)
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            Error::IoError(format!(
                "Failed to create store directory {}: {e}",
                root.display()
            ))
        })?;
        debug!("Opened artifact store at {}", root.display());
        Ok(Self { root })
    }

    /// Open an existing store (install phase); missing store is structural
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::StoreMissing(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical path for a package's artifact
    pub fn artifact_path(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(artifact_file_name(name, version))
    }

    /// All artifact files in the store, sorted by file name
    pub fn artifacts(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            Error::IoError(format!("Failed to read store {}: {e}", self.root.display()))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .map(|ext| ext == ARTIFACT_EXTENSION)
                        .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Locate the artifact for a package name, any version
    pub fn find_artifact(&self, name: &str) -> Result<Option<PathBuf>> {
        for path in self.artifacts()? {
            if let Some(file_name) = path.file_name().and_then(|f| f.to_str()) {
                if let Some((pkg, _version)) = parse_artifact_file_name(file_name) {
                    if pkg == name {
                        return Ok(Some(path));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Write artifact bytes via a temp file and atomic rename
    pub fn write_artifact(&self, name: &str, version: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dest = self.artifact_path(name, version);
        let temp = dest.with_extension("tmp");

        let mut file = fs::File::create(&temp)
            .map_err(|e| Error::IoError(format!("Failed to create {}: {e}", temp.display())))?;
        file.write_all(bytes)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {e}", temp.display())))?;

        fs::rename(&temp, &dest).map_err(|e| {
            Error::IoError(format!(
                "Failed to move {} to {}: {e}",
                temp.display(),
                dest.display()
            ))
        })?;
        Ok(dest)
    }

    /// Remove an artifact file (used when validation rejects it)
    pub fn remove_artifact(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .map_err(|e| Error::IoError(format!("Failed to remove {}: {e}", path.display())))
    }

    /// Names already expanded by the resolver
    pub fn processed(&self) -> Result<HashSet<String>> {
        Ok(self.read_names(PROCESSED_FILE)?.into_iter().collect())
    }

    /// Append a name to the processed set
    pub fn mark_processed(&self, name: &str) -> Result<()> {
        self.append_line(PROCESSED_FILE, name)
    }

    /// Names that exhausted every fetch tier, in recording order
    pub fn unfetchable(&self) -> Result<Vec<String>> {
        self.read_names(UNFETCHABLE_FILE)
    }

    /// Record a permanently unfetchable name (deduplicated)
    pub fn record_unfetchable(&self, name: &str) -> Result<()> {
        if self.read_names(UNFETCHABLE_FILE)?.iter().any(|n| n == name) {
            return Ok(());
        }
        self.append_line(UNFETCHABLE_FILE, name)
    }

    /// Append one write-once line to the conflict log
    pub fn append_conflict_line(&self, line: &str) -> Result<()> {
        self.append_line(CONFLICT_LOG_FILE, line)
    }

    /// All conflict log lines, oldest first
    pub fn conflict_log(&self) -> Result<Vec<String>> {
        self.read_names(CONFLICT_LOG_FILE)
    }

    /// Record the root package name (build phase)
    pub fn set_main_package(&self, name: &str) -> Result<()> {
        let path = self.root.join(MAIN_PACKAGE_FILE);
        fs::write(&path, format!("{name}\n"))
            .map_err(|e| Error::IoError(format!("Failed to write {}: {e}", path.display())))
    }

    /// The recorded root package name; missing or empty is structural
    pub fn main_package(&self) -> Result<String> {
        let path = self.root.join(MAIN_PACKAGE_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return Err(Error::MainPackageMissing(self.root.clone())),
        };
        let name = content.lines().next().unwrap_or("").trim().to_string();
        if name.is_empty() {
            return Err(Error::MainPackageMissing(self.root.clone()));
        }
        Ok(name)
    }

    fn read_names(&self, file: &str) -> Result<Vec<String>> {
        let path = self.root.join(file);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(content
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn append_line(&self, file: &str, line: &str) -> Result<()> {
        let path = self.root.join(file);
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::IoError(format!("Failed to open {}: {e}", path.display())))?;
        writeln!(f, "{line}")
            .map_err(|e| Error::IoError(format!("Failed to append to {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_artifact_file_name_round_trip() {
        let file = artifact_file_name("libssl3", "3.0.2-0ubuntu1.10");
        assert_eq!(file, "libssl3_3.0.2-0ubuntu1.10.deb");
        assert_eq!(
            parse_artifact_file_name(&file),
            Some(("libssl3".to_string(), "3.0.2-0ubuntu1.10".to_string()))
        );
    }

    #[test]
    fn test_artifact_file_name_epoch_encoding() {
        let file = artifact_file_name("vim", "2:8.2.3995-1ubuntu2");
        assert_eq!(file, "vim_2%3a8.2.3995-1ubuntu2.deb");
        assert_eq!(
            parse_artifact_file_name(&file),
            Some(("vim".to_string(), "2:8.2.3995-1ubuntu2".to_string()))
        );
    }

    #[test]
    fn test_parse_artifact_file_name_rejects_other_files() {
        assert_eq!(parse_artifact_file_name("processed_dependencies.txt"), None);
        assert_eq!(parse_artifact_file_name("noversion.deb"), None);
    }

    #[test]
    fn test_open_missing_store_is_structural() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nowhere");
        match ArtifactStore::open(&missing) {
            Err(Error::StoreMissing(path)) => assert_eq!(path, missing),
            other => panic!("expected StoreMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_processed_set_round_trip() {
        let (_dir, store) = temp_store();
        assert!(store.processed().unwrap().is_empty());

        store.mark_processed("foo").unwrap();
        store.mark_processed("bar").unwrap();

        let processed = store.processed().unwrap();
        assert!(processed.contains("foo"));
        assert!(processed.contains("bar"));
        assert_eq!(processed.len(), 2);
    }

    #[test]
    fn test_unfetchable_deduplicates() {
        let (_dir, store) = temp_store();
        store.record_unfetchable("ghost").unwrap();
        store.record_unfetchable("ghost").unwrap();
        assert_eq!(store.unfetchable().unwrap(), vec!["ghost".to_string()]);
    }

    #[test]
    fn test_main_package_round_trip() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.main_package(),
            Err(Error::MainPackageMissing(_))
        ));

        store.set_main_package("nginx").unwrap();
        assert_eq!(store.main_package().unwrap(), "nginx");
    }

    #[test]
    fn test_write_and_find_artifact() {
        let (_dir, store) = temp_store();
        let path = store.write_artifact("foo", "1.0", b"artifact-bytes").unwrap();
        assert!(path.exists());

        let found = store.find_artifact("foo").unwrap();
        assert_eq!(found, Some(path.clone()));
        assert_eq!(store.find_artifact("bar").unwrap(), None);

        store.remove_artifact(&path).unwrap();
        assert_eq!(store.find_artifact("foo").unwrap(), None);
    }
}
