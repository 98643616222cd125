//! Package map: which source roots belong to which named packages.
//!
//! The package map is a JSON array of `{"path": ..., "package":
//! "name@version"}` entries. Paths are normalized to absolute form with any
//! trailing separator stripped; `name` and `version` are validated against
//! `[A-Za-z0-9._-]+`. Exactly one entry must cover the project root; that
//! entry becomes the *main package*, and files under it count as
//! in-project.
//!
//! Lookup is longest-prefix over a file's ancestor directories, with
//! negative prefixes cached so deep trees don't re-walk the map.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{IndexerError, Result};
use crate::path::AbsolutePath;

// ---------------------------------------------------------------------------
// Package identity
// ---------------------------------------------------------------------------

/// A package name plus version, both non-empty and `[A-Za-z0-9._-]+`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

/// Everything the indexer knows about one package root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageMetadata {
    pub id: PackageId,
    /// Root directory, normalized, no trailing separator.
    pub root: AbsolutePath,
    /// Whether this entry covers the project being indexed.
    pub is_main: bool,
}

// ---------------------------------------------------------------------------
// PackageMap
// ---------------------------------------------------------------------------

/// Longest-prefix map from directories to package metadata.
#[derive(Clone, Debug, Default)]
pub struct PackageMap {
    by_root: HashMap<String, Arc<PackageMetadata>>,
    /// Prefixes known not to be package roots.
    negative: HashSet<String>,
}

#[derive(Deserialize)]
struct PackageMapEntry {
    path: String,
    package: String,
}

fn is_valid_component(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl PackageMap {
    /// An empty map: every file resolves to "no package".
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a package map file, validating entries and marking the entry
    /// matching `project_root` as the main package.
    ///
    /// # Errors
    /// Returns a configuration error if the file is missing or malformed,
    /// an entry fails validation, or no entry covers the project root.
    pub fn load(path: &Path, project_root: &AbsolutePath) -> Result<Self> {
        let bytes = fs::read(path)
            .map_err(|e| IndexerError::config("package map", path, format!("cannot read: {e}")))?;
        let entries: Vec<PackageMapEntry> = serde_json::from_slice(&bytes)
            .map_err(|e| IndexerError::config("package map", path, format!("malformed JSON: {e}")))?;
        if entries.is_empty() {
            return Err(IndexerError::config(
                "package map",
                path,
                "empty map; add one entry per package",
            ));
        }

        let mut map = Self::default();
        for entry in entries {
            let root = if entry.path.starts_with('/') {
                AbsolutePath::new(&entry.path)?
            } else {
                // Relative entries resolve against the current directory.
                let cwd = std::env::current_dir().map_err(|e| IndexerError::io(".", e))?;
                AbsolutePath::new(&cwd.to_string_lossy())?.join(&entry.path)
            };
            let Some((name, version)) = entry.package.split_once('@') else {
                return Err(IndexerError::config(
                    "package map",
                    path,
                    format!("expected 'name@version', found '{}'", entry.package),
                ));
            };
            if !is_valid_component(name) || !is_valid_component(version) {
                return Err(IndexerError::config(
                    "package map",
                    path,
                    format!("name and version must match [A-Za-z0-9._-]+, found '{}'", entry.package),
                ));
            }
            let is_main = &root == project_root;
            map.by_root.insert(
                root.as_str().to_owned(),
                Arc::new(PackageMetadata {
                    id: PackageId { name: name.to_owned(), version: version.to_owned() },
                    root,
                    is_main,
                }),
            );
        }

        if !map.by_root.values().any(|m| m.is_main) {
            return Err(IndexerError::config(
                "package map",
                path,
                format!("no entry covers the project root {project_root}"),
            ));
        }
        Ok(map)
    }

    /// Find the package owning `file` via longest-prefix match over its
    /// ancestor directories. Caches negative prefixes along the way.
    pub fn lookup(&mut self, file: &AbsolutePath) -> Option<Arc<PackageMetadata>> {
        if self.by_root.is_empty() {
            return None;
        }
        let mut missed: Vec<String> = Vec::new();
        let mut found = None;
        for prefix in file.ancestors() {
            if self.negative.contains(prefix) {
                continue;
            }
            if let Some(meta) = self.by_root.get(prefix) {
                found = Some(Arc::clone(meta));
                break;
            }
            missed.push(prefix.to_owned());
        }
        self.negative.extend(missed);
        found
    }

    /// Number of package entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_root.len()
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_root.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write_map(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("package-map.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn longest_prefix_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_map(
            dir.path(),
            r#"[
                {"path": "/proj", "package": "main@1.0"},
                {"path": "/proj/vendor/libx", "package": "libx@2.3"}
            ]"#,
        );
        let root = AbsolutePath::new("/proj").unwrap();
        let mut map = PackageMap::load(&path, &root).unwrap();

        let inner = AbsolutePath::new("/proj/vendor/libx/include/x.h").unwrap();
        let meta = map.lookup(&inner).unwrap();
        assert_eq!(meta.id.name, "libx");
        assert!(!meta.is_main);

        let outer = AbsolutePath::new("/proj/src/a.cc").unwrap();
        let meta = map.lookup(&outer).unwrap();
        assert_eq!(meta.id.name, "main");
        assert!(meta.is_main);

        let foreign = AbsolutePath::new("/usr/include/stdio.h").unwrap();
        assert!(map.lookup(&foreign).is_none());
        // Second miss hits the negative cache.
        assert!(map.lookup(&foreign).is_none());
    }

    #[test]
    fn rejects_bad_package_field() {
        let dir = tempfile::tempdir().unwrap();
        let root = AbsolutePath::new("/proj").unwrap();
        for bad in [r#"[{"path": "/proj", "package": "noversion"}]"#,
            r#"[{"path": "/proj", "package": "sp ace@1.0"}]"#] {
            let path = write_map(dir.path(), bad);
            assert!(PackageMap::load(&path, &root).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn requires_project_root_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_map(dir.path(), r#"[{"path": "/other", "package": "x@1"}]"#);
        let root = AbsolutePath::new("/proj").unwrap();
        let err = PackageMap::load(&path, &root).unwrap_err();
        assert!(err.is_config());
    }
}
