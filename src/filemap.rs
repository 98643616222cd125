//! File identity: front-end ids to stable, run-independent file ids.
//!
//! The front-end hands out opaque per-TU [`FileId`]s; the index needs paths
//! that are stable across indexing runs and meaningful across translation
//! units. [`FileMetadataMap`] performs that classification once per file:
//!
//! 1. Files under a package-map root are external package files (or
//!    in-project files, for the main package).
//! 2. Files under the build root are generated; if a same-named file exists
//!    under the project root they are treated as that project file,
//!    otherwise they get a synthetic build-root path.
//! 3. Files under the project root are in-project.
//! 4. Anything else gets a synthetic external path.
//!
//! Invariants: an in-project file is never synthetic; an external
//! non-synthetic file always has package metadata; a synthetic file never
//! has package metadata.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::frontend::FileId;
use crate::hash::HashValue;
use crate::packagemap::{PackageMap, PackageMetadata};
use crate::path::{AbsolutePath, RootKind, RootRelativePath};

// ---------------------------------------------------------------------------
// StableFileId / FileMetadata
// ---------------------------------------------------------------------------

/// An identifier for a file that is stable across indexing runs,
/// represented as a root-relative path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StableFileId {
    pub path: RootRelativePath,
    /// Does this file belong to the project being indexed?
    pub in_project: bool,
    /// Was this path synthesized rather than derived from a real root?
    pub synthetic: bool,
}

/// Everything the indexer tracks for one observed file.
#[derive(Clone, Debug)]
pub struct FileMetadata {
    pub stable_id: StableFileId,
    pub original_path: AbsolutePath,
    pub package: Option<Arc<PackageMetadata>>,
}

impl FileMetadata {
    fn new(
        stable_id: StableFileId,
        original_path: AbsolutePath,
        package: Option<Arc<PackageMetadata>>,
    ) -> Self {
        debug_assert!(
            !(stable_id.in_project && stable_id.synthetic),
            "in-project file marked synthetic: {}",
            stable_id.path
        );
        debug_assert!(
            stable_id.in_project || stable_id.synthetic || package.is_some(),
            "external non-synthetic file without package info: {}",
            stable_id.path
        );
        debug_assert!(
            !stable_id.synthetic || package.is_none(),
            "synthetic file with package info: {}",
            stable_id.path
        );
        Self { stable_id, original_path, package }
    }
}

// ---------------------------------------------------------------------------
// PathHashLookup
// ---------------------------------------------------------------------------

/// Reverse lookup from (absolute path, content hash) to the front-end file
/// id, filled in when the preprocessor transcript is flushed.
///
/// Inner maps are never empty.
#[derive(Debug, Default)]
pub struct PathHashLookup {
    map: HashMap<AbsolutePath, HashMap<HashValue, FileId>>,
}

impl PathHashLookup {
    /// Record one (path, hash, id) association. A later insert for the same
    /// (path, hash) replaces the id; a single representative is sufficient.
    pub fn insert(&mut self, path: AbsolutePath, hash: HashValue, id: FileId) {
        self.map.entry(path).or_default().insert(hash, id);
    }

    /// Exact lookup by path and hash.
    #[must_use]
    pub fn lookup(&self, path: &AbsolutePath, hash: HashValue) -> Option<FileId> {
        self.map.get(path)?.get(&hash).copied()
    }

    /// Any file id recorded for this path; used when recording include
    /// edges, where any representative will do.
    #[must_use]
    pub fn lookup_any(&self, path: &AbsolutePath) -> Option<FileId> {
        let inner = self.map.get(path)?;
        debug_assert!(!inner.is_empty(), "stored an empty hash map for {path}");
        inner.values().next().copied()
    }

    /// Visit every (path, hash-map) pair.
    pub fn for_each(&self, mut f: impl FnMut(&AbsolutePath, &HashMap<HashValue, FileId>)) {
        for (path, inner) in &self.map {
            debug_assert!(!inner.is_empty(), "stored an empty hash map for {path}");
            f(path, inner);
        }
    }

    /// Number of distinct paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no path has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ---------------------------------------------------------------------------
// FileMetadataMap
// ---------------------------------------------------------------------------

/// Classifies observed files and maps front-end ids to [`FileMetadata`].
pub struct FileMetadataMap {
    project_root: AbsolutePath,
    build_root: AbsolutePath,
    package_map: PackageMap,
    map: HashMap<FileId, FileMetadata>,
}

impl FileMetadataMap {
    /// Create an empty map for one translation unit.
    #[must_use]
    pub fn new(
        project_root: AbsolutePath,
        build_root: AbsolutePath,
        package_map: PackageMap,
    ) -> Self {
        Self { project_root, build_root, package_map, map: HashMap::new() }
    }

    /// Classify every file recorded in `lookup`.
    ///
    /// # Errors
    /// Propagates path-validation failures for synthesized paths (which
    /// would indicate a front-end handing out degenerate paths).
    pub fn populate(&mut self, lookup: &PathHashLookup) -> Result<()> {
        let mut pairs: Vec<(AbsolutePath, Vec<FileId>)> = Vec::new();
        lookup.for_each(|path, inner| {
            pairs.push((path.clone(), inner.values().copied().collect()));
        });
        for (path, ids) in pairs {
            for id in ids {
                self.insert(id, &path)?;
            }
        }
        Ok(())
    }

    /// Classify one file and record its metadata. Returns `false` when the
    /// id was already present.
    ///
    /// # Errors
    /// Propagates path-validation failures for synthesized paths.
    pub fn insert(&mut self, id: FileId, path: &AbsolutePath) -> Result<bool> {
        if self.map.contains_key(&id) {
            return Ok(false);
        }
        let metadata = self.classify(path)?;
        self.map.insert(id, metadata);
        Ok(true)
    }

    fn classify(&mut self, path: &AbsolutePath) -> Result<FileMetadata> {
        if let Some(package) = self.package_map.lookup(path) {
            if let Some(rel) = package.root.make_relative(path) {
                let stable_id = StableFileId {
                    path: RootRelativePath::new(RootKind::External, rel)?,
                    in_project: package.is_main,
                    synthetic: false,
                };
                return Ok(FileMetadata::new(stable_id, path.clone(), Some(package)));
            }
            warn!(
                root = %package.root,
                path = %path,
                "package map chose a root for a path it is not a prefix of"
            );
        }

        // CMake-style builds pass both project files and generated files in
        // the build root; generated files with a project counterpart are
        // indexed under the project path.
        if let Some(rel) = self.build_root.make_relative(path) {
            let counterpart = self.project_root.join(rel);
            if std::path::Path::new(counterpart.as_str()).exists() {
                let stable_id = StableFileId {
                    path: RootRelativePath::new(RootKind::Project, rel)?,
                    in_project: true,
                    synthetic: false,
                };
                return Ok(FileMetadata::new(stable_id, path.clone(), None));
            }
            let stable_id = StableFileId {
                path: RootRelativePath::new(RootKind::Build, &format!("<generated>/{rel}"))?,
                in_project: false,
                synthetic: true,
            };
            return Ok(FileMetadata::new(stable_id, path.clone(), None));
        }

        if let Some(rel) = self.project_root.make_relative(path) {
            let stable_id = StableFileId {
                path: RootRelativePath::new(RootKind::Project, rel)?,
                in_project: true,
                synthetic: false,
            };
            return Ok(FileMetadata::new(stable_id, path.clone(), None));
        }

        let fake = format!("<external>{}", path.as_str());
        let stable_id = StableFileId {
            path: RootRelativePath::new(RootKind::External, &fake)?,
            in_project: false,
            synthetic: true,
        };
        Ok(FileMetadata::new(stable_id, path.clone(), None))
    }

    /// Metadata for a classified file.
    #[must_use]
    pub fn get(&self, id: FileId) -> Option<&FileMetadata> {
        self.map.get(&id)
    }

    /// The project root this map classifies against.
    #[must_use]
    pub fn project_root(&self) -> &AbsolutePath {
        &self.project_root
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
