//! Path values used throughout the indexer.
//!
//! Foundation types for the file model: [`AbsolutePath`] (a validated,
//! lexically normalized absolute path), [`RootRelativePath`] (a path relative
//! to one of the three named roots), and [`RootKind`]. Every path stored in
//! any map in this crate goes through these constructors, so lookups never
//! have to worry about `.`/`..` components or trailing separators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

// ---------------------------------------------------------------------------
// Lexical normalization
// ---------------------------------------------------------------------------

/// Lexically normalize a path: resolve `.` and `..` components textually,
/// collapse repeated separators, and strip any trailing separator.
///
/// Purely textual; never touches the filesystem, so symlinks are not
/// resolved. Idempotent: `normalize(normalize(p)) == normalize(p)`.
#[must_use]
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                match parts.last() {
                    Some(&"..") | None if !absolute => parts.push(".."),
                    Some(_) => {
                        parts.pop();
                    }
                    // `/..` is `/`
                    None => {}
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

// ---------------------------------------------------------------------------
// AbsolutePath
// ---------------------------------------------------------------------------

/// A validated, non-empty, lexically normalized absolute path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AbsolutePath(String);

impl AbsolutePath {
    /// Create a new `AbsolutePath`, validating and normalizing the input.
    ///
    /// # Errors
    /// Returns an error if the string is empty or not absolute.
    pub fn new(s: &str) -> Result<Self, IndexerError> {
        if s.is_empty() {
            return Err(IndexerError::InvalidPath {
                value: s.to_owned(),
                reason: "empty path".to_owned(),
            });
        }
        if !s.starts_with('/') {
            return Err(IndexerError::InvalidPath {
                value: s.to_owned(),
                reason: "expected an absolute path".to_owned(),
            });
        }
        Ok(Self(normalize(s)))
    }

    /// Return the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final path component. Empty only for the root path `/`.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Join a relative tail onto this path, renormalizing.
    #[must_use]
    pub fn join(&self, tail: &str) -> Self {
        Self(normalize(&format!("{}/{tail}", self.0)))
    }

    /// Strip `self` off the front of `longer`, respecting component
    /// boundaries. Returns the relative remainder, or `None` if `longer` is
    /// not inside `self`.
    #[must_use]
    pub fn make_relative<'a>(&self, longer: &'a Self) -> Option<&'a str> {
        let prefix = &self.0;
        let rest = longer.0.strip_prefix(prefix.as_str())?;
        if rest.is_empty() {
            return None;
        }
        // "/a/b" must not claim "/a/bc/d".
        let rest = rest.strip_prefix('/')?;
        if rest.is_empty() { None } else { Some(rest) }
    }

    /// Iterate ancestor directories of this path, longest first, excluding
    /// the path itself. Used for longest-prefix package lookup.
    pub fn ancestors(&self) -> impl Iterator<Item = &str> {
        let value = self.0.as_str();
        let mut end = value.len();
        std::iter::from_fn(move || {
            let cut = value[..end].rfind('/')?;
            end = cut;
            if cut == 0 { Some("/") } else { Some(&value[..cut]) }
        })
    }
}

impl fmt::Display for AbsolutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AbsolutePath {
    type Err = IndexerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AbsolutePath {
    type Error = IndexerError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<AbsolutePath> for String {
    fn from(p: AbsolutePath) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// RootKind / RootRelativePath
// ---------------------------------------------------------------------------

/// Which named root a relative path hangs off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    /// The repository being indexed.
    Project,
    /// Where generated files live (often inside the project root).
    Build,
    /// Conceptual root for files outside both, including synthesized paths.
    External,
}

/// A non-empty, normalized path relative to one of the named roots.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RootRelativePath {
    kind: RootKind,
    path: String,
}

impl RootRelativePath {
    /// Create a new root-relative path, validating and normalizing.
    ///
    /// # Errors
    /// Returns an error if the string is empty or absolute.
    pub fn new(kind: RootKind, s: &str) -> Result<Self, IndexerError> {
        if s.is_empty() {
            return Err(IndexerError::InvalidPath {
                value: s.to_owned(),
                reason: "empty relative path".to_owned(),
            });
        }
        if s.starts_with('/') {
            return Err(IndexerError::InvalidPath {
                value: s.to_owned(),
                reason: "expected a relative path".to_owned(),
            });
        }
        let path = normalize(s);
        if path.is_empty() {
            return Err(IndexerError::InvalidPath {
                value: s.to_owned(),
                reason: "path normalizes to the root itself".to_owned(),
            });
        }
        Ok(Self { kind, path })
    }

    /// The root this path is relative to.
    #[must_use]
    pub fn kind(&self) -> RootKind {
        self.kind
    }

    /// The relative path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// The final path component.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }
}

impl fmt::Display for RootRelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
