//! SCIP wire model.
//!
//! In-memory representations of the messages that end up on disk: shard and
//! final-index documents, occurrences, symbol information, and the forward
//! declaration records that ride alongside each shard. Serialization is
//! canonical JSON (struct field order, sorted collections when determinism
//! is requested) written with write-to-temp + atomic rename, so shards are
//! either fully present or absent.
//!
//! The schema is deliberately isolated in this one module: the rest of the
//! pipeline only manipulates these types, so a different on-disk encoding
//! can be slotted in behind [`write_artifact`] / [`read_artifact`] without
//! touching the pipeline.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};

// ---------------------------------------------------------------------------
// Source ranges
// ---------------------------------------------------------------------------

/// An inclusive, 1-based source range within a single file.
///
/// The wire form is the SCIP convention: 0-based `[line, col, endCol]` for
/// single-line ranges (the end line is collapsed to save space) and
/// `[line, col, endLine, endCol]` otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<i32>", into = "Vec<i32>")]
pub struct FileRange {
    /// 1-based first line.
    pub start_line: u32,
    /// 1-based first column.
    pub start_col: u32,
    /// 1-based last line (>= `start_line`).
    pub end_line: u32,
    /// 1-based last column.
    pub end_col: u32,
}

impl FileRange {
    /// Create a range, enforcing `start <= end`.
    #[must_use]
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        debug_assert!(
            (start_line, start_col) <= (end_line, end_col),
            "inverted range {start_line}:{start_col}-{end_line}:{end_col}"
        );
        Self { start_line, start_col, end_line, end_col }
    }

    /// A single-line range from a line, a column, and a token length.
    #[must_use]
    pub fn for_token(line: u32, col: u32, len: u32) -> Self {
        Self::new(line, col, line, col + len)
    }
}

impl std::fmt::Display for FileRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}-{}:{}", self.start_line, self.start_col, self.end_line, self.end_col)
    }
}

impl From<FileRange> for Vec<i32> {
    fn from(r: FileRange) -> Self {
        let sl = r.start_line as i32 - 1;
        let sc = r.start_col as i32 - 1;
        let el = r.end_line as i32 - 1;
        let ec = r.end_col as i32 - 1;
        if r.start_line == r.end_line { vec![sl, sc, ec] } else { vec![sl, sc, el, ec] }
    }
}

impl TryFrom<Vec<i32>> for FileRange {
    type Error = String;

    fn try_from(v: Vec<i32>) -> Result<Self, Self::Error> {
        let to_u32 = |x: i32| -> Result<u32, String> {
            u32::try_from(x + 1).map_err(|_| format!("negative range element {x}"))
        };
        match v.as_slice() {
            [sl, sc, ec] => Ok(Self {
                start_line: to_u32(*sl)?,
                start_col: to_u32(*sc)?,
                end_line: to_u32(*sl)?,
                end_col: to_u32(*ec)?,
            }),
            [sl, sc, el, ec] => Ok(Self {
                start_line: to_u32(*sl)?,
                start_col: to_u32(*sc)?,
                end_line: to_u32(*el)?,
                end_col: to_u32(*ec)?,
            }),
            other => Err(format!("expected 3 or 4 range elements, got {}", other.len())),
        }
    }
}

// ---------------------------------------------------------------------------
// Roles and syntax kinds
// ---------------------------------------------------------------------------

/// Symbol role bitmask values. Plain references carry no bits.
pub mod symbol_role {
    /// The occurrence is the definition of its symbol.
    pub const DEFINITION: u32 = 0x1;
    /// The occurrence is a forward definition (declaration without a body).
    pub const FORWARD_DEFINITION: u32 = 0x40;
}

/// Syntactic classification of an occurrence, mirroring the SCIP enum for
/// the kinds this indexer emits.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SyntaxKind {
    #[default]
    UnspecifiedSyntaxKind,
    Identifier,
    IdentifierNamespace,
    IdentifierType,
    IdentifierFunction,
    IdentifierFunctionDefinition,
    IdentifierLocal,
    IdentifierConstant,
    IdentifierParameter,
    IdentifierMacro,
    IdentifierMacroDefinition,
}

// ---------------------------------------------------------------------------
// Occurrences and symbol information
// ---------------------------------------------------------------------------

/// A single (range, symbol, role) datum attached to a file.
///
/// `Ord` is derived with the fields in (range, symbol, roles) order, which
/// is exactly the deterministic sort key for occurrence collections.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Occurrence {
    pub range: FileRange,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub symbol_roles: u32,
    #[serde(default, skip_serializing_if = "is_unspecified")]
    pub syntax_kind: SyntaxKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub override_documentation: Vec<String>,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_unspecified(k: &SyntaxKind) -> bool {
    *k == SyntaxKind::UnspecifiedSyntaxKind
}

/// A relationship edge from one symbol to another, deduplicated by the full
/// tuple.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_definition: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_reference: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_type_definition: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_implementation: bool,
}

/// Per-symbol metadata, emitted once per definition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInformation {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documentation: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

// ---------------------------------------------------------------------------
// Documents and indexes
// ---------------------------------------------------------------------------

/// All occurrences and symbol metadata for one file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub language: String,
    pub relative_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub occurrences: Vec<Occurrence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<SymbolInformation>,
}

/// A partial or final index: documents plus symbols defined outside them.
///
/// The same message doubles as the per-job shard and the merged output, so
/// re-running the merger over a single shard reproduces it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_symbols: Vec<SymbolInformation>,
}

// ---------------------------------------------------------------------------
// Forward declaration shard
// ---------------------------------------------------------------------------

/// A reference site recorded for a forward-declared entity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForwardDeclReference {
    pub relative_path: String,
    pub range: FileRange,
}

/// A forward-declared entity whose definition this translation unit never
/// saw. Keyed by the package-agnostic symbol suffix so the merger can match
/// it against a definition found in another translation unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardDecl {
    pub suffix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub documentation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ForwardDeclReference>,
}

/// The sidecar shard carrying all forward declarations for one job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardDeclIndex {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forward_decls: Vec<ForwardDecl>,
}

// ---------------------------------------------------------------------------
// Artifact I/O
// ---------------------------------------------------------------------------

/// Serialize `value` as JSON to `path` via write-to-temp + fsync + rename,
/// so concurrent readers never observe a half-written artifact.
///
/// # Errors
/// Returns an error if serialization or any filesystem step fails.
pub fn write_artifact<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).map_err(|e| IndexerError::io(&tmp, e))?;
    file.write_all(&bytes).map_err(|e| IndexerError::io(&tmp, e))?;
    file.sync_all().map_err(|e| IndexerError::io(&tmp, e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| IndexerError::io(path, e))?;
    Ok(())
}

/// Read an artifact previously written with [`write_artifact`].
///
/// # Errors
/// Returns an error if the file is missing or does not parse.
pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| IndexerError::io(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_range_collapses_on_the_wire() {
        let r = FileRange::new(3, 5, 3, 9);
        let wire: Vec<i32> = r.into();
        assert_eq!(wire, vec![2, 4, 8]);
        assert_eq!(FileRange::try_from(wire).unwrap(), r);
    }

    #[test]
    fn multi_line_range_keeps_four_elements() {
        let r = FileRange::new(3, 5, 6, 2);
        let wire: Vec<i32> = r.into();
        assert_eq!(wire, vec![2, 4, 5, 1]);
        assert_eq!(FileRange::try_from(wire).unwrap(), r);
    }

    #[test]
    fn occurrence_sort_key_is_range_then_symbol_then_role() {
        let occ = |line, sym: &str, roles| Occurrence {
            range: FileRange::for_token(line, 1, 3),
            symbol: sym.to_owned(),
            symbol_roles: roles,
            syntax_kind: SyntaxKind::Identifier,
            override_documentation: Vec::new(),
        };
        let mut v = vec![occ(2, "b", 0), occ(2, "a", 1), occ(1, "z", 0), occ(2, "a", 0)];
        v.sort();
        assert_eq!(v[0].symbol, "z");
        assert_eq!((v[1].symbol.as_str(), v[1].symbol_roles), ("a", 0));
        assert_eq!((v[2].symbol.as_str(), v[2].symbol_roles), ("a", 1));
        assert_eq!(v[3].symbol, "b");
    }

    #[test]
    fn artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.index.json");
        let index = Index {
            documents: vec![Document {
                language: "CPP".to_owned(),
                relative_path: "a.cc".to_owned(),
                ..Document::default()
            }],
            external_symbols: Vec::new(),
        };
        write_artifact(&path, &index).unwrap();
        let back: Index = read_artifact(&path).unwrap();
        assert_eq!(back, index);
        assert!(!path.with_extension("tmp").exists());
    }
}
