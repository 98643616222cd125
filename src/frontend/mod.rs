//! Front-end contract.
//!
//! The AST and preprocessor machinery for C-family languages is an external
//! collaborator: this module defines the interface between the indexing
//! pipeline and whatever parser provides translation units. A
//! [`CompilerFrontend`] turns a compile command into a [`TranslationUnit`]
//! value exposing three things:
//!
//! 1. the **file table**: every buffer the preprocessor touched, real or
//!    imaginary;
//! 2. the **preprocessor transcript**: [`PpEvent`]s in callback order,
//!    `Enter → (macros/includes)* → Exit` per file, with the main file's
//!    exit possibly missing (malformed / reduced inputs are tolerated);
//! 3. the **AST records**: declaration, expression, and type-location
//!    nodes by category, plus the specifier references a default traversal
//!    misses (nested-name-specifiers, constructor initializers).
//!
//! # Key invariants
//!
//! - Event and record locations are *spelling* locations: a macro use
//!   inside an expansion points at the source token.
//! - Declaration records appear after the records of their enclosing
//!   contexts (`context` always points backwards).
//! - Override and base lists are acyclic.
//!
//! The in-tree implementation is [`replay::ReplayFrontend`], which loads a
//! serialized `TranslationUnit` from a JSON fixture next to each source
//! file. A libclang binding implements the same trait out of tree.

pub mod replay;

use serde::{Deserialize, Serialize};

use crate::compdb::CompileCommand;
use crate::error::IndexerError;
use crate::scip::FileRange;

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Opaque per-TU file identifier assigned by the front-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u32);

/// One buffer in the translation unit's file table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: FileId,
    /// Real filesystem path. `None` for imaginary buffers (the built-in
    /// header, command-line definitions).
    #[serde(default)]
    pub path: Option<String>,
}

// ---------------------------------------------------------------------------
// Preprocessor transcript
// ---------------------------------------------------------------------------

/// Where a macro's definition lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroOrigin {
    /// Defined in an actual file.
    File(FileId),
    /// Pre-defined by the compiler's built-in header.
    Builtin,
    /// Defined on the command line (`-D`).
    CommandLine,
}

/// The definition site identifying a macro.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroDefSite {
    pub origin: MacroOrigin,
    pub line: u32,
    pub col: u32,
}

/// The spelling site of a macro name token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroSite {
    pub file: FileId,
    pub range: FileRange,
}

/// One preprocessor callback, in transcript order.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PpEvent {
    /// The preprocessor entered a file. `None` marks an imaginary buffer
    /// with no file id at all.
    EnterFile { file: Option<FileId> },
    /// The preprocessor left a file. `None` mirrors an imaginary enter.
    ExitFile { file: Option<FileId> },
    /// `#define NAME body`. The definition site doubles as the macro's
    /// identity; the spelling site is `None` for built-in and command-line
    /// definitions.
    MacroDefined { name: String, body: String, def: MacroDefSite, site: Option<MacroSite> },
    /// `#undef NAME`, referring back to the definition being removed.
    MacroUndefined { name: String, site: Option<MacroSite>, def: Option<MacroDefSite> },
    /// A macro was expanded.
    MacroExpanded { name: String, site: Option<MacroSite>, def: Option<MacroDefSite> },
    /// A macro's definedness was tested (`#ifdef`, `#ifndef`, `#elifdef`,
    /// `#elifndef`, `defined(...)`).
    MacroTested { name: String, site: Option<MacroSite>, def: Option<MacroDefSite> },
    /// An `#include` directive, with the spelled range of the file name and
    /// the resolved target path.
    Inclusion { includer: FileId, range: FileRange, target: String },
}

// ---------------------------------------------------------------------------
// AST records
// ---------------------------------------------------------------------------

/// Per-TU declaration identifier; indexes the `decls` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclId(pub u32);

/// The declaration categories the indexer dispatches over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclKind {
    Binding,
    EnumConstant,
    Enum,
    Field,
    Function,
    Namespace,
    NonTypeTemplateParm,
    Record,
    TemplateTemplateParm,
    TemplateTypeParm,
    TypedefName,
    Var,
}

/// How a function is spelled; drives symbol naming for the special cases.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    #[default]
    Plain,
    Constructor,
    Destructor,
    /// `operator==` and friends; the record `name` carries the spelling.
    Operator,
    /// Conversion operator; the target type is encoded into the name.
    Conversion { target: String },
}

/// Category-specific payload of a declaration record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "detail", rename_all = "snake_case")]
pub enum DeclDetail {
    #[default]
    None,
    Namespace {
        #[serde(default)]
        is_anonymous: bool,
    },
    Record {
        #[serde(default)]
        is_anonymous: bool,
        /// Base classes, for implementation relationships.
        #[serde(default)]
        bases: Vec<DeclId>,
    },
    Enum {
        #[serde(default)]
        is_anonymous: bool,
    },
    Function {
        /// Canonical signature (parameter types and qualifiers), the input
        /// to the overload disambiguator.
        signature: String,
        #[serde(default)]
        kind: FunctionKind,
        #[serde(default)]
        is_virtual: bool,
        /// Methods this one directly overrides.
        #[serde(default)]
        overrides: Vec<DeclId>,
    },
    Var {
        /// Block-local variables and lambda captures become local symbols.
        #[serde(default)]
        is_local: bool,
        /// Function parameters become local symbols too.
        #[serde(default)]
        is_parameter: bool,
    },
}

/// One declaration site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeclRecord {
    pub id: DeclId,
    pub kind: DeclKind,
    /// Spelled name; empty for anonymous entities.
    #[serde(default)]
    pub name: String,
    pub file: FileId,
    /// Range of the name token (what the occurrence covers).
    pub range: FileRange,
    /// Enclosing declaration context, if any.
    #[serde(default)]
    pub context: Option<DeclId>,
    /// Whether this site is the entity's definition.
    #[serde(default)]
    pub is_definition: bool,
    /// Documentation lines attached at this site.
    #[serde(default)]
    pub documentation: Vec<String>,
    #[serde(default)]
    pub detail: DeclDetail,
}

/// The expression categories that yield reference occurrences.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprKind {
    CxxConstruct,
    DeclRef,
    Member,
}

/// A reference-producing expression node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExprRecord {
    pub kind: ExprKind,
    pub target: DeclId,
    pub file: FileId,
    pub range: FileRange,
}

/// The type-location categories that yield reference occurrences.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeLocKind {
    Enum,
    Record,
    TemplateSpecialization,
    TemplateTypeParm,
}

/// A reference-producing type location.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeLocRecord {
    pub kind: TypeLocKind,
    pub target: DeclId,
    pub file: FileId,
    pub range: FileRange,
}

/// Reference sites a default AST traversal misses; reported explicitly by
/// the front-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecifierKind {
    /// Qualifier components in `a::b::c`.
    NestedNameSpecifier,
    /// Field references in constructor member-initializer lists.
    CtorInitializer,
}

/// A specifier reference site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpecifierRecord {
    pub kind: SpecifierKind,
    pub target: DeclId,
    pub file: FileId,
    pub range: FileRange,
}

// ---------------------------------------------------------------------------
// TranslationUnit
// ---------------------------------------------------------------------------

/// Everything the front-end produced for one compile command.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub main_file: FileId,
    #[serde(default)]
    pub files: Vec<SourceFile>,
    #[serde(default)]
    pub pp_events: Vec<PpEvent>,
    #[serde(default)]
    pub decls: Vec<DeclRecord>,
    #[serde(default)]
    pub exprs: Vec<ExprRecord>,
    #[serde(default)]
    pub type_locs: Vec<TypeLocRecord>,
    #[serde(default)]
    pub specifier_refs: Vec<SpecifierRecord>,
}

impl Default for FileId {
    fn default() -> Self {
        Self(0)
    }
}

impl TranslationUnit {
    /// Real path of a file, or `None` for imaginary buffers and unknown
    /// ids.
    #[must_use]
    pub fn file_path(&self, id: FileId) -> Option<&str> {
        self.files.iter().find(|f| f.id == id).and_then(|f| f.path.as_deref())
    }

    /// Look up a declaration record. Ids index the table directly.
    #[must_use]
    pub fn decl(&self, id: DeclId) -> Option<&DeclRecord> {
        self.decls.get(id.0 as usize)
    }

    /// Sanity-check internal consistency: decl ids are table positions and
    /// contexts point backwards. Fixture loaders call this after parsing.
    ///
    /// # Errors
    /// Returns a description of the first inconsistency found.
    pub fn validate(&self) -> Result<(), String> {
        for (position, decl) in self.decls.iter().enumerate() {
            if decl.id.0 as usize != position {
                return Err(format!("decl at position {position} has id {}", decl.id.0));
            }
            if let Some(context) = decl.context
                && context.0 >= decl.id.0
            {
                return Err(format!("decl {} has non-backward context {}", decl.id.0, context.0));
            }
        }
        for expr in &self.exprs {
            if self.decl(expr.target).is_none() {
                return Err(format!("expr targets unknown decl {}", expr.target.0));
            }
        }
        for tl in &self.type_locs {
            if self.decl(tl.target).is_none() {
                return Err(format!("type-loc targets unknown decl {}", tl.target.0));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CompilerFrontend
// ---------------------------------------------------------------------------

/// A source of translation units.
///
/// Implementations are free to cache; the pipeline treats each `parse` call
/// as a fresh parse of the command's main file.
pub trait CompilerFrontend {
    /// Parse the translation unit described by `command`.
    ///
    /// # Errors
    /// Returns [`IndexerError::Frontend`] if no translation unit can be
    /// produced.
    fn parse(&self, command: &CompileCommand) -> Result<TranslationUnit, IndexerError>;
}
