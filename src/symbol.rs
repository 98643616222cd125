//! SCIP symbol string formatting.
//!
//! Produces the stable, package-qualified symbol strings that tie
//! occurrences together across translation units and repositories. The
//! grammar is `<scheme> <manager> <package-name> <package-version>
//! <descriptor>+`, whitespace-separated, with one descriptor per enclosing
//! context:
//!
//! - namespace `X` → `X/`
//! - type `X` → `X#`
//! - term `X` → `X.`
//! - method `X` with disambiguator `D` → `X(D).`
//! - macro at `F:L:C` → `F:L:C#`
//!
//! The package version field carries a trailing `$` so that the marker
//! sequence `$ ` separates the package prefix from the structural suffix.
//! Producers of forward declarations (which do not know the defining
//! package) and consumers of definitions (which do) agree on everything
//! after the marker, which is what makes cross-TU forward-decl resolution
//! possible without shared package knowledge.
//!
//! Local entities (block locals, parameters, template parameters,
//! structured bindings) never escape their translation unit and use the
//! `local N` form with a per-file counter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::filemap::FileMetadataMap;
use crate::frontend::{
    DeclDetail, DeclId, DeclKind, FileId, FunctionKind, MacroDefSite, MacroOrigin, TranslationUnit,
};
use crate::hash::fingerprint;

/// Presumed file name for compiler-predefined macros.
const BUILTIN_FILE_NAME: &str = "<built-in>";
/// Presumed file name for `-D` command-line macros.
const COMMAND_LINE_FILE_NAME: &str = "<command line>";

// ---------------------------------------------------------------------------
// SymbolName
// ---------------------------------------------------------------------------

/// An interned symbol string. Cheap to clone; compared by content.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SymbolName(Arc<str>);

impl SymbolName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The package-agnostic tail following the `$ ` marker, when present.
    #[must_use]
    pub fn package_agnostic_suffix(&self) -> Option<&str> {
        package_agnostic_suffix(&self.0)
    }
}

impl fmt::Display for SymbolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SymbolName {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<SymbolName> for String {
    fn from(s: SymbolName) -> Self {
        s.0.as_ref().to_owned()
    }
}

/// Extract the package-agnostic suffix of a symbol string: everything after
/// the first `$ ` marker. `None` when the symbol carries no marker (macros,
/// locals) or the marker is trailing.
#[must_use]
pub fn package_agnostic_suffix(symbol: &str) -> Option<&str> {
    let ix = symbol.find("$ ")?;
    let suffix = &symbol[ix + 2..];
    if suffix.is_empty() { None } else { Some(suffix) }
}

/// Prepend the fake package prefix to a suffix, for externals synthesized
/// from forward declarations where no package is known.
#[must_use]
pub fn add_fake_prefix(suffix: &str) -> String {
    format!("cxx . . $ {suffix}")
}

// ---------------------------------------------------------------------------
// SymbolFormatter
// ---------------------------------------------------------------------------

/// Formats and caches symbol strings for one translation unit.
pub struct SymbolFormatter<'a> {
    files: &'a FileMetadataMap,
    /// Keyed by definition site: macros.
    macro_cache: HashMap<MacroDefSite, SymbolName>,
    /// Keyed by declaration: everything except namespaces.
    decl_cache: HashMap<DeclId, Option<SymbolName>>,
    /// Namespaces cut across packages, so the resolved package depends on
    /// the usage site's file.
    namespace_cache: HashMap<(DeclId, FileId), Option<SymbolName>>,
    /// Keyed by file: file symbols for include edges.
    file_cache: HashMap<FileId, Option<SymbolName>>,
    anonymous_type_counters: HashMap<FileId, u32>,
    local_counters: HashMap<FileId, u32>,
}

impl<'a> SymbolFormatter<'a> {
    #[must_use]
    pub fn new(files: &'a FileMetadataMap) -> Self {
        Self {
            files,
            macro_cache: HashMap::new(),
            decl_cache: HashMap::new(),
            namespace_cache: HashMap::new(),
            file_cache: HashMap::new(),
            anonymous_type_counters: HashMap::new(),
            local_counters: HashMap::new(),
        }
    }

    // --- Package prefixes -------------------------------------------------

    /// `cxx . <name> <version>$ ` for a known package, `cxx . . $ ` when no
    /// package information is available for the file.
    fn package_prefix(&self, file: FileId) -> String {
        match self.files.get(file).and_then(|m| m.package.as_ref()) {
            Some(package) => {
                format!("cxx . {} {}$ ", package.id.name, package.id.version)
            }
            None => "cxx . . $ ".to_owned(),
        }
    }

    // --- Macros -----------------------------------------------------------

    /// Symbol for a macro, keyed by its definition site.
    pub fn macro_symbol(&mut self, tu: &TranslationUnit, def: MacroDefSite) -> SymbolName {
        if let Some(hit) = self.macro_cache.get(&def) {
            return hit.clone();
        }
        let file_name: String = match def.origin {
            MacroOrigin::File(id) => self
                .files
                .get(id)
                .map(|m| m.stable_id.path.as_str().to_owned())
                .or_else(|| tu.file_path(id).map(ToOwned::to_owned))
                .unwrap_or_else(|| BUILTIN_FILE_NAME.to_owned()),
            MacroOrigin::Builtin => BUILTIN_FILE_NAME.to_owned(),
            MacroOrigin::CommandLine => COMMAND_LINE_FILE_NAME.to_owned(),
        };
        let symbol = SymbolName::from(format!(
            "c . todo-pkg todo-version {file_name}:{}:{}#",
            def.line, def.col
        ));
        self.macro_cache.insert(def, symbol.clone());
        symbol
    }

    // --- Files ------------------------------------------------------------

    /// Symbol representing a file itself; the target of include edges.
    pub fn file_symbol(&mut self, file: FileId) -> Option<SymbolName> {
        if let Some(hit) = self.file_cache.get(&file) {
            return hit.clone();
        }
        let symbol = self.files.get(file).map(|meta| {
            SymbolName::from(format!(
                "{}{}/",
                self.package_prefix(file),
                meta.stable_id.path.as_str()
            ))
        });
        self.file_cache.insert(file, symbol.clone());
        symbol
    }

    // --- Declarations -----------------------------------------------------

    /// Symbol for a declaration, dispatching on its category. `None` when
    /// no stable symbol can be formed (e.g. an anonymous namespace in a
    /// file with no stable path).
    pub fn decl_symbol(&mut self, tu: &TranslationUnit, id: DeclId) -> Option<SymbolName> {
        let decl = tu.decl(id)?;
        if matches!(decl.kind, DeclKind::Namespace) {
            return self.namespace_symbol(tu, id, decl.file);
        }
        if let Some(hit) = self.decl_cache.get(&id) {
            return hit.clone();
        }
        let symbol = self.compute_decl_symbol(tu, id);
        self.decl_cache.insert(id, symbol.clone());
        symbol
    }

    /// True when the declaration formats as a `local N` symbol.
    #[must_use]
    pub fn is_local(tu: &TranslationUnit, id: DeclId) -> bool {
        let Some(decl) = tu.decl(id) else { return false };
        match decl.kind {
            DeclKind::Binding
            | DeclKind::NonTypeTemplateParm
            | DeclKind::TemplateTemplateParm
            | DeclKind::TemplateTypeParm => true,
            DeclKind::Var => matches!(
                decl.detail,
                DeclDetail::Var { is_local: true, .. } | DeclDetail::Var { is_parameter: true, .. }
            ),
            _ => false,
        }
    }

    fn compute_decl_symbol(&mut self, tu: &TranslationUnit, id: DeclId) -> Option<SymbolName> {
        let decl = tu.decl(id)?;

        if Self::is_local(tu, id) {
            let counter = self.local_counters.entry(decl.file).or_insert(0);
            let symbol = SymbolName::from(format!("local {counter}"));
            *counter += 1;
            return Some(symbol);
        }

        let context = self.context_symbol(tu, decl.context, decl.file)?;
        let descriptor = match (&decl.kind, &decl.detail) {
            (DeclKind::Record | DeclKind::Enum, detail) => {
                let anonymous = matches!(
                    detail,
                    DeclDetail::Record { is_anonymous: true, .. }
                        | DeclDetail::Enum { is_anonymous: true }
                );
                if anonymous || decl.name.is_empty() {
                    let file_token = self
                        .files
                        .get(decl.file)
                        .map(|m| m.stable_id.path.as_str().to_owned())
                        .or_else(|| tu.file_path(decl.file).map(ToOwned::to_owned))?;
                    let counter = self.anonymous_type_counters.entry(decl.file).or_insert(0);
                    let descriptor = format!(
                        "$anonymous_type_{:x}_{counter}#",
                        fingerprint(file_token.as_bytes()).0
                    );
                    *counter += 1;
                    descriptor
                } else {
                    format!("{}#", decl.name)
                }
            }
            (DeclKind::TypedefName, _) => format!("{}#", decl.name),
            (DeclKind::Function, DeclDetail::Function { signature, kind, .. }) => {
                let name = match kind {
                    FunctionKind::Conversion { target } => format!("operator {target}"),
                    _ => decl.name.clone(),
                };
                if name.is_empty() {
                    return None;
                }
                format!("{name}({:x}).", fingerprint(signature.as_bytes()).0)
            }
            // A Function record without function detail still disambiguates,
            // on an empty signature.
            (DeclKind::Function, _) => {
                if decl.name.is_empty() {
                    return None;
                }
                format!("{}({:x}).", decl.name, fingerprint(b"").0)
            }
            (DeclKind::Var | DeclKind::Field | DeclKind::EnumConstant, _) => {
                if decl.name.is_empty() {
                    return None;
                }
                format!("{}.", decl.name)
            }
            // Locals were handled above; anything left is unexpected input.
            _ => return None,
        };
        Some(SymbolName::from(format!("{context}{descriptor}")))
    }

    /// Symbol for a namespace, with the package resolved from the usage
    /// site's file.
    fn namespace_symbol(
        &mut self,
        tu: &TranslationUnit,
        id: DeclId,
        usage_file: FileId,
    ) -> Option<SymbolName> {
        if let Some(hit) = self.namespace_cache.get(&(id, usage_file)) {
            return hit.clone();
        }
        let symbol = self.compute_namespace_symbol(tu, id, usage_file);
        self.namespace_cache.insert((id, usage_file), symbol.clone());
        symbol
    }

    fn compute_namespace_symbol(
        &mut self,
        tu: &TranslationUnit,
        id: DeclId,
        usage_file: FileId,
    ) -> Option<SymbolName> {
        let decl = tu.decl(id)?;
        let context = self.context_symbol(tu, decl.context, usage_file)?;
        let anonymous = matches!(decl.detail, DeclDetail::Namespace { is_anonymous: true })
            || decl.name.is_empty();
        let name = if anonymous {
            // File-scoped but stable: keyed to the TU's main file. Without a
            // stable main-file path there is nothing useful to emit.
            let main = self.files.get(tu.main_file)?;
            format!("$anonymous_namespace_{}", main.stable_id.path.as_str())
        } else {
            decl.name.clone()
        };
        Some(SymbolName::from(format!("{context}{name}/")))
    }

    /// Symbol of the enclosing context: the package prefix when there is
    /// none, otherwise the context declaration's own symbol.
    fn context_symbol(
        &mut self,
        tu: &TranslationUnit,
        context: Option<DeclId>,
        usage_file: FileId,
    ) -> Option<String> {
        match context {
            None => Some(self.package_prefix(usage_file)),
            Some(ctx_id) => {
                let ctx = tu.decl(ctx_id)?;
                let symbol = if matches!(ctx.kind, DeclKind::Namespace) {
                    self.namespace_symbol(tu, ctx_id, usage_file)?
                } else {
                    self.decl_symbol(tu, ctx_id)?
                };
                Some(symbol.as_str().to_owned())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{DeclRecord, SourceFile};
    use crate::packagemap::PackageMap;
    use crate::path::AbsolutePath;
    use crate::scip::FileRange;

    fn decl(
        id: u32,
        kind: DeclKind,
        name: &str,
        context: Option<u32>,
        detail: DeclDetail,
    ) -> DeclRecord {
        DeclRecord {
            id: DeclId(id),
            kind,
            name: name.to_owned(),
            file: FileId(0),
            range: FileRange::for_token(1, 1, name.len().max(1) as u32),
            context: context.map(DeclId),
            is_definition: true,
            documentation: Vec::new(),
            detail,
        }
    }

    fn test_tu(decls: Vec<DeclRecord>) -> TranslationUnit {
        TranslationUnit {
            main_file: FileId(0),
            files: vec![SourceFile { id: FileId(0), path: Some("/proj/a.cc".to_owned()) }],
            decls,
            ..TranslationUnit::default()
        }
    }

    fn test_files() -> FileMetadataMap {
        let mut files = FileMetadataMap::new(
            AbsolutePath::new("/proj").unwrap(),
            AbsolutePath::new("/proj/build").unwrap(),
            PackageMap::empty(),
        );
        files.insert(FileId(0), &AbsolutePath::new("/proj/a.cc").unwrap()).unwrap();
        files
    }

    #[test]
    fn namespace_and_function_symbols() {
        let tu = test_tu(vec![
            decl(0, DeclKind::Namespace, "a", None, DeclDetail::Namespace { is_anonymous: false }),
            decl(
                1,
                DeclKind::Function,
                "f",
                Some(0),
                DeclDetail::Function {
                    signature: "()".to_owned(),
                    kind: FunctionKind::Plain,
                    is_virtual: false,
                    overrides: Vec::new(),
                },
            ),
        ]);
        let files = test_files();
        let mut formatter = SymbolFormatter::new(&files);

        let ns = formatter.decl_symbol(&tu, DeclId(0)).unwrap();
        assert_eq!(ns.as_str(), "cxx . . $ a/");

        let f = formatter.decl_symbol(&tu, DeclId(1)).unwrap();
        assert!(f.as_str().starts_with("cxx . . $ a/f("));
        assert!(f.as_str().ends_with(")."));
    }

    #[test]
    fn overloads_differ_only_in_disambiguator() {
        let sig = |s: &str| DeclDetail::Function {
            signature: s.to_owned(),
            kind: FunctionKind::Plain,
            is_virtual: false,
            overrides: Vec::new(),
        };
        let tu = test_tu(vec![
            decl(0, DeclKind::Function, "f", None, sig("(int)")),
            decl(1, DeclKind::Function, "f", None, sig("(const char *)")),
            decl(2, DeclKind::Function, "f", None, sig("(int)")),
        ]);
        let files = test_files();
        let mut formatter = SymbolFormatter::new(&files);
        let a = formatter.decl_symbol(&tu, DeclId(0)).unwrap();
        let b = formatter.decl_symbol(&tu, DeclId(1)).unwrap();
        let c = formatter.decl_symbol(&tu, DeclId(2)).unwrap();
        assert_ne!(a, b);
        // Identical canonical signatures share a disambiguator.
        assert_eq!(a, c);
    }

    #[test]
    fn locals_count_up_per_file() {
        let local = DeclDetail::Var { is_local: true, is_parameter: false };
        let tu = test_tu(vec![
            decl(0, DeclKind::Var, "x", None, local.clone()),
            decl(1, DeclKind::Var, "y", None, local),
        ]);
        let files = test_files();
        let mut formatter = SymbolFormatter::new(&files);
        assert_eq!(formatter.decl_symbol(&tu, DeclId(0)).unwrap().as_str(), "local 0");
        assert_eq!(formatter.decl_symbol(&tu, DeclId(1)).unwrap().as_str(), "local 1");
        // Cached: asking again does not advance the counter.
        assert_eq!(formatter.decl_symbol(&tu, DeclId(0)).unwrap().as_str(), "local 0");
    }

    #[test]
    fn anonymous_namespace_is_keyed_to_main_file() {
        let tu = test_tu(vec![decl(
            0,
            DeclKind::Namespace,
            "",
            None,
            DeclDetail::Namespace { is_anonymous: true },
        )]);
        let files = test_files();
        let mut formatter = SymbolFormatter::new(&files);
        let ns = formatter.decl_symbol(&tu, DeclId(0)).unwrap();
        assert_eq!(ns.as_str(), "cxx . . $ $anonymous_namespace_a.cc/");
    }

    #[test]
    fn macro_symbols_use_definition_location() {
        let tu = test_tu(Vec::new());
        let files = test_files();
        let mut formatter = SymbolFormatter::new(&files);
        let def = MacroDefSite { origin: MacroOrigin::File(FileId(0)), line: 3, col: 9 };
        assert_eq!(
            formatter.macro_symbol(&tu, def).as_str(),
            "c . todo-pkg todo-version a.cc:3:9#"
        );
        let cli = MacroDefSite { origin: MacroOrigin::CommandLine, line: 1, col: 1 };
        assert_eq!(
            formatter.macro_symbol(&tu, cli).as_str(),
            "c . todo-pkg todo-version <command line>:1:1#"
        );
    }

    #[test]
    fn suffix_round_trips_through_fake_prefix() {
        let symbol = "cxx . mypkg 1.2.0$ a/Thing#";
        let suffix = package_agnostic_suffix(symbol).unwrap();
        assert_eq!(suffix, "a/Thing#");
        let fake = add_fake_prefix(suffix);
        assert_eq!(package_agnostic_suffix(&fake).unwrap(), suffix);
    }
}
