//! Translation-unit indexing: AST records to per-document buffers.
//!
//! Walks the front-end's declaration, expression, type-location, and
//! specifier records, asking the symbol formatter for a name at each one
//! and appending occurrences into per-file buffers. Definitions also
//! create/update `SymbolInformation` (documentation, inheritance and
//! override relationships).
//!
//! Entities this TU only ever saw forward-declared are special: their
//! occurrences are routed into [`ForwardDecl`] records keyed by the
//! package-agnostic symbol suffix, because the declaring TU cannot know
//! the defining package. The merger reconciles them against definitions
//! found in other translation units.
//!
//! After traversal, macro occurrences recorded during preprocessing are
//! concatenated into the same documents, documents are partitioned into
//! in-project (shard documents) and external (shard external symbols), and
//! everything is sorted when determinism is requested.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::filemap::FileMetadataMap;
use crate::frontend::{
    DeclDetail, DeclId, DeclKind, ExprKind, FileId, SpecifierKind, TranslationUnit, TypeLocKind,
};
use crate::macros::MacroIndexer;
use crate::scip::{
    Document, ForwardDecl, ForwardDeclReference, Occurrence, Relationship, SymbolInformation,
    SyntaxKind, symbol_role,
};
use crate::symbol::{SymbolFormatter, SymbolName};

/// Known limitation: C and Objective-C inputs are also labeled CPP.
const DOCUMENT_LANGUAGE: &str = "CPP";

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Everything one emit job produced from AST traversal.
#[derive(Debug, Default)]
pub struct TuIndexOutput {
    /// Documents for in-project files in the emit set.
    pub documents: Vec<Document>,
    /// Symbols defined in external files, plus file-less macros.
    pub external_symbols: Vec<SymbolInformation>,
    /// Entities seen only as forward declarations.
    pub forward_decls: Vec<ForwardDecl>,
}

// ---------------------------------------------------------------------------
// Entity aggregation
// ---------------------------------------------------------------------------

/// What the TU knows about one named entity after scanning declarations.
struct EntityInfo {
    symbol: SymbolName,
    /// Whether any site in this TU is the definition.
    has_definition: bool,
    /// Whether the entity's kind participates in forward-decl resolution.
    forward_declarable: bool,
    /// First non-empty documentation seen at any site.
    documentation: Vec<String>,
}

// ---------------------------------------------------------------------------
// TuIndexer
// ---------------------------------------------------------------------------

/// Indexes one translation unit restricted to an emit set of files.
pub struct TuIndexer<'a> {
    tu: &'a TranslationUnit,
    files: &'a FileMetadataMap,
    formatter: SymbolFormatter<'a>,
    emit_set: HashSet<FileId>,
    deterministic: bool,

    occurrences: HashMap<FileId, Vec<Occurrence>>,
    symbols: HashMap<FileId, BTreeMap<String, SymbolInformation>>,
    entities: HashMap<DeclId, EntityInfo>,
    /// symbol → forward-decl references, for forward-only entities.
    forward_refs: BTreeMap<String, (String, Vec<ForwardDeclReference>)>,
}

impl<'a> TuIndexer<'a> {
    #[must_use]
    pub fn new(
        tu: &'a TranslationUnit,
        files: &'a FileMetadataMap,
        emit_set: HashSet<FileId>,
        deterministic: bool,
    ) -> Self {
        Self {
            tu,
            files,
            formatter: SymbolFormatter::new(files),
            emit_set,
            deterministic,
            occurrences: HashMap::new(),
            symbols: HashMap::new(),
            entities: HashMap::new(),
            forward_refs: BTreeMap::new(),
        }
    }

    /// Run the full traversal and assemble the shard contents.
    #[must_use]
    pub fn index(mut self, macros: &MacroIndexer) -> TuIndexOutput {
        self.scan_entities();
        self.visit_decls();
        self.visit_exprs();
        self.visit_type_locs();
        self.visit_specifiers();
        self.assemble(macros)
    }

    // --- Entity scan ------------------------------------------------------

    /// First pass: compute symbols and aggregate per-entity facts, so that
    /// reference emission knows whether a target is forward-declared-only.
    fn scan_entities(&mut self) {
        let tu = self.tu;
        for decl in &tu.decls {
            let Some(symbol) = self.formatter.decl_symbol(tu, decl.id) else {
                continue;
            };
            let forward_declarable = matches!(
                decl.kind,
                DeclKind::Record | DeclKind::Enum | DeclKind::Function
            ) && !SymbolFormatter::is_local(tu, decl.id);
            let entry = self.entities.entry(decl.id).or_insert_with(|| EntityInfo {
                symbol: symbol.clone(),
                has_definition: false,
                forward_declarable,
                documentation: Vec::new(),
            });
            entry.has_definition |= decl.is_definition;
            if entry.documentation.is_empty() && !decl.documentation.is_empty() {
                entry.documentation = decl.documentation.clone();
            }
        }
        // Sites of the same entity share a symbol; definition status is a
        // property of the symbol, not the site.
        let mut by_symbol: HashMap<String, bool> = HashMap::new();
        for info in self.entities.values() {
            *by_symbol.entry(info.symbol.as_str().to_owned()).or_default() |=
                info.has_definition;
        }
        for info in self.entities.values_mut() {
            if let Some(&defined) = by_symbol.get(info.symbol.as_str()) {
                info.has_definition = defined;
            }
        }
    }

    fn entity(&self, id: DeclId) -> Option<&EntityInfo> {
        self.entities.get(&id)
    }

    /// Forward-only: declarable, and no definition anywhere in this TU.
    fn is_forward_only(&self, id: DeclId) -> bool {
        self.entity(id).is_some_and(|e| e.forward_declarable && !e.has_definition)
    }

    // --- Declarations -----------------------------------------------------

    fn visit_decls(&mut self) {
        let tu = self.tu;
        for decl in &tu.decls {
            let Some(info) = self.entities.get(&decl.id) else { continue };
            let symbol = info.symbol.clone();
            let forward_only = info.forward_declarable && !info.has_definition;

            if forward_only {
                self.push_forward_ref(decl.id, decl.file, decl.range);
                continue;
            }
            if !self.emit_set.contains(&decl.file) {
                continue;
            }

            let (roles, kind) = if decl.is_definition {
                (symbol_role::DEFINITION, Self::definition_syntax_kind(decl.kind))
            } else {
                (0, Self::reference_syntax_kind(decl.kind))
            };
            self.push_occurrence(decl.file, Occurrence {
                range: decl.range,
                symbol: symbol.as_str().to_owned(),
                symbol_roles: roles,
                syntax_kind: kind,
                override_documentation: Vec::new(),
            });

            if decl.is_definition && !SymbolFormatter::is_local(tu, decl.id) {
                let documentation = self
                    .entity(decl.id)
                    .map(|e| e.documentation.clone())
                    .unwrap_or_default();
                let relationships = self.relationships_for(decl.id);
                self.record_symbol_information(
                    decl.file,
                    &symbol,
                    documentation,
                    relationships,
                );
            }
        }
    }

    const fn definition_syntax_kind(kind: DeclKind) -> SyntaxKind {
        match kind {
            DeclKind::Namespace => SyntaxKind::IdentifierNamespace,
            DeclKind::Record
            | DeclKind::Enum
            | DeclKind::TypedefName
            | DeclKind::TemplateTypeParm
            | DeclKind::TemplateTemplateParm => SyntaxKind::IdentifierType,
            DeclKind::Function => SyntaxKind::IdentifierFunctionDefinition,
            DeclKind::EnumConstant => SyntaxKind::IdentifierConstant,
            DeclKind::Binding | DeclKind::NonTypeTemplateParm | DeclKind::Var => {
                SyntaxKind::Identifier
            }
            DeclKind::Field => SyntaxKind::Identifier,
        }
    }

    const fn reference_syntax_kind(kind: DeclKind) -> SyntaxKind {
        match kind {
            DeclKind::Namespace => SyntaxKind::IdentifierNamespace,
            DeclKind::Record | DeclKind::Enum | DeclKind::TypedefName => SyntaxKind::IdentifierType,
            DeclKind::Function => SyntaxKind::IdentifierFunction,
            DeclKind::EnumConstant => SyntaxKind::IdentifierConstant,
            _ => SyntaxKind::Identifier,
        }
    }

    /// Relationships attached at a definition site: implementation edges to
    /// base classes, and implementation+reference edges to every transitive
    /// override ancestor.
    fn relationships_for(&mut self, id: DeclId) -> Vec<Relationship> {
        let tu = self.tu;
        let Some(decl) = tu.decl(id) else { return Vec::new() };
        let mut out: HashSet<Relationship> = HashSet::new();
        match &decl.detail {
            DeclDetail::Record { bases, .. } => {
                for &base in bases {
                    if let Some(base_symbol) = self.formatter.decl_symbol(tu, base) {
                        out.insert(Relationship {
                            symbol: base_symbol.as_str().to_owned(),
                            is_definition: false,
                            is_reference: false,
                            is_type_definition: false,
                            is_implementation: true,
                        });
                    }
                }
            }
            DeclDetail::Function { overrides, .. } => {
                // Every ancestor that also declared the method, transitively.
                // The override graph is acyclic; a visited set guards against
                // diamond shapes.
                let mut visited: HashSet<DeclId> = HashSet::new();
                let mut stack: Vec<DeclId> = overrides.clone();
                while let Some(ancestor) = stack.pop() {
                    if !visited.insert(ancestor) {
                        continue;
                    }
                    if let Some(symbol) = self.formatter.decl_symbol(tu, ancestor) {
                        out.insert(Relationship {
                            symbol: symbol.as_str().to_owned(),
                            is_definition: false,
                            is_reference: true,
                            is_type_definition: false,
                            is_implementation: true,
                        });
                    }
                    if let Some(DeclDetail::Function { overrides: next, .. }) =
                        tu.decl(ancestor).map(|d| &d.detail)
                    {
                        stack.extend(next.iter().copied());
                    }
                }
            }
            _ => {}
        }
        let mut list: Vec<Relationship> = out.into_iter().collect();
        list.sort();
        list
    }

    // --- References -------------------------------------------------------

    fn visit_exprs(&mut self) {
        let tu = self.tu;
        for expr in &tu.exprs {
            let kind = match expr.kind {
                ExprKind::CxxConstruct | ExprKind::DeclRef => {
                    self.target_reference_kind(expr.target)
                }
                ExprKind::Member => SyntaxKind::Identifier,
            };
            self.push_reference(expr.target, expr.file, expr.range, kind);
        }
    }

    fn visit_type_locs(&mut self) {
        let tu = self.tu;
        for tl in &tu.type_locs {
            let kind = match tl.kind {
                TypeLocKind::Enum | TypeLocKind::Record | TypeLocKind::TemplateSpecialization => {
                    SyntaxKind::IdentifierType
                }
                TypeLocKind::TemplateTypeParm => SyntaxKind::IdentifierLocal,
            };
            self.push_reference(tl.target, tl.file, tl.range, kind);
        }
    }

    fn visit_specifiers(&mut self) {
        let tu = self.tu;
        for sp in &tu.specifier_refs {
            let kind = match sp.kind {
                SpecifierKind::NestedNameSpecifier => {
                    match tu.decl(sp.target).map(|d| d.kind) {
                        Some(DeclKind::Namespace) => SyntaxKind::IdentifierNamespace,
                        _ => SyntaxKind::IdentifierType,
                    }
                }
                SpecifierKind::CtorInitializer => SyntaxKind::Identifier,
            };
            self.push_reference(sp.target, sp.file, sp.range, kind);
        }
    }

    fn target_reference_kind(&self, target: DeclId) -> SyntaxKind {
        match self.tu.decl(target).map(|d| d.kind) {
            Some(DeclKind::Function) => SyntaxKind::IdentifierFunction,
            Some(DeclKind::EnumConstant) => SyntaxKind::IdentifierConstant,
            Some(DeclKind::Var) if SymbolFormatter::is_local(self.tu, target) => {
                SyntaxKind::IdentifierLocal
            }
            _ => SyntaxKind::Identifier,
        }
    }

    fn push_reference(
        &mut self,
        target: DeclId,
        file: FileId,
        range: crate::scip::FileRange,
        kind: SyntaxKind,
    ) {
        if self.is_forward_only(target) {
            self.push_forward_ref(target, file, range);
            return;
        }
        if !self.emit_set.contains(&file) {
            return;
        }
        let Some(symbol) = self.formatter.decl_symbol(self.tu, target) else { return };
        self.push_occurrence(file, Occurrence {
            range,
            symbol: symbol.as_str().to_owned(),
            symbol_roles: 0,
            syntax_kind: kind,
            override_documentation: Vec::new(),
        });
    }

    fn push_forward_ref(&mut self, target: DeclId, file: FileId, range: crate::scip::FileRange) {
        // References in files we are not emitting belong to another worker's
        // shard (or to no shard, for external files).
        if !self.emit_set.contains(&file) {
            return;
        }
        let Some(meta) = self.files.get(file) else { return };
        if !meta.stable_id.in_project {
            return;
        }
        let relative_path = meta.stable_id.path.as_str().to_owned();
        let Some(info) = self.entities.get(&target) else { return };
        let Some(suffix) = info.symbol.package_agnostic_suffix() else {
            debug!(symbol = %info.symbol, "forward-declared entity without a suffix");
            return;
        };
        let suffix = suffix.to_owned();
        let documentation = info.documentation.first().cloned().unwrap_or_default();
        let entry = self
            .forward_refs
            .entry(suffix)
            .or_insert_with(|| (documentation, Vec::new()));
        entry.1.push(ForwardDeclReference { relative_path, range });
    }

    // --- Buffers ----------------------------------------------------------

    fn push_occurrence(&mut self, file: FileId, occurrence: Occurrence) {
        self.occurrences.entry(file).or_default().push(occurrence);
    }

    fn record_symbol_information(
        &mut self,
        file: FileId,
        symbol: &SymbolName,
        documentation: Vec<String>,
        relationships: Vec<Relationship>,
    ) {
        let per_file = self.symbols.entry(file).or_default();
        let info = per_file.entry(symbol.as_str().to_owned()).or_insert_with(|| {
            SymbolInformation {
                symbol: symbol.as_str().to_owned(),
                documentation: Vec::new(),
                relationships: Vec::new(),
            }
        });
        if info.documentation.is_empty() {
            info.documentation = documentation;
        }
        for rel in relationships {
            if !info.relationships.contains(&rel) {
                info.relationships.push(rel);
            }
        }
    }

    // --- Assembly ---------------------------------------------------------

    fn assemble(mut self, macros: &MacroIndexer) -> TuIndexOutput {
        let mut output = TuIndexOutput::default();

        // Every in-project file in the emit set yields a document, even an
        // empty one: the TU main file with no declarations still appears in
        // the index.
        let mut emit_files: Vec<FileId> = self.emit_set.iter().copied().collect();
        emit_files.sort_unstable();

        let mut external: BTreeMap<String, SymbolInformation> = BTreeMap::new();

        for file in emit_files {
            let Some(meta) = self.files.get(file) else {
                debug!(file = file.0, "emit-set file with no metadata; skipping");
                continue;
            };
            let mut occurrences = self.occurrences.remove(&file).unwrap_or_default();
            let mut symbols: Vec<SymbolInformation> =
                self.symbols.remove(&file).map(|m| m.into_values().collect()).unwrap_or_default();
            macros.emit_into(self.tu, &mut self.formatter, file, &mut occurrences, &mut symbols);

            if !meta.stable_id.in_project {
                // External files contribute symbol metadata only.
                for info in symbols {
                    merge_external(&mut external, info);
                }
                continue;
            }

            // Include edges: the spelled file name references the included
            // file's own symbol, making `#include` lines navigable.
            for edge in macros.includes_of(file) {
                if let Some(id) = find_file_by_path(self.tu, &edge.target)
                    && let Some(symbol) = self.formatter.file_symbol(id)
                {
                    occurrences.push(Occurrence {
                        range: edge.range,
                        symbol: symbol.as_str().to_owned(),
                        symbol_roles: 0,
                        syntax_kind: SyntaxKind::Identifier,
                        override_documentation: Vec::new(),
                    });
                }
            }
            if self.deterministic {
                occurrences.sort();
                symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            }
            occurrences.dedup();
            output.documents.push(Document {
                language: DOCUMENT_LANGUAGE.to_owned(),
                relative_path: meta.stable_id.path.as_str().to_owned(),
                occurrences,
                symbols,
            });
        }

        for info in macros.emit_non_file_based(self.tu, &mut self.formatter, self.deterministic) {
            merge_external(&mut external, info);
        }
        output.external_symbols = external.into_values().collect();

        output.forward_decls = self
            .forward_refs
            .into_iter()
            .map(|(suffix, (documentation, mut references))| {
                references.sort();
                references.dedup();
                ForwardDecl { suffix, documentation, references }
            })
            .collect();

        if self.deterministic {
            output.documents.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        }
        output
    }
}

/// Find the file id whose real path matches `target`.
fn find_file_by_path(tu: &TranslationUnit, target: &crate::path::AbsolutePath) -> Option<FileId> {
    tu.files
        .iter()
        .find(|f| f.path.as_deref().map(crate::path::normalize).as_deref() == Some(target.as_str()))
        .map(|f| f.id)
}

/// Merge an external symbol into the per-shard map: first non-empty
/// documentation wins, relationships union.
fn merge_external(map: &mut BTreeMap<String, SymbolInformation>, info: SymbolInformation) {
    match map.get_mut(&info.symbol) {
        None => {
            map.insert(info.symbol.clone(), info);
        }
        Some(existing) => {
            if existing.documentation.is_empty() {
                existing.documentation = info.documentation;
            }
            for rel in info.relationships {
                if !existing.relationships.contains(&rel) {
                    existing.relationships.push(rel);
                }
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
    use crate::frontend::{DeclRecord, ExprRecord, FunctionKind, SourceFile};
    use crate::packagemap::PackageMap;
    use crate::path::AbsolutePath;
    use crate::scip::FileRange;

    fn decl(
        id: u32,
        kind: DeclKind,
        name: &str,
        file: u32,
        line: u32,
        context: Option<u32>,
        is_definition: bool,
        detail: DeclDetail,
    ) -> DeclRecord {
        DeclRecord {
            id: DeclId(id),
            kind,
            name: name.to_owned(),
            file: FileId(file),
            range: FileRange::for_token(line, 1, name.len().max(1) as u32),
            context: context.map(DeclId),
            is_definition,
            documentation: Vec::new(),
            detail,
        }
    }

    fn function_detail(signature: &str) -> DeclDetail {
        DeclDetail::Function {
            signature: signature.to_owned(),
            kind: FunctionKind::Plain,
            is_virtual: false,
            overrides: Vec::new(),
        }
    }

    struct Harness {
        tu: TranslationUnit,
        files: FileMetadataMap,
    }

    fn harness(tu: TranslationUnit) -> Harness {
        let mut files = FileMetadataMap::new(
            AbsolutePath::new("/proj").unwrap(),
            AbsolutePath::new("/proj/build").unwrap(),
            PackageMap::empty(),
        );
        for f in &tu.files {
            if let Some(path) = &f.path {
                files.insert(f.id, &AbsolutePath::new(path).unwrap()).unwrap();
            }
        }
        Harness { tu, files }
    }

    fn index_all(h: &Harness) -> TuIndexOutput {
        let emit: HashSet<FileId> = h.tu.files.iter().map(|f| f.id).collect();
        TuIndexer::new(&h.tu, &h.files, emit, true).index(&MacroIndexer::new())
    }

    fn main_file_tu(decls: Vec<DeclRecord>, exprs: Vec<ExprRecord>) -> TranslationUnit {
        TranslationUnit {
            main_file: FileId(0),
            files: vec![SourceFile { id: FileId(0), path: Some("/proj/a.cc".to_owned()) }],
            decls,
            exprs,
            ..TranslationUnit::default()
        }
    }

    #[test]
    fn namespace_and_function_definitions_are_indexed() {
        let h = harness(main_file_tu(
            vec![
                decl(0, DeclKind::Namespace, "a", 0, 1, None, true,
                    DeclDetail::Namespace { is_anonymous: false }),
                decl(1, DeclKind::Function, "f", 0, 1, Some(0), true, function_detail("()")),
            ],
            Vec::new(),
        ));
        let out = index_all(&h);
        assert_eq!(out.documents.len(), 1);
        let doc = &out.documents[0];
        assert_eq!(doc.relative_path, "a.cc");
        let defs: Vec<&Occurrence> = doc
            .occurrences
            .iter()
            .filter(|o| o.symbol_roles & symbol_role::DEFINITION != 0)
            .collect();
        assert_eq!(defs.len(), 2);
        assert!(defs.iter().any(|o| o.symbol.ends_with("a/")));
        assert!(defs.iter().any(|o| o.symbol.contains("a/f(") && o.symbol.ends_with(").")));
        assert_eq!(doc.symbols.len(), 2);
    }

    #[test]
    fn empty_tu_still_emits_main_document() {
        let h = harness(main_file_tu(Vec::new(), Vec::new()));
        let out = index_all(&h);
        assert_eq!(out.documents.len(), 1);
        assert!(out.documents[0].occurrences.is_empty());
        assert!(out.documents[0].symbols.is_empty());
    }

    #[test]
    fn forward_only_entities_become_forward_decls() {
        let mut tu = main_file_tu(
            vec![decl(0, DeclKind::Record, "F", 0, 1, None, false,
                DeclDetail::Record { is_anonymous: false, bases: Vec::new() })],
            vec![ExprRecord {
                kind: ExprKind::DeclRef,
                target: DeclId(0),
                file: FileId(0),
                range: FileRange::for_token(2, 9, 1),
            }],
        );
        tu.type_locs = Vec::new();
        let h = harness(tu);
        let out = index_all(&h);
        assert_eq!(out.forward_decls.len(), 1);
        let fwd = &out.forward_decls[0];
        assert_eq!(fwd.suffix, "F#");
        // Both the decl site and the reference site are recorded.
        assert_eq!(fwd.references.len(), 2);
        // And neither leaked into the document.
        assert!(out.documents[0].occurrences.is_empty());
    }

    #[test]
    fn base_classes_yield_implementation_relationships() {
        let h = harness(main_file_tu(
            vec![
                decl(0, DeclKind::Record, "Base", 0, 1, None, true,
                    DeclDetail::Record { is_anonymous: false, bases: Vec::new() }),
                decl(1, DeclKind::Record, "Derived", 0, 3, None, true,
                    DeclDetail::Record { is_anonymous: false, bases: vec![DeclId(0)] }),
            ],
            Vec::new(),
        ));
        let out = index_all(&h);
        let doc = &out.documents[0];
        let derived = doc
            .symbols
            .iter()
            .find(|s| s.symbol.contains("Derived#"))
            .expect("Derived has symbol information");
        assert_eq!(derived.relationships.len(), 1);
        assert!(derived.relationships[0].is_implementation);
        assert!(derived.relationships[0].symbol.contains("Base#"));
    }

    #[test]
    fn overrides_reach_transitive_ancestors() {
        let method = |id: u32, ctx: u32, overrides: Vec<u32>| DeclRecord {
            id: DeclId(id),
            kind: DeclKind::Function,
            name: "run".to_owned(),
            file: FileId(0),
            range: FileRange::for_token(id + 1, 3, 3),
            context: Some(DeclId(ctx)),
            is_definition: true,
            documentation: Vec::new(),
            detail: DeclDetail::Function {
                signature: "()".to_owned(),
                kind: FunctionKind::Plain,
                is_virtual: true,
                overrides: overrides.into_iter().map(DeclId).collect(),
            },
        };
        let record = |id: u32, name: &str, line: u32| decl(
            id, DeclKind::Record, name, 0, line, None, true,
            DeclDetail::Record { is_anonymous: false, bases: Vec::new() },
        );
        let h = harness(main_file_tu(
            vec![
                record(0, "A", 1),
                method(1, 0, vec![]),
                record(2, "B", 4),
                method(3, 2, vec![1]),
                record(4, "C", 7),
                method(5, 4, vec![3]),
            ],
            Vec::new(),
        ));
        let out = index_all(&h);
        let doc = &out.documents[0];
        let c_run = doc
            .symbols
            .iter()
            .find(|s| s.symbol.contains("C#run("))
            .expect("C::run has symbol information");
        // Both B::run and A::run, transitively.
        assert_eq!(c_run.relationships.len(), 2);
        assert!(c_run.relationships.iter().all(|r| r.is_implementation && r.is_reference));
    }

    #[test]
    fn external_files_contribute_external_symbols_only() {
        let tu = TranslationUnit {
            main_file: FileId(0),
            files: vec![
                SourceFile { id: FileId(0), path: Some("/proj/a.cc".to_owned()) },
                SourceFile { id: FileId(1), path: Some("/usr/include/lib.h".to_owned()) },
            ],
            decls: vec![decl(0, DeclKind::Function, "ext", 1, 1, None, true, function_detail("()"))],
            ..TranslationUnit::default()
        };
        let h = harness(tu);
        let out = index_all(&h);
        assert_eq!(out.documents.len(), 1, "external file must not become a document");
        assert_eq!(out.documents[0].relative_path, "a.cc");
        assert!(out.external_symbols.iter().any(|s| s.symbol.contains("ext(")));
    }
}
