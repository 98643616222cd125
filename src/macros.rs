//! Macro occurrence recording.
//!
//! Collects macro definition/reference occurrences per file while the
//! preprocessor transcript streams past, for later merging into the same
//! per-document buffers the AST indexer fills. Spelling locations are used
//! throughout, so a macro use inside another macro's expansion points at
//! the source token.
//!
//! Built-in and command-line macros have no file to attach a definition
//! occurrence to; they are tracked separately and emitted as external
//! symbols.

use std::collections::{HashMap, HashSet};

use crate::frontend::{FileId, MacroDefSite, MacroSite, TranslationUnit};
use crate::path::AbsolutePath;
use crate::scip::{FileRange, Occurrence, SymbolInformation, SyntaxKind, symbol_role};
use crate::symbol::SymbolFormatter;

// ---------------------------------------------------------------------------
// Occurrence records
// ---------------------------------------------------------------------------

/// Definition vs. reference; drives role bits and syntax kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MacroRole {
    Definition,
    Reference,
}

/// One macro occurrence within a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MacroOccurrence {
    pub range: FileRange,
    pub def: MacroDefSite,
    pub role: MacroRole,
}

/// An `#include` edge: the spelled file-name range and the included file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludeEdge {
    pub range: FileRange,
    pub target: AbsolutePath,
}

// ---------------------------------------------------------------------------
// MacroIndexer
// ---------------------------------------------------------------------------

/// Per-TU accumulator for macro occurrences and include edges.
#[derive(Debug, Default)]
pub struct MacroIndexer {
    table: HashMap<FileId, Vec<MacroOccurrence>>,
    /// Duplicate suppression: identical (file, occurrence) pairs are
    /// recorded once.
    seen: HashSet<(FileId, MacroOccurrence)>,
    /// Builtins and command-line definitions; no document to put them in.
    non_file_based: HashSet<MacroDefSite>,
    includes: HashMap<FileId, Vec<IncludeEdge>>,
}

impl MacroIndexer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `#define`. A site-less definition is a built-in or `-D`
    /// macro.
    pub fn save_definition(&mut self, site: Option<MacroSite>, def: MacroDefSite) {
        match site {
            Some(site) => self.save_occurrence(site, def, MacroRole::Definition),
            None => {
                self.non_file_based.insert(def);
            }
        }
    }

    /// Record an expansion, definedness test, or `#undef` referring back to
    /// `def`. References with no resolvable definition (e.g. `#undef` of an
    /// undefined name) or with no file-based spelling site are dropped.
    pub fn save_reference(&mut self, site: Option<MacroSite>, def: Option<MacroDefSite>) {
        let (Some(site), Some(def)) = (site, def) else { return };
        self.save_occurrence(site, def, MacroRole::Reference);
    }

    fn save_occurrence(&mut self, site: MacroSite, def: MacroDefSite, role: MacroRole) {
        debug_assert!(
            site.range.start_line != site.range.end_line
                || site.range.start_col != site.range.end_col,
            "zero-length macro occurrence at {}",
            site.range
        );
        let occurrence = MacroOccurrence { range: site.range, def, role };
        if self.seen.insert((site.file, occurrence)) {
            self.table.entry(site.file).or_default().push(occurrence);
        }
    }

    /// Record an `#include` edge for the including file.
    pub fn save_include(&mut self, includer: FileId, range: FileRange, target: AbsolutePath) {
        self.includes.entry(includer).or_default().push(IncludeEdge { range, target });
    }

    /// Include edges recorded for a file.
    #[must_use]
    pub fn includes_of(&self, file: FileId) -> &[IncludeEdge] {
        self.includes.get(&file).map_or(&[], Vec::as_slice)
    }

    /// Convert a file's macro occurrences into wire occurrences plus symbol
    /// information for the definitions it contains.
    pub fn emit_into(
        &self,
        tu: &TranslationUnit,
        formatter: &mut SymbolFormatter<'_>,
        file: FileId,
        occurrences: &mut Vec<Occurrence>,
        symbols: &mut Vec<SymbolInformation>,
    ) {
        let Some(entries) = self.table.get(&file) else { return };
        let mut defined_here: Vec<SymbolInformation> = Vec::new();
        for entry in entries {
            let symbol = formatter.macro_symbol(tu, entry.def);
            let (roles, kind) = match entry.role {
                MacroRole::Definition => {
                    (symbol_role::DEFINITION, SyntaxKind::IdentifierMacroDefinition)
                }
                MacroRole::Reference => (0, SyntaxKind::IdentifierMacro),
            };
            occurrences.push(Occurrence {
                range: entry.range,
                symbol: symbol.as_str().to_owned(),
                symbol_roles: roles,
                syntax_kind: kind,
                override_documentation: Vec::new(),
            });
            if entry.role == MacroRole::Definition {
                defined_here.push(SymbolInformation {
                    symbol: symbol.as_str().to_owned(),
                    documentation: Vec::new(),
                    relationships: Vec::new(),
                });
            }
        }
        symbols.extend(defined_here);
    }

    /// Symbol information for the macros with no backing file, emitted into
    /// the shard's external-symbols list.
    pub fn emit_non_file_based(
        &self,
        tu: &TranslationUnit,
        formatter: &mut SymbolFormatter<'_>,
        deterministic: bool,
    ) -> Vec<SymbolInformation> {
        let mut out: Vec<SymbolInformation> = self
            .non_file_based
            .iter()
            .map(|def| SymbolInformation {
                symbol: formatter.macro_symbol(tu, *def).as_str().to_owned(),
                documentation: Vec::new(),
                relationships: Vec::new(),
            })
            .collect();
        if deterministic {
            out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        }
        out.dedup_by(|a, b| a.symbol == b.symbol);
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filemap::FileMetadataMap;
    use crate::frontend::{MacroOrigin, SourceFile};
    use crate::packagemap::PackageMap;

    fn site(file: u32, line: u32, col: u32, len: u32) -> MacroSite {
        MacroSite { file: FileId(file), range: FileRange::for_token(line, col, len) }
    }

    fn def_at(file: u32, line: u32, col: u32) -> MacroDefSite {
        MacroDefSite { origin: MacroOrigin::File(FileId(file)), line, col }
    }

    fn harness() -> (TranslationUnit, FileMetadataMap) {
        let tu = TranslationUnit {
            main_file: FileId(0),
            files: vec![SourceFile { id: FileId(0), path: Some("/proj/a.cc".to_owned()) }],
            ..TranslationUnit::default()
        };
        let mut files = FileMetadataMap::new(
            AbsolutePath::new("/proj").unwrap(),
            AbsolutePath::new("/proj/build").unwrap(),
            PackageMap::empty(),
        );
        files.insert(FileId(0), &AbsolutePath::new("/proj/a.cc").unwrap()).unwrap();
        (tu, files)
    }

    #[test]
    fn define_then_undef_yields_definition_and_reference() {
        let mut indexer = MacroIndexer::new();
        let def = def_at(0, 1, 9);
        indexer.save_definition(Some(site(0, 1, 9, 4)), def);
        indexer.save_reference(Some(site(0, 2, 8, 4)), Some(def));

        let (tu, files) = harness();
        let mut formatter = SymbolFormatter::new(&files);
        let mut occurrences = Vec::new();
        let mut symbols = Vec::new();
        indexer.emit_into(&tu, &mut formatter, FileId(0), &mut occurrences, &mut symbols);

        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[0].symbol_roles, symbol_role::DEFINITION);
        assert_eq!(occurrences[1].symbol_roles, 0);
        assert_eq!(occurrences[0].symbol, occurrences[1].symbol);
        assert_eq!(symbols.len(), 1);
    }

    #[test]
    fn duplicate_ranges_are_suppressed() {
        let mut indexer = MacroIndexer::new();
        let def = def_at(0, 1, 9);
        indexer.save_reference(Some(site(0, 3, 1, 4)), Some(def));
        indexer.save_reference(Some(site(0, 3, 1, 4)), Some(def));

        let (tu, files) = harness();
        let mut formatter = SymbolFormatter::new(&files);
        let mut occurrences = Vec::new();
        let mut symbols = Vec::new();
        indexer.emit_into(&tu, &mut formatter, FileId(0), &mut occurrences, &mut symbols);
        assert_eq!(occurrences.len(), 1);
    }

    #[test]
    fn undef_without_define_is_dropped() {
        let mut indexer = MacroIndexer::new();
        indexer.save_reference(Some(site(0, 4, 8, 4)), None);
        assert!(indexer.table.is_empty());
    }

    #[test]
    fn command_line_macros_are_external() {
        let mut indexer = MacroIndexer::new();
        let def = MacroDefSite { origin: MacroOrigin::CommandLine, line: 1, col: 1 };
        indexer.save_definition(None, def);

        let (tu, files) = harness();
        let mut formatter = SymbolFormatter::new(&files);
        let externals = indexer.emit_non_file_based(&tu, &mut formatter, true);
        assert_eq!(externals.len(), 1);
        assert!(externals[0].symbol.contains("<command line>"));
    }
}
