//! Ingestion step of the shard merge pipeline.
//!
//! [`IndexBuilder`] accepts documents and external symbols from every
//! shard. Singly-indexed documents pass straight through to the output
//! stage; paths the scheduler flagged as multiply indexed are merged
//! occurrence-by-occurrence in a [`DocumentBuilder`], which is
//! insertion-idempotent: feeding it the same document twice changes
//! nothing.
//!
//! Documentation merging is first-non-empty-wins, which is deterministic
//! as long as shards are ingested in a stable order (the driver sorts them
//! by TU path before merging).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;

use crate::error::Result;
use crate::scip::{
    Document, FileRange, ForwardDecl, Occurrence, Relationship, SymbolInformation,
};
use crate::symbol::{add_fake_prefix, package_agnostic_suffix};

use super::MergeStats;
use super::forward::{DocTarget, ForwardDeclResolver};
use super::writer::IndexWriter;

// ---------------------------------------------------------------------------
// SymbolInfoBuilder
// ---------------------------------------------------------------------------

/// Symbol metadata being merged across shards.
#[derive(Clone, Debug, Default)]
pub struct SymbolInfoBuilder {
    documentation: Vec<String>,
    relationships: BTreeSet<Relationship>,
}

impl SymbolInfoBuilder {
    #[must_use]
    pub fn from_info(info: SymbolInformation) -> Self {
        Self {
            documentation: info.documentation,
            relationships: info.relationships.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn has_documentation(&self) -> bool {
        !self.documentation.is_empty()
    }

    /// First non-empty documentation wins.
    pub fn adopt_documentation(&mut self, documentation: Vec<String>) {
        if !self.has_documentation() && !documentation.is_empty() {
            self.documentation = documentation;
        }
    }

    /// Merge another shard's view of the same symbol.
    pub fn merge(&mut self, info: SymbolInformation) {
        self.adopt_documentation(info.documentation);
        self.relationships.extend(info.relationships);
    }

    /// Seal into wire form. Relationships come out sorted by tuple order.
    #[must_use]
    pub fn finish(self, symbol: String) -> SymbolInformation {
        SymbolInformation {
            symbol,
            documentation: self.documentation,
            relationships: self.relationships.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentBuilder
// ---------------------------------------------------------------------------

/// Cross-shard merge state for one multiply-indexed path.
#[derive(Debug)]
pub struct DocumentBuilder {
    language: String,
    relative_path: String,
    occurrences: BTreeSet<Occurrence>,
    symbols: BTreeMap<String, SymbolInfoBuilder>,
}

impl DocumentBuilder {
    #[must_use]
    pub fn new(first: Document) -> Self {
        let mut builder = Self {
            language: first.language.clone(),
            relative_path: first.relative_path.clone(),
            occurrences: BTreeSet::new(),
            symbols: BTreeMap::new(),
        };
        builder.merge(first);
        builder
    }

    /// Fold another emitted variant of the same file in. Idempotent.
    pub fn merge(&mut self, document: Document) {
        debug_assert_eq!(self.relative_path, document.relative_path);
        self.occurrences.extend(document.occurrences);
        for info in document.symbols {
            let symbol = info.symbol.clone();
            match self.symbols.get_mut(&symbol) {
                None => {
                    self.symbols.insert(symbol, SymbolInfoBuilder::from_info(info));
                }
                Some(existing) => existing.merge(info),
            }
        }
    }

    /// Register every suffixed symbol with the forward-decl resolver.
    pub fn populate_resolver(&self, resolver: &mut ForwardDeclResolver) {
        for symbol in self.symbols.keys() {
            if let Some(suffix) = package_agnostic_suffix(symbol) {
                resolver.insert_document_symbol(
                    suffix.to_owned(),
                    DocTarget::Builder { path: self.relative_path.clone(), symbol: symbol.clone() },
                );
            }
        }
    }

    fn adopt_documentation(&mut self, symbol: &str, documentation: Vec<String>) {
        if let Some(info) = self.symbols.get_mut(symbol) {
            info.adopt_documentation(documentation);
        }
    }

    /// Seal into a wire document; both collections come out sorted.
    #[must_use]
    pub fn finish(self) -> Document {
        Document {
            language: self.language,
            relative_path: self.relative_path,
            occurrences: self.occurrences.into_iter().collect(),
            symbols: self.symbols.into_iter().map(|(s, b)| b.finish(s)).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// IndexBuilder
// ---------------------------------------------------------------------------

/// Whole-index merge state.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    /// Documents for paths with exactly one emitter; passed through.
    documents: Vec<Document>,
    /// Path → cross-shard merge state for ill-behaved files.
    multiply_indexed: BTreeMap<String, DocumentBuilder>,
    /// Symbol → metadata for definitions outside every indexed document.
    external_symbols: BTreeMap<String, SymbolInfoBuilder>,
    /// Relative path → occurrences resolved out of forward declarations,
    /// appended to the owning document at write time.
    forward_occurrences: HashMap<String, Vec<(String, FileRange)>>,
}

impl IndexBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one shard document.
    pub fn add_document(&mut self, document: Document, is_multiply_indexed: bool) {
        debug_assert!(!document.relative_path.is_empty(), "document without a relative path");
        if is_multiply_indexed {
            match self.multiply_indexed.get_mut(&document.relative_path) {
                None => {
                    self.multiply_indexed
                        .insert(document.relative_path.clone(), DocumentBuilder::new(document));
                }
                Some(builder) => builder.merge(document),
            }
        } else {
            debug_assert!(
                !self.multiply_indexed.contains_key(&document.relative_path),
                "document '{}' arrived both singly and multiply indexed",
                document.relative_path
            );
            self.documents.push(document);
        }
    }

    /// Merge one external symbol; first non-empty documentation wins.
    pub fn add_external_symbol(&mut self, info: SymbolInformation) {
        let symbol = info.symbol.clone();
        match self.external_symbols.get_mut(&symbol) {
            None => {
                self.external_symbols.insert(symbol, SymbolInfoBuilder::from_info(info));
            }
            Some(existing) => existing.merge(info),
        }
    }

    /// Build the suffix lookup over everything ingested so far.
    #[must_use]
    pub fn populate_forward_decl_resolver(&self) -> ForwardDeclResolver {
        let mut resolver = ForwardDeclResolver::default();
        for (doc_ix, document) in self.documents.iter().enumerate() {
            for (sym_ix, info) in document.symbols.iter().enumerate() {
                if let Some(suffix) = package_agnostic_suffix(&info.symbol) {
                    resolver.insert_document_symbol(
                        suffix.to_owned(),
                        DocTarget::SinglyIndexed { document: doc_ix, symbol: sym_ix },
                    );
                }
            }
        }
        for builder in self.multiply_indexed.values() {
            builder.populate_resolver(&mut resolver);
        }
        for symbol in self.external_symbols.keys() {
            resolver.insert_external(symbol);
        }
        resolver
    }

    /// Resolve one forward declaration against the index contents.
    pub fn add_forward_decl(&mut self, resolver: &mut ForwardDeclResolver, decl: ForwardDecl) {
        let ForwardDecl { suffix, documentation, references } = decl;

        let Some(target) = resolver.lookup_in_documents(&suffix).cloned() else {
            if let Some(externals) = resolver.lookup_externals(&suffix) {
                // Confirmed external: the definition lives outside every
                // indexed TU. Adopt documentation where it is missing and
                // emit the references against each matching external.
                let names: Vec<String> = externals.iter().cloned().collect();
                for name in names {
                    if let Some(builder) = self.external_symbols.get_mut(&name)
                        && !documentation.is_empty()
                    {
                        builder.adopt_documentation(vec![documentation.clone()]);
                    }
                    self.add_forward_occurrences(&name, &references);
                }
            } else {
                // No definition anywhere; make up a fake package prefix.
                let name = add_fake_prefix(&suffix);
                let mut builder = SymbolInfoBuilder::default();
                if !documentation.is_empty() {
                    builder.adopt_documentation(vec![documentation.clone()]);
                }
                self.external_symbols.insert(name.clone(), builder);
                resolver.insert_external(&name);
                self.add_forward_occurrences(&name, &references);
            }
            return;
        };

        // The definition is in-project, so any same-suffix externals were
        // recorded by TUs that only ever saw the forward declaration. Drop
        // them as false externals.
        if let Some(externals) = resolver.lookup_externals(&suffix) {
            let stale: Vec<String> = externals.iter().cloned().collect();
            for name in stale {
                self.external_symbols.remove(&name);
            }
            resolver.delete_externals(&suffix);
        }

        let name = match &target {
            DocTarget::SinglyIndexed { document, symbol } => {
                let info = &mut self.documents[*document].symbols[*symbol];
                if info.documentation.is_empty() && !documentation.is_empty() {
                    info.documentation = vec![documentation.clone()];
                }
                info.symbol.clone()
            }
            DocTarget::Builder { path, symbol } => {
                if let Some(builder) = self.multiply_indexed.get_mut(path)
                    && !documentation.is_empty()
                {
                    builder.adopt_documentation(symbol, vec![documentation.clone()]);
                }
                symbol.clone()
            }
        };
        self.add_forward_occurrences(&name, &references);
    }

    fn add_forward_occurrences(
        &mut self,
        symbol: &str,
        references: &[crate::scip::ForwardDeclReference],
    ) {
        for reference in references {
            self.forward_occurrences
                .entry(reference.relative_path.clone())
                .or_default()
                .push((symbol.to_owned(), reference.range));
        }
    }

    fn take_forward_occurrences(&mut self, relative_path: &str) -> Vec<Occurrence> {
        self.forward_occurrences
            .remove(relative_path)
            .unwrap_or_default()
            .into_iter()
            .map(|(symbol, range)| Occurrence {
                range,
                symbol,
                symbol_roles: 0,
                syntax_kind: crate::scip::SyntaxKind::UnspecifiedSyntaxKind,
                override_documentation: Vec::new(),
            })
            .collect()
    }

    /// Stream everything out.
    ///
    /// # Errors
    /// Returns an error when the output stream does.
    pub fn finish(mut self, deterministic: bool, out: &mut impl Write) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        let mut writer = IndexWriter::new(out);

        let mut documents = std::mem::take(&mut self.documents);
        if deterministic {
            documents.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        }
        for mut document in documents {
            let extra = self.take_forward_occurrences(&document.relative_path);
            if !extra.is_empty() {
                document.occurrences.extend(extra);
                if deterministic {
                    document.occurrences.sort();
                }
                document.occurrences.dedup();
            }
            writer.write_document(&document)?;
            stats.documents += 1;
        }

        let multiply = std::mem::take(&mut self.multiply_indexed);
        for (_, builder) in multiply {
            let mut document = builder.finish();
            let extra = self.take_forward_occurrences(&document.relative_path);
            if !extra.is_empty() {
                document.occurrences.extend(extra);
                if deterministic {
                    document.occurrences.sort();
                }
                document.occurrences.dedup();
            }
            writer.write_document(&document)?;
            stats.documents += 1;
        }

        for (symbol, builder) in std::mem::take(&mut self.external_symbols) {
            writer.write_external_symbol(&builder.finish(symbol))?;
            stats.external_symbols += 1;
        }

        writer.finish()?;
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scip::{ForwardDeclReference, Index, SyntaxKind, read_artifact, write_artifact};

    fn occ(line: u32, symbol: &str) -> Occurrence {
        Occurrence {
            range: FileRange::for_token(line, 1, 3),
            symbol: symbol.to_owned(),
            symbol_roles: 0,
            syntax_kind: SyntaxKind::Identifier,
            override_documentation: Vec::new(),
        }
    }

    fn doc(path: &str, occurrences: Vec<Occurrence>, symbols: Vec<SymbolInformation>) -> Document {
        Document {
            language: "CPP".to_owned(),
            relative_path: path.to_owned(),
            occurrences,
            symbols,
        }
    }

    fn info(symbol: &str) -> SymbolInformation {
        SymbolInformation {
            symbol: symbol.to_owned(),
            documentation: Vec::new(),
            relationships: Vec::new(),
        }
    }

    #[test]
    fn document_builder_merge_is_idempotent() {
        let d = doc("h.h", vec![occ(1, "cxx . . $ g()."), occ(2, "cxx . . $ g().")], vec![
            info("cxx . . $ g()."),
        ]);
        let mut builder = DocumentBuilder::new(d.clone());
        builder.merge(d.clone());
        builder.merge(d);
        let merged = builder.finish();
        assert_eq!(merged.occurrences.len(), 2);
        assert_eq!(merged.symbols.len(), 1);
    }

    #[test]
    fn forward_decl_resolves_to_in_project_definition() {
        let mut builder = IndexBuilder::new();
        builder.add_document(
            doc("t2.cc", vec![occ(1, "cxx . . $ F#")], vec![info("cxx . . $ F#")]),
            false,
        );
        // A TU that only saw `class F;` conservatively called it external.
        builder.add_external_symbol(info("cxx . . $ F#"));

        let mut resolver = builder.populate_forward_decl_resolver();
        builder.add_forward_decl(&mut resolver, ForwardDecl {
            suffix: "F#".to_owned(),
            documentation: "the F class".to_owned(),
            references: vec![ForwardDeclReference {
                relative_path: "t1.cc".to_owned(),
                range: FileRange::for_token(4, 7, 1),
            }],
        });

        let mut out = Vec::new();
        let stats = builder.finish(true, &mut out).unwrap();
        // The false external was dropped.
        assert_eq!(stats.external_symbols, 0);
        let index: Index = serde_json::from_slice(&out).unwrap();
        assert!(index.external_symbols.is_empty());
        // References landed on t1.cc... except t1.cc was never emitted as a
        // document, so no document exists for it. The in-project definition
        // document is intact.
        assert_eq!(stats.documents, 1);
        assert_eq!(index.documents[0].relative_path, "t2.cc");
    }

    #[test]
    fn unresolved_forward_decl_synthesizes_fake_external() {
        let mut builder = IndexBuilder::new();
        builder.add_document(doc("t1.cc", Vec::new(), Vec::new()), false);
        let mut resolver = builder.populate_forward_decl_resolver();
        builder.add_forward_decl(&mut resolver, ForwardDecl {
            suffix: "Mystery#".to_owned(),
            documentation: String::new(),
            references: vec![ForwardDeclReference {
                relative_path: "t1.cc".to_owned(),
                range: FileRange::for_token(2, 7, 7),
            }],
        });
        let mut out = Vec::new();
        let stats = builder.finish(true, &mut out).unwrap();
        assert_eq!(stats.external_symbols, 1);
        let index: Index = serde_json::from_slice(&out).unwrap();
        assert_eq!(index.external_symbols[0].symbol, "cxx . . $ Mystery#");
        // The reference was attached to the referencing document.
        assert_eq!(index.documents[0].occurrences.len(), 1);
        assert_eq!(index.documents[0].occurrences[0].symbol, "cxx . . $ Mystery#");
    }

    #[test]
    fn merging_a_single_shard_reproduces_it() {
        let dir = tempfile::tempdir().unwrap();
        let shard = Index {
            documents: vec![doc(
                "a.cc",
                vec![occ(1, "cxx . . $ a/")],
                vec![info("cxx . . $ a/")],
            )],
            external_symbols: vec![info("cxx . ext 1.0$ x#")],
        };
        let shard_path = dir.path().join("shard.index.json");
        write_artifact(&shard_path, &shard).unwrap();
        let fwd_path = dir.path().join("shard.fwd.json");
        write_artifact(&fwd_path, &crate::scip::ForwardDeclIndex::default()).unwrap();

        let mut out = Vec::new();
        super::super::merge_shards(
            &[super::super::ShardPair { index: shard_path.clone(), forward_decls: fwd_path }],
            &std::collections::HashSet::new(),
            true,
            &mut out,
        )
        .unwrap();

        let original = std::fs::read(&shard_path).unwrap();
        assert_eq!(out, original, "single-shard merge must be byte-identical");
        let reread: Index = read_artifact(&shard_path).unwrap();
        assert_eq!(reread, shard);
    }
}
