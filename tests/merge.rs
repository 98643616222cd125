//! Merger integration tests: shard files in, one index out, invariants
//! checked on the result.

use std::collections::HashSet;

use cindex::merge::{ShardPair, merge_shards};
use cindex::scip::{
    Document, FileRange, ForwardDecl, ForwardDeclIndex, ForwardDeclReference, Index, Occurrence,
    SymbolInformation, SyntaxKind, symbol_role, write_artifact,
};

fn occurrence(line: u32, symbol: &str, roles: u32) -> Occurrence {
    Occurrence {
        range: FileRange::for_token(line, 1, 4),
        symbol: symbol.to_owned(),
        symbol_roles: roles,
        syntax_kind: SyntaxKind::Identifier,
        override_documentation: Vec::new(),
    }
}

fn document(path: &str, occurrences: Vec<Occurrence>, symbols: Vec<&str>) -> Document {
    Document {
        language: "CPP".to_owned(),
        relative_path: path.to_owned(),
        occurrences,
        symbols: symbols
            .into_iter()
            .map(|s| SymbolInformation {
                symbol: s.to_owned(),
                documentation: Vec::new(),
                relationships: Vec::new(),
            })
            .collect(),
    }
}

fn write_shard(dir: &std::path::Path, name: &str, index: &Index, fwd: &ForwardDeclIndex) -> ShardPair {
    let pair = ShardPair {
        index: dir.join(format!("{name}.index.json")),
        forward_decls: dir.join(format!("{name}.fwd.json")),
    };
    write_artifact(&pair.index, index).unwrap();
    write_artifact(&pair.forward_decls, fwd).unwrap();
    pair
}

fn merge(pairs: &[ShardPair], multiply: &HashSet<String>) -> Index {
    let mut out = Vec::new();
    merge_shards(pairs, multiply, true, &mut out).unwrap();
    serde_json::from_slice(&out).unwrap()
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[test]
fn merged_index_upholds_uniqueness_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let s1 = write_shard(
        dir.path(),
        "s1",
        &Index {
            documents: vec![
                document(
                    "a.cc",
                    vec![occurrence(1, "cxx . . $ a/", symbol_role::DEFINITION)],
                    vec!["cxx . . $ a/"],
                ),
                document(
                    "shared.h",
                    vec![occurrence(2, "cxx . . $ s().", symbol_role::DEFINITION)],
                    vec!["cxx . . $ s()."],
                ),
            ],
            external_symbols: vec![SymbolInformation {
                symbol: "cxx . libc 2.0$ printf(0).".to_owned(),
                documentation: Vec::new(),
                relationships: Vec::new(),
            }],
        },
        &ForwardDeclIndex::default(),
    );
    let s2 = write_shard(
        dir.path(),
        "s2",
        &Index {
            documents: vec![
                document("b.cc", Vec::new(), Vec::new()),
                // The same shared.h content emitted by a second worker for
                // a different variant.
                document(
                    "shared.h",
                    vec![
                        occurrence(2, "cxx . . $ s().", symbol_role::DEFINITION),
                        occurrence(5, "cxx . . $ extra().", symbol_role::DEFINITION),
                    ],
                    vec!["cxx . . $ s().", "cxx . . $ extra()."],
                ),
            ],
            external_symbols: vec![SymbolInformation {
                symbol: "cxx . libc 2.0$ printf(0).".to_owned(),
                documentation: vec!["printf docs".to_owned()],
                relationships: Vec::new(),
            }],
        },
        &ForwardDeclIndex::default(),
    );

    let multiply: HashSet<String> = std::iter::once("shared.h".to_owned()).collect();
    let index = merge(&[s1, s2], &multiply);

    // No two documents share a relative path.
    let mut paths = HashSet::new();
    for doc in &index.documents {
        assert!(paths.insert(doc.relative_path.clone()), "duplicate {}", doc.relative_path);
    }
    assert_eq!(index.documents.len(), 3);

    // Within a document, no two occurrences share (range, symbol, role).
    for doc in &index.documents {
        let mut seen = HashSet::new();
        for occ in &doc.occurrences {
            assert!(
                seen.insert((occ.range, occ.symbol.clone(), occ.symbol_roles)),
                "duplicate occurrence in {}",
                doc.relative_path
            );
        }
        for info in &doc.symbols {
            assert!(!info.symbol.is_empty());
        }
    }

    // The shared header merged, not duplicated.
    let shared = index.documents.iter().find(|d| d.relative_path == "shared.h").unwrap();
    assert_eq!(shared.occurrences.len(), 2);

    // Externals deduplicated; documentation first-non-empty-wins.
    assert_eq!(index.external_symbols.len(), 1);
    assert_eq!(index.external_symbols[0].documentation, vec!["printf docs"]);
}

// ---------------------------------------------------------------------------
// Forward declarations against externals
// ---------------------------------------------------------------------------

#[test]
fn forward_decl_against_known_external_adopts_documentation() {
    let dir = tempfile::tempdir().unwrap();
    let shard = write_shard(
        dir.path(),
        "s",
        &Index {
            documents: vec![document("user.cc", Vec::new(), Vec::new())],
            external_symbols: vec![SymbolInformation {
                symbol: "cxx . somelib 3.1$ Widget#".to_owned(),
                documentation: Vec::new(),
                relationships: Vec::new(),
            }],
        },
        &ForwardDeclIndex {
            forward_decls: vec![ForwardDecl {
                suffix: "Widget#".to_owned(),
                documentation: "A widget.".to_owned(),
                references: vec![ForwardDeclReference {
                    relative_path: "user.cc".to_owned(),
                    range: FileRange::for_token(3, 7, 6),
                }],
            }],
        },
    );

    let index = merge(std::slice::from_ref(&shard), &HashSet::new());
    // The forward decl matched the external symbol: documentation adopted,
    // references emitted against the external's full name.
    assert_eq!(index.external_symbols.len(), 1);
    assert_eq!(index.external_symbols[0].symbol, "cxx . somelib 3.1$ Widget#");
    assert_eq!(index.external_symbols[0].documentation, vec!["A widget."]);
    let user = &index.documents[0];
    assert_eq!(user.occurrences.len(), 1);
    assert_eq!(user.occurrences[0].symbol, "cxx . somelib 3.1$ Widget#");
}

#[test]
fn forward_decl_matching_multiple_externals_references_each() {
    let dir = tempfile::tempdir().unwrap();
    let external = |package: &str| SymbolInformation {
        symbol: format!("cxx . {package} 1.0$ Shared#"),
        documentation: Vec::new(),
        relationships: Vec::new(),
    };
    let shard = write_shard(
        dir.path(),
        "s",
        &Index {
            documents: vec![document("user.cc", Vec::new(), Vec::new())],
            external_symbols: vec![external("liba"), external("libb")],
        },
        &ForwardDeclIndex {
            forward_decls: vec![ForwardDecl {
                suffix: "Shared#".to_owned(),
                documentation: String::new(),
                references: vec![ForwardDeclReference {
                    relative_path: "user.cc".to_owned(),
                    range: FileRange::for_token(1, 1, 6),
                }],
            }],
        },
    );

    let index = merge(std::slice::from_ref(&shard), &HashSet::new());
    // Conservative fallback: one reference occurrence per matching package.
    let user = &index.documents[0];
    let symbols: HashSet<&str> = user.occurrences.iter().map(|o| o.symbol.as_str()).collect();
    assert_eq!(symbols.len(), 2);
    assert!(symbols.contains("cxx . liba 1.0$ Shared#"));
    assert!(symbols.contains("cxx . libb 1.0$ Shared#"));
}
