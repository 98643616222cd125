//! Deterministic shard merge pipeline.
//!
//! Combines per-job index shards into the final index in three steps, each
//! a separate module:
//!
//! - **builder**: ingest shard documents and external symbols, routing
//!   multiply-indexed paths through insertion-idempotent
//!   [`builder::DocumentBuilder`]s.
//! - **forward**: match forward-declaration records against definitions by
//!   package-agnostic suffix, demoting false externals and synthesizing
//!   fake-package externals when no definition exists anywhere.
//! - **writer**: stream the result to the output file, flushing after
//!   every document and every 1024 external symbols so memory stays
//!   bounded.
//!
//! # Determinism guarantee
//!
//! The same shard contents always produce the same output bytes,
//! regardless of worker scheduling or shard arrival order: documents are
//! emitted in relative-path order, occurrences sorted by (range, symbol,
//! role), external symbols and relationships by name. Ordering is imposed
//! at this serialization boundary, never by coordinating the workers.

pub mod builder;
pub mod forward;
pub mod writer;


use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;
use crate::scip::{ForwardDeclIndex, Index, read_artifact};

use self::builder::IndexBuilder;

/// The two artifacts one emit job leaves on disk.
#[derive(Clone, Debug)]
pub struct ShardPair {
    pub index: PathBuf,
    pub forward_decls: PathBuf,
}

/// Figures reported after a merge completes.
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeStats {
    pub documents: usize,
    pub external_symbols: usize,
}

/// Merge `shards` into `out`.
///
/// `multiply_indexed` names the relative paths the scheduler assigned to
/// more than one emitter (ill-behaved headers); only those are routed
/// through cross-shard document merging.
///
/// # Errors
/// Returns an error if a shard cannot be read or the output cannot be
/// written.
pub fn merge_shards(
    shards: &[ShardPair],
    multiply_indexed: &HashSet<String>,
    deterministic: bool,
    out: &mut impl Write,
) -> Result<MergeStats> {
    let mut builder = IndexBuilder::new();

    for shard in shards {
        let index: Index = read_artifact(&shard.index)?;
        debug!(
            shard = %shard.index.display(),
            documents = index.documents.len(),
            externals = index.external_symbols.len(),
            "ingesting shard"
        );
        for document in index.documents {
            let is_multiply = multiply_indexed.contains(&document.relative_path);
            builder.add_document(document, is_multiply);
        }
        for external in index.external_symbols {
            builder.add_external_symbol(external);
        }
    }

    let mut resolver = builder.populate_forward_decl_resolver();
    for shard in shards {
        let forward: ForwardDeclIndex = read_artifact(&shard.forward_decls)?;
        for decl in forward.forward_decls {
            builder.add_forward_decl(&mut resolver, decl);
        }
    }

    builder.finish(deterministic, out)
}
