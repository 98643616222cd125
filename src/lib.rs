//! cindex library crate: the SCIP indexing pipeline for C-family code.
//!
//! The primary interface is the `scip-cindex` CLI binary; the library
//! exists so integration tests and embedders can drive the pieces
//! directly. The pipeline, bottom up: [`path`] and [`hash`] are the value
//! types; [`compdb`] and [`packagemap`] read the two input files;
//! [`frontend`] is the contract with the external C/C++ parser; [`pp`],
//! [`symbol`], [`macros`], and [`indexer`] turn one translation unit into
//! shard content; [`ipc`], [`worker`], and [`driver`] run N workers under
//! a single-threaded scheduler; [`merge`] folds the shards into the final
//! index.

pub mod compdb;
pub mod driver;
pub mod error;
pub mod filemap;
pub mod frontend;
pub mod hash;
pub mod indexer;
pub mod ipc;
pub mod macros;
pub mod merge;
pub mod packagemap;
pub mod path;
pub mod pp;
pub mod scip;
pub mod symbol;
pub mod telemetry;
pub mod worker;
