//! Output step: stream the merged index without holding it in memory.
//!
//! Produces byte-for-byte the same JSON as serializing a whole
//! [`crate::scip::Index`] value, but element by element: the underlying
//! stream is flushed after every document and every 1024 external symbols,
//! so merging arbitrarily large inputs keeps memory bounded.

use std::io::Write;

use serde::Serialize;

use crate::error::{IndexerError, Result};
use crate::scip::{Document, SymbolInformation};

/// How many external symbols between flushes.
const EXTERNAL_FLUSH_INTERVAL: usize = 1024;

/// Incremental writer for the final index message.
pub struct IndexWriter<'w, W: Write> {
    out: &'w mut W,
    documents_open: bool,
    externals_open: bool,
    externals_since_flush: usize,
}

impl<'w, W: Write> IndexWriter<'w, W> {
    pub fn new(out: &'w mut W) -> Self {
        Self { out, documents_open: false, externals_open: false, externals_since_flush: 0 }
    }

    fn io(e: std::io::Error) -> IndexerError {
        IndexerError::io("<index output>", e)
    }

    fn write_element<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer(&mut *self.out, value)?;
        Ok(())
    }

    /// Append one document. Must precede all external symbols.
    ///
    /// # Errors
    /// Returns an error when the output stream does.
    pub fn write_document(&mut self, document: &Document) -> Result<()> {
        debug_assert!(!self.externals_open, "documents must be written before external symbols");
        if self.documents_open {
            self.out.write_all(b",").map_err(Self::io)?;
        } else {
            self.out.write_all(b"{\"documents\":[").map_err(Self::io)?;
            self.documents_open = true;
        }
        self.write_element(document)?;
        self.out.flush().map_err(Self::io)
    }

    /// Append one external symbol.
    ///
    /// # Errors
    /// Returns an error when the output stream does.
    pub fn write_external_symbol(&mut self, info: &SymbolInformation) -> Result<()> {
        if self.externals_open {
            self.out.write_all(b",").map_err(Self::io)?;
        } else {
            if self.documents_open {
                self.out.write_all(b"],").map_err(Self::io)?;
                self.documents_open = false;
            } else {
                self.out.write_all(b"{").map_err(Self::io)?;
            }
            self.out.write_all(b"\"external_symbols\":[").map_err(Self::io)?;
            self.externals_open = true;
        }
        self.write_element(info)?;
        self.externals_since_flush += 1;
        if self.externals_since_flush >= EXTERNAL_FLUSH_INTERVAL {
            self.externals_since_flush = 0;
            self.out.flush().map_err(Self::io)?;
        }
        Ok(())
    }

    /// Close the message and flush.
    ///
    /// # Errors
    /// Returns an error when the output stream does.
    pub fn finish(mut self) -> Result<()> {
        if self.externals_open {
            self.out.write_all(b"]}").map_err(Self::io)?;
        } else if self.documents_open {
            self.out.write_all(b"]}").map_err(Self::io)?;
        } else {
            self.out.write_all(b"{}").map_err(Self::io)?;
        }
        self.out.flush().map_err(Self::io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scip::Index;

    fn doc(path: &str) -> Document {
        Document {
            language: "CPP".to_owned(),
            relative_path: path.to_owned(),
            ..Document::default()
        }
    }

    fn info(symbol: &str) -> SymbolInformation {
        SymbolInformation { symbol: symbol.to_owned(), ..SymbolInformation::default() }
    }

    fn serde_bytes(index: &Index) -> Vec<u8> {
        serde_json::to_vec(index).unwrap()
    }

    #[test]
    fn matches_whole_value_serialization() {
        let cases = [
            Index::default(),
            Index { documents: vec![doc("a.cc")], external_symbols: Vec::new() },
            Index { documents: Vec::new(), external_symbols: vec![info("x")] },
            Index {
                documents: vec![doc("a.cc"), doc("b.cc")],
                external_symbols: vec![info("x"), info("y")],
            },
        ];
        for index in cases {
            let mut out = Vec::new();
            {
                let mut writer = IndexWriter::new(&mut out);
                for d in &index.documents {
                    writer.write_document(d).unwrap();
                }
                for e in &index.external_symbols {
                    writer.write_external_symbol(e).unwrap();
                }
                writer.finish().unwrap();
            }
            assert_eq!(out, serde_bytes(&index));
        }
    }
}
