//! Preprocessor transcript hashing.
//!
//! Streams the preprocessor event transcript into a running per-file hash,
//! fingerprinting the *effective* preprocessor-visible contents of every
//! file a translation unit touches. Two translation units that observe the
//! same contents for a header compute the same [`HashValue`] for it; a
//! header whose expansion depends on the including TU's macro state
//! computes different values, which is how the driver distinguishes
//! well-behaved from ill-behaved headers.
//!
//! The hasher maintains a stack of builders, one frame per file currently
//! being processed (invalid frames for imaginary buffers). Exiting a file
//! finalizes its hash and mixes that hash into the parent frame, so a
//! parent's transcript reflects what it observed by including the child.
//!
//! Unbalanced Enter/Exit pairs (reduced or otherwise malformed inputs) are
//! tolerated: any frames still open at flush are force-exited. No error
//! surfaces from this module's event path.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{IndexerError, Result};
use crate::filemap::PathHashLookup;
use crate::frontend::{FileId, MacroDefSite, MacroOrigin, PpEvent, TranslationUnit};
use crate::hash::{HashBuilder, HashValue, HistoryRow};
use crate::macros::MacroIndexer;
use crate::path::{AbsolutePath, normalize};

// ---------------------------------------------------------------------------
// HeaderFilter
// ---------------------------------------------------------------------------

/// Anchored regex over entering file paths; arms history recording.
#[derive(Debug, Default)]
pub struct HeaderFilter {
    matcher: Option<Regex>,
    text: String,
}

impl HeaderFilter {
    /// Compile a filter. An empty pattern matches nothing.
    ///
    /// # Errors
    /// Returns a configuration error for an ill-formed pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Ok(Self::default());
        }
        let anchored = format!("^({pattern})$");
        let matcher = Regex::new(&anchored).map_err(|e| IndexerError::Config {
            input: "history filter regex",
            path: None,
            detail: format!("ill-formed pattern '{pattern}': {e}"),
        })?;
        Ok(Self { matcher: Some(matcher), text: pattern.to_owned() })
    }

    /// The original pattern text (for forwarding over IPC).
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.text
    }

    /// Whether a path should have its hash history recorded.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.is_match(path))
    }
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Recorded mix history for one file, serialized as one YAML document.
#[derive(Debug, Serialize)]
pub struct FileHistory {
    pub path: String,
    pub hash: String,
    pub history: Vec<HistoryRow>,
}

/// Everything the semantic-analysis phase learned from the preprocessor.
pub struct PpOutput {
    /// Files with exactly one observed content hash, sorted when
    /// determinism is requested.
    pub well_behaved: Vec<(AbsolutePath, HashValue)>,
    /// Files with two or more observed content hashes.
    pub ill_behaved: Vec<(AbsolutePath, Vec<HashValue>)>,
    /// (path, hash) → front-end file id, for the emit phase.
    pub lookup: PathHashLookup,
    /// Macro occurrences recorded alongside hashing.
    pub macros: MacroIndexer,
    /// Histories of files matched by the header filter.
    pub histories: Vec<FileHistory>,
}

// ---------------------------------------------------------------------------
// TranscriptHasher
// ---------------------------------------------------------------------------

struct Frame {
    file: FileId,
    builder: HashBuilder,
}

/// Options for one hashing pass.
#[derive(Debug, Default)]
pub struct PpOptions {
    pub deterministic: bool,
    pub filter: HeaderFilter,
}

/// Streams [`PpEvent`]s into per-file hashes. One instance per TU parse.
pub struct TranscriptHasher {
    options: PpOptions,
    /// `None` frames correspond to imaginary buffers.
    stack: Vec<Option<Frame>>,
    /// First finalized hash per file id wins.
    finished: HashMap<FileId, HashValue>,
    macros: MacroIndexer,
    histories: Vec<FileHistory>,
}

impl TranscriptHasher {
    #[must_use]
    pub fn new(options: PpOptions) -> Self {
        Self {
            options,
            stack: Vec::new(),
            finished: HashMap::new(),
            macros: MacroIndexer::new(),
            histories: Vec::new(),
        }
    }

    /// Feed the entire transcript of a TU, then flush.
    #[must_use]
    pub fn run(mut self, tu: &TranslationUnit) -> PpOutput {
        for event in &tu.pp_events {
            self.handle(tu, event);
        }
        self.flush(tu)
    }

    fn handle(&mut self, tu: &TranslationUnit, event: &PpEvent) {
        match event {
            PpEvent::EnterFile { file } => self.enter_file(tu, *file),
            PpEvent::ExitFile { file } => self.exit_file(tu, *file),
            PpEvent::MacroDefined { name, body, def, site } => {
                self.macros.save_definition(*site, *def);
                self.mix(&format!("#define {name} {body}"), "macro definition", name);
            }
            PpEvent::MacroUndefined { name, site, def } => {
                self.macros.save_reference(*site, *def);
                self.mix(&format!("#undef {name}"), "macro undef", name);
            }
            PpEvent::MacroExpanded { name, site, def } => {
                self.macros.save_reference(*site, *def);
                let key = Self::def_key(tu, *def);
                self.mix(&format!("expand {name} {key}"), "macro expansion", name);
            }
            PpEvent::MacroTested { name, site, def } => {
                self.macros.save_reference(*site, *def);
                let key = Self::def_key(tu, *def);
                self.mix(&format!("test {name} {key}"), "defined test", name);
            }
            PpEvent::Inclusion { includer, range, target } => match AbsolutePath::new(target) {
                Ok(path) => self.macros.save_include(*includer, *range, path),
                Err(_) => debug!(target, "skipping include edge with non-absolute target"),
            },
        }
    }

    /// Stable identity of a macro definition, mixed into expansion events so
    /// that "same name, different definition" changes the transcript. Uses
    /// the definition file's *path*; per-TU file ids would make identical
    /// transcripts disagree across translation units.
    fn def_key(tu: &TranslationUnit, def: Option<MacroDefSite>) -> String {
        match def {
            None => "<undefined>".to_owned(),
            Some(d) => match d.origin {
                MacroOrigin::File(id) => {
                    let path = tu.file_path(id).map(normalize).unwrap_or_default();
                    format!("{path}:{}:{}", d.line, d.col)
                }
                MacroOrigin::Builtin => format!("<built-in>:{}:{}", d.line, d.col),
                MacroOrigin::CommandLine => format!("<command line>:{}:{}", d.line, d.col),
            },
        }
    }

    fn enter_file(&mut self, tu: &TranslationUnit, file: Option<FileId>) {
        let Some(id) = file else {
            self.stack.push(None);
            return;
        };
        let Some(path) = tu.file_path(id) else {
            // A file id backed by no real file is an imaginary buffer.
            self.stack.push(None);
            return;
        };
        let normalized = normalize(path);
        let record = self.options.filter.matches(&normalized);
        let mut builder = HashBuilder::new(record);
        // Distinguish same-content files at different paths.
        builder.mix_with_context(normalized.as_bytes(), "self path", &normalized);
        self.stack.push(Some(Frame { file: id, builder }));
    }

    fn exit_file(&mut self, tu: &TranslationUnit, file: Option<FileId>) {
        let Some(frame) = self.stack.pop() else {
            debug!("exit with empty preprocessor stack; tolerating");
            return;
        };
        let Some(frame) = frame else {
            // Invalid frames pop without hashing.
            return;
        };
        if let Some(id) = file
            && frame.file != id
        {
            debug!(expected = frame.file.0, got = id.0, "file id mismatch on exit; tolerating");
        }
        self.finalize_frame(tu, frame);
    }

    fn finalize_frame(&mut self, tu: &TranslationUnit, frame: Frame) {
        let (hash, history) = frame.builder.finish();
        self.finished.entry(frame.file).or_insert(hash);
        if let Some(rows) = history {
            let path = tu.file_path(frame.file).map(normalize).unwrap_or_default();
            self.histories.push(FileHistory { path, hash: hash.to_string(), history: rows });
        }
        // The parent's transcript reflects what it observed by including
        // this file.
        if let Some(Some(parent)) = self.stack.last_mut() {
            if parent.builder.is_recording() {
                parent.builder.mix_with_context(
                    hash.to_string().as_bytes(),
                    "hash for #include",
                    tu.file_path(frame.file).unwrap_or(""),
                );
            } else {
                parent.builder.mix_u64(hash.0);
            }
        }
    }

    fn mix(&mut self, value: &str, context: &str, context_data: &str) {
        if let Some(Some(frame)) = self.stack.last_mut() {
            frame.builder.mix_with_context(value.as_bytes(), context, context_data);
        }
    }

    /// Force-exit any open frames (the main file's frame in the balanced
    /// case), then classify everything observed.
    fn flush(mut self, tu: &TranslationUnit) -> PpOutput {
        while let Some(frame) = self.stack.pop() {
            if let Some(frame) = frame {
                self.finalize_frame(tu, frame);
            }
        }

        let mut lookup = PathHashLookup::default();
        let mut warned_missing_path = false;
        for (&id, &hash) in &self.finished {
            let Some(path) = tu.file_path(id) else { continue };
            match AbsolutePath::new(path) {
                Ok(abs) => lookup.insert(abs, hash, id),
                Err(_) => {
                    if !warned_missing_path {
                        warn!(path, "unexpected relative path from the front-end; skipping file");
                        warned_missing_path = true;
                    }
                }
            }
        }

        let mut well_behaved = Vec::new();
        let mut ill_behaved = Vec::new();
        lookup.for_each(|path, hashes| {
            if hashes.len() == 1 {
                if let Some(&hash) = hashes.keys().next() {
                    well_behaved.push((path.clone(), hash));
                }
            } else {
                let mut all: Vec<HashValue> = hashes.keys().copied().collect();
                all.sort_unstable();
                ill_behaved.push((path.clone(), all));
            }
        });
        if self.options.deterministic {
            well_behaved.sort();
            ill_behaved.sort();
        }

        PpOutput {
            well_behaved,
            ill_behaved,
            lookup,
            macros: self.macros,
            histories: self.histories,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
