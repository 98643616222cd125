//! Compilation database handling.
//!
//! Reads `compile_commands.json` into [`CompileCommand`] values, accepting
//! either the `command` (single shell string) or `arguments` (pre-split)
//! form, and scrubs compiler arguments that are meaningless or harmful for
//! indexing (architecture selection flags only some compilers know).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};

// ---------------------------------------------------------------------------
// CompileCommand
// ---------------------------------------------------------------------------

/// One translation unit's build invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawCommand")]
pub struct CompileCommand {
    /// Working directory the compiler was invoked from.
    pub directory: String,
    /// Main source file, absolute or relative to `directory`.
    pub file: String,
    /// Argument vector, including the compiler executable.
    pub arguments: Vec<String>,
    /// Output object file, when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl CompileCommand {
    /// The main file as an absolute path string, resolving against
    /// `directory` when relative.
    #[must_use]
    pub fn absolute_file(&self) -> String {
        if self.file.starts_with('/') {
            crate::path::normalize(&self.file)
        } else {
            crate::path::normalize(&format!("{}/{}", self.directory, self.file))
        }
    }
}

/// Wire-side shape: `command` and `arguments` are mutually exclusive in
/// practice; when both appear, `arguments` wins (it is already tokenized).
#[derive(Deserialize)]
struct RawCommand {
    #[serde(default)]
    directory: String,
    #[serde(default)]
    file: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    #[serde(default)]
    output: Option<String>,
}

impl From<RawCommand> for CompileCommand {
    fn from(raw: RawCommand) -> Self {
        let arguments = match (raw.arguments, raw.command) {
            (Some(args), _) => args,
            (None, Some(cmd)) => unescape_command_line(&cmd),
            (None, None) => Vec::new(),
        };
        Self { directory: raw.directory, file: raw.file, arguments, output: raw.output }
    }
}

// ---------------------------------------------------------------------------
// Shell unescaping
// ---------------------------------------------------------------------------

/// Split a `command` string into an argument vector using POSIX shell
/// quoting rules: whitespace separates arguments; single quotes are
/// literal; double quotes allow backslash escapes of `"` and `\`; a bare
/// backslash escapes the next character.
#[must_use]
pub fn unescape_command_line(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\n' => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            '\'' => {
                in_arg = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_arg = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some(e @ ('"' | '\\' | '$' | '`')) => current.push(e),
                            Some(e) => {
                                current.push('\\');
                                current.push(e);
                            }
                            None => current.push('\\'),
                        },
                        other => current.push(other),
                    }
                }
            }
            '\\' => {
                in_arg = true;
                if let Some(e) = chars.next() {
                    current.push(e);
                }
            }
            other => {
                in_arg = true;
                current.push(other);
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}

// ---------------------------------------------------------------------------
// Command-line cleaning
// ---------------------------------------------------------------------------

/// Whether a recognized flag consumes a following argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OptionKind {
    NoArgument,
    OneArgument,
}

/// Strips compiler arguments that this indexer must not forward to the
/// front-end: architecture-selection flags are often specific to GCC or to
/// proprietary compilers, and never affect code navigation.
pub struct CommandLineCleaner {
    to_zap: HashMap<&'static str, OptionKind>,
    no_argument_matcher: Regex,
}

/// Flags that select a target architecture; may take their value either
/// inline (`-march=armv8`) or as a separate argument.
const SKIP_OPTIONS_WITH_ARGS: [&str; 3] = ["-march", "-mcpu", "-mtune"];

/// Arg-less flag patterns to strip. `-mfix-*` erratum flags differ between
/// GCC and Clang even for the same CPUs.
const SKIP_OPTIONS_NO_ARGS_PATTERN: &str = "^-m(no-)?fix-.*$";

impl CommandLineCleaner {
    /// Cleaner configured for Clang- and GCC-style driver command lines.
    ///
    /// # Panics
    /// Only if the built-in pattern constant is malformed.
    #[must_use]
    pub fn for_clang_or_gcc() -> Self {
        let mut to_zap = HashMap::new();
        for flag in SKIP_OPTIONS_WITH_ARGS {
            to_zap.insert(flag, OptionKind::OneArgument);
        }
        #[allow(clippy::expect_used)]
        let no_argument_matcher =
            Regex::new(SKIP_OPTIONS_NO_ARGS_PATTERN).expect("built-in pattern is well-formed");
        Self { to_zap, no_argument_matcher }
    }

    /// Remove recognized flags (and their arguments) in place.
    pub fn clean(&self, command_line: &mut Vec<String>) {
        let mut kept = Vec::with_capacity(command_line.len());
        let mut iter = command_line.drain(..).peekable();
        while let Some(arg) = iter.next() {
            if !arg.starts_with('-') {
                kept.push(arg);
                continue;
            }
            let flag = arg.split('=').next().unwrap_or(&arg);
            let has_inline_value = flag.len() < arg.len();
            let kind = if !has_inline_value && self.no_argument_matcher.is_match(&arg) {
                Some(OptionKind::NoArgument)
            } else {
                self.to_zap.get(flag).copied()
            };
            match kind {
                None => kept.push(arg),
                Some(OptionKind::NoArgument) => {}
                Some(OptionKind::OneArgument) => {
                    if !has_inline_value {
                        // Value is the next argument; drop it too.
                        iter.next();
                    }
                }
            }
        }
        drop(iter);
        *command_line = kept;
    }
}

// ---------------------------------------------------------------------------
// Database loading
// ---------------------------------------------------------------------------

/// Load a compilation database and yield its commands in file order, with
/// the command-line cleaner already applied.
///
/// The JSON array parser is an external collaborator as far as the pipeline
/// is concerned; this entry point hides it entirely.
///
/// # Errors
/// Returns a configuration error if the file is missing or malformed.
pub fn load(path: &Path) -> Result<Vec<CompileCommand>> {
    let bytes = fs::read(path).map_err(|e| {
        IndexerError::config("compilation database", path, format!("cannot read: {e}"))
    })?;
    let mut commands: Vec<CompileCommand> = serde_json::from_slice(&bytes).map_err(|e| {
        IndexerError::config("compilation database", path, format!("malformed JSON: {e}"))
    })?;
    let cleaner = CommandLineCleaner::for_clang_or_gcc();
    for command in &mut commands {
        cleaner.clean(&mut command.arguments);
    }
    Ok(commands)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
