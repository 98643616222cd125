//! Unified error type for the indexing pipeline.
//!
//! Defines [`IndexerError`], the error type shared by the library modules.
//! Each variant is self-contained: the message identifies what went wrong and
//! carries enough context (paths, the offending value) to act on it without a
//! debugger. The binary layer wraps these in `anyhow` with additional CLI
//! context.

use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// IndexerError
// ---------------------------------------------------------------------------

/// Unified error type for indexing operations.
#[derive(Debug)]
pub enum IndexerError {
    /// A startup input (compilation database, package map) is missing or
    /// malformed. Always fatal; reported before any worker is spawned.
    Config {
        /// Which input was bad.
        input: &'static str,
        /// Path to the offending file, when there is one.
        path: Option<PathBuf>,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// A path value failed validation (not absolute, empty, etc.).
    InvalidPath {
        /// The offending path string.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No message arrived on an IPC queue within the configured wait.
    IpcTimeout,

    /// A message arrived but could not be decoded. The message is consumed;
    /// recovery relies on the peer's timeout.
    IpcDecode(serde_json::Error),

    /// The peer end of an IPC queue hung up (process exit or crash).
    IpcDisconnected,

    /// The front-end could not produce a translation unit for a compile
    /// command.
    Frontend {
        /// Main file of the translation unit.
        file: String,
        /// Description of the failure.
        detail: String,
    },

    /// An I/O error, annotated with the path being accessed.
    Io {
        /// Path the operation was touching.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// JSON (de)serialization failed outside the IPC layer.
    Serde(serde_json::Error),
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { input, path, detail } => match path {
                Some(p) => write!(f, "invalid {input} at {}: {detail}", p.display()),
                None => write!(f, "invalid {input}: {detail}"),
            },
            Self::InvalidPath { value, reason } => {
                write!(f, "invalid path '{value}': {reason}")
            }
            Self::IpcTimeout => write!(f, "timeout when receiving from queue"),
            Self::IpcDecode(e) => write!(f, "malformed IPC message: {e}"),
            Self::IpcDisconnected => write!(f, "IPC peer disconnected"),
            Self::Frontend { file, detail } => {
                write!(f, "front-end failed for '{file}': {detail}")
            }
            Self::Io { path, source } => {
                write!(f, "I/O error at {}: {source}", path.display())
            }
            Self::Serde(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl std::error::Error for IndexerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IpcDecode(e) | Self::Serde(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl IndexerError {
    /// Attach a path to a raw I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Shorthand for a configuration error with a file path.
    pub fn config(
        input: &'static str,
        path: impl Into<PathBuf>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Config { input, path: Some(path.into()), detail: detail.into() }
    }

    /// Returns `true` for errors that should terminate the run with the
    /// configuration exit code instead of the generic failure code.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e)
    }
}

/// Convenience alias used throughout the library modules.
pub type Result<T, E = IndexerError> = std::result::Result<T, E>;
