//! Replay front-end: translation units from JSON fixtures.
//!
//! Loads a serialized [`TranslationUnit`] from `<main-file>.tu.json` next to
//! the source file named by the compile command. This powers the end-to-end
//! tests (the whole driver/worker pipeline runs against fixture trees) and
//! doubles as a debugging harness: a problematic TU captured from a real
//! front-end can be replayed through the pipeline in isolation.

use std::fs;
use std::path::PathBuf;

use crate::compdb::CompileCommand;
use crate::error::IndexerError;
use crate::frontend::{CompilerFrontend, TranslationUnit};

/// Suffix appended to a source path to find its fixture.
pub const FIXTURE_SUFFIX: &str = ".tu.json";

/// Front-end that replays pre-recorded translation units.
#[derive(Clone, Debug, Default)]
pub struct ReplayFrontend;

impl ReplayFrontend {
    /// Fixture path for a compile command's main file.
    #[must_use]
    pub fn fixture_path(command: &CompileCommand) -> PathBuf {
        PathBuf::from(format!("{}{FIXTURE_SUFFIX}", command.absolute_file()))
    }
}

impl CompilerFrontend for ReplayFrontend {
    fn parse(&self, command: &CompileCommand) -> Result<TranslationUnit, IndexerError> {
        let fixture = Self::fixture_path(command);
        let bytes = fs::read(&fixture).map_err(|e| IndexerError::Frontend {
            file: command.absolute_file(),
            detail: format!("cannot read fixture {}: {e}", fixture.display()),
        })?;
        let tu: TranslationUnit =
            serde_json::from_slice(&bytes).map_err(|e| IndexerError::Frontend {
                file: command.absolute_file(),
                detail: format!("malformed fixture {}: {e}", fixture.display()),
            })?;
        tu.validate().map_err(|detail| IndexerError::Frontend {
            file: command.absolute_file(),
            detail: format!("inconsistent fixture {}: {detail}", fixture.display()),
        })?;
        Ok(tu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{DeclId, DeclKind, DeclRecord, FileId, SourceFile};
    use crate::scip::FileRange;

    #[test]
    fn loads_fixture_next_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.cc");
        fs::write(&src, "// source\n").unwrap();

        let tu = TranslationUnit {
            main_file: FileId(0),
            files: vec![SourceFile { id: FileId(0), path: Some(src.display().to_string()) }],
            decls: vec![DeclRecord {
                id: DeclId(0),
                kind: DeclKind::Namespace,
                name: "a".to_owned(),
                file: FileId(0),
                range: FileRange::for_token(1, 11, 1),
                context: None,
                is_definition: true,
                documentation: Vec::new(),
                detail: crate::frontend::DeclDetail::Namespace { is_anonymous: false },
            }],
            ..TranslationUnit::default()
        };
        let fixture = PathBuf::from(format!("{}{FIXTURE_SUFFIX}", src.display()));
        fs::write(&fixture, serde_json::to_vec(&tu).unwrap()).unwrap();

        let command = CompileCommand {
            directory: dir.path().display().to_string(),
            file: "a.cc".to_owned(),
            arguments: vec!["cc".to_owned(), "-c".to_owned(), "a.cc".to_owned()],
            output: None,
        };
        let loaded = ReplayFrontend.parse(&command).unwrap();
        assert_eq!(loaded.decls.len(), 1);
        assert_eq!(loaded.decls[0].name, "a");
    }

    #[test]
    fn missing_fixture_is_a_frontend_error() {
        let command = CompileCommand {
            directory: "/nonexistent".to_owned(),
            file: "missing.cc".to_owned(),
            arguments: Vec::new(),
            output: None,
        };
        let err = ReplayFrontend.parse(&command).unwrap_err();
        assert!(matches!(err, IndexerError::Frontend { .. }));
    }
}
