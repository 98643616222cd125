//! Shared helpers for scip-cindex integration tests.
//!
//! All tests run against temp directories; no side effects outside them.
//! Each test builds a fixture project (sources + replay-front-end TU
//! fixtures + compile_commands.json) and drives the real binary, workers
//! and all, through `run_index`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

use cindex::frontend::{
    DeclDetail, DeclId, DeclKind, DeclRecord, FileId, FunctionKind, MacroDefSite, MacroOrigin,
    MacroSite, PpEvent, SourceFile, TranslationUnit,
};
use cindex::scip::{FileRange, Index};

// ---------------------------------------------------------------------------
// Project fixture
// ---------------------------------------------------------------------------

/// A throwaway project directory with sources, TU fixtures, and a compdb.
pub struct TestProject {
    _dir: TempDir,
    /// Canonicalized root, so fixture paths match what the driver sees as
    /// its working directory.
    root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let root = dir.path().canonicalize().expect("failed to canonicalize temp dir");
        Self { _dir: dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a project-relative file.
    pub fn abs(&self, rel: &str) -> String {
        self.root().join(rel).display().to_string()
    }

    /// Write a source file (content is irrelevant to the replay front-end
    /// but keeps the tree honest).
    pub fn write_source(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    /// Write the replay fixture for a main file.
    pub fn write_tu_fixture(&self, main_rel: &str, tu: &TranslationUnit) {
        let path = self.root().join(format!("{main_rel}.tu.json"));
        std::fs::write(path, serde_json::to_vec_pretty(tu).unwrap()).unwrap();
    }

    /// Write compile_commands.json for the given main files.
    pub fn write_compdb(&self, mains: &[&str]) {
        let entries: Vec<serde_json::Value> = mains
            .iter()
            .map(|rel| {
                serde_json::json!({
                    "directory": self.root().display().to_string(),
                    "file": rel,
                    "arguments": ["cc", "-c", rel],
                })
            })
            .collect();
        std::fs::write(
            self.root().join("compile_commands.json"),
            serde_json::to_vec_pretty(&entries).unwrap(),
        )
        .unwrap();
    }

    /// Run `scip-cindex index` in the project root with common flags plus
    /// `extra_args`, writing the output to `output_rel`.
    pub fn run_index(&self, output_rel: &str, extra_args: &[&str]) -> Output {
        self.run_index_with_env(output_rel, extra_args, &[])
    }

    pub fn run_index_with_env(
        &self,
        output_rel: &str,
        extra_args: &[&str],
        env: &[(&str, &str)],
    ) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_scip-cindex"));
        command
            .current_dir(self.root())
            .arg("index")
            .arg("--compdb")
            .arg("compile_commands.json")
            .arg("--output")
            .arg(output_rel)
            .arg("--temp-dir")
            .arg(format!("{output_rel}.shards"))
            .arg("--deterministic")
            .args(extra_args);
        for (key, value) in env {
            command.env(key, value);
        }
        command.output().expect("failed to run scip-cindex")
    }

    /// Read back a merged index.
    pub fn read_index(&self, output_rel: &str) -> Index {
        let bytes = std::fs::read(self.root().join(output_rel)).expect("index file exists");
        serde_json::from_slice(&bytes).expect("index parses")
    }

    pub fn index_bytes(&self, output_rel: &str) -> Vec<u8> {
        std::fs::read(self.root().join(output_rel)).expect("index file exists")
    }
}

// ---------------------------------------------------------------------------
// TU fixture builder
// ---------------------------------------------------------------------------

/// Small builder for translation-unit fixtures.
pub struct TuBuilder {
    tu: TranslationUnit,
    next_decl: u32,
}

impl TuBuilder {
    /// Start a TU whose main file (id 0) is `main_abs`.
    pub fn new(main_abs: &str) -> Self {
        let tu = TranslationUnit {
            main_file: FileId(0),
            files: vec![SourceFile { id: FileId(0), path: Some(main_abs.to_owned()) }],
            ..TranslationUnit::default()
        };
        Self { tu, next_decl: 0 }
    }

    pub fn file(mut self, id: u32, abs: &str) -> Self {
        self.tu.files.push(SourceFile { id: FileId(id), path: Some(abs.to_owned()) });
        self
    }

    pub fn enter(mut self, id: u32) -> Self {
        self.tu.pp_events.push(PpEvent::EnterFile { file: Some(FileId(id)) });
        self
    }

    pub fn exit(mut self, id: u32) -> Self {
        self.tu.pp_events.push(PpEvent::ExitFile { file: Some(FileId(id)) });
        self
    }

    pub fn define(mut self, file: u32, line: u32, name: &str, body: &str) -> Self {
        self.tu.pp_events.push(PpEvent::MacroDefined {
            name: name.to_owned(),
            body: body.to_owned(),
            def: MacroDefSite { origin: MacroOrigin::File(FileId(file)), line, col: 9 },
            site: Some(MacroSite {
                file: FileId(file),
                range: FileRange::for_token(line, 9, name.len() as u32),
            }),
        });
        self
    }

    pub fn undef(mut self, file: u32, line: u32, name: &str, def_line: u32) -> Self {
        self.tu.pp_events.push(PpEvent::MacroUndefined {
            name: name.to_owned(),
            site: Some(MacroSite {
                file: FileId(file),
                range: FileRange::for_token(line, 8, name.len() as u32),
            }),
            def: Some(MacroDefSite {
                origin: MacroOrigin::File(FileId(file)),
                line: def_line,
                col: 9,
            }),
        });
        self
    }

    /// Append a declaration record; returns (builder, decl id).
    pub fn decl(
        mut self,
        kind: DeclKind,
        name: &str,
        file: u32,
        line: u32,
        context: Option<u32>,
        is_definition: bool,
        detail: DeclDetail,
    ) -> (Self, u32) {
        let id = self.next_decl;
        self.next_decl += 1;
        self.tu.decls.push(DeclRecord {
            id: DeclId(id),
            kind,
            name: name.to_owned(),
            file: FileId(file),
            range: FileRange::for_token(line, 1, name.len().max(1) as u32),
            context: context.map(DeclId),
            is_definition,
            documentation: Vec::new(),
            detail,
        });
        (self, id)
    }

    /// A `DeclRef` expression referencing `target`.
    pub fn expr_ref(mut self, target: u32, file: u32, line: u32, col: u32, len: u32) -> Self {
        self.tu.exprs.push(cindex::frontend::ExprRecord {
            kind: cindex::frontend::ExprKind::DeclRef,
            target: DeclId(target),
            file: FileId(file),
            range: FileRange::for_token(line, col, len),
        });
        self
    }

    /// A `Record` type location referencing `target`.
    pub fn type_ref(mut self, target: u32, file: u32, line: u32, col: u32, len: u32) -> Self {
        self.tu.type_locs.push(cindex::frontend::TypeLocRecord {
            kind: cindex::frontend::TypeLocKind::Record,
            target: DeclId(target),
            file: FileId(file),
            range: FileRange::for_token(line, col, len),
        });
        self
    }

    /// A macro-expansion event (reference back to a definition site).
    pub fn expand(mut self, file: u32, line: u32, name: &str, def: MacroDefSite) -> Self {
        self.tu.pp_events.push(PpEvent::MacroExpanded {
            name: name.to_owned(),
            site: Some(MacroSite {
                file: FileId(file),
                range: FileRange::for_token(line, 1, name.len() as u32),
            }),
            def: Some(def),
        });
        self
    }

    pub fn build(self) -> TranslationUnit {
        self.tu
    }
}

/// Function detail with a canonical signature.
pub fn function_detail(signature: &str) -> DeclDetail {
    DeclDetail::Function {
        signature: signature.to_owned(),
        kind: FunctionKind::Plain,
        is_virtual: false,
        overrides: Vec::new(),
    }
}

/// Plain record (class/struct) detail.
pub fn record_detail() -> DeclDetail {
    DeclDetail::Record { is_anonymous: false, bases: Vec::new() }
}

/// Assert the run succeeded, with stderr in the failure message.
pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "scip-cindex failed (status {:?}):\n{}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
}
