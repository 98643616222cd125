//! Worker process: the request loop driving per-TU indexing.
//!
//! A worker is spawned by the driver with a slot id, reads [`JobRequest`]s
//! from stdin, and writes [`JobResponse`]s to stdout. Each translation
//! unit goes through the two-phase protocol:
//!
//! 1. **SemanticAnalysis**: parse the TU through the front-end, run the
//!    preprocessor transcript hasher, and report every (path, hash) pair
//!    observed, partitioned into well-behaved and ill-behaved files. The
//!    parsed TU and its transcript output are kept for phase 2.
//! 2. **EmitIndex**: re-use the loaded TU (re-parsing when the cache
//!    does not match, e.g. on a respawned worker), run the AST indexer
//!    restricted to the main file plus the headers this worker was chosen
//!    to emit, and write a shard pair into the driver's temp directory.
//!
//! Errors never escape the loop: a failed job is logged and answered with
//! an empty result; the driver cannot distinguish "worker produced empty
//! output" from "worker failed", by design. The loop exits on the
//! shutdown sentinel or when no request arrives within the receive
//! timeout (a dead driver must not leave orphan workers behind).

use std::collections::HashSet;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::compdb::CompileCommand;
use crate::error::{IndexerError, Result};
use crate::filemap::FileMetadataMap;
use crate::frontend::{CompilerFrontend, FileId, TranslationUnit, replay::ReplayFrontend};
use crate::indexer::TuIndexer;
use crate::ipc::{
    EmitIndexJob, EmitIndexResult, EmitStats, Job, JobRequest, JobResponse, JobResult,
    PreprocessedFileInfo, PreprocessedFileInfoMulti, QueueSender, SemanticAnalysisJob,
    SemanticAnalysisResult, TypedReceiver, WorkerId, spawn_line_pump,
};
use crate::packagemap::PackageMap;
use crate::path::AbsolutePath;
use crate::pp::{HeaderFilter, PpOptions, PpOutput, TranscriptHasher};
use crate::scip::{ForwardDeclIndex, Index, write_artifact};

/// Test-only injection point: exit when the N-th job request arrives,
/// before handling it. Lets the crash-recovery path be exercised without a
/// real segfault.
pub const TEST_EXIT_AFTER_ENV: &str = "CINDEX_TEST_EXIT_AFTER";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Everything a worker learns from its command line.
#[derive(Clone, Debug)]
pub struct WorkerOptions {
    pub worker_id: WorkerId,
    /// Exit if no request arrives for this long.
    pub receive_timeout: Duration,
    pub deterministic: bool,
    pub project_root: AbsolutePath,
    pub package_map_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct LoadedTu {
    command: CompileCommand,
    tu: TranslationUnit,
    pp: PpOutput,
    semantic_millis: u64,
}

/// Run the worker request loop until shutdown. The returned value is the
/// process exit code.
///
/// # Errors
/// Only configuration problems (an unreadable package map) error out;
/// everything job-related is handled inside the loop.
pub fn run(options: &WorkerOptions) -> Result<()> {
    let package_map = match &options.package_map_path {
        Some(path) => PackageMap::load(path, &options.project_root)?,
        None => PackageMap::empty(),
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let _pump = spawn_line_pump(BufReader::new(std::io::stdin()), tx);
    let receiver = TypedReceiver::new(rx);
    let mut sender = QueueSender::new(std::io::stdout());

    let exit_after: Option<u64> =
        std::env::var(TEST_EXIT_AFTER_ENV).ok().and_then(|v| v.parse().ok());
    let mut received: u64 = 0;

    let mut loaded: Option<LoadedTu> = None;

    info!(worker_id = options.worker_id, "worker ready");
    loop {
        let request: JobRequest = match receiver.recv_timeout(options.receive_timeout) {
            Ok(request) => request,
            Err(IndexerError::IpcTimeout) => {
                error!("no request within the timeout; is the driver dead? shutting down");
                break;
            }
            Err(IndexerError::IpcDisconnected) => {
                debug!("driver closed the request queue; shutting down");
                break;
            }
            Err(e) => {
                error!(error = %e, "received malformed message");
                continue;
            }
        };
        let job_id = request.id;
        if job_id.is_shutdown() {
            debug!("shutting down");
            break;
        }
        received += 1;
        if exit_after == Some(received) {
            // Simulated crash for recovery tests: no response, no cleanup.
            std::process::exit(101);
        }
        let Some(job) = request.job else {
            warn!(job_id = %job_id, "request with no job payload; ignoring");
            continue;
        };

        let result = match job {
            Job::SemanticAnalysis(job) => {
                let (result, new_loaded) = semantic_analysis(options, job);
                loaded = new_loaded;
                JobResult::SemanticAnalysis(result)
            }
            Job::EmitIndex(job) => {
                JobResult::EmitIndex(emit_index(options, &package_map, &mut loaded, job_id, job))
            }
        };
        let response = JobResponse { worker_id: options.worker_id, job_id, result };
        if let Err(e) = sender.send(&response) {
            error!(error = %e, "failed to send response; shutting down");
            break;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Phase A: semantic analysis
// ---------------------------------------------------------------------------

fn semantic_analysis(
    options: &WorkerOptions,
    job: SemanticAnalysisJob,
) -> (SemanticAnalysisResult, Option<LoadedTu>) {
    let started = Instant::now();
    let loaded = match load_tu(options, &job.command, &job.record_history_filter) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(file = job.command.file, error = %e, "semantic analysis failed");
            return (SemanticAnalysisResult::default(), None);
        }
    };
    let result = SemanticAnalysisResult {
        well_behaved: loaded
            .pp
            .well_behaved
            .iter()
            .map(|(path, hash)| PreprocessedFileInfo { path: path.clone(), hash: *hash })
            .collect(),
        ill_behaved: loaded
            .pp
            .ill_behaved
            .iter()
            .map(|(path, hashes)| PreprocessedFileInfoMulti {
                path: path.clone(),
                hashes: hashes.clone(),
            })
            .collect(),
    };
    debug!(
        file = loaded.command.file,
        well = result.well_behaved.len(),
        ill = result.ill_behaved.len(),
        millis = started.elapsed().as_millis() as u64,
        "semantic analysis complete"
    );
    (result, Some(loaded))
}

fn load_tu(
    options: &WorkerOptions,
    command: &CompileCommand,
    history_filter: &str,
) -> Result<LoadedTu> {
    let started = Instant::now();
    let tu = ReplayFrontend.parse(command)?;
    let pp_options = PpOptions {
        deterministic: options.deterministic,
        filter: HeaderFilter::new(history_filter)?,
    };
    let pp = TranscriptHasher::new(pp_options).run(&tu);
    Ok(LoadedTu {
        command: command.clone(),
        tu,
        pp,
        semantic_millis: started.elapsed().as_millis() as u64,
    })
}

// ---------------------------------------------------------------------------
// Phase B: emit index
// ---------------------------------------------------------------------------

fn emit_index(
    options: &WorkerOptions,
    package_map: &PackageMap,
    loaded: &mut Option<LoadedTu>,
    job_id: crate::ipc::JobId,
    job: EmitIndexJob,
) -> EmitIndexResult {
    let started = Instant::now();
    let output_dir = PathBuf::from(&job.output_dir);

    // Reuse the TU from phase A when it matches; a respawned worker (or a
    // rescheduled job) holds no state and re-parses.
    let reuse = loaded.as_ref().is_some_and(|l| l.command == job.command);
    if !reuse {
        debug!(file = job.command.file, "no cached TU for emit job; re-parsing");
        *loaded = load_tu(options, &job.command, "").map_or_else(
            |e| {
                error!(file = job.command.file, error = %e, "emit-phase parse failed");
                None
            },
            Some,
        );
    }
    let Some(current) = loaded.as_ref() else {
        return write_empty_shard(options, job_id, &output_dir);
    };

    let mut files = FileMetadataMap::new(
        options.project_root.clone(),
        build_root_of(&current.command),
        package_map.clone(),
    );
    if let Err(e) = files.populate(&current.pp.lookup) {
        error!(error = %e, "file classification failed");
        return write_empty_shard(options, job_id, &output_dir);
    }

    // The emit set: the TU's main file plus exactly the headers this
    // worker was chosen to emit.
    let mut emit_set: HashSet<FileId> = HashSet::new();
    emit_set.insert(current.tu.main_file);
    for header in &job.headers {
        match current.pp.lookup.lookup(&header.path, header.hash) {
            Some(id) => {
                emit_set.insert(id);
            }
            None => warn!(
                path = %header.path,
                hash = %header.hash,
                "assigned header not observed in this parse; skipping"
            ),
        }
    }

    let output =
        TuIndexer::new(&current.tu, &files, emit_set, options.deterministic).index(&current.pp.macros);

    let shard = Index { documents: output.documents, external_symbols: output.external_symbols };
    let forward = ForwardDeclIndex { forward_decls: output.forward_decls };

    let shard_path = shard_file(&output_dir, options.worker_id, job_id.0, "index");
    let forward_path = shard_file(&output_dir, options.worker_id, job_id.0, "fwd");
    if let Err(e) =
        write_artifact(&shard_path, &shard).and_then(|()| write_artifact(&forward_path, &forward))
    {
        error!(error = %e, "failed to write shard");
        return write_empty_shard(options, job_id, &output_dir);
    }

    write_histories(options, job_id, &output_dir, &current.pp);

    EmitIndexResult {
        shard_path: shard_path.display().to_string(),
        forward_decl_path: forward_path.display().to_string(),
        stats: EmitStats {
            semantic_millis: current.semantic_millis,
            emit_millis: started.elapsed().as_millis() as u64,
        },
    }
}

/// The build root: where the compiler ran, which is where generated files
/// live.
fn build_root_of(command: &CompileCommand) -> AbsolutePath {
    AbsolutePath::new(&command.directory)
        .unwrap_or_else(|_| AbsolutePath::new("/").unwrap_or_else(|_| unreachable!()))
}

fn shard_file(dir: &Path, worker: WorkerId, job: u64, kind: &str) -> PathBuf {
    dir.join(format!("shard-w{worker}-j{job}.{kind}.json"))
}

/// A failed emit still answers with a readable (empty) shard pair, keeping
/// "worker failed" and "worker produced nothing" indistinguishable.
fn write_empty_shard(
    options: &WorkerOptions,
    job_id: crate::ipc::JobId,
    output_dir: &Path,
) -> EmitIndexResult {
    let shard_path = shard_file(output_dir, options.worker_id, job_id.0, "index");
    let forward_path = shard_file(output_dir, options.worker_id, job_id.0, "fwd");
    if let Err(e) = write_artifact(&shard_path, &Index::default())
        .and_then(|()| write_artifact(&forward_path, &ForwardDeclIndex::default()))
    {
        error!(error = %e, "failed to write empty shard");
    }
    EmitIndexResult {
        shard_path: shard_path.display().to_string(),
        forward_decl_path: forward_path.display().to_string(),
        stats: EmitStats::default(),
    }
}

/// Dump recorded hash histories as one YAML document per file.
fn write_histories(
    options: &WorkerOptions,
    job_id: crate::ipc::JobId,
    output_dir: &Path,
    pp: &PpOutput,
) {
    if pp.histories.is_empty() {
        return;
    }
    let path = output_dir.join(format!(
        "pp-history-w{}-j{}.yaml",
        options.worker_id, job_id.0
    ));
    let mut body = String::new();
    for history in &pp.histories {
        match serde_yaml::to_string(history) {
            Ok(doc) => {
                body.push_str("---\n");
                body.push_str(&doc);
            }
            Err(e) => warn!(error = %e, "failed to serialize hash history"),
        }
    }
    if let Err(e) = std::fs::write(&path, body) {
        warn!(path = %path.display(), error = %e, "failed to write hash history");
    }
}
