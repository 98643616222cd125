//! Driver: schedules translation units across worker processes.
//!
//! The driver is single-threaded. It streams the compilation database into
//! a job queue, farms jobs out to N workers over the IPC queues, and
//! arbitrates header ownership so every distinct (path, hash) pair is
//! emitted by exactly one worker:
//!
//! - **Phase A** (SemanticAnalysis): the worker parses the TU and reports
//!   each preprocessed file with its content hash. For a pair never seen
//!   before, the driver records "this TU's emit job will emit it"; repeat
//!   reports are recorded as not-emit.
//! - **Phase B** (EmitIndex): the driver enqueues an emit job pinned to
//!   the same worker (which still holds the parsed TU), listing exactly
//!   the pairs it was chosen to emit.
//!
//! A worker that exceeds the per-job timeout is killed and respawned in
//! its slot; the in-flight job is requeued at the tail under a fresh id
//! (unpinned: the replacement holds no parse state, and the emit payload
//! carries the compile command precisely so any worker can take it).
//! Ownership entries pointing at a requeued emit job follow it to the new
//! id, preserving the exactly-one-emitter invariant.
//!
//! When the queues drain, the driver sends each worker the shutdown
//! sentinel, waits for the processes to exit, and merges the shards into
//! the final index. A drop guard kills any still-running children on
//! every exit path.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::compdb::{self, CompileCommand};
use crate::error::{IndexerError, Result};
use crate::hash::HashValue;
use crate::ipc::{
    EmitIndexJob, Job, JobId, JobRequest, JobResponse, JobResult, PreprocessedFileInfo,
    QueueSender, SemanticAnalysisJob, TypedReceiver, spawn_line_pump,
};
use crate::merge::{self, ShardPair};
use crate::packagemap::PackageMap;
use crate::path::AbsolutePath;
use crate::worker::TEST_EXIT_AFTER_ENV;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Driver configuration, straight from the CLI.
#[derive(Clone, Debug)]
pub struct DriverOptions {
    /// Worker count; must be non-zero.
    pub jobs: usize,
    /// Per-job wall-clock timeout.
    pub receive_timeout: Duration,
    pub compdb_path: PathBuf,
    pub package_map_path: Option<PathBuf>,
    pub output_path: PathBuf,
    /// Shard directory; a temp dir is created when absent.
    pub temp_dir: Option<PathBuf>,
    pub deterministic: bool,
    /// Regex forwarded to workers to arm hash-history recording.
    pub record_history_filter: String,
    /// Write per-TU timing statistics here.
    pub print_statistics: Option<PathBuf>,
    /// Log level forwarded to workers.
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Per-TU statistics
// ---------------------------------------------------------------------------

/// Timing record for one translation unit.
#[derive(Clone, Debug, Serialize)]
pub struct TuStatistics {
    pub path: String,
    pub planning_millis: u64,
    pub semantic_millis: u64,
    pub emit_millis: u64,
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum WorkerStatus {
    Free,
    Busy { started: Instant, job: JobId },
}

struct WorkerHandle {
    child: Child,
    sender: QueueSender<std::process::ChildStdin>,
    status: WorkerStatus,
}

struct JobEntry {
    job: Job,
    /// Absolute path of the TU's main file, for progress and shard order.
    tu_main: String,
    /// Preferred worker slot; emit jobs start pinned to the worker that
    /// parsed the TU.
    pinned_to: Option<usize>,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// The scheduler. One instance per indexing run.
pub struct Driver {
    options: DriverOptions,
    worker_exe: PathBuf,
    project_root: AbsolutePath,
    output_dir: PathBuf,
    /// Owns the shard directory when the user did not name one; removed on
    /// drop, covering every exit path.
    _temp_guard: Option<tempfile::TempDir>,

    workers: Vec<WorkerHandle>,
    available: VecDeque<usize>,
    response_tx: Sender<String>,
    responses: TypedReceiver,

    next_job_id: u64,
    jobs: HashMap<JobId, JobEntry>,
    pending: VecDeque<JobId>,
    wip: HashSet<JobId>,

    /// (path, hash) → the emit job chosen to emit that content.
    ownership: HashMap<AbsolutePath, HashMap<HashValue, JobId>>,
    /// Completed emit jobs, with the TU path for stable merge ordering.
    shards: Vec<(String, ShardPair)>,
    statistics: Vec<TuStatistics>,

    total_tus: usize,
    completed_tus: usize,
}

impl Driver {
    /// Validate configuration and construct the scheduler. Fails fast on
    /// configuration errors, before any worker is spawned.
    ///
    /// # Errors
    /// Configuration problems: zero workers, unreadable inputs.
    pub fn new(options: DriverOptions) -> Result<Self> {
        if options.jobs == 0 {
            return Err(IndexerError::Config {
                input: "worker count",
                path: None,
                detail: "at least one worker is required".to_owned(),
            });
        }
        let cwd = std::env::current_dir().map_err(|e| IndexerError::io(".", e))?;
        let project_root = AbsolutePath::new(&cwd.to_string_lossy())?;
        // Surface package-map problems now; workers load it themselves.
        if let Some(path) = &options.package_map_path {
            PackageMap::load(path, &project_root)?;
        }
        let (output_dir, temp_guard) = match &options.temp_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|e| IndexerError::io(dir, e))?;
                (dir.clone(), None)
            }
            None => {
                let guard = tempfile::Builder::new()
                    .prefix("scip-cindex-")
                    .tempdir()
                    .map_err(|e| IndexerError::io("<temp>", e))?;
                (guard.path().to_path_buf(), Some(guard))
            }
        };
        let worker_exe = std::env::current_exe().map_err(|e| IndexerError::io("<exe>", e))?;
        let (response_tx, response_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            options,
            worker_exe,
            project_root,
            output_dir,
            _temp_guard: temp_guard,
            workers: Vec::new(),
            available: VecDeque::new(),
            response_tx,
            responses: TypedReceiver::new(response_rx),
            next_job_id: 1,
            jobs: HashMap::new(),
            pending: VecDeque::new(),
            wip: HashSet::new(),
            ownership: HashMap::new(),
            shards: Vec::new(),
            statistics: Vec::new(),
            total_tus: 0,
            completed_tus: 0,
        })
    }

    /// Run the whole pipeline: load the compdb, spawn workers, schedule
    /// both phases for every TU, shut down, merge.
    ///
    /// # Errors
    /// Configuration and fatal IPC errors; per-job failures are recovered
    /// internally.
    pub fn run(mut self) -> Result<()> {
        let commands = compdb::load(&self.options.compdb_path)?;
        self.total_tus = commands.len();
        info!(tus = self.total_tus, jobs = self.options.jobs, "starting indexing");

        self.spawn_workers()?;
        for command in commands {
            self.queue_semantic_job(command);
        }
        self.run_jobs_to_completion();
        self.shutdown_workers();
        self.merge_and_write()
    }

    // --- Spawning ---------------------------------------------------------

    fn spawn_workers(&mut self) -> Result<()> {
        for slot in 0..self.options.jobs {
            let handle = self.spawn_worker(slot, false)?;
            self.workers.push(handle);
            self.available.push_back(slot);
        }
        Ok(())
    }

    fn spawn_worker(&self, slot: usize, is_respawn: bool) -> Result<WorkerHandle> {
        let mut command = Command::new(&self.worker_exe);
        command
            .arg("worker")
            .arg("--driver-id")
            .arg(std::process::id().to_string())
            .arg("--worker-id")
            .arg(slot.to_string())
            .arg("--receive-timeout-seconds")
            .arg(self.worker_receive_timeout().as_secs().to_string())
            .arg("--project-root")
            .arg(self.project_root.as_str())
            .arg("--log-level")
            .arg(&self.options.log_level)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(path) = &self.options.package_map_path {
            command.arg("--package-map").arg(path);
        }
        if self.options.deterministic {
            command.arg("--deterministic");
        }
        if is_respawn {
            // Replacement workers must not re-trigger injected crashes.
            command.env_remove(TEST_EXIT_AFTER_ENV);
        }
        let mut child = command
            .spawn()
            .map_err(|e| IndexerError::io(&self.worker_exe, e))?;
        let stdin = child.stdin.take().ok_or_else(|| IndexerError::Config {
            input: "worker process",
            path: None,
            detail: "worker stdin not captured".to_owned(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| IndexerError::Config {
            input: "worker process",
            path: None,
            detail: "worker stdout not captured".to_owned(),
        })?;
        spawn_line_pump(BufReader::new(stdout), self.response_tx.clone());
        info!(slot, pid = child.id(), respawn = is_respawn, "worker running");
        Ok(WorkerHandle {
            child,
            sender: QueueSender::new(stdin),
            status: WorkerStatus::Free,
        })
    }

    /// Workers wait considerably longer than the driver's per-job timeout
    /// before concluding the driver is gone.
    fn worker_receive_timeout(&self) -> Duration {
        self.options.receive_timeout * 10 + Duration::from_secs(30)
    }

    // --- Queueing ---------------------------------------------------------

    fn allocate_job_id(&mut self) -> JobId {
        let id = JobId(self.next_job_id);
        self.next_job_id += 1;
        id
    }

    fn queue_semantic_job(&mut self, command: CompileCommand) {
        let tu_main = command.absolute_file();
        let job = Job::SemanticAnalysis(SemanticAnalysisJob {
            command,
            record_history_filter: self.options.record_history_filter.clone(),
        });
        let id = self.allocate_job_id();
        self.jobs.insert(id, JobEntry { job, tu_main, pinned_to: None });
        self.pending.push_back(id);
    }

    /// Requeue at the tail under a fresh id, so other work makes progress
    /// first. Ownership entries follow an emit job to its new id.
    fn requeue_job(&mut self, old_id: JobId) {
        self.wip.remove(&old_id);
        let Some(mut entry) = self.jobs.remove(&old_id) else { return };
        entry.pinned_to = None;
        let new_id = self.allocate_job_id();
        if matches!(entry.job, Job::EmitIndex(_)) {
            for per_path in self.ownership.values_mut() {
                for assignee in per_path.values_mut() {
                    if *assignee == old_id {
                        *assignee = new_id;
                    }
                }
            }
        }
        warn!(old = %old_id, new = %new_id, tu = entry.tu_main, "requeueing job");
        self.jobs.insert(new_id, entry);
        self.pending.push_back(new_id);
    }

    // --- Main loop --------------------------------------------------------

    fn run_jobs_to_completion(&mut self) {
        while !self.pending.is_empty() || !self.wip.is_empty() {
            if !self.pending.is_empty() && !self.available.is_empty() {
                self.assign_jobs_to_available_workers();
            }
            self.process_one_response();
        }
    }

    fn assign_jobs_to_available_workers(&mut self) {
        // Front-of-deque workers are the warmest; each one takes the first
        // pending job it is allowed to run (its own pinned jobs, or any
        // unpinned job).
        let slots: Vec<usize> = self.available.iter().copied().collect();
        for slot in slots {
            if self.pending.is_empty() {
                break;
            }
            // A worker's own pinned emit jobs come first: it still holds
            // the parsed TU from phase A.
            let pinned = self.pending.iter().position(|id| {
                self.jobs.get(id).is_some_and(|entry| entry.pinned_to == Some(slot))
            });
            let Some(position) = pinned.or_else(|| {
                self.pending.iter().position(|id| {
                    self.jobs.get(id).is_some_and(|entry| entry.pinned_to.is_none())
                })
            }) else {
                continue;
            };
            if let Some(ix) = self.available.iter().position(|&s| s == slot) {
                self.available.remove(ix);
            }
            let Some(job_id) = self.pending.remove(position) else { continue };
            self.assign_job_to_worker(slot, job_id);
        }
    }

    fn assign_job_to_worker(&mut self, slot: usize, job_id: JobId) {
        let Some(entry) = self.jobs.get(&job_id) else { return };
        debug!(job = %job_id, slot, tu = entry.tu_main, "assigning job");
        let request = JobRequest { id: job_id, job: Some(entry.job.clone()) };
        self.wip.insert(job_id);
        self.workers[slot].status =
            WorkerStatus::Busy { started: Instant::now(), job: job_id };
        if let Err(e) = self.workers[slot].sender.send(&request) {
            warn!(slot, error = %e, "send to worker failed; respawning");
            self.replace_worker(slot);
            self.requeue_job(job_id);
            self.workers[slot].status = WorkerStatus::Free;
            self.available.push_back(slot);
        }
    }

    fn process_one_response(&mut self) {
        // Strictly longer than the per-job timeout: if nothing arrived in
        // this window, every busy worker is overdue.
        let wait = self.options.receive_timeout + Duration::from_secs(1);
        match self.responses.recv_timeout::<JobResponse>(wait) {
            Ok(response) => self.handle_response(response),
            Err(IndexerError::IpcTimeout | IndexerError::IpcDisconnected) => {
                if let Some(deadline) = Instant::now().checked_sub(self.options.receive_timeout) {
                    self.kill_overdue_workers(deadline);
                }
            }
            Err(e) => {
                error!(error = %e, "received malformed message");
            }
        }
    }

    fn kill_overdue_workers(&mut self, started_before: Instant) {
        for slot in 0..self.workers.len() {
            let WorkerStatus::Busy { started, job } = self.workers[slot].status else {
                continue;
            };
            if started >= started_before {
                continue;
            }
            warn!(slot, job = %job, "worker exceeded the job timeout; killing");
            self.replace_worker(slot);
            self.requeue_job(job);
            self.workers[slot].status = WorkerStatus::Free;
            self.available.push_back(slot);
        }
    }

    fn replace_worker(&mut self, slot: usize) {
        if let Err(e) = self.workers[slot].child.kill() {
            debug!(slot, error = %e, "kill failed (already exited?)");
        }
        let _ = self.workers[slot].child.wait();
        match self.spawn_worker(slot, true) {
            Ok(handle) => self.workers[slot] = handle,
            Err(e) => {
                // Leave the dead handle in place; assignment to it will
                // fail and trigger another respawn attempt.
                error!(slot, error = %e, "failed to respawn worker");
            }
        }
    }

    fn handle_response(&mut self, response: JobResponse) {
        let slot = response.worker_id as usize;
        if !self.wip.remove(&response.job_id) {
            debug!(job = %response.job_id, "stale response for unknown job; ignoring");
            return;
        }
        if slot < self.workers.len() {
            if let WorkerStatus::Busy { job, .. } = self.workers[slot].status
                && job == response.job_id
            {
                self.workers[slot].status = WorkerStatus::Free;
                // Prefer warm workers for the next assignment.
                self.available.push_front(slot);
            }
        }
        let Some(entry) = self.jobs.remove(&response.job_id) else { return };
        match response.result {
            JobResult::SemanticAnalysis(result) => {
                let planning = Instant::now();
                let headers = self.merge_ownership(&result, response.job_id);
                self.queue_emit_job(&entry, slot, headers, planning.elapsed());
            }
            JobResult::EmitIndex(result) => {
                self.completed_tus += 1;
                info!("[{}/{}] {}", self.completed_tus, self.total_tus, entry.tu_main);
                self.shards.push((entry.tu_main.clone(), ShardPair {
                    index: PathBuf::from(&result.shard_path),
                    forward_decls: PathBuf::from(&result.forward_decl_path),
                }));
                if let Some(stats) = self
                    .statistics
                    .iter_mut()
                    .find(|s| s.path == entry.tu_main && s.emit_millis == 0)
                {
                    stats.semantic_millis = result.stats.semantic_millis;
                    stats.emit_millis = result.stats.emit_millis.max(1);
                }
            }
        }
    }

    /// Phase A bookkeeping: first reporter of a (path, hash) pair gets the
    /// emit assignment. Returns the pairs assigned to this TU's emit job.
    ///
    /// The assignment is keyed by the not-yet-allocated emit job; the
    /// caller allocates it immediately after, so a placeholder id of the
    /// semantic job is remapped there.
    fn merge_ownership(
        &mut self,
        result: &crate::ipc::SemanticAnalysisResult,
        placeholder: JobId,
    ) -> Vec<PreprocessedFileInfo> {
        let mut assigned = Vec::new();
        let mut consider = |ownership: &mut HashMap<AbsolutePath, HashMap<HashValue, JobId>>,
                            path: &AbsolutePath,
                            hash: HashValue| {
            let per_path = ownership.entry(path.clone()).or_default();
            if !per_path.contains_key(&hash) {
                per_path.insert(hash, placeholder);
                assigned.push(PreprocessedFileInfo { path: path.clone(), hash });
            }
        };
        for info in &result.well_behaved {
            consider(&mut self.ownership, &info.path, info.hash);
        }
        for info in &result.ill_behaved {
            for &hash in &info.hashes {
                consider(&mut self.ownership, &info.path, hash);
            }
        }
        assigned
    }

    fn queue_emit_job(
        &mut self,
        semantic_entry: &JobEntry,
        slot: usize,
        headers: Vec<PreprocessedFileInfo>,
        planning: Duration,
    ) {
        let Job::SemanticAnalysis(semantic) = &semantic_entry.job else {
            error!(tu = semantic_entry.tu_main, "emit follow-up for a non-semantic job");
            return;
        };
        let emit_id = self.allocate_job_id();
        // Re-key the assignments recorded under the semantic job's id.
        // (merge_ownership used it as a placeholder.)
        for info in &headers {
            if let Some(per_path) = self.ownership.get_mut(&info.path) {
                per_path.insert(info.hash, emit_id);
            }
        }
        let job = Job::EmitIndex(EmitIndexJob {
            command: semantic.command.clone(),
            headers,
            output_dir: self.output_dir.display().to_string(),
        });
        self.statistics.push(TuStatistics {
            path: semantic_entry.tu_main.clone(),
            planning_millis: planning.as_millis() as u64,
            semantic_millis: 0,
            emit_millis: 0,
        });
        self.jobs.insert(emit_id, JobEntry {
            job,
            tu_main: semantic_entry.tu_main.clone(),
            pinned_to: Some(slot),
        });
        self.pending.push_back(emit_id);
    }

    // --- Shutdown and merge -----------------------------------------------

    fn shutdown_workers(&mut self) {
        debug_assert!(self.pending.is_empty() && self.wip.is_empty());
        for slot in 0..self.workers.len() {
            if let Err(e) = self.workers[slot].sender.send(&JobRequest::shutdown()) {
                debug!(slot, error = %e, "shutdown send failed (worker already gone)");
            }
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        for slot in 0..self.workers.len() {
            loop {
                match self.workers[slot].child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() < deadline => {
                        std::thread::sleep(Duration::from_millis(20));
                    }
                    Ok(None) => {
                        warn!(slot, "worker ignored shutdown; killing");
                        let _ = self.workers[slot].child.kill();
                        let _ = self.workers[slot].child.wait();
                        break;
                    }
                    Err(e) => {
                        debug!(slot, error = %e, "wait failed");
                        break;
                    }
                }
            }
        }
    }

    /// Relative paths the scheduler decided to have emitted by more than
    /// one worker: ill-behaved files, one emitter per content variant.
    fn multiply_indexed_paths(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        for (path, per_path) in &self.ownership {
            if per_path.len() < 2 {
                continue;
            }
            if let Some(rel) = self.project_root.make_relative(path) {
                out.insert(rel.to_owned());
            }
        }
        out
    }

    fn merge_and_write(mut self) -> Result<()> {
        // Stable ingestion order: by TU path, not completion order, so
        // crash-recovery reruns merge identically.
        self.shards.sort_by(|a, b| a.0.cmp(&b.0));
        let pairs: Vec<ShardPair> = self.shards.iter().map(|(_, p)| p.clone()).collect();
        let multiply = self.multiply_indexed_paths();

        let file = fs::File::create(&self.options.output_path)
            .map_err(|e| IndexerError::io(&self.options.output_path, e))?;
        let mut out = BufWriter::new(file);
        let stats = merge::merge_shards(&pairs, &multiply, self.options.deterministic, &mut out)?;
        info!(
            documents = stats.documents,
            external_symbols = stats.external_symbols,
            output = %self.options.output_path.display(),
            "index written"
        );

        if let Some(path) = self.options.print_statistics.clone() {
            crate::scip::write_artifact(&path, &self.statistics)?;
        }
        Ok(())
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        // Cover every exit path: no orphan workers, even on errors.
        for worker in &mut self.workers {
            if worker.child.try_wait().ok().flatten().is_none() {
                let _ = worker.child.kill();
                let _ = worker.child.wait();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
