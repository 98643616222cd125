//! Driver ↔ worker IPC: typed messages over bounded, timed queues.
//!
//! Transport: each worker's stdin is the driver→worker queue; one shared
//! channel, fed by a line-pump thread per worker draining the child's
//! stdout, is the worker→driver queue. Framing is one JSON object per
//! line. Messages are expected to fit the 1 MiB slot budget; oversized
//! ones are logged and still sent.
//!
//! The receive API is a typed one-shot: [`TypedReceiver::recv_timeout`]
//! both waits and parses, and a decode failure consumes the message; the
//! caller logs and moves on, relying on the peer's timeout for recovery.
//!
//! FIFO ordering holds between any single worker and the driver; nothing
//! is guaranteed (or needed) across workers.

use std::io::{BufRead, Write};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::compdb::CompileCommand;
use crate::error::{IndexerError, Result};
use crate::hash::HashValue;
use crate::path::AbsolutePath;

/// Slot-size budget for a single message.
pub const IPC_BUFFER_MAX_SIZE: usize = 1024 * 1024;

/// Worker slot number; stable across respawns of the same slot.
pub type WorkerId = u64;

// ---------------------------------------------------------------------------
// Job identifiers
// ---------------------------------------------------------------------------

/// Monotonically assigned job id. `u64::MAX` is the shutdown sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// The reserved shutdown sentinel.
    pub const SHUTDOWN: Self = Self(u64::MAX);

    #[must_use]
    pub fn is_shutdown(self) -> bool {
        self == Self::SHUTDOWN
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_shutdown() { write!(f, "shutdown") } else { write!(f, "{}", self.0) }
    }
}

// ---------------------------------------------------------------------------
// Message schema
// ---------------------------------------------------------------------------

/// One (path, hash) pair reported by semantic analysis.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PreprocessedFileInfo {
    pub path: AbsolutePath,
    pub hash: HashValue,
}

/// An ill-behaved file: one path, several observed content hashes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PreprocessedFileInfoMulti {
    pub path: AbsolutePath,
    pub hashes: Vec<HashValue>,
}

/// Phase A payload: parse the TU, hash the preprocessor transcript.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticAnalysisJob {
    pub command: CompileCommand,
    /// Regex arming hash-history recording; empty matches nothing.
    #[serde(default)]
    pub record_history_filter: String,
}

/// Phase B payload: re-traverse the TU, emit exactly these headers.
///
/// Carries the compile command so a respawned worker (which holds no state
/// from phase A) can re-parse.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmitIndexJob {
    pub command: CompileCommand,
    /// The (path, hash) pairs this worker is the chosen emitter for.
    pub headers: Vec<PreprocessedFileInfo>,
    /// Directory to write the shard into.
    pub output_dir: String,
}

/// A unit of work sent driver → worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details")]
pub enum Job {
    SemanticAnalysis(SemanticAnalysisJob),
    EmitIndex(EmitIndexJob),
}

/// Request envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: JobId,
    pub job: Option<Job>,
}

impl JobRequest {
    /// The shutdown sentinel request.
    #[must_use]
    pub fn shutdown() -> Self {
        Self { id: JobId::SHUTDOWN, job: None }
    }
}

/// Phase A result: well/ill-behaved partition of everything preprocessed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SemanticAnalysisResult {
    pub well_behaved: Vec<PreprocessedFileInfo>,
    pub ill_behaved: Vec<PreprocessedFileInfoMulti>,
}

/// Timing figures a worker reports with its shard.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EmitStats {
    pub semantic_millis: u64,
    pub emit_millis: u64,
}

/// Phase B result: where the shard landed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmitIndexResult {
    pub shard_path: String,
    pub forward_decl_path: String,
    #[serde(default)]
    pub stats: EmitStats,
}

/// A completed job, worker → driver.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details")]
pub enum JobResult {
    SemanticAnalysis(SemanticAnalysisResult),
    EmitIndex(EmitIndexResult),
}

/// Response envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub worker_id: WorkerId,
    pub job_id: JobId,
    pub result: JobResult,
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

/// Blocking, line-framed JSON sender over any writer.
pub struct QueueSender<W: Write> {
    writer: W,
}

impl<W: Write> QueueSender<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize and send one message, newline-framed, flushed.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails (a closed pipe
    /// surfaces as [`IndexerError::IpcDisconnected`]).
    pub fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        if line.len() > IPC_BUFFER_MAX_SIZE {
            warn!(size = line.len(), "IPC message exceeds the slot budget; sending anyway");
        }
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::BrokenPipe => IndexerError::IpcDisconnected,
                _ => IndexerError::io("<ipc>", e),
            })
    }
}

/// Pump raw lines from a reader into a channel until EOF. The channel end
/// hanging up (receiver dropped) also terminates the pump.
pub fn spawn_line_pump<R: BufRead + Send + 'static>(
    reader: R,
    tx: Sender<String>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "IPC line pump read failed; stopping");
                    return;
                }
            }
        }
    })
}

/// Typed one-shot receiver over a line channel.
pub struct TypedReceiver {
    rx: Receiver<String>,
}

impl TypedReceiver {
    #[must_use]
    pub fn new(rx: Receiver<String>) -> Self {
        Self { rx }
    }

    /// Wait for one message and parse it. On decode failure the message is
    /// consumed and [`IndexerError::IpcDecode`] is returned.
    ///
    /// # Errors
    /// [`IndexerError::IpcTimeout`] if nothing arrives within `wait`;
    /// [`IndexerError::IpcDisconnected`] if all senders hung up.
    pub fn recv_timeout<T: DeserializeOwned>(&self, wait: Duration) -> Result<T> {
        let line = self.rx.recv_timeout(wait).map_err(|e| match e {
            RecvTimeoutError::Timeout => IndexerError::IpcTimeout,
            RecvTimeoutError::Disconnected => IndexerError::IpcDisconnected,
        })?;
        serde_json::from_str(&line).map_err(IndexerError::IpcDecode)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn request_line(id: u64) -> String {
        let request = JobRequest {
            id: JobId(id),
            job: Some(Job::SemanticAnalysis(SemanticAnalysisJob {
                command: CompileCommand {
                    directory: "/b".to_owned(),
                    file: "a.cc".to_owned(),
                    arguments: vec!["cc".to_owned()],
                    output: None,
                },
                record_history_filter: String::new(),
            })),
        };
        serde_json::to_string(&request).unwrap()
    }

    #[test]
    fn round_trip_through_sender_and_receiver() {
        let mut buffer = Vec::new();
        {
            let mut sender = QueueSender::new(&mut buffer);
            sender.send(&JobRequest::shutdown()).unwrap();
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        let pump = spawn_line_pump(std::io::Cursor::new(buffer), tx);
        let receiver = TypedReceiver::new(rx);
        let request: JobRequest = receiver.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(request.id.is_shutdown());
        pump.join().unwrap();
    }

    #[test]
    fn timeout_and_decode_errors_are_distinct() {
        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        let receiver = TypedReceiver::new(rx);
        let err = receiver.recv_timeout::<JobRequest>(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, IndexerError::IpcTimeout));

        tx.send("not json".to_owned()).unwrap();
        let err = receiver.recv_timeout::<JobRequest>(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, IndexerError::IpcDecode(_)));

        // The malformed message was consumed; a valid one goes through.
        tx.send(request_line(7)).unwrap();
        let ok: JobRequest = receiver.recv_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(ok.id, JobId(7));
    }

    #[test]
    fn job_schema_shape_is_stable() {
        let line = request_line(1);
        assert!(line.contains("\"kind\":\"SemanticAnalysis\""));
        assert!(line.contains("\"details\""));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], 1);
    }
}
