use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing::error;

use cindex::driver::{Driver, DriverOptions};
use cindex::error::IndexerError;
use cindex::path::AbsolutePath;
use cindex::telemetry;
use cindex::worker::{self, WorkerOptions};

/// SCIP code-intelligence indexer for C, C++, and Objective-C.
///
/// Reads a compilation database, indexes every translation unit across a
/// pool of worker processes, and writes a single merged SCIP index. Each
/// header is indexed exactly once per distinct preprocessor-visible
/// content, no matter how many translation units include it.
#[derive(Parser)]
#[command(name = "scip-cindex")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a project from its compilation database
    Index(IndexArgs),

    /// Internal worker mode; spawned by the driver, not user-facing
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Path to compile_commands.json
    #[arg(long)]
    compdb: PathBuf,

    /// Worker process count (default: hardware concurrency)
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Log level: debug, info, warning, error
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Per-job timeout before a worker is presumed hung
    #[arg(long, default_value_t = 300)]
    receive_timeout_seconds: u64,

    /// JSON map from directories to name@version packages; must contain
    /// an entry for the project root
    #[arg(long)]
    package_map: Option<PathBuf>,

    /// Output index file
    #[arg(long, default_value = "index.scip.json")]
    output: PathBuf,

    /// Directory for intermediate shards (default: a fresh temp dir)
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Sort all emitted collections for bit-exact reproducible output
    #[arg(long)]
    deterministic: bool,

    /// Regex over header paths; matching files get their hash history
    /// recorded to YAML for debugging non-deterministic hashes
    #[arg(long, default_value = "")]
    record_history: String,

    /// Write per-TU timing statistics to this JSON file
    #[arg(long)]
    print_statistics: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct WorkerArgs {
    /// Opaque driver identity (for log correlation only)
    #[arg(long)]
    driver_id: String,

    /// Worker slot number
    #[arg(long)]
    worker_id: u64,

    /// Exit if no request arrives for this long
    #[arg(long, default_value_t = 300)]
    receive_timeout_seconds: u64,

    /// Project root the driver is indexing
    #[arg(long)]
    project_root: String,

    #[arg(long)]
    package_map: Option<PathBuf>,

    #[arg(long)]
    deterministic: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Index(args) => {
            telemetry::init(telemetry::level_directive(&args.log_level));
            match run_index(args) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("{e:#}");
                    if e.downcast_ref::<IndexerError>().is_some_and(IndexerError::is_config) {
                        ExitCode::from(2)
                    } else {
                        ExitCode::FAILURE
                    }
                }
            }
        }
        Commands::Worker(args) => {
            telemetry::init(telemetry::level_directive(&args.log_level));
            match run_worker(&args) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(driver = args.driver_id, "worker failed: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run_index(args: IndexArgs) -> anyhow::Result<()> {
    let jobs = match args.jobs {
        Some(n) => n,
        None => std::thread::available_parallelism().map(usize::from).unwrap_or(1),
    };
    let options = DriverOptions {
        jobs,
        receive_timeout: Duration::from_secs(args.receive_timeout_seconds),
        compdb_path: args.compdb,
        package_map_path: args.package_map,
        output_path: args.output,
        temp_dir: args.temp_dir,
        deterministic: args.deterministic,
        record_history_filter: args.record_history,
        print_statistics: args.print_statistics,
        log_level: args.log_level,
    };
    Driver::new(options)?.run().context("indexing failed")
}

fn run_worker(args: &WorkerArgs) -> anyhow::Result<()> {
    let options = WorkerOptions {
        worker_id: args.worker_id,
        receive_timeout: Duration::from_secs(args.receive_timeout_seconds),
        deterministic: args.deterministic,
        project_root: AbsolutePath::new(&args.project_root)
            .with_context(|| format!("bad --project-root '{}'", args.project_root))?,
        package_map_path: args.package_map.clone(),
    };
    worker::run(&options).context("worker loop failed")
}
