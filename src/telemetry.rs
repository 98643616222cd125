//! Telemetry initialization.
//!
//! All diagnostics go to stderr; stdout is the IPC channel in worker
//! mode, so nothing else may ever write to it. The filter defaults to the
//! CLI's `--log-level` and can be overridden per-target with `RUST_LOG`.
//! Setting `CINDEX_LOG_FORMAT=json` switches to the JSON formatter for
//! log collectors.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Call once, from `main`.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cindex={level},scip_cindex={level}")));

    let json = std::env::var("CINDEX_LOG_FORMAT").is_ok_and(|v| v == "json");
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Map the CLI log-level argument to a filter directive.
#[must_use]
pub fn level_directive(level: &str) -> &'static str {
    match level {
        "debug" => "debug",
        "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}
