//! Structured logging for the mesh CLI via `tracing-subscriber`.
//!
//! Command results go to stdout as JSON, so every log layer writes to
//! stderr or to a file. When `[logging].logs_dir` is set, a rotating JSON
//! file layer is added next to the console layer; otherwise the console is
//! the only sink.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Prefix of rotated log files (`ghostmesh.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "ghostmesh.log";

/// Keeps the background log writer alive. Dropping it flushes the file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Install the subscriber described by `config`.
///
/// A relative `logs_dir` is resolved against `root`. Returns a guard only
/// when a file sink was installed.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init(config: &LoggingConfig, root: &Path) -> anyhow::Result<Option<LoggingGuard>> {
    match &config.logs_dir {
        Some(dir) => init_with_file(&root.join(dir)).map(Some),
        None => {
            init_cli();
            Ok(None)
        }
    }
}

/// Console plus rotating JSON file under `logs_dir`.
///
/// Level comes from `RUST_LOG`, default `info`.
///
/// # Errors
///
/// Returns an error if `logs_dir` cannot be created or a subscriber is
/// already installed.
pub fn init_with_file(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("a global log subscriber is already installed")?;

    Ok(LoggingGuard { _guard: guard })
}

/// Console-only logging on stderr.
///
/// Level comes from `RUST_LOG`, default `warn` so one-shot commands stay quiet.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_writer(std::io::stderr)
        .init();
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}
