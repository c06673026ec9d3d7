//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Route output to stderr or a daily-rotated log file
//! - Render error source chains for log fields
//!
//! # Design Decisions
//! - `RUST_LOG` takes precedence over the configured level
//! - `fatal` is accepted as a level name and maps to `error`
//! - The file writer is non-blocking; its guard must outlive the server

use std::error::Error;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::validation::is_known_log_level;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unknown log level {0:?}")]
    UnknownLevel(String),

    #[error("invalid log file path {}", .0.display())]
    InvalidFile(PathBuf),

    #[error("failed to install the log subscriber")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Map a configured level name to an `EnvFilter` directive.
pub fn level_directive(level: &str) -> Result<&'static str, LoggingError> {
    let lower = level.to_ascii_lowercase();
    if !is_known_log_level(&lower) {
        return Err(LoggingError::UnknownLevel(level.to_string()));
    }
    Ok(match lower.as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        _ => "error",
    })
}

/// Install the global subscriber.
///
/// Returns the background writer guard when logging to a file; dropping it
/// flushes and stops the writer.
pub fn init_logging(level: &str, file: Option<&Path>) -> Result<Option<WorkerGuard>, LoggingError> {
    let directive = level_directive(level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    match file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
            Ok(None)
        }
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), LoggingError> {
    let name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidFile(path.to_path_buf()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(name)))
}

/// Render an error and every `source()` below it as `outer: inner: root`.
pub fn error_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
