//! Logging setup built on the `tracing` ecosystem.
//!
//! The daemon calls [`init_logging`] once its configuration has been loaded and
//! falls back on [`init_minimal_logging`] (stderr only) when that fails.

use crate::config::LoggingConfig;
use crate::error::{CoreError, LoggingError};
use crate::utils;

use once_cell::sync::Lazy;
use std::io::stdout;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Keeps the non-blocking file writer alive so buffered lines are flushed.
static LOG_WORKER_GUARD: Lazy<Mutex<Option<WorkerGuard>>> = Lazy::new(|| Mutex::new(None));

/// Installs a stderr subscriber filtered by `RUST_LOG` (default `info`).
///
/// Errors, e.g. a subscriber already being set, are ignored.
pub fn init_minimal_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init();
}

fn parse_level(level: &str) -> Result<Level, CoreError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        invalid_level => Err(CoreError::Logging(LoggingError::InitializationFailure(format!(
            "Invalid log level in config: {}",
            invalid_level
        )))),
    }
}

/// Builds a daily-rolling file layer for `log_path` in `format`.
fn create_file_layer(log_path: &Path, format: &str) -> Result<(BoxedLayer, WorkerGuard), CoreError> {
    let directory = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    utils::fs::ensure_dir_exists(directory)?;

    let file_name = log_path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("nova-compmgr.log"));
    let file_appender = tracing_appender::rolling::daily(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let layer: BoxedLayer = match format.to_lowercase().as_str() {
        "json" => fmt::layer().json().with_writer(writer).with_ansi(false).boxed(),
        _ => fmt::layer().with_writer(writer).with_ansi(false).boxed(),
    };
    Ok((layer, guard))
}

/// Installs the global subscriber described by `config`.
///
/// With `is_reload` set, a subscriber that is already installed is reported on
/// stderr and treated as success; otherwise it is an error.
pub fn init_logging(config: &LoggingConfig, is_reload: bool) -> Result<(), CoreError> {
    let level = parse_level(&config.level)?;

    let stdout_filter = EnvFilter::new(level.to_string());
    let stdout_layer: BoxedLayer = match config.format.to_lowercase().as_str() {
        "json" => fmt::layer()
            .json()
            .with_writer(stdout)
            .with_ansi(false)
            .with_filter(stdout_filter)
            .boxed(),
        _ => fmt::layer()
            .with_writer(stdout)
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_filter(stdout_filter)
            .boxed(),
    };

    let mut layers: Vec<BoxedLayer> = vec![stdout_layer];
    let mut new_file_guard: Option<WorkerGuard> = None;
    if let Some(log_path) = &config.file_path {
        let (file_layer, guard) = create_file_layer(log_path, &config.format)?;
        new_file_guard = Some(guard);
        layers.push(file_layer.with_filter(EnvFilter::new(level.to_string())).boxed());
    }

    let result = Registry::default().with(layers).try_init();

    match LOG_WORKER_GUARD.lock() {
        Ok(mut guard_slot) => *guard_slot = new_file_guard,
        Err(e) => eprintln!(
            "[ERROR] Failed to lock LOG_WORKER_GUARD to update: {}. Log flushing may be affected.",
            e
        ),
    }

    match result {
        Ok(()) => Ok(()),
        Err(e) if is_reload => {
            eprintln!(
                "[INFO] Re-initializing logging configuration attempted. Previous logger may persist. Error: {}",
                e
            );
            Ok(())
        }
        Err(e) => Err(CoreError::Logging(LoggingError::InitializationFailure(format!(
            "Failed to set global tracing subscriber. Was it already initialized? Error: {}",
            e
        )))),
    }
}
