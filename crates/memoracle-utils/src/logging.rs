//! # Logging Utilities
//!
//! Logging infrastructure for memoracle using `tracing`.
//!
//! This module provides structured logging with support for:
//! - Multiple output formats (JSON for machines, pretty for development)
//! - Environment variable configuration
//! - Log level filtering
//! - Optional file output alongside the console
//!
//! Console output goes to stderr: stdout carries snapshot records.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memoracle_utils::init_logging;
//!
//! // Initialize with default settings (reads from RUST_LOG env var)
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Snapshot started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=memoracle_core=trace`)
//! - `MEMORACLE_LOG_FORMAT`: Set output format (`json` or `pretty`, default: `pretty`)
//! - `MEMORACLE_LOG_FILE`: Optional path to an additional log file
//!
//! ## Examples
//!
//! ```rust,no_run
//! use memoracle_utils::{LogFormat, LogLevel, init_logging_with_level};
//!
//! // Keep the guard alive until exit so buffered file output is flushed
//! let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Json)
//!     .expect("Failed to initialize logging");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Local;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const FORMAT_VAR: &str = "MEMORACLE_LOG_FORMAT";
/// Environment variable naming an additional log file.
pub const FILE_VAR: &str = "MEMORACLE_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s}. Use 'pretty' or 'json'"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            ))),
        }
    }
}

/// Keeps the background file writer alive. Buffered file output is flushed
/// when the guard is dropped.
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard
{
    _worker: Option<WorkerGuard>,
}

/// Initialize logging with default settings
///
/// Reads configuration from environment variables:
/// - `RUST_LOG`: Log level filter (e.g., `debug`, `memoracle_core=debug`)
/// - `MEMORACLE_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
/// - `MEMORACLE_LOG_FILE`: Optional path to log file
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `MEMORACLE_LOG_FORMAT` holds an unknown format
/// - File logging fails (if `MEMORACLE_LOG_FILE` is set)
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = match env::var(FORMAT_VAR) {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::Pretty,
    };
    let directives = env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| Level::INFO.to_string());
    install(&directives, format, env::var(FILE_VAR).ok().map(PathBuf::from))
}

/// Initialize logging with explicit level and format
///
/// The level overrides `RUST_LOG`; `MEMORACLE_LOG_FILE` is still honoured.
///
/// ## Example
///
/// ```rust,no_run
/// use memoracle_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if logging is already initialized or file logging fails.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    install(&Level::from(level).to_string(), format, env::var(FILE_VAR).ok().map(PathBuf::from))
}

/// Initialize logging to the console and to `log_file`.
///
/// Without an explicit level, `RUST_LOG` applies (default INFO).
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the file cannot be
/// created.
pub fn init_logging_with_file(level: Option<LogLevel>, format: LogFormat, log_file: PathBuf) -> Result<LoggingGuard, LoggingError>
{
    let directives = match level {
        Some(level) => Level::from(level).to_string(),
        None => env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| Level::INFO.to_string()),
    };
    install(&directives, format, Some(log_file))
}

/// Default log file: `~/.memoracle/YYYY-MM-DD-memoracle.log`, or the system
/// temp directory when there is no home directory.
///
/// ## Errors
///
/// Returns an error if the log directory cannot be created.
pub fn default_log_file() -> Result<PathBuf, LoggingError>
{
    let today = Local::now().format("%Y-%m-%d");
    let directory = match env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".memoracle"),
        Err(_) => env::temp_dir(),
    };
    std::fs::create_dir_all(&directory)?;
    Ok(directory.join(format!("{today}-memoracle.log")))
}

// Invalid directives fall back to INFO rather than failing startup
fn filter(directives: &str) -> EnvFilter
{
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
}

fn install(directives: &str, format: LogFormat, log_file: Option<PathBuf>) -> Result<LoggingGuard, LoggingError>
{
    let (file_writer, worker) = match log_file {
        Some(path) => {
            let (directory, file_name) = split_log_path(&path)?;
            std::fs::create_dir_all(&directory)?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let result = match format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stderr)
                .with_filter(filter(directives));
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false) // No ANSI in files
                    .with_filter(filter(directives))
            });
            Registry::default().with(console_layer).with(file_layer).try_init()
        }
        LogFormat::Json => {
            let console_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(io::stderr)
                .with_filter(filter(directives));
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_filter(filter(directives))
            });
            Registry::default().with(console_layer).with(file_layer).try_init()
        }
    };

    result.map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(LoggingGuard { _worker: worker })
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), LoggingError>
{
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, PathBuf::from(file_name)))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Log file path without a file name
    #[error("Invalid log file path: {0}")]
    InvalidPath(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("dev").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("PROD").unwrap(), LogFormat::Json);
        assert!(matches!(LogFormat::from_str("invalid"), Err(LoggingError::InvalidFormat(_))));
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(matches!(LogLevel::from_str("invalid"), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_split_log_path()
    {
        let (directory, file) = split_log_path(Path::new("/var/log/memoracle.log")).unwrap();
        assert_eq!(directory, PathBuf::from("/var/log"));
        assert_eq!(file, PathBuf::from("memoracle.log"));

        let (directory, _) = split_log_path(Path::new("memoracle.log")).unwrap();
        assert_eq!(directory, PathBuf::from("."));

        assert!(matches!(split_log_path(Path::new("/")), Err(LoggingError::InvalidPath(_))));
    }
}
