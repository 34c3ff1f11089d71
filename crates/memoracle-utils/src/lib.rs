//! # memoracle Utilities
//!
//! Shared utilities, logging, and helpers for memoracle.
//!
//! This crate provides common functionality used across the memoracle
//! workspace, including the logging infrastructure built on `tracing`.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    default_log_file, init_logging, init_logging_with_file, init_logging_with_level, LogFormat, LogLevel, LoggingError,
    LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
