// error.rs - Error types for the metrics subsystem.
//
// Only the storage and config layers surface these to callers. The
// recorder itself logs and swallows failures so metrics problems never
// reach the host application.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, saving, or configuring metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Failed to open or read a file.
    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to create, write, or replace the metrics file.
    #[error("failed to write metrics file at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The metrics file exists but is not a valid JSON event list.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The configuration file is not valid TOML for `MetricsConfig`.
    #[error("invalid metrics config: {0}")]
    ConfigError(#[from] toml::de::Error),
}
