//! Error types for configuration loading.

use std::path::PathBuf;

use reaper_primitives::SignalKind;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration document is not valid JSON for the schema.
    #[error("failed to parse config: {source}")]
    Parse {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },
    /// A table lists the same signal kind twice.
    #[error("duplicate {table} entry for signal kind `{kind}`")]
    DuplicateKind {
        /// Which table contained the duplicate.
        table: &'static str,
        /// The repeated kind.
        kind: SignalKind,
    },
    /// A field holds a value the engine cannot run with.
    #[error("invalid config value for `{field}`: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidValue { field, reason }
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
