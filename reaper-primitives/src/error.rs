//! Shared error definitions for reaper primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the reaper workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing or validating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided confirmation identifier could not be parsed.
    #[error("invalid confirmation id: {source}")]
    InvalidConfirmationId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// An identifier string failed validation.
    #[error("invalid {kind} `{value}`: {reason}")]
    InvalidId {
        /// Which identifier family was rejected.
        kind: &'static str,
        /// The offending identifier string.
        value: String,
        /// Human-readable reason for rejection.
        reason: &'static str,
    },

    /// A signal was malformed and must not reach suppression.
    #[error("invalid signal: {reason}")]
    InvalidSignal {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl Error {
    /// Convenience constructor for invalid signals.
    #[must_use]
    pub fn invalid_signal(reason: impl Into<String>) -> Self {
        Self::InvalidSignal {
            reason: reason.into(),
        }
    }
}
