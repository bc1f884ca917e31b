//! Corrective actions the reaper may take against a run.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Reaper actions, declared in order of increasing severity so that the derived
/// ordering matches `alert < throttle < pause < cancel_run < terminate_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaperAction {
    /// Notify operators; no effect on the run.
    Alert,
    /// Slow the run down.
    Throttle,
    /// Hold the session until an operator resumes it.
    Pause,
    /// Cancel the in-flight run.
    CancelRun,
    /// Terminate the whole session.
    TerminateSession,
}

impl ReaperAction {
    /// Every action, in severity order.
    pub const ALL: [Self; 5] = [
        Self::Alert,
        Self::Throttle,
        Self::Pause,
        Self::CancelRun,
        Self::TerminateSession,
    ];

    /// Returns `true` for irreversible actions.
    #[must_use]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::CancelRun | Self::TerminateSession)
    }

    /// Returns `true` when a failed adapter call may be attempted once more.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Alert | Self::Throttle)
    }

    /// Returns the snake_case label used in configuration and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Throttle => "throttle",
            Self::Pause => "pause",
            Self::CancelRun => "cancel_run",
            Self::TerminateSession => "terminate_session",
        }
    }
}

impl Display for ReaperAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
