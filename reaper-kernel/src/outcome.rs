//! Outcome reported for every processed signal.

use reaper_primitives::{ConfirmationId, ReaperAction};
use serde::{Deserialize, Serialize};

/// Why an outcome ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeReason {
    /// The adapter applied the action.
    Executed,
    /// Suppression, or a disabled reaper, withheld the signal before policy
    /// evaluation.
    Suppressed,
    /// A destructive action is parked until an operator confirms it.
    AwaitingConfirmation,
    /// The adapter failed or timed out.
    AdapterError,
}

/// Immutable record of what happened to one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<ReaperAction>,
    executed: bool,
    reason: OutcomeReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confirmation_id: Option<ConfirmationId>,
}

impl ActionOutcome {
    pub(crate) fn completed(action: ReaperAction, attempts: u32) -> Self {
        Self {
            action: Some(action),
            executed: true,
            reason: OutcomeReason::Executed,
            detail: None,
            attempts,
            confirmation_id: None,
        }
    }

    pub(crate) fn suppressed(detail: impl Into<String>) -> Self {
        Self {
            action: None,
            executed: false,
            reason: OutcomeReason::Suppressed,
            detail: Some(detail.into()),
            attempts: 0,
            confirmation_id: None,
        }
    }

    pub(crate) fn awaiting_confirmation(action: ReaperAction) -> Self {
        Self {
            action: Some(action),
            executed: false,
            reason: OutcomeReason::AwaitingConfirmation,
            detail: None,
            attempts: 0,
            confirmation_id: None,
        }
    }

    pub(crate) fn adapter_error(
        action: ReaperAction,
        detail: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            action: Some(action),
            executed: false,
            reason: OutcomeReason::AdapterError,
            detail: Some(detail.into()),
            attempts,
            confirmation_id: None,
        }
    }

    pub(crate) fn with_confirmation_id(mut self, id: ConfirmationId) -> Self {
        self.confirmation_id = Some(id);
        self
    }

    /// Returns the action decided for the signal; `None` when suppressed.
    #[must_use]
    pub fn action(&self) -> Option<ReaperAction> {
        self.action
    }

    /// Returns `true` when the adapter applied the action.
    #[must_use]
    pub fn executed(&self) -> bool {
        self.executed
    }

    /// Returns the outcome reason.
    #[must_use]
    pub fn reason(&self) -> OutcomeReason {
        self.reason
    }

    /// Returns free-form detail (denial or adapter error text).
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns how many adapter calls were made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the pending confirmation handle for parked actions.
    #[must_use]
    pub fn confirmation_id(&self) -> Option<ConfirmationId> {
        self.confirmation_id
    }
}
