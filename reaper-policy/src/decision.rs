//! Policy decision types returned by engines.

use reaper_primitives::ReaperAction;
use serde::{Deserialize, Serialize};

/// Action the policy permits for an admitted signal.
///
/// Destructive actions always require confirmation; the constructor enforces
/// this regardless of what the policy table says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaperDecision {
    action: ReaperAction,
    require_confirmation: bool,
    matched_policy: bool,
}

impl ReaperDecision {
    /// Creates a decision for a policy table match.
    #[must_use]
    pub const fn new(action: ReaperAction, require_confirmation: bool) -> Self {
        Self {
            action,
            require_confirmation: require_confirmation || action.is_destructive(),
            matched_policy: true,
        }
    }

    /// Decision used when no policy entry exists for the signal kind.
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            action: ReaperAction::Alert,
            require_confirmation: false,
            matched_policy: false,
        }
    }

    /// Returns the action to take.
    #[must_use]
    pub const fn action(&self) -> ReaperAction {
        self.action
    }

    /// Returns `true` when an operator must confirm before execution.
    #[must_use]
    pub const fn require_confirmation(&self) -> bool {
        self.require_confirmation
    }

    /// Returns `false` when the decision came from the fallback.
    #[must_use]
    pub const fn matched_policy(&self) -> bool {
        self.matched_policy
    }
}
