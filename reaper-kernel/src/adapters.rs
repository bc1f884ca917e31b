//! Outbound action adapters.
//!
//! The executor owns exactly one adapter per [`ReaperAction`] variant; hosts
//! plug in their session manager, run canceller, and notifier here.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reaper_primitives::{ReaperAction, RunId, Scope};
use reaper_telemetry::TraceContext;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Result alias used by action adapters.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Error type shared by adapter implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The downstream system refused the action.
    #[error("action rejected: {reason}")]
    Rejected {
        /// Additional context for the failure.
        reason: String,
    },

    /// Transport-level failures (network, IPC, etc.).
    #[error("adapter transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The adapter did not answer within the configured limit.
    #[error("adapter timed out after {limit:?}")]
    TimedOut {
        /// Limit that elapsed.
        limit: Duration,
    },
}

impl AdapterError {
    /// Convenience constructor for rejections.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// What an action is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionTarget {
    run_id: RunId,
    scope: Scope,
}

impl ActionTarget {
    /// Creates a target for a run within a suppression scope.
    #[must_use]
    pub fn new(run_id: RunId, scope: Scope) -> Self {
        Self { run_id, scope }
    }

    /// Returns the run the signal was raised for.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Returns the scope the signal was suppressed under.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns the session-level subject a restriction applies to: the agent
    /// for agent-scoped signals, otherwise the run.
    #[must_use]
    pub fn subject(&self) -> Scope {
        match &self.scope {
            Scope::Global => Scope::Run(self.run_id.clone()),
            scoped => scoped.clone(),
        }
    }
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.run_id, self.scope)
    }
}

/// Single-operation adapter performing one reaper action.
#[async_trait]
pub trait ActionAdapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Applies the action to `target`, propagating `trace` downstream.
    async fn apply(&self, target: &ActionTarget, trace: &TraceContext) -> AdapterResult<()>;
}

/// Adapter that only records the action in the log.
#[derive(Debug, Clone, Copy)]
pub struct LoggingAdapter {
    action: ReaperAction,
}

impl LoggingAdapter {
    /// Creates a logging adapter for `action`.
    #[must_use]
    pub const fn new(action: ReaperAction) -> Self {
        Self { action }
    }
}

#[async_trait]
impl ActionAdapter for LoggingAdapter {
    fn name(&self) -> &str {
        "log"
    }

    async fn apply(&self, target: &ActionTarget, trace: &TraceContext) -> AdapterResult<()> {
        info!(
            action = %self.action,
            run_id = %target.run_id(),
            scope = %target.scope(),
            traceparent = %trace.traceparent(),
            "reaper action recorded"
        );
        Ok(())
    }
}

/// One adapter per reaper action.
#[derive(Clone)]
pub struct ActionAdapters {
    notifier: Arc<dyn ActionAdapter>,
    throttler: Arc<dyn ActionAdapter>,
    pauser: Arc<dyn ActionAdapter>,
    run_canceller: Arc<dyn ActionAdapter>,
    session_terminator: Arc<dyn ActionAdapter>,
}

impl ActionAdapters {
    /// Creates the adapter set.
    #[must_use]
    pub fn new(
        notifier: Arc<dyn ActionAdapter>,
        throttler: Arc<dyn ActionAdapter>,
        pauser: Arc<dyn ActionAdapter>,
        run_canceller: Arc<dyn ActionAdapter>,
        session_terminator: Arc<dyn ActionAdapter>,
    ) -> Self {
        Self {
            notifier,
            throttler,
            pauser,
            run_canceller,
            session_terminator,
        }
    }

    /// Adapter set that only logs every action.
    #[must_use]
    pub fn logging() -> Self {
        Self::new(
            Arc::new(LoggingAdapter::new(ReaperAction::Alert)),
            Arc::new(LoggingAdapter::new(ReaperAction::Throttle)),
            Arc::new(LoggingAdapter::new(ReaperAction::Pause)),
            Arc::new(LoggingAdapter::new(ReaperAction::CancelRun)),
            Arc::new(LoggingAdapter::new(ReaperAction::TerminateSession)),
        )
    }

    /// Replaces the notification adapter.
    #[must_use]
    pub fn with_notifier(mut self, adapter: Arc<dyn ActionAdapter>) -> Self {
        self.notifier = adapter;
        self
    }

    /// Replaces the throttle adapter.
    #[must_use]
    pub fn with_throttler(mut self, adapter: Arc<dyn ActionAdapter>) -> Self {
        self.throttler = adapter;
        self
    }

    /// Replaces the pause adapter.
    #[must_use]
    pub fn with_pauser(mut self, adapter: Arc<dyn ActionAdapter>) -> Self {
        self.pauser = adapter;
        self
    }

    /// Replaces the run cancellation adapter.
    #[must_use]
    pub fn with_run_canceller(mut self, adapter: Arc<dyn ActionAdapter>) -> Self {
        self.run_canceller = adapter;
        self
    }

    /// Replaces the session termination adapter.
    #[must_use]
    pub fn with_session_terminator(mut self, adapter: Arc<dyn ActionAdapter>) -> Self {
        self.session_terminator = adapter;
        self
    }

    /// Returns the adapter responsible for `action`.
    #[must_use]
    pub fn for_action(&self, action: ReaperAction) -> &Arc<dyn ActionAdapter> {
        match action {
            ReaperAction::Alert => &self.notifier,
            ReaperAction::Throttle => &self.throttler,
            ReaperAction::Pause => &self.pauser,
            ReaperAction::CancelRun => &self.run_canceller,
            ReaperAction::TerminateSession => &self.session_terminator,
        }
    }
}

impl Default for ActionAdapters {
    fn default() -> Self {
        Self::logging()
    }
}

impl fmt::Debug for ActionAdapters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionAdapters")
            .field("notifier", &self.notifier.name())
            .field("throttler", &self.throttler.name())
            .field("pauser", &self.pauser.name())
            .field("run_canceller", &self.run_canceller.name())
            .field("session_terminator", &self.session_terminator.name())
            .finish()
    }
}
