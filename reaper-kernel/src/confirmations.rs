//! Destructive actions parked until an operator confirms them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reaper_policy::ReaperDecision;
use reaper_primitives::{ConfirmationId, Severity, SignalKind};
use reaper_telemetry::TraceContext;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::adapters::ActionTarget;

/// Explicit operator approval for a gated action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    confirmed_by: String,
}

impl Confirmation {
    /// Records who approved the action.
    #[must_use]
    pub fn new(confirmed_by: impl Into<String>) -> Self {
        Self {
            confirmed_by: confirmed_by.into(),
        }
    }

    /// Returns the approving operator.
    #[must_use]
    pub fn confirmed_by(&self) -> &str {
        &self.confirmed_by
    }

    /// Returns `true` when the confirmation names an operator.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.confirmed_by.trim().is_empty()
    }
}

/// Errors raised by the confirmation store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    /// No pending entry has this id.
    #[error("no pending confirmation {0}")]
    NotFound(ConfirmationId),
    /// The entry outlived its TTL.
    #[error("confirmation {id} expired at {expired_at}")]
    Expired {
        /// Expired entry.
        id: ConfirmationId,
        /// When it expired.
        expired_at: DateTime<Utc>,
    },
}

/// Action waiting for operator confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingConfirmation {
    id: ConfirmationId,
    kind: SignalKind,
    severity: Severity,
    decision: ReaperDecision,
    target: ActionTarget,
    trace: TraceContext,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl PendingConfirmation {
    /// Returns the confirmation handle.
    #[must_use]
    pub fn id(&self) -> ConfirmationId {
        self.id
    }

    /// Returns the kind of the signal that triggered the action.
    #[must_use]
    pub fn kind(&self) -> &SignalKind {
        &self.kind
    }

    /// Returns the severity of the triggering signal.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the parked decision.
    #[must_use]
    pub fn decision(&self) -> &ReaperDecision {
        &self.decision
    }

    /// Returns the action target.
    #[must_use]
    pub fn target(&self) -> &ActionTarget {
        &self.target
    }

    /// Returns the trace context captured when the action was parked.
    #[must_use]
    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Returns when the entry was parked.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the entry stops being confirmable.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Pending confirmations keyed by id.
#[derive(Debug)]
pub struct ConfirmationStore {
    ttl: chrono::Duration,
    pending: Mutex<HashMap<ConfirmationId, PendingConfirmation>>,
}

impl ConfirmationStore {
    /// Creates a store whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Parks a decision and returns its handle.
    ///
    /// Entries already past their TTL at `now` are dropped first.
    ///
    /// # Panics
    ///
    /// Panics if the store lock has been poisoned.
    pub fn register(
        &self,
        kind: SignalKind,
        severity: Severity,
        decision: ReaperDecision,
        target: ActionTarget,
        trace: TraceContext,
        now: DateTime<Utc>,
    ) -> ConfirmationId {
        let id = ConfirmationId::random();
        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        debug!(
            confirmation_id = %id,
            action = %decision.action(),
            run_id = %target.run_id(),
            %expires_at,
            "action parked for confirmation"
        );
        let entry = PendingConfirmation {
            id,
            kind,
            severity,
            decision,
            target,
            trace,
            created_at: now,
            expires_at,
        };
        let mut guard = self.pending.lock().expect("confirmation store poisoned");
        guard.retain(|_, held| !held.is_expired(now));
        guard.insert(id, entry);
        id
    }

    /// Removes and returns a live entry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::NotFound`] for unknown ids and
    /// [`ConfirmationError::Expired`] for entries past their TTL (which are
    /// dropped).
    ///
    /// # Panics
    ///
    /// Panics if the store lock has been poisoned.
    pub fn take(
        &self,
        id: ConfirmationId,
        now: DateTime<Utc>,
    ) -> Result<PendingConfirmation, ConfirmationError> {
        let entry = self
            .pending
            .lock()
            .expect("confirmation store poisoned")
            .remove(&id)
            .ok_or(ConfirmationError::NotFound(id))?;
        if entry.is_expired(now) {
            warn!(confirmation_id = %id, expired_at = %entry.expires_at, "confirmation expired");
            return Err(ConfirmationError::Expired {
                id,
                expired_at: entry.expires_at,
            });
        }
        Ok(entry)
    }

    /// Discards an entry without executing it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::NotFound`] when no entry has this id.
    ///
    /// # Panics
    ///
    /// Panics if the store lock has been poisoned.
    pub fn reject(&self, id: ConfirmationId) -> Result<PendingConfirmation, ConfirmationError> {
        self.pending
            .lock()
            .expect("confirmation store poisoned")
            .remove(&id)
            .ok_or(ConfirmationError::NotFound(id))
    }

    /// Drops expired entries and returns the live ones, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the store lock has been poisoned.
    pub fn pending(&self, now: DateTime<Utc>) -> Vec<PendingConfirmation> {
        let mut guard = self.pending.lock().expect("confirmation store poisoned");
        guard.retain(|_, entry| !entry.is_expired(now));
        let mut live: Vec<_> = guard.values().cloned().collect();
        drop(guard);
        live.sort_by_key(PendingConfirmation::created_at);
        live
    }

    /// Drops every entry.
    ///
    /// # Panics
    ///
    /// Panics if the store lock has been poisoned.
    pub fn clear(&self) {
        self.pending
            .lock()
            .expect("confirmation store poisoned")
            .clear();
    }
}
