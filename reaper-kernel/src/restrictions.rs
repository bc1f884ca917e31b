//! In-memory pause and throttle restrictions.
//!
//! Hosts consult [`SessionRestrictions`] before letting a run start or a tool
//! call proceed; the pause and throttle adapters write to it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reaper_primitives::Scope;
use reaper_telemetry::TraceContext;
use tracing::info;

use crate::adapters::{ActionAdapter, ActionTarget, AdapterResult};

/// Pause and throttle state per subject.
#[derive(Debug)]
pub struct SessionRestrictions {
    paused: RwLock<HashSet<Scope>>,
    throttled: RwLock<HashMap<Scope, Duration>>,
    throttle_delay: Duration,
}

impl SessionRestrictions {
    /// Creates an empty registry applying `throttle_delay` to throttled subjects.
    #[must_use]
    pub fn new(throttle_delay: Duration) -> Self {
        Self {
            paused: RwLock::new(HashSet::new()),
            throttled: RwLock::new(HashMap::new()),
            throttle_delay,
        }
    }

    /// Returns `true` when `subject` is paused.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    #[must_use]
    pub fn is_paused(&self, subject: &Scope) -> bool {
        self.paused
            .read()
            .expect("restrictions poisoned")
            .contains(subject)
    }

    /// Returns the delay to impose on `subject`, if throttled.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    #[must_use]
    pub fn throttle_delay(&self, subject: &Scope) -> Option<Duration> {
        self.throttled
            .read()
            .expect("restrictions poisoned")
            .get(subject)
            .copied()
    }

    /// Lifts a pause, returning `true` when one existed.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn resume(&self, subject: &Scope) -> bool {
        let removed = self
            .paused
            .write()
            .expect("restrictions poisoned")
            .remove(subject);
        if removed {
            info!(subject = %subject, "pause lifted");
        }
        removed
    }

    /// Lifts a throttle, returning `true` when one existed.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn unthrottle(&self, subject: &Scope) -> bool {
        self.throttled
            .write()
            .expect("restrictions poisoned")
            .remove(subject)
            .is_some()
    }

    /// Drops every restriction.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn clear(&self) {
        self.paused.write().expect("restrictions poisoned").clear();
        self.throttled
            .write()
            .expect("restrictions poisoned")
            .clear();
    }

    /// Returns an adapter that pauses targets in this registry.
    #[must_use]
    pub fn pause_adapter(self: &Arc<Self>) -> Arc<dyn ActionAdapter> {
        Arc::new(PauseAdapter(Arc::clone(self)))
    }

    /// Returns an adapter that throttles targets in this registry.
    #[must_use]
    pub fn throttle_adapter(self: &Arc<Self>) -> Arc<dyn ActionAdapter> {
        Arc::new(ThrottleAdapter(Arc::clone(self)))
    }
}

struct PauseAdapter(Arc<SessionRestrictions>);

#[async_trait]
impl ActionAdapter for PauseAdapter {
    fn name(&self) -> &str {
        "session-pause"
    }

    async fn apply(&self, target: &ActionTarget, trace: &TraceContext) -> AdapterResult<()> {
        let subject = target.subject();
        info!(subject = %subject, trace_id = %trace.trace_id(), "subject paused");
        self.0
            .paused
            .write()
            .expect("restrictions poisoned")
            .insert(subject);
        Ok(())
    }
}

struct ThrottleAdapter(Arc<SessionRestrictions>);

#[async_trait]
impl ActionAdapter for ThrottleAdapter {
    fn name(&self) -> &str {
        "session-throttle"
    }

    async fn apply(&self, target: &ActionTarget, trace: &TraceContext) -> AdapterResult<()> {
        let subject = target.subject();
        let delay = self.0.throttle_delay;
        info!(subject = %subject, ?delay, trace_id = %trace.trace_id(), "subject throttled");
        self.0
            .throttled
            .write()
            .expect("restrictions poisoned")
            .insert(subject, delay);
        Ok(())
    }
}
