//! Bounded ring of recent reaper outcomes.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use reaper_primitives::{RunId, Scope, Severity, SignalKind};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::outcome::ActionOutcome;

/// One processed signal or confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    kind: SignalKind,
    severity: Severity,
    run_id: RunId,
    scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    outcome: ActionOutcome,
    recorded_at: DateTime<Utc>,
}

impl ActionRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(
        kind: SignalKind,
        severity: Severity,
        run_id: RunId,
        scope: Scope,
        trace_id: Option<String>,
        outcome: ActionOutcome,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            severity,
            run_id,
            scope,
            trace_id,
            outcome,
            recorded_at,
        }
    }

    /// Returns the signal kind.
    #[must_use]
    pub fn kind(&self) -> &SignalKind {
        &self.kind
    }

    /// Returns the signal severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the run.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Returns the suppression scope.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns the trace id active when the record was written.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Returns the outcome.
    #[must_use]
    pub fn outcome(&self) -> &ActionOutcome {
        &self.outcome
    }

    /// Returns when the record was written.
    #[must_use]
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

/// Ring buffer retaining the most recent records.
#[derive(Debug)]
pub struct ActionHistory {
    capacity: NonZeroUsize,
    entries: RwLock<VecDeque<ActionRecord>>,
}

impl ActionHistory {
    /// Creates a history holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity.get())),
        }
    }

    /// Appends a record, evicting the oldest once full.
    pub async fn push(&self, record: ActionRecord) {
        let mut guard = self.entries.write().await;
        guard.push_back(record);
        while guard.len() > self.capacity.get() {
            guard.pop_front();
        }
    }

    /// Returns up to `limit` of the newest records, oldest first, optionally
    /// restricted to one run.
    pub async fn recent(&self, run_id: Option<&RunId>, limit: usize) -> Vec<ActionRecord> {
        let guard = self.entries.read().await;
        let mut selected: Vec<_> = guard
            .iter()
            .rev()
            .filter(|record| run_id.is_none_or(|run| record.run_id() == run))
            .take(limit)
            .cloned()
            .collect();
        selected.reverse();
        selected
    }

    /// Returns the number of retained records.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when no records are retained.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drops every record.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use reaper_primitives::ReaperAction;

    use super::*;

    fn record(run: &str, attempts: u32) -> ActionRecord {
        let run_id = RunId::new(run).unwrap();
        ActionRecord::new(
            SignalKind::ErrorBurst,
            Severity::Warning,
            run_id.clone(),
            Scope::Run(run_id),
            None,
            ActionOutcome::completed(ReaperAction::Pause, attempts),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn respects_capacity() {
        let history = ActionHistory::new(NonZeroUsize::new(2).unwrap());
        for attempts in 1..=3 {
            history.push(record("run-1", attempts)).await;
        }

        let recent = history.recent(None, 10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].outcome().attempts(), 2);
        assert_eq!(recent[1].outcome().attempts(), 3);
    }

    #[tokio::test]
    async fn filters_by_run_and_limit() {
        let history = ActionHistory::new(NonZeroUsize::new(10).unwrap());
        history.push(record("run-a", 1)).await;
        history.push(record("run-b", 2)).await;
        history.push(record("run-a", 3)).await;
        history.push(record("run-a", 4)).await;

        let run_a = RunId::new("run-a").unwrap();
        let recent = history.recent(Some(&run_a), 2).await;
        let attempts: Vec<_> = recent.iter().map(|r| r.outcome().attempts()).collect();
        assert_eq!(attempts, [3, 4]);

        history.clear().await;
        assert!(history.is_empty().await);
    }
}
