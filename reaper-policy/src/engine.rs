//! Policy engine traits and table-driven implementation.

use std::collections::HashMap;
use std::fmt;

use reaper_config::{EngineConfig, ReaperPolicy};
use reaper_primitives::{AnomalySignal, SignalKind};
use tracing::debug;

use crate::decision::ReaperDecision;

/// Maps admitted signals to reaper decisions.
///
/// Implementations must be pure: identical signals yield identical decisions.
pub trait PolicyEngine: Send + Sync + fmt::Debug {
    /// Resolves the action for `signal`.
    fn resolve(&self, signal: &AnomalySignal) -> ReaperDecision;

    /// Returns the effective policy table, when the engine has one.
    fn policies(&self) -> Vec<ReaperPolicy> {
        Vec::new()
    }
}

/// Immutable lookup table keyed by signal kind.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicyEngine {
    table: HashMap<SignalKind, ReaperPolicy>,
}

impl StaticPolicyEngine {
    /// Builds an engine from policy entries; later entries for a kind win.
    #[must_use]
    pub fn new(policies: impl IntoIterator<Item = ReaperPolicy>) -> Self {
        let table = policies
            .into_iter()
            .map(|policy| (policy.kind().clone(), policy))
            .collect();
        Self { table }
    }

    /// Builds an engine from the configured policy table.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.policies().iter().cloned())
    }
}

impl PolicyEngine for StaticPolicyEngine {
    fn resolve(&self, signal: &AnomalySignal) -> ReaperDecision {
        let Some(policy) = self.table.get(signal.kind()) else {
            debug!(kind = %signal.kind(), "no reaper policy for kind; falling back to alert");
            return ReaperDecision::fallback();
        };

        let decision = ReaperDecision::new(policy.action(), policy.require_confirmation());
        debug!(
            kind = %signal.kind(),
            action = %decision.action(),
            require_confirmation = decision.require_confirmation(),
            "reaper policy matched"
        );
        decision
    }

    fn policies(&self) -> Vec<ReaperPolicy> {
        let mut policies: Vec<_> = self.table.values().cloned().collect();
        policies.sort_by(|a, b| a.kind().cmp(b.kind()));
        policies
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use reaper_primitives::{ReaperAction, RunId, Severity};

    use super::*;

    fn signal(kind: impl Into<SignalKind>) -> AnomalySignal {
        AnomalySignal::new(
            kind,
            Severity::Warning,
            RunId::new("run-1").unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn resolves_configured_kinds() {
        let engine = StaticPolicyEngine::from_config(&EngineConfig::default());
        let decision = engine.resolve(&signal(SignalKind::ErrorBurst));
        assert_eq!(decision.action(), ReaperAction::Pause);
        assert!(!decision.require_confirmation());
        assert!(decision.matched_policy());
    }

    #[test]
    fn unmapped_kinds_fall_back_to_alert() {
        let engine = StaticPolicyEngine::from_config(&EngineConfig::default());
        let decision = engine.resolve(&signal("gpu_meltdown"));
        assert_eq!(decision, ReaperDecision::fallback());
    }

    #[test]
    fn table_cannot_disable_confirmation_for_destructive_actions() {
        let engine = StaticPolicyEngine::new([
            ReaperPolicy::new(SignalKind::CostSpike, ReaperAction::TerminateSession, false),
            ReaperPolicy::new(SignalKind::ToolLoop, ReaperAction::CancelRun, false),
        ]);
        assert!(engine.resolve(&signal(SignalKind::CostSpike)).require_confirmation());
        assert!(engine.resolve(&signal(SignalKind::ToolLoop)).require_confirmation());
    }

    #[test]
    fn resolve_is_pure() {
        let engine = StaticPolicyEngine::from_config(&EngineConfig::default());
        let sample = signal(SignalKind::TokenSpike).with_payload("tokens", serde_json::json!(9000));
        assert_eq!(engine.resolve(&sample), engine.resolve(&sample));
    }

    #[test]
    fn policies_are_listed_in_kind_order() {
        let engine = StaticPolicyEngine::from_config(&EngineConfig::default());
        let kinds: Vec<_> = engine
            .policies()
            .iter()
            .map(|policy| policy.kind().clone())
            .collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
        assert_eq!(kinds.len(), 4);
    }
}
