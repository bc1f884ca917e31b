//! Cooldown and hourly-cap suppression keyed by signal kind and scope.
//!
//! Every (kind, scope) pair owns one state slot behind its own mutex. The
//! admit/deny decision and the state update happen under that mutex, so two
//! concurrent signals for the same pair can never both pass the cooldown.
//! Decisions use the signal's own timestamp, never the wall clock.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reaper_config::{EngineConfig, SuppressionRule};
use reaper_primitives::{AnomalySignal, KeyedStore, Scope, SignalKind};
use serde::Serialize;
use tracing::debug;

fn hour() -> chrono::Duration {
    chrono::Duration::hours(1)
}

/// Identifies one suppression bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SuppressionKey {
    kind: SignalKind,
    scope: Scope,
}

impl SuppressionKey {
    /// Creates a key.
    #[must_use]
    pub fn new(kind: SignalKind, scope: Scope) -> Self {
        Self { kind, scope }
    }

    /// Returns the signal kind.
    #[must_use]
    pub fn kind(&self) -> &SignalKind {
        &self.kind
    }

    /// Returns the scope.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

#[derive(Debug, Default)]
struct SuppressionState {
    last_fired_at: Option<DateTime<Utc>>,
    hour_window: VecDeque<DateTime<Utc>>,
}

impl SuppressionState {
    fn prune(&mut self, reference: DateTime<Utc>) {
        let cutoff = reference - hour();
        self.hour_window.retain(|fired| *fired > cutoff);
    }

    fn check(&self, rule: &SuppressionRule, at: DateTime<Utc>) -> Option<Denial> {
        if let Some(last) = self.last_fired_at {
            let cooldown =
                chrono::Duration::from_std(rule.cooldown()).unwrap_or(chrono::Duration::MAX);
            let elapsed = at.signed_duration_since(last);
            if elapsed < cooldown {
                let remaining = cooldown
                    .checked_sub(&elapsed)
                    .and_then(|left| left.to_std().ok())
                    .unwrap_or(rule.cooldown());
                return Some(Denial::Cooldown { remaining });
            }
        }
        let limit = rule.max_per_hour();
        if self.hour_window.len() >= limit as usize {
            return Some(Denial::HourlyCap { limit });
        }
        None
    }

    fn admit(&mut self, at: DateTime<Utc>) {
        self.hour_window.push_back(at);
        self.last_fired_at = Some(at);
    }

    fn snapshot(&self, key: &SuppressionKey) -> SuppressionSnapshot {
        SuppressionSnapshot {
            kind: key.kind.clone(),
            scope: key.scope.clone(),
            last_fired_at: self.last_fired_at,
            events_in_window: self.hour_window.len(),
        }
    }
}

/// Why a signal was withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Denial {
    /// The previous admission is too recent.
    Cooldown {
        /// Time left until the cooldown lapses, measured from the signal.
        remaining: Duration,
    },
    /// The rolling hourly cap is exhausted.
    HourlyCap {
        /// Configured cap.
        limit: u32,
    },
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cooldown { remaining } => {
                write!(f, "cooldown active for another {}s", remaining.as_secs())
            }
            Self::HourlyCap { limit } => write!(f, "hourly cap of {limit} reached"),
        }
    }
}

/// Point-in-time view of a suppression bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressionSnapshot {
    /// Signal kind of the bucket.
    pub kind: SignalKind,
    /// Scope of the bucket.
    pub scope: Scope,
    /// Timestamp of the latest admission.
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Admissions inside the trailing hour.
    pub events_in_window: usize,
}

/// Result of a suppression check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressionVerdict {
    denial: Option<Denial>,
    snapshot: SuppressionSnapshot,
}

impl SuppressionVerdict {
    /// Returns `true` when the signal may proceed.
    #[must_use]
    pub fn admitted(&self) -> bool {
        self.denial.is_none()
    }

    /// Returns the denial reason for suppressed signals.
    #[must_use]
    pub fn denial(&self) -> Option<Denial> {
        self.denial
    }

    /// Returns the bucket state after the check.
    #[must_use]
    pub fn snapshot(&self) -> &SuppressionSnapshot {
        &self.snapshot
    }
}

/// Tracks cooldown and hourly-cap state per (kind, scope).
#[derive(Debug)]
pub struct SuppressionController {
    rules: HashMap<SignalKind, SuppressionRule>,
    states: KeyedStore<SuppressionKey, SuppressionState>,
}

impl SuppressionController {
    /// Creates a controller from suppression rules; later rules for a kind win.
    #[must_use]
    pub fn new(rules: impl IntoIterator<Item = SuppressionRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| (rule.kind().clone(), rule))
            .collect();
        Self {
            rules,
            states: KeyedStore::new(),
        }
    }

    /// Creates a controller from the configured suppression table.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.suppression_rules().iter().cloned())
    }

    /// Returns the rule governing `kind`; unconfigured kinds get one per hour.
    #[must_use]
    pub fn rule_for(&self, kind: &SignalKind) -> SuppressionRule {
        self.rules
            .get(kind)
            .cloned()
            .unwrap_or_else(|| SuppressionRule::unconfigured(kind.clone()))
    }

    /// Decides whether `signal` may proceed, recording the admission if so.
    ///
    /// # Panics
    ///
    /// Panics if the bucket lock has been poisoned.
    pub fn evaluate(&self, signal: &AnomalySignal) -> SuppressionVerdict {
        let rule = self.rule_for(signal.kind());
        let key = SuppressionKey::new(signal.kind().clone(), signal.scope());
        let at = signal.occurred_at();

        let slot = self.states.slot(&key, SuppressionState::default);
        let mut state = slot.lock().expect("suppression state poisoned");
        state.prune(at);
        let denial = state.check(&rule, at);
        if denial.is_none() {
            state.admit(at);
        }
        let snapshot = state.snapshot(&key);
        drop(state);

        match denial {
            Some(reason) => debug!(
                kind = %key.kind,
                scope = %key.scope,
                %reason,
                "signal suppressed"
            ),
            None => debug!(
                kind = %key.kind,
                scope = %key.scope,
                events_in_window = snapshot.events_in_window,
                "signal admitted"
            ),
        }

        SuppressionVerdict { denial, snapshot }
    }

    /// Returns the current state of a bucket, if it exists.
    ///
    /// # Panics
    ///
    /// Panics if the bucket lock has been poisoned.
    #[must_use]
    pub fn snapshot(&self, kind: &SignalKind, scope: &Scope) -> Option<SuppressionSnapshot> {
        let key = SuppressionKey::new(kind.clone(), scope.clone());
        self.states.get(&key).map(|slot| {
            slot.lock()
                .expect("suppression state poisoned")
                .snapshot(&key)
        })
    }

    /// Clears one bucket.
    pub fn reset(&self, kind: &SignalKind, scope: &Scope) {
        self.states
            .remove(&SuppressionKey::new(kind.clone(), scope.clone()));
    }

    /// Clears every bucket.
    pub fn reset_all(&self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use reaper_primitives::{RunId, Severity};

    use super::*;

    fn minute(m: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(m)
    }

    fn run() -> RunId {
        RunId::new("run-1").unwrap()
    }

    fn signal(kind: SignalKind, at: DateTime<Utc>) -> AnomalySignal {
        AnomalySignal::new(kind, Severity::Warning, run(), at)
    }

    fn token_rule() -> SuppressionRule {
        SuppressionRule::new(SignalKind::TokenSpike, Duration::from_secs(15 * 60), 4)
    }

    #[test]
    fn cooldown_blocks_rapid_refiring() {
        let controller = SuppressionController::new([token_rule()]);
        let admitted: Vec<i64> = [0, 1, 2, 16, 17]
            .into_iter()
            .filter(|m| {
                controller
                    .evaluate(&signal(SignalKind::TokenSpike, minute(*m)))
                    .admitted()
            })
            .collect();
        assert_eq!(admitted, [0, 16]);
    }

    #[test]
    fn spelled_out_kind_shares_the_known_bucket() {
        let controller = SuppressionController::new([token_rule()]);
        let spelled = SignalKind::Other("token_spike".into());
        assert_eq!(controller.rule_for(&spelled), token_rule());

        assert!(controller.evaluate(&signal(SignalKind::TokenSpike, minute(0))).admitted());
        assert!(!controller.evaluate(&signal(spelled.clone(), minute(5))).admitted());
        assert!(controller.evaluate(&signal(spelled, minute(16))).admitted());
    }

    #[test]
    fn cooldown_denial_reports_remaining_time() {
        let controller = SuppressionController::new([token_rule()]);
        controller.evaluate(&signal(SignalKind::TokenSpike, minute(0)));
        let verdict = controller.evaluate(&signal(SignalKind::TokenSpike, minute(5)));
        assert_eq!(
            verdict.denial(),
            Some(Denial::Cooldown {
                remaining: Duration::from_secs(10 * 60)
            })
        );
        assert_eq!(verdict.snapshot().events_in_window, 1);
    }

    #[test]
    fn hourly_cap_bounds_admissions_and_rolls() {
        let rule = SuppressionRule::new(SignalKind::ToolLoop, Duration::from_secs(60), 3);
        let controller = SuppressionController::new([rule]);
        let verdicts: Vec<_> = [0, 2, 4, 6, 60, 61]
            .into_iter()
            .map(|m| controller.evaluate(&signal(SignalKind::ToolLoop, minute(m))))
            .collect();

        let admitted: Vec<bool> = verdicts.iter().map(SuppressionVerdict::admitted).collect();
        assert_eq!(admitted, [true, true, true, false, true, false]);
        assert_eq!(verdicts[3].denial(), Some(Denial::HourlyCap { limit: 3 }));
    }

    #[test]
    fn zero_cap_never_admits() {
        let rule = SuppressionRule::new(SignalKind::ErrorBurst, Duration::ZERO, 0);
        let controller = SuppressionController::new([rule]);
        assert!(!controller.evaluate(&signal(SignalKind::ErrorBurst, minute(0))).admitted());
    }

    #[test]
    fn unconfigured_kinds_are_capped_at_one_per_hour() {
        let controller = SuppressionController::new([]);
        let kind = SignalKind::from("disk_full");
        assert!(controller.evaluate(&signal(kind.clone(), minute(0))).admitted());
        assert!(!controller.evaluate(&signal(kind.clone(), minute(30))).admitted());
        assert!(controller.evaluate(&signal(kind, minute(61))).admitted());
    }

    #[test]
    fn out_of_order_signals_do_not_reopen_the_cooldown() {
        let controller = SuppressionController::new([token_rule()]);
        assert!(controller.evaluate(&signal(SignalKind::TokenSpike, minute(30))).admitted());
        assert!(!controller.evaluate(&signal(SignalKind::TokenSpike, minute(0))).admitted());
    }

    #[test]
    fn scopes_and_kinds_are_independent() {
        let controller = SuppressionController::new(SuppressionRule::defaults());
        let base = signal(SignalKind::TokenSpike, minute(0));
        assert!(controller.evaluate(&base).admitted());
        assert!(controller.evaluate(&base.clone().with_scope(Scope::Global)).admitted());
        assert!(controller.evaluate(&signal(SignalKind::ErrorBurst, minute(0))).admitted());
        assert!(!controller.evaluate(&base).admitted());
    }

    #[test]
    fn reset_clears_one_bucket() {
        let controller = SuppressionController::new([token_rule()]);
        let sample = signal(SignalKind::TokenSpike, minute(0));
        controller.evaluate(&sample);
        assert!(controller.snapshot(sample.kind(), &sample.scope()).is_some());

        controller.reset(sample.kind(), &sample.scope());
        assert!(controller.snapshot(sample.kind(), &sample.scope()).is_none());
        assert!(controller.evaluate(&sample).admitted());

        controller.reset_all();
        assert!(controller.snapshot(sample.kind(), &sample.scope()).is_none());
    }

    #[test]
    fn concurrent_signals_for_one_bucket_admit_exactly_once() {
        let controller = &SuppressionController::new([token_rule()]);
        let admitted = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(move || {
                        controller
                            .evaluate(&signal(SignalKind::TokenSpike, minute(0)))
                            .admitted()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|admitted| *admitted)
                .count()
        });
        assert_eq!(admitted, 1);
    }

    #[test]
    fn admissions_respect_spacing_and_rolling_cap() {
        let rule = SuppressionRule::new(SignalKind::ToolLoop, Duration::from_secs(5 * 60), 4);
        let controller = SuppressionController::new([rule.clone()]);

        // Deterministic pseudo-random arrival gaps between 0 and 6 minutes.
        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut at = minute(0);
        let mut admitted = Vec::new();
        for _ in 0..400 {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let gap = i64::try_from((state >> 33) % 360).unwrap();
            at += chrono::Duration::seconds(gap);
            if controller.evaluate(&signal(SignalKind::ToolLoop, at)).admitted() {
                admitted.push(at);
            }
        }

        let cooldown = chrono::Duration::from_std(rule.cooldown()).unwrap();
        for pair in admitted.windows(2) {
            assert!(pair[1] - pair[0] >= cooldown);
        }
        for end in &admitted {
            let in_window = admitted
                .iter()
                .filter(|t| *t <= end && *end - **t < hour())
                .count();
            assert!(in_window <= rule.max_per_hour() as usize);
        }
    }
}
