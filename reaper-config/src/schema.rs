//! Strongly typed configuration schemas.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::time::Duration;

use reaper_primitives::{ReaperAction, SignalKind};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

const MINUTE: u64 = 60;

/// Rate limits applied to one signal kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionRule {
    kind: SignalKind,
    cooldown: Duration,
    max_per_hour: u32,
}

impl SuppressionRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(kind: impl Into<SignalKind>, cooldown: Duration, max_per_hour: u32) -> Self {
        Self {
            kind: kind.into(),
            cooldown,
            max_per_hour,
        }
    }

    /// Rule applied to kinds with no configured entry: one per hour.
    #[must_use]
    pub fn unconfigured(kind: SignalKind) -> Self {
        Self::new(kind, Duration::from_secs(60 * MINUTE), 1)
    }

    /// Built-in rules for the known signal kinds.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(SignalKind::TokenSpike, Duration::from_secs(15 * MINUTE), 4),
            Self::new(SignalKind::ErrorBurst, Duration::from_secs(10 * MINUTE), 6),
            Self::new(SignalKind::ToolLoop, Duration::from_secs(5 * MINUTE), 12),
            Self::new(SignalKind::CostSpike, Duration::from_secs(60 * MINUTE), 1),
        ]
    }

    /// Returns the kind this rule governs.
    #[must_use]
    pub fn kind(&self) -> &SignalKind {
        &self.kind
    }

    /// Returns the minimum spacing between admissions.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Returns the rolling hourly admission cap.
    #[must_use]
    pub const fn max_per_hour(&self) -> u32 {
        self.max_per_hour
    }
}

/// Maps one signal kind to the reaper action it warrants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReaperPolicy {
    kind: SignalKind,
    action: ReaperAction,
    require_confirmation: bool,
}

impl ReaperPolicy {
    /// Creates a policy entry.
    #[must_use]
    pub fn new(
        kind: impl Into<SignalKind>,
        action: ReaperAction,
        require_confirmation: bool,
    ) -> Self {
        Self {
            kind: kind.into(),
            action,
            require_confirmation,
        }
    }

    /// Built-in policy table.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(SignalKind::TokenSpike, ReaperAction::Throttle, false),
            Self::new(SignalKind::ErrorBurst, ReaperAction::Pause, false),
            Self::new(SignalKind::ToolLoop, ReaperAction::CancelRun, true),
            Self::new(SignalKind::CostSpike, ReaperAction::TerminateSession, true),
        ]
    }

    /// Returns the kind this entry maps.
    #[must_use]
    pub fn kind(&self) -> &SignalKind {
        &self.kind
    }

    /// Returns the configured action.
    #[must_use]
    pub const fn action(&self) -> ReaperAction {
        self.action
    }

    /// Returns the configured confirmation flag, before destructive actions
    /// are forced to require confirmation.
    #[must_use]
    pub const fn require_confirmation(&self) -> bool {
        self.require_confirmation
    }
}

/// Suppression entry as written in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuppressionRuleEntry {
    /// Signal kind name.
    pub kind: String,
    /// Cooldown between admissions, in seconds.
    pub cooldown_secs: u64,
    /// Hourly admission cap.
    pub max_per_hour: u32,
}

/// Policy entry as written in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyEntry {
    /// Signal kind name.
    pub kind: String,
    /// Action to take.
    pub action: ReaperAction,
    /// Whether an operator must confirm the action.
    #[serde(default)]
    pub require_confirmation: bool,
}

/// On-disk configuration document. Table entries replace the built-in entry
/// for the same kind; kinds not listed keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Suppression overrides.
    pub suppression: Vec<SuppressionRuleEntry>,
    /// Policy overrides.
    pub policies: Vec<PolicyEntry>,
    /// Per-call adapter timeout in milliseconds; `null` disables it.
    pub adapter_timeout_ms: Option<u64>,
    /// Lifetime of a pending confirmation, in seconds.
    pub confirmation_ttl_secs: u64,
    /// Number of action records retained.
    pub history_capacity: usize,
    /// How far ahead of the clock a signal timestamp may be, in seconds.
    pub max_clock_skew_secs: u64,
    /// When `false`, admitted signals only raise alerts.
    pub reaper_enabled: bool,
    /// Delay imposed on throttled targets, in milliseconds.
    pub throttle_delay_ms: u64,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            suppression: Vec::new(),
            policies: Vec::new(),
            adapter_timeout_ms: Some(10_000),
            confirmation_ttl_secs: 15 * MINUTE,
            history_capacity: 500,
            max_clock_skew_secs: 5 * MINUTE,
            reaper_enabled: true,
            throttle_delay_ms: 2_000,
        }
    }
}

/// Validated, immutable engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    suppression_rules: Vec<SuppressionRule>,
    policies: Vec<ReaperPolicy>,
    adapter_timeout: Option<Duration>,
    confirmation_ttl: Duration,
    history_capacity: NonZeroUsize,
    max_clock_skew: Duration,
    reaper_enabled: bool,
    throttle_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let file = ConfigFile::default();
        Self {
            suppression_rules: SuppressionRule::defaults(),
            policies: ReaperPolicy::defaults(),
            adapter_timeout: file.adapter_timeout_ms.map(Duration::from_millis),
            confirmation_ttl: Duration::from_secs(file.confirmation_ttl_secs),
            history_capacity: NonZeroUsize::new(file.history_capacity).expect("non-zero"),
            max_clock_skew: Duration::from_secs(file.max_clock_skew_secs),
            reaper_enabled: file.reaper_enabled,
            throttle_delay: Duration::from_millis(file.throttle_delay_ms),
        }
    }
}

fn kind_name(kind: &str, field: &'static str) -> ConfigResult<SignalKind> {
    if kind.trim().is_empty() {
        return Err(ConfigError::invalid(field, "signal kind must not be empty"));
    }
    Ok(SignalKind::from(kind))
}

impl TryFrom<ConfigFile> for EngineConfig {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> ConfigResult<Self> {
        let mut config = Self::default();

        let mut seen = BTreeSet::new();
        for entry in file.suppression {
            let kind = kind_name(&entry.kind, "suppression.kind")?;
            if !seen.insert(kind.clone()) {
                return Err(ConfigError::DuplicateKind {
                    table: "suppression",
                    kind,
                });
            }
            config = config.with_suppression_rule(SuppressionRule::new(
                kind,
                Duration::from_secs(entry.cooldown_secs),
                entry.max_per_hour,
            ));
        }

        let mut seen = BTreeSet::new();
        for entry in file.policies {
            let kind = kind_name(&entry.kind, "policies.kind")?;
            if !seen.insert(kind.clone()) {
                return Err(ConfigError::DuplicateKind {
                    table: "policies",
                    kind,
                });
            }
            config = config.with_policy(ReaperPolicy::new(
                kind,
                entry.action,
                entry.require_confirmation,
            ));
        }

        config.adapter_timeout = file.adapter_timeout_ms.map(Duration::from_millis);
        config.confirmation_ttl = Duration::from_secs(file.confirmation_ttl_secs);
        config.history_capacity = NonZeroUsize::new(file.history_capacity)
            .ok_or_else(|| ConfigError::invalid("history_capacity", "must be greater than zero"))?;
        config.max_clock_skew = Duration::from_secs(file.max_clock_skew_secs);
        config.reaper_enabled = file.reaper_enabled;
        config.throttle_delay = Duration::from_millis(file.throttle_delay_ms);

        config.validate()?;
        Ok(config)
    }
}

impl EngineConfig {
    /// Replaces (or adds) the suppression rule for the rule's kind.
    #[must_use]
    pub fn with_suppression_rule(mut self, rule: SuppressionRule) -> Self {
        self.suppression_rules.retain(|existing| existing.kind() != rule.kind());
        self.suppression_rules.push(rule);
        self
    }

    /// Replaces (or adds) the policy for the entry's kind.
    #[must_use]
    pub fn with_policy(mut self, policy: ReaperPolicy) -> Self {
        self.policies.retain(|existing| existing.kind() != policy.kind());
        self.policies.push(policy);
        self
    }

    /// Sets the per-call adapter timeout.
    #[must_use]
    pub fn with_adapter_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    /// Sets how long a pending confirmation stays valid.
    #[must_use]
    pub fn with_confirmation_ttl(mut self, ttl: Duration) -> Self {
        self.confirmation_ttl = ttl;
        self
    }

    /// Sets the number of retained action records.
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Sets the tolerated clock skew for signal timestamps.
    #[must_use]
    pub fn with_max_clock_skew(mut self, skew: Duration) -> Self {
        self.max_clock_skew = skew;
        self
    }

    /// Enables or disables non-alert reaper actions.
    #[must_use]
    pub fn with_reaper_enabled(mut self, enabled: bool) -> Self {
        self.reaper_enabled = enabled;
        self
    }

    /// Sets the delay imposed on throttled targets.
    #[must_use]
    pub fn with_throttle_delay(mut self, delay: Duration) -> Self {
        self.throttle_delay = delay;
        self
    }

    /// Checks invariants the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a table repeats a kind, a kind is blank, or
    /// a duration the engine divides time by is zero.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = BTreeSet::new();
        for rule in &self.suppression_rules {
            if rule.kind().as_str().trim().is_empty() {
                return Err(ConfigError::invalid(
                    "suppression.kind",
                    "signal kind must not be empty",
                ));
            }
            if !seen.insert(rule.kind()) {
                return Err(ConfigError::DuplicateKind {
                    table: "suppression",
                    kind: rule.kind().clone(),
                });
            }
        }
        let mut seen = BTreeSet::new();
        for policy in &self.policies {
            if policy.kind().as_str().trim().is_empty() {
                return Err(ConfigError::invalid(
                    "policies.kind",
                    "signal kind must not be empty",
                ));
            }
            if !seen.insert(policy.kind()) {
                return Err(ConfigError::DuplicateKind {
                    table: "policies",
                    kind: policy.kind().clone(),
                });
            }
        }
        if self.adapter_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ConfigError::invalid(
                "adapter_timeout_ms",
                "must be greater than zero when set",
            ));
        }
        if self.confirmation_ttl.is_zero() {
            return Err(ConfigError::invalid(
                "confirmation_ttl_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Returns the suppression table.
    #[must_use]
    pub fn suppression_rules(&self) -> &[SuppressionRule] {
        &self.suppression_rules
    }

    /// Returns the policy table.
    #[must_use]
    pub fn policies(&self) -> &[ReaperPolicy] {
        &self.policies
    }

    /// Returns the per-call adapter timeout, if any.
    #[must_use]
    pub const fn adapter_timeout(&self) -> Option<Duration> {
        self.adapter_timeout
    }

    /// Returns the pending confirmation lifetime.
    #[must_use]
    pub const fn confirmation_ttl(&self) -> Duration {
        self.confirmation_ttl
    }

    /// Returns the action history capacity.
    #[must_use]
    pub const fn history_capacity(&self) -> NonZeroUsize {
        self.history_capacity
    }

    /// Returns the tolerated signal clock skew.
    #[must_use]
    pub const fn max_clock_skew(&self) -> Duration {
        self.max_clock_skew
    }

    /// Returns whether non-alert actions are enabled.
    #[must_use]
    pub const fn reaper_enabled(&self) -> bool {
        self.reaper_enabled
    }

    /// Returns the delay imposed on throttled targets.
    #[must_use]
    pub const fn throttle_delay(&self) -> Duration {
        self.throttle_delay
    }
}
