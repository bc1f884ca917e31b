//! Anomaly signal model.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, LineageId, Result, RunId};

/// Category of a detected anomaly.
///
/// Kinds the engine has no built-in name for are kept as [`SignalKind::Other`]
/// and fall into the unconfigured category instead of being rejected.
///
/// Equality, hashing and ordering compare [`SignalKind::as_str`], so
/// `Other("token_spike")` is the same kind as [`SignalKind::TokenSpike`].
/// Prefer `SignalKind::from` when building kinds from names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignalKind {
    /// Token consumption jumped well above the run's baseline.
    TokenSpike,
    /// Errors arrived in a burst.
    ErrorBurst,
    /// The same tool was called repeatedly without progress.
    ToolLoop,
    /// Spend jumped well above the run's baseline.
    CostSpike,
    /// Any kind not known to this build.
    Other(String),
}

impl SignalKind {
    /// Returns the snake_case name used in configuration and logs.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TokenSpike => "token_spike",
            Self::ErrorBurst => "error_burst",
            Self::ToolLoop => "tool_loop",
            Self::CostSpike => "cost_spike",
            Self::Other(name) => name,
        }
    }
}

impl PartialEq for SignalKind {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for SignalKind {}

impl Hash for SignalKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for SignalKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SignalKind {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl From<String> for SignalKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "token_spike" => Self::TokenSpike,
            "error_burst" => Self::ErrorBurst,
            "tool_loop" => Self::ToolLoop,
            "cost_spike" => Self::CostSpike,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for SignalKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<SignalKind> for String {
    fn from(value: SignalKind) -> Self {
        match value {
            SignalKind::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl Display for SignalKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    #[default]
    Info,
    /// Degraded behaviour worth attention.
    Warning,
    /// Behaviour that needs intervention.
    Critical,
}

/// Grouping key over which suppression state is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    /// One bucket for the whole process.
    Global,
    /// One bucket per agent.
    Agent(String),
    /// One bucket per run.
    Run(RunId),
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Agent(agent) => write!(f, "agent:{agent}"),
            Self::Run(run) => write!(f, "run:{run}"),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        if value == "global" {
            return Ok(Self::Global);
        }
        if let Some(agent) = value.strip_prefix("agent:") {
            if agent.trim().is_empty() {
                return Err(Error::InvalidId {
                    kind: "scope",
                    value,
                    reason: "agent scope needs an agent id",
                });
            }
            return Ok(Self::Agent(agent.to_owned()));
        }
        if let Some(run) = value.strip_prefix("run:") {
            return RunId::new(run).map(Self::Run);
        }
        Err(Error::InvalidId {
            kind: "scope",
            value,
            reason: "expected `global`, `agent:<id>` or `run:<id>`",
        })
    }
}

impl From<Scope> for String {
    fn from(value: Scope) -> Self {
        value.to_string()
    }
}

/// One detected anomalous condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySignal {
    kind: SignalKind,
    #[serde(default)]
    severity: Severity,
    run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lineage_id: Option<LineageId>,
    occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    payload: Map<String, Value>,
}

impl AnomalySignal {
    /// Creates a signal with no lineage, the default (per-run) scope, and an
    /// empty payload.
    #[must_use]
    pub fn new(
        kind: impl Into<SignalKind>,
        severity: Severity,
        run_id: RunId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: kind.into(),
            severity,
            run_id,
            lineage_id: None,
            occurred_at,
            scope: None,
            payload: Map::new(),
        }
    }

    /// Attaches the session lineage used for trace correlation.
    #[must_use]
    pub fn with_lineage(mut self, lineage_id: LineageId) -> Self {
        self.lineage_id = Some(lineage_id);
        self
    }

    /// Overrides the suppression scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Adds a payload entry.
    #[must_use]
    pub fn with_payload(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Returns the signal kind.
    #[must_use]
    pub fn kind(&self) -> &SignalKind {
        &self.kind
    }

    /// Returns the reported severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the run the signal was raised for.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Returns the lineage identifier, if any.
    #[must_use]
    pub fn lineage_id(&self) -> Option<&LineageId> {
        self.lineage_id.as_ref()
    }

    /// Returns the detector's timestamp.
    #[must_use]
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Returns the suppression scope, defaulting to the signal's run.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
            .clone()
            .unwrap_or_else(|| Scope::Run(self.run_id.clone()))
    }

    /// Returns the opaque detector payload.
    #[must_use]
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Rejects signals that must never reach suppression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignal`] when the kind is blank, the timestamp
    /// predates the unix epoch, or it lies further than `max_skew` ahead of
    /// `now`.
    pub fn validate(&self, now: DateTime<Utc>, max_skew: Duration) -> Result<()> {
        if self.kind.as_str().trim().is_empty() {
            return Err(Error::invalid_signal("signal kind is empty"));
        }
        if self.occurred_at < DateTime::<Utc>::UNIX_EPOCH {
            return Err(Error::invalid_signal(format!(
                "timestamp {} predates the unix epoch",
                self.occurred_at
            )));
        }
        let skew = chrono::Duration::from_std(max_skew).unwrap_or(chrono::Duration::MAX);
        if let Some(limit) = now.checked_add_signed(skew) {
            if self.occurred_at > limit {
                return Err(Error::invalid_signal(format!(
                    "timestamp {} is ahead of the clock ({now})",
                    self.occurred_at
                )));
            }
        }
        Ok(())
    }
}
