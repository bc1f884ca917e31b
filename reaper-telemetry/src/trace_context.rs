//! Per-run trace and span identifiers.
//!
//! Trace ids for runs that carry a lineage id are derived with SHA-256 over the
//! UTF-8 bytes of the lineage id, truncated to the first 16 bytes and rendered
//! as 32 lowercase hex characters. Any process applying the same derivation
//! lands on the same trace id without sharing state. Runs without a lineage get
//! 128 random bits in the same encoding; span ids are always 64 random bits
//! rendered as 16 lowercase hex characters.

use std::fmt;

use reaper_primitives::{KeyedStore, LineageId, RunId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Errors emitted by the trace context manager.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceError {
    /// No context has been started for the run.
    #[error("no trace context for run {0}")]
    NotFound(RunId),
}

/// Result alias for trace operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Correlation identifiers attached to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    trace_id: String,
    span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
    run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lineage_id: Option<LineageId>,
}

impl TraceContext {
    fn root(run_id: RunId, lineage_id: Option<LineageId>) -> Self {
        let trace_id = lineage_id
            .as_ref()
            .map_or_else(random_trace_id, derive_trace_id);
        Self {
            trace_id,
            span_id: random_span_id(),
            parent_span_id: None,
            run_id,
            lineage_id,
        }
    }

    /// Returns a copy of this context re-parented under a new span.
    #[must_use]
    pub fn child(&self, span_id: String) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            parent_span_id: Some(self.span_id.clone()),
            span_id,
            run_id: self.run_id.clone(),
            lineage_id: self.lineage_id.clone(),
        }
    }

    /// Returns the trace identifier.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Returns the span identifier.
    #[must_use]
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// Returns the parent span identifier, if any.
    #[must_use]
    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    /// Returns the run this context belongs to.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Returns the lineage identifier, if any.
    #[must_use]
    pub fn lineage_id(&self) -> Option<&LineageId> {
        self.lineage_id.as_ref()
    }

    /// Renders a W3C `traceparent` header value (sampled).
    #[must_use]
    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.trace_id, self.span_id)
    }
}

/// Derives the trace id for a lineage.
#[must_use]
pub fn derive_trace_id(lineage_id: &LineageId) -> String {
    let digest = Sha256::digest(lineage_id.as_str().as_bytes());
    hex::encode(&digest[..16])
}

fn random_trace_id() -> String {
    loop {
        let value: u128 = rand::random();
        if value != 0 {
            return format!("{value:032x}");
        }
    }
}

fn random_span_id() -> String {
    loop {
        let value: u64 = rand::random();
        if value != 0 {
            return format!("{value:016x}");
        }
    }
}

/// Stores the root trace context of every live run.
#[derive(Debug, Default)]
pub struct TraceContextManager {
    contexts: KeyedStore<RunId, TraceContext>,
}

impl TraceContextManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or returns the existing) context for `run_id`.
    ///
    /// # Panics
    ///
    /// Panics if the context slot lock has been poisoned.
    pub fn start(&self, run_id: &RunId, lineage_id: Option<&LineageId>) -> TraceContext {
        let slot = self.contexts.slot(run_id, || {
            let context = TraceContext::root(run_id.clone(), lineage_id.cloned());
            debug!(
                run_id = %run_id,
                trace_id = %context.trace_id,
                span_id = %context.span_id,
                "trace context started"
            );
            context
        });
        slot.lock().expect("trace context poisoned").clone()
    }

    /// Returns the stored context for `run_id`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the context slot lock has been poisoned.
    #[must_use]
    pub fn get(&self, run_id: &RunId) -> Option<TraceContext> {
        self.contexts
            .get(run_id)
            .map(|slot| slot.lock().expect("trace context poisoned").clone())
    }

    /// Mints a new span id under the run's root span.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::NotFound`] when the run has no context.
    pub fn child_span(&self, run_id: &RunId) -> TraceResult<String> {
        if self.contexts.get(run_id).is_none() {
            return Err(TraceError::NotFound(run_id.clone()));
        }
        Ok(random_span_id())
    }

    /// Discards the context for `run_id`. No-op when absent.
    pub fn end(&self, run_id: &RunId) {
        if self.contexts.remove(run_id).is_some() {
            debug!(run_id = %run_id, "trace context ended");
        }
    }

    /// Discards every stored context.
    pub fn clear(&self) {
        self.contexts.clear();
    }

    /// Returns the number of live contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns `true` when no contexts are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
