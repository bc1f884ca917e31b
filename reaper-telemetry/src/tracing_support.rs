//! Structured tracing helpers.

use tracing::Span;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::TraceContext;

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` when the variable is unset or invalid.
///
/// # Errors
///
/// Returns an error when a global subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish()
        .try_init()
}

/// Returns a span carrying the correlation ids of `trace`.
#[must_use]
pub fn correlation_span(trace: &TraceContext) -> Span {
    tracing::info_span!(
        "reaper",
        run_id = %trace.run_id(),
        trace_id = %trace.trace_id(),
        span_id = %trace.span_id(),
        parent_span_id = trace.parent_span_id().unwrap_or_default(),
    )
}
