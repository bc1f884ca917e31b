//! Observability utilities for the anomaly reaper.
//!
//! Trace contexts are keyed by run and shared with every adapter that acts on
//! the run, so downstream systems can correlate their own telemetry with the
//! reaper's decisions.

#![warn(missing_docs, clippy::pedantic)]

pub mod trace_context;
pub mod tracing_support;

pub use trace_context::{
    TraceContext, TraceContextManager, TraceError, TraceResult, derive_trace_id,
};
pub use tracing_support::{correlation_span, init_tracing};
