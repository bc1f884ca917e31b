//! Anomaly-response engine facade.
//!
//! Depend on this crate via `cargo add anomaly-reaper`. It bundles the reaper
//! crates behind feature flags; the default set enables the full engine.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use reaper_primitives as primitives;

/// Signal orchestration and reaper actions (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use reaper_kernel as kernel;

/// Suppression and policy resolution (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use reaper_policy as policy;

/// Trace correlation and tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use reaper_telemetry as telemetry;

/// Engine configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use reaper_config as config;

/// Engine entry point (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use reaper_kernel::ReaperEngine;
