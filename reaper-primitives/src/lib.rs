//! Core shared types for the anomaly reaper.

#![warn(missing_docs, clippy::pedantic)]

mod action;
mod clock;
mod error;
mod ids;
mod keyed;
mod signal;

/// Corrective actions ordered by irreversibility.
pub use action::ReaperAction;
/// Time sources used for expiry and signal validation.
pub use clock::{Clock, ManualClock, SystemClock};
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Identifiers for runs, lineages, and pending confirmations.
pub use ids::{ConfirmationId, LineageId, RunId};
/// Sharded store handing out one lock per key.
pub use keyed::KeyedStore;
/// Inbound anomaly signal model.
pub use signal::{AnomalySignal, Scope, Severity, SignalKind};
