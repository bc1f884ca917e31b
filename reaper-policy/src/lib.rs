//! Suppression and policy evaluation for admitted anomaly signals.

#![warn(missing_docs, clippy::pedantic)]

pub mod decision;
pub mod engine;
pub mod suppression;

pub use decision::ReaperDecision;
pub use engine::{PolicyEngine, StaticPolicyEngine};
pub use suppression::{
    Denial, SuppressionController, SuppressionKey, SuppressionSnapshot, SuppressionVerdict,
};
