//! Configuration for the anomaly reaper.
//!
//! Tables are loaded once at startup and never change afterwards; a malformed
//! file is fatal.

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{from_json_str, load_from_path};
pub use schema::{
    ConfigFile, EngineConfig, PolicyEntry, ReaperPolicy, SuppressionRule, SuppressionRuleEntry,
};
