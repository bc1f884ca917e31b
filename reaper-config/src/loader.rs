//! Configuration loader implementations.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::schema::{ConfigFile, EngineConfig};
use crate::{ConfigError, ConfigResult};

/// Parses and validates a JSON configuration document.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields and any
/// validation error raised while building the [`EngineConfig`].
pub fn from_json_str(raw: &str) -> ConfigResult<EngineConfig> {
    let file: ConfigFile = serde_json::from_str(raw)?;
    EngineConfig::try_from(file)
}

/// Reads, parses, and validates the JSON configuration at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read, otherwise the
/// errors documented on [`from_json_str`].
pub fn load_from_path(path: impl AsRef<Path>) -> ConfigResult<EngineConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = from_json_str(&raw)?;
    info!(
        path = %path.display(),
        suppression_rules = config.suppression_rules().len(),
        policies = config.policies().len(),
        reaper_enabled = config.reaper_enabled(),
        "loaded reaper configuration"
    );
    Ok(config)
}
