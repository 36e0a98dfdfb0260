//! Secrets and small configuration documents read from a project checkout.
//!
//! Secrets only ever come from the process environment (populated from
//! `.env` by the CLI). Static documents are plain YAML next to the project.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::ConfigError;

pub const RUNTIME_CONFIG_FILENAME: &str = "runtime_config.yaml";
pub const VERSION_FILENAME: &str = "VERSION";

/// Read an API key from the environment.
///
/// The value is trimmed; an absent or blank variable is
/// [`ConfigError::MissingEnv`] naming both the variable and the service.
pub fn load_api_key(env_var: &str, service: &str) -> Result<String, ConfigError> {
    match env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => {
            debug!(env_var, service, "API key loaded");
            Ok(value.trim().to_string())
        }
        _ => {
            error!(env_var, service, "API key missing");
            Err(ConfigError::MissingEnv {
                var: env_var.to_string(),
                service: service.to_string(),
            })
        }
    }
}

/// Load `<root>/<filename>` as an untyped YAML document.
pub fn load_yaml_config(root: &Path, filename: &str) -> Result<serde_yaml::Value, ConfigError> {
    let path = root.join(filename);
    info!(config_path = %path.display(), "Loading configuration from file");

    if !path.exists() {
        error!(config_path = %path.display(), "Config file not found");
        return Err(ConfigError::NotFound(path));
    }
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    match serde_yaml::from_str(&content) {
        Ok(value) => {
            info!(config_path = %path.display(), "Config file parsed successfully");
            Ok(value)
        }
        Err(source) => {
            error!(error = ?source, config_path = %path.display(), "Failed to parse YAML config");
            Err(ConfigError::Parse { path, source })
        }
    }
}

/// Trimmed contents of the version file at `<root>/<filename>`.
pub fn load_version(root: &Path, filename: &str) -> Result<String, ConfigError> {
    let path = root.join(filename);
    match fs::read_to_string(&path) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!(version_path = %path.display(), "Version file not found");
            Err(ConfigError::NotFound(path))
        }
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

/// Optional per-checkout overrides (`runtime_config.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub log_level: Option<String>,
}

impl RuntimeConfig {
    pub fn trace_loaded(&self) {
        info!(log_level = ?self.log_level, "Loaded RuntimeConfig");
        debug!(?self, "RuntimeConfig loaded (full debug)");
    }
}

/// Read `runtime_config.yaml` under `root`. A missing file yields defaults.
pub fn load_runtime_config(root: &Path) -> Result<RuntimeConfig, ConfigError> {
    let path = root.join(RUNTIME_CONFIG_FILENAME);
    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }
    let value = load_yaml_config(root, RUNTIME_CONFIG_FILENAME)?;
    let config: RuntimeConfig = if value.is_null() {
        RuntimeConfig::default()
    } else {
        serde_yaml::from_value(value).map_err(|source| ConfigError::Parse { path, source })?
    };
    config.trace_loaded();
    Ok(config)
}
