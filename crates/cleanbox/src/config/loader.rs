use std::path::{Path, PathBuf};

use crate::config::schema::{Config, KNOWN_CATEGORIES};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Returns the default config location: `~/.cleanbox/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".cleanbox").join("config.json"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Loads the config at `path`, or at the default location when `None`.
///
/// A missing file at the default location yields the built-in defaults;
/// an explicitly given path must exist.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => {
            log::debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.gmail.categories.is_empty() {
        return Err(ConfigError::Validation {
            message: "gmail.categories must name at least one category".to_string(),
        });
    }
    if let Some(unknown) = config
        .gmail
        .categories
        .iter()
        .find(|c| !KNOWN_CATEGORIES.contains(&c.as_str()))
    {
        return Err(ConfigError::Validation {
            message: format!("Unknown gmail category: {}", unknown),
        });
    }

    if config.gmail.max_results == 0 {
        return Err(ConfigError::Validation {
            message: "gmail.maxResults must be positive".to_string(),
        });
    }
    if config.queue.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "queue.maxAttempts must be positive".to_string(),
        });
    }
    if config.openai.run_timeout_secs == 0 || config.openai.poll_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "openai timings must be positive".to_string(),
        });
    }

    Ok(())
}
