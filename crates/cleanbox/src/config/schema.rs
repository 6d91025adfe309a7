use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::secrets::{expand_home, resolve_secret, resolve_secret_optional};

/// Gmail category tabs the scanner knows how to route.
pub const KNOWN_CATEGORIES: &[&str] = &["promotions", "updates"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            gmail: GmailConfig::default(),
            openai: OpenAiConfig::default(),
            extraction: ExtractionConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Falls back to `~/.cleanbox/data/cleanbox.db`.
    #[serde(default)]
    pub path: Option<String>,
}

impl DatabaseConfig {
    /// The configured path with `~` expanded, or the default location.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        match self.path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(PathBuf::from(expand_home(path))),
            _ => crate::db::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_secret_file: Option<String>,
    #[serde(default = "default_client_secret_env_var")]
    pub client_secret_env_var: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_newer_than_days")]
    pub newer_than_days: u32,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_gmail_api_base")]
    pub api_base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

fn default_client_secret_env_var() -> Option<String> {
    Some("GOOGLE_CLIENT_SECRET".to_string())
}

fn default_max_results() -> u32 {
    200
}

fn default_newer_than_days() -> u32 {
    90
}

fn default_categories() -> Vec<String> {
    KNOWN_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

fn default_gmail_api_base() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl GmailConfig {
    /// Resolves the OAuth client secret. Absent when no source is configured.
    pub fn resolve_client_secret(&self) -> Result<Option<SecretString>, ConfigError> {
        resolve_secret_optional(
            self.client_secret.as_deref(),
            self.client_secret_file.as_deref(),
            self.client_secret_env_var.as_deref(),
        )
        .or_else(|e| match e {
            crate::secrets::SecretError::EnvVarNotSet { .. } => Ok(None),
            other => Err(ConfigError::Secret {
                name: "gmail.clientSecret".to_string(),
                source: other,
            }),
        })
    }
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            client_secret_file: None,
            client_secret_env_var: default_client_secret_env_var(),
            max_results: default_max_results(),
            newer_than_days: default_newer_than_days(),
            categories: default_categories(),
            api_base_url: default_gmail_api_base(),
            token_url: default_token_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_openai_base")]
    pub base_url: String,
    #[serde(default)]
    pub promo_assistant_id: Option<String>,
    #[serde(default)]
    pub package_assistant_id: Option<String>,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_api_key_env_var() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_run_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            base_url: default_openai_base(),
            promo_assistant_id: None,
            package_assistant_id: None,
            run_timeout_secs: default_run_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl OpenAiConfig {
    pub fn resolve_api_key(&self) -> Result<SecretString, ConfigError> {
        resolve_secret(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            self.api_key_env_var.as_deref(),
        )
        .map_err(|source| ConfigError::Secret {
            name: "openai.apiKey".to_string(),
            source,
        })
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionConfig {
    /// Case-insensitive substrings matched against the sender.
    #[serde(default = "default_blacklisted_senders")]
    pub blacklisted_senders: Vec<String>,
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
}

fn default_blacklisted_senders() -> Vec<String> {
    vec!["paypal.com".to_string(), "@paypal.".to_string()]
}

fn default_max_body_chars() -> usize {
    8000
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            blacklisted_senders: default_blacklisted_senders(),
            max_body_chars: default_max_body_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_queue_poll_secs")]
    pub poll_interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    5
}

fn default_queue_poll_secs() -> u64 {
    5
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            poll_interval_secs: default_queue_poll_secs(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
