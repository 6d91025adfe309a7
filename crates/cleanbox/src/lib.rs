pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod gmail;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod worker;

pub use config::{load_config, load_config_or_default, Config};
pub use db::Database;
pub use error::{CleanboxError, ConfigError, Result};
pub use extract::{Extractor, ExtractionError, OpenAiAssistantClient};
pub use gmail::{GmailClient, GmailError, MailProvider};
pub use pipeline::{Aggregator, PackageEventWriter, PipelineError, PromoWriter};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError, TokenEncryptor};
pub use worker::{AccountScanner, ScanError, ScanQueue};
