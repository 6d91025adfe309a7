//! Gmail access: message listing, raw fetch, trash and token refresh.
//!
//! The scan orchestrator only talks to the [`MailProvider`] trait, so tests
//! can substitute an in-memory mailbox for [`GmailClient`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

pub mod client;
pub mod error;
pub mod oauth;
pub mod parser;

pub use client::GmailClient;
pub use error::GmailError;
pub use oauth::{expires_soon, TokenResponse};

/// A message id returned by a list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: Option<String>,
}

/// A fully fetched and decoded message.
#[derive(Debug, Clone, Default)]
pub struct FetchedMessage {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub snippet: Option<String>,
    /// HTML when available, otherwise plain text.
    pub body: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub size: Option<i64>,
}

#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Lists message ids matching a Gmail search query.
    async fn list_messages(
        &self,
        access_token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, GmailError>;

    /// Fetches one message. `Ok(None)` when the message no longer exists.
    async fn get_message(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<Option<FetchedMessage>, GmailError>;

    async fn trash_message(&self, access_token: &str, message_id: &str) -> Result<(), GmailError>;

    async fn refresh_access_token(
        &self,
        refresh_token: &SecretString,
    ) -> Result<TokenResponse, GmailError>;
}

/// Builds the list query for a category tab, e.g. `category:updates newer_than:90d`.
pub fn category_query(category: &str, newer_than_days: u32) -> String {
    format!("category:{} newer_than:{}d", category, newer_than_days)
}
