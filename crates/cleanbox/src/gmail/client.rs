//! Gmail REST API client.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response, StatusCode};
use secrecy::SecretString;
use serde::Deserialize;

use super::error::{GmailError, Result};
use super::oauth::{self, TokenResponse};
use super::parser::{decode_base64url, parse_message, RawEnvelope};
use super::{FetchedMessage, MailProvider, MessageRef};
use crate::config::GmailConfig;
use crate::sanitize::truncate_for_log;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageStub {
    id: String,
    #[serde(default)]
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessageResponse {
    id: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    size_estimate: Option<i64>,
    #[serde(default)]
    raw: Option<String>,
}

/// Client for the Gmail API and Google's token endpoint.
pub struct GmailClient {
    http: Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: Option<SecretString>,
}

impl GmailClient {
    pub fn new(config: &GmailConfig, client_secret: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GmailError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/users/me/messages", self.api_base)
    }
}

/// Maps a non-success response to a [`GmailError`].
async fn error_for(response: Response) -> GmailError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => GmailError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => GmailError::RateLimited {
            retry_after: response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
        },
        _ => {
            let body = response.text().await.unwrap_or_default();
            GmailError::Http {
                status: status.as_u16(),
                message: truncate_for_log(&body),
            }
        }
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_messages(
        &self,
        access_token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageRef>> {
        let response = self
            .http
            .get(self.messages_url())
            .bearer_auth(access_token)
            .query(&[("q", query), ("maxResults", &max_results.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let list: MessageListResponse = response.json().await?;
        debug!("Query '{}' matched {} messages", query, list.messages.len());

        Ok(list
            .messages
            .into_iter()
            .map(|m| MessageRef {
                id: m.id,
                thread_id: m.thread_id,
            })
            .collect())
    }

    async fn get_message(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<Option<FetchedMessage>> {
        let response = self
            .http
            .get(format!("{}/{}", self.messages_url(), message_id))
            .bearer_auth(access_token)
            .query(&[("format", "raw")])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Message {} no longer exists", message_id);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let detail: RawMessageResponse = response.json().await?;
        let Some(raw) = detail.raw.as_deref() else {
            return Ok(None);
        };
        let bytes = decode_base64url(raw)?;

        let envelope = RawEnvelope {
            id: &detail.id,
            snippet: detail.snippet.as_deref(),
            internal_date: detail.internal_date.as_deref(),
            size_estimate: detail.size_estimate,
        };
        parse_message(&envelope, &bytes).map(Some)
    }

    async fn trash_message(&self, access_token: &str, message_id: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/{}/trash", self.messages_url(), message_id))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for(response).await);
        }
        Ok(())
    }

    async fn refresh_access_token(&self, refresh_token: &SecretString) -> Result<TokenResponse> {
        if self.client_id.is_empty() {
            return Err(GmailError::OAuth2(
                "gmail.clientId is not configured".to_string(),
            ));
        }
        oauth::refresh_access_token(
            &self.http,
            &self.token_url,
            &self.client_id,
            self.client_secret.as_ref(),
            refresh_token,
        )
        .await
    }
}
