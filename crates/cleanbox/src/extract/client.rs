//! OpenAI Assistants API (v2) client.
//!
//! One extraction is one thread: create-and-run with the user message,
//! poll the run until it settles, then read the assistant's reply.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::ExtractionError;
use super::types::{strip_json_fence, ExtractionInput, PackageDetails, PromoDetails};
use super::Extractor;
use crate::config::OpenAiConfig;
use crate::sanitize::truncate_for_log;

const ASSISTANTS_BETA_HEADER: &str = "assistants=v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`OpenAiAssistantClient`].
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub api_key: SecretString,
    pub base_url: String,
    pub promo_assistant_id: Option<String>,
    pub package_assistant_id: Option<String>,
    pub poll_interval: Duration,
    pub run_timeout: Duration,
}

impl AssistantSettings {
    pub fn from_config(config: &OpenAiConfig, api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: config.base_url.clone(),
            promo_assistant_id: config.promo_assistant_id.clone(),
            package_assistant_id: config.package_assistant_id.clone(),
            poll_interval: config.poll_interval(),
            run_timeout: config.run_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Run {
    id: String,
    #[serde(default)]
    thread_id: Option<String>,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

/// Extraction backed by two OpenAI assistants, one for promos and one
/// for package tracking.
pub struct OpenAiAssistantClient {
    http: Client,
    settings: AssistantSettings,
}

impl OpenAiAssistantClient {
    pub fn new(settings: AssistantSettings) -> Result<Self, ExtractionError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExtractionError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.settings.api_key.expose_secret())
            .header("OpenAI-Beta", ASSISTANTS_BETA_HEADER)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ExtractionError> {
        let response = self.authorized(request).send().await?;
        if !response.status().is_success() {
            return Err(error_for(response).await);
        }
        Ok(response.json().await?)
    }

    /// Runs the assistant and returns its raw text reply, if any.
    async fn run_assistant(
        &self,
        assistant_id: &str,
        input: &ExtractionInput,
    ) -> Result<Option<String>, ExtractionError> {
        let body = json!({
            "assistant_id": assistant_id,
            "thread": {
                "messages": [{
                    "role": "user",
                    "content": format_user_message(input, Local::now().date_naive()),
                }]
            }
        });

        let mut run: Run = self
            .send(self.http.post(self.url("/threads/runs")).json(&body))
            .await?;
        let thread_id = run
            .thread_id
            .clone()
            .ok_or_else(|| ExtractionError::Protocol("run has no thread_id".to_string()))?;
        debug!(run_id = %run.id, thread_id = %thread_id, "Assistant run created");

        let started = Instant::now();
        while run.status != "completed" {
            if matches!(run.status.as_str(), "failed" | "cancelled" | "expired") {
                let message = run
                    .last_error
                    .as_ref()
                    .map(|e| {
                        format!(
                            "{}: {}",
                            e.code.as_deref().unwrap_or("error"),
                            e.message.as_deref().unwrap_or_default()
                        )
                    })
                    .unwrap_or_else(|| run.status.clone());
                return Err(ExtractionError::RunFailed {
                    status: run.status,
                    message,
                });
            }

            if started.elapsed() > self.settings.run_timeout {
                warn!(run_id = %run.id, "Assistant run timed out");
                return Err(ExtractionError::Timeout {
                    secs: self.settings.run_timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.settings.poll_interval).await;
            run = self
                .send(
                    self.http
                        .get(self.url(&format!("/threads/{}/runs/{}", thread_id, run.id))),
                )
                .await?;
        }

        let messages: MessageList = self
            .send(self.http.get(self.url(&format!("/threads/{}/messages", thread_id))))
            .await?;

        let reply = messages
            .data
            .into_iter()
            .find(|m| m.role == "assistant")
            .and_then(|m| m.content.into_iter().next())
            .filter(|block| block.kind == "text")
            .and_then(|block| block.text)
            .map(|text| text.value);

        Ok(reply)
    }

    async fn extract<T: DeserializeOwned>(
        &self,
        assistant_id: Option<&str>,
        kind: &str,
        input: &ExtractionInput,
    ) -> Result<Option<T>, ExtractionError> {
        let assistant_id = assistant_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ExtractionError::NotConfigured(format!("{} assistant id", kind)))?;

        let Some(reply) = self.run_assistant(assistant_id, input).await? else {
            debug!(kind, "Assistant returned no text reply");
            return Ok(None);
        };

        match serde_json::from_str::<T>(strip_json_fence(&reply)) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                warn!(kind, error = %e, "Assistant reply is not valid JSON");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Extractor for OpenAiAssistantClient {
    async fn extract_promo(
        &self,
        input: &ExtractionInput,
    ) -> Result<Option<PromoDetails>, ExtractionError> {
        self.extract(self.settings.promo_assistant_id.as_deref(), "promo", input)
            .await
    }

    async fn extract_package(
        &self,
        input: &ExtractionInput,
    ) -> Result<Option<PackageDetails>, ExtractionError> {
        self.extract(
            self.settings.package_assistant_id.as_deref(),
            "package",
            input,
        )
        .await
    }
}

async fn error_for(response: Response) -> ExtractionError {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|secs| secs.ceil() as u64);
        return ExtractionError::RateLimited { retry_after };
    }
    let body = response.text().await.unwrap_or_default();
    ExtractionError::Api {
        status: status.as_u16(),
        message: truncate_for_log(&body),
    }
}

/// Builds the user message. The current date lets the model resolve
/// relative dates such as "arrives Friday".
pub fn format_user_message(input: &ExtractionInput, today: NaiveDate) -> String {
    format!(
        "CURRENT DATE: {}\nCURRENT YEAR: {}\n\nSubject: {}\nSender: {}\n\nBody:\n{}",
        today.format("%B %-d, %Y"),
        today.format("%Y"),
        input.subject,
        input.sender,
        input.body
    )
    .trim()
    .to_string()
}
