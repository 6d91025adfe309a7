//! Google OAuth2 access-token refresh.

use chrono::{DateTime, Duration, Utc};
use log::info;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::{GmailError, Result};
use crate::sanitize::truncate_for_log;

/// Tokens expiring within this window are refreshed before a scan.
pub const REFRESH_WINDOW_MINUTES: i64 = 5;

/// Response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub token_type: Option<String>,

    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Only present when Google rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry of the access token, relative to `now`.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        now.checked_add_signed(Duration::seconds(secs))
    }
}

/// Returns `true` if a token with this expiry should be refreshed now.
/// Unknown expiry is treated as still valid.
pub fn expires_soon(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expiry {
        Some(at) => at <= now + Duration::minutes(REFRESH_WINDOW_MINUTES),
        None => false,
    }
}

/// Exchanges a refresh token for a new access token.
pub(crate) async fn refresh_access_token(
    client: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: Option<&SecretString>,
    refresh_token: &SecretString,
) -> Result<TokenResponse> {
    info!("Refreshing Gmail access token");

    let mut params = vec![
        ("client_id", client_id),
        ("refresh_token", refresh_token.expose_secret()),
        ("grant_type", "refresh_token"),
    ];
    if let Some(secret) = client_secret {
        params.push(("client_secret", secret.expose_secret()));
    }

    let response = client
        .post(token_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| GmailError::OAuth2(format!("Token refresh failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(GmailError::OAuth2(format!(
            "Token refresh failed ({}): {}",
            status,
            truncate_for_log(&body)
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| GmailError::OAuth2(format!("Failed to parse refresh response: {}", e)))?;

    info!("Refreshed Gmail access token");
    Ok(token)
}
