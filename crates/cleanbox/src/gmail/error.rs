//! Gmail API error types.

use thiserror::Error;

/// Errors from the Gmail REST API and the Google token endpoint.
#[derive(Error, Debug)]
pub enum GmailError {
    /// Non-success HTTP status.
    #[error("Gmail API returned {status}: {message}")]
    Http { status: u16, message: String },

    /// HTTP 429; `retry_after` in seconds when the server sent one.
    #[error("Gmail API rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// HTTP 401, the access token was rejected.
    #[error("Gmail access token rejected")]
    Unauthorized,

    /// Connection, TLS or timeout failure.
    #[error("Gmail transport error: {0}")]
    Transport(String),

    /// The response or the raw message could not be decoded.
    #[error("Failed to decode Gmail message: {0}")]
    Decode(String),

    /// OAuth2 token refresh failed.
    #[error("OAuth2 token refresh failed: {0}")]
    OAuth2(String),
}

impl GmailError {
    /// Whether a later attempt may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            GmailError::RateLimited { .. } | GmailError::Transport(_) => true,
            GmailError::Http { status, .. } => *status >= 500,
            GmailError::Unauthorized | GmailError::Decode(_) | GmailError::OAuth2(_) => false,
        }
    }
}

impl From<reqwest::Error> for GmailError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GmailError::Decode(err.to_string())
        } else {
            GmailError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, GmailError>;
