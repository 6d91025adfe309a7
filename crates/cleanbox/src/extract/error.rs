use thiserror::Error;

/// Errors from the LLM extraction service.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction is not configured: {0}")]
    NotConfigured(String),

    #[error("Assistant run ended with status '{status}': {message}")]
    RunFailed { status: String, message: String },

    #[error("Assistant run did not complete within {secs}s")]
    Timeout { secs: u64 },

    #[error("OpenAI rate limit exceeded (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("OpenAI API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("OpenAI transport error: {0}")]
    Transport(String),

    /// The API answered 2xx with a body we could not use.
    #[error("Unexpected OpenAI response: {0}")]
    Protocol(String),
}

impl ExtractionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Timeout { .. }
            | ExtractionError::RateLimited { .. }
            | ExtractionError::Transport(_) => true,
            ExtractionError::Api { status, .. } => *status >= 500,
            ExtractionError::NotConfigured(_)
            | ExtractionError::RunFailed { .. }
            | ExtractionError::Protocol(_) => false,
        }
    }
}

impl From<reqwest::Error> for ExtractionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ExtractionError::Protocol(err.to_string())
        } else {
            ExtractionError::Transport(err.to_string())
        }
    }
}
