pub mod job;
pub mod queue;
pub mod scanner;

pub use job::{RetryPolicy, ScanJobStatus};
pub use queue::ScanQueue;
pub use scanner::{AccountScanner, ScanOptions};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Email account {id} not found")]
    AccountNotFound { id: i64 },

    #[error("Scan job {id} not found")]
    JobNotFound { id: i64 },

    #[error("Gmail request failed: {0}")]
    Gmail(#[from] crate::gmail::GmailError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Token decryption failed: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error(transparent)]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

impl ScanError {
    /// External API failures are retried by the queue; everything else is
    /// final for the job.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScanError::Gmail(e) => e.is_retryable(),
            ScanError::Pipeline(e) => e.is_retryable(),
            ScanError::AccountNotFound { .. }
            | ScanError::JobNotFound { .. }
            | ScanError::Database(_)
            | ScanError::Secret(_) => false,
        }
    }
}
