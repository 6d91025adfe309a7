use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] crate::extract::ExtractionError),

    #[error("Storage failed: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Failed to encode event details: {0}")]
    Details(#[from] serde_json::Error),
}

impl PipelineError {
    /// True when the failure came from the extraction service and may
    /// succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Extraction(e) => e.is_retryable(),
            PipelineError::Database(_) | PipelineError::Details(_) => false,
        }
    }
}
