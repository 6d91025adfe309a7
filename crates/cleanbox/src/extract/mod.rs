//! LLM extraction of promo codes and package tracking details.

mod cleaner;
mod client;
mod error;
mod types;

use async_trait::async_trait;

pub use cleaner::{clean_email_for_ai, strip_html, truncate_text, CleanedEmail, DEFAULT_MAX_BODY_CHARS};
pub use client::{format_user_message, AssistantSettings, OpenAiAssistantClient};
pub use error::ExtractionError;
pub use types::{strip_json_fence, ExtractionInput, PackageDetails, PackageItem, PromoDetails};

/// Turns a cleaned email into structured details.
///
/// `Ok(None)` means the model answered but nothing usable came back.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract_promo(
        &self,
        input: &ExtractionInput,
    ) -> Result<Option<PromoDetails>, ExtractionError>;

    async fn extract_package(
        &self,
        input: &ExtractionInput,
    ) -> Result<Option<PackageDetails>, ExtractionError>;
}
