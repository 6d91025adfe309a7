//! Turns stored emails into promo codes, package events and packages.

pub mod aggregator;
pub mod details;
pub mod error;
pub mod event_writer;
pub mod promo;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregator::Aggregator;
pub use details::EventDetails;
pub use error::PipelineError;
pub use event_writer::PackageEventWriter;
pub use promo::PromoWriter;

use crate::db::email_repo::EmailRow;
use crate::extract::{clean_email_for_ai, ExtractionInput};

/// Status of a package whose carrier reported delivery.
pub const STATUS_DELIVERED: &str = "delivered";
/// Status used when extraction returned none.
pub const STATUS_UNKNOWN: &str = "unknown";

/// Builds the cleaned prompt input for an email.
pub(crate) fn extraction_input(email: &EmailRow, max_body_chars: usize) -> ExtractionInput {
    let cleaned = clean_email_for_ai(
        &email.subject,
        email.snippet.as_deref().unwrap_or_default(),
        email.body.as_deref().unwrap_or_default(),
        max_body_chars,
    );
    ExtractionInput {
        body: cleaned.text_to_scan().to_string(),
        subject: cleaned.subject,
        sender: email.from_address.clone(),
    }
}
