//! Promo code extraction for promotions-tab emails.

use std::sync::Arc;

use tracing::debug;

use super::details::{non_blank, parse_date};
use super::error::PipelineError;
use super::extraction_input;
use crate::config::ExtractionConfig;
use crate::db::email_repo::EmailRow;
use crate::db::promo_repo::{self, NewPromoCode};
use crate::db::Database;
use crate::extract::Extractor;

/// Category stored when the assistant does not name one.
pub const DEFAULT_PROMO_CATEGORY: &str = "Other";

pub struct PromoWriter {
    db: Database,
    extractor: Arc<dyn Extractor>,
    max_body_chars: usize,
}

impl PromoWriter {
    pub fn new(db: Database, extractor: Arc<dyn Extractor>, config: &ExtractionConfig) -> Self {
        Self {
            db,
            extractor,
            max_body_chars: config.max_body_chars,
        }
    }

    /// Extracts promo codes from an email and returns the number of rows
    /// created. A discount without a code is stored as a deal with a
    /// NULL code.
    pub async fn extract_promos(&self, email: &EmailRow) -> Result<usize, PipelineError> {
        let input = extraction_input(email, self.max_body_chars);
        let Some(details) = self.extractor.extract_promo(&input).await? else {
            return Ok(0);
        };

        let code = non_blank(details.code.as_deref());
        let discount_raw = non_blank(details.discount_raw.as_deref());
        if code.is_none() && discount_raw.is_none() {
            debug!(email_id = email.id, "No promo found");
            return Ok(0);
        }

        promo_repo::insert(
            &self.db,
            &NewPromoCode {
                email_id: email.id,
                code,
                discount_raw,
                brand: non_blank(details.brand.as_deref()),
                summary: non_blank(details.summary.as_deref()),
                category: non_blank(details.category.as_deref())
                    .unwrap_or_else(|| DEFAULT_PROMO_CATEGORY.to_string()),
                url: non_blank(details.url.as_deref()),
                expires_at: details.expires_at.as_deref().and_then(parse_date),
            },
        )?;
        Ok(1)
    }
}
