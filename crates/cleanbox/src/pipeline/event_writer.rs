//! Package event extraction: one status snapshot per tracking email.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use super::details::{non_blank, EventDetails};
use super::error::PipelineError;
use super::{extraction_input, STATUS_UNKNOWN};
use crate::config::ExtractionConfig;
use crate::db::email_repo::EmailRow;
use crate::db::event_repo::{self, NewPackageEvent};
use crate::db::Database;
use crate::extract::Extractor;
use crate::sanitize::redact_address;

pub struct PackageEventWriter {
    db: Database,
    extractor: Arc<dyn Extractor>,
    blacklisted_senders: Vec<String>,
    max_body_chars: usize,
}

impl PackageEventWriter {
    pub fn new(db: Database, extractor: Arc<dyn Extractor>, config: &ExtractionConfig) -> Self {
        Self {
            db,
            extractor,
            blacklisted_senders: config
                .blacklisted_senders
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            max_body_chars: config.max_body_chars,
        }
    }

    /// Case-insensitive substring match against the sender blacklist.
    pub fn is_blacklisted(&self, sender: &str) -> bool {
        let sender = sender.to_lowercase();
        self.blacklisted_senders
            .iter()
            .any(|pattern| sender.contains(pattern.as_str()))
    }

    /// Extracts a package event from an email.
    ///
    /// Returns `true` when the email has an event afterwards, including
    /// one written by an earlier pass. `force` re-runs extraction and
    /// updates the existing event in place.
    pub async fn extract_package_event(
        &self,
        email: &EmailRow,
        force: bool,
    ) -> Result<bool, PipelineError> {
        if self.is_blacklisted(&email.from_address) {
            debug!(
                email_id = email.id,
                sender = %redact_address(&email.from_address),
                "Skipping blacklisted sender"
            );
            return Ok(false);
        }

        let existing = event_repo::find_by_email_id(&self.db, email.id)?;
        if existing.is_some() && !force {
            return Ok(true);
        }

        let input = extraction_input(email, self.max_body_chars);
        let Some(details) = self.extractor.extract_package(&input).await? else {
            debug!(email_id = email.id, "No package details extracted");
            return Ok(false);
        };
        if !details.is_order_tracking {
            return Ok(false);
        }
        let Some(order_number) = non_blank(details.order_number.as_deref()) else {
            debug!(email_id = email.id, "Tracking email has no order number");
            return Ok(false);
        };

        let event = NewPackageEvent {
            email_id: Some(email.id),
            order_number: Some(order_number),
            tracking_number: non_blank(details.tracking_number.as_deref()),
            status: non_blank(details.status.as_deref())
                .unwrap_or_else(|| STATUS_UNKNOWN.to_string()),
            location: non_blank(details.current_location.as_deref()),
            description: Some(EventDetails::from_extraction(&details).encode()?),
            event_timestamp: email.sent_at.unwrap_or_else(Utc::now),
        };

        match existing {
            Some(row) => {
                event_repo::update_extracted(&self.db, row.id, &event)?;
                info!(email_id = email.id, event_id = row.id, "Package event re-extracted");
            }
            None => {
                let id = event_repo::insert(&self.db, &event)?;
                info!(email_id = email.id, event_id = id, status = %event.status, "Package event recorded");
            }
        }
        Ok(true)
    }
}
