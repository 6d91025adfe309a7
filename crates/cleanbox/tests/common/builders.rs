//! Builders for test data.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, TimeZone, Utc};

use cleanbox::db::email_repo::{self, NewEmail};
use cleanbox::db::event_repo::{self, NewPackageEvent};
use cleanbox::extract::{PackageDetails, PackageItem};
use cleanbox::gmail::FetchedMessage;
use cleanbox::pipeline::EventDetails;
use cleanbox::Database;

static EMAIL_SEQ: AtomicUsize = AtomicUsize::new(0);

/// `2026-05-01T{hour}:00:00Z`.
pub fn at_hour(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, hour, 0, 0).unwrap()
}

/// Builder for a stored package event and the email it came from.
pub struct EventBuilder {
    order_number: Option<String>,
    tracking_number: Option<String>,
    status: String,
    location: Option<String>,
    timestamp: DateTime<Utc>,
    details: EventDetails,
    raw_description: Option<String>,
}

impl EventBuilder {
    pub fn new(order_number: &str) -> Self {
        Self {
            order_number: Some(order_number.to_string()),
            tracking_number: None,
            status: "ordered".to_string(),
            location: None,
            timestamp: at_hour(0),
            details: EventDetails::default(),
            raw_description: None,
        }
    }

    pub fn no_order(mut self) -> Self {
        self.order_number = None;
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn at(mut self, hour: u32) -> Self {
        self.timestamp = at_hour(hour);
        self
    }

    pub fn tracking(mut self, tracking_number: &str) -> Self {
        self.tracking_number = Some(tracking_number.to_string());
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    pub fn brand(mut self, brand: &str) -> Self {
        self.details.brand = Some(brand.to_string());
        self
    }

    pub fn estimated(mut self, day: u32) -> Self {
        self.details.estimated_delivery = Some(Utc.with_ymd_and_hms(2026, 5, day, 0, 0, 0).unwrap());
        self
    }

    /// Stores `description` verbatim instead of encoding the details.
    pub fn raw_description(mut self, description: &str) -> Self {
        self.raw_description = Some(description.to_string());
        self
    }

    /// Inserts a fresh email for the account and the event linked to it.
    pub fn insert(self, db: &Database, account_id: i64) -> i64 {
        let seq = EMAIL_SEQ.fetch_add(1, Ordering::SeqCst);
        let email_id = email_repo::insert(
            db,
            &NewEmail {
                email_account_id: account_id,
                gmail_message_id: format!("evt-msg-{}", seq),
                category: Some("updates".to_string()),
                subject: "Order update".to_string(),
                from_address: "Shop <orders@shop.example>".to_string(),
                to_address: "me@example.com".to_string(),
                snippet: None,
                body: None,
                sent_at: Some(self.timestamp),
                size: None,
            },
        )
        .unwrap();

        let description = match self.raw_description {
            Some(raw) => raw,
            None => self.details.encode().unwrap(),
        };
        event_repo::insert(
            db,
            &NewPackageEvent {
                email_id: Some(email_id),
                order_number: self.order_number,
                tracking_number: self.tracking_number,
                status: self.status,
                location: self.location,
                description: Some(description),
                event_timestamp: self.timestamp,
            },
        )
        .unwrap()
    }
}

/// A fetched Gmail message with a plain text body.
pub fn message(id: &str, subject: &str, from: &str, hour: u32) -> FetchedMessage {
    FetchedMessage {
        id: id.to_string(),
        subject: subject.to_string(),
        from: from.to_string(),
        to: "me@example.com".to_string(),
        snippet: Some(subject.to_string()),
        body: Some(format!("<p>{}</p>", subject)),
        sent_at: Some(at_hour(hour)),
        size: Some(2048),
    }
}

/// Extraction result for a tracking email.
pub fn tracking_details(order_number: &str, status: &str) -> PackageDetails {
    PackageDetails {
        is_order_tracking: true,
        order_number: Some(order_number.to_string()),
        tracking_number: Some(format!("1Z{}", order_number)),
        carrier: Some("UPS".to_string()),
        status: Some(status.to_string()),
        brand: Some("Acme".to_string()),
        items: Some(vec![PackageItem {
            name: Some("Desk lamp".to_string()),
            quantity: Some(1),
            ..Default::default()
        }]),
        ..Default::default()
    }
}
