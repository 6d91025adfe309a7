//! Package aggregation.
//!
//! Orphan events are grouped by order number, merged in timestamp order
//! and written to one package per order. Each group is created or updated
//! and linked in its own transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, warn};

use super::details::EventDetails;
use super::error::PipelineError;
use super::{STATUS_DELIVERED, STATUS_UNKNOWN};
use crate::db::event_repo::{self, EventRow};
use crate::db::package_repo::{self, PackageFields, PackageRow};
use crate::db::{Database, DatabaseError};

/// The merged view of one order's events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedOrder {
    pub order_number: String,
    /// Email of the earliest event.
    pub first_email_id: Option<i64>,
    pub status: String,
    pub location: Option<String>,
    /// Timestamp of the newest parsable event.
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub tracking_numbers: Vec<String>,
    pub details: EventDetails,
    pub actual_delivery: Option<DateTime<Utc>>,
    /// Events whose description could not be decoded.
    pub skipped: usize,
}

impl AggregatedOrder {
    fn primary_tracking_number(&self) -> String {
        self.tracking_numbers
            .first()
            .cloned()
            .unwrap_or_else(|| placeholder_tracking_number(&self.order_number))
    }

    fn encoded_items(&self) -> Result<Option<String>, serde_json::Error> {
        self.details
            .items
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
    }

    /// Column values for a package created from this order alone.
    pub fn new_package_fields(&self) -> Result<PackageFields, serde_json::Error> {
        let d = &self.details;
        Ok(PackageFields {
            email_id: self.first_email_id,
            tracking_number: self.primary_tracking_number(),
            tracking_numbers: self.tracking_numbers.clone(),
            tracking_url: d.tracking_url.clone(),
            carrier: d.carrier.clone(),
            carrier_raw: d.carrier_raw.clone(),
            status: self.status.clone(),
            status_at: self.latest_timestamp,
            brand: d.brand.clone(),
            item_name: d.item_name.clone(),
            items: self.encoded_items()?,
            order_number: self.order_number.clone(),
            order_date: d.order_date,
            estimated_delivery: d.estimated_delivery,
            actual_delivery: self.actual_delivery,
            current_location: self.location.clone(),
            destination_city: d.destination_city.clone(),
            destination_state: d.destination_state.clone(),
            destination_zip: d.destination_zip.clone(),
        })
    }
}

/// Tracking number used when no event carried one.
pub fn placeholder_tracking_number(order_number: &str) -> String {
    format!("ORDER-{}", order_number)
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

/// Merges one order's events. Events are ordered by timestamp (stable)
/// before merging.
pub fn aggregate_group(order_number: &str, events: &[EventRow]) -> AggregatedOrder {
    let mut sorted: Vec<&EventRow> = events.iter().collect();
    sorted.sort_by_key(|e| e.event_timestamp);

    let mut order = AggregatedOrder {
        order_number: order_number.to_string(),
        first_email_id: sorted.first().and_then(|e| e.email_id),
        status: STATUS_UNKNOWN.to_string(),
        ..Default::default()
    };

    for event in sorted {
        let details = match EventDetails::decode(event.description.as_deref()) {
            Ok(details) => details,
            Err(e) => {
                warn!(event_id = event.id, error = %e, "Skipping event with unreadable description");
                order.skipped += 1;
                continue;
            }
        };

        if order
            .latest_timestamp
            .map_or(true, |latest| event.event_timestamp >= latest)
        {
            order.status = event.status.clone();
            order.location = event.location.clone();
            order.latest_timestamp = Some(event.event_timestamp);
        }

        if let Some(number) = &event.tracking_number {
            if !order.tracking_numbers.contains(number) {
                order.tracking_numbers.push(number.clone());
            }
        }

        let merged = &mut order.details;
        fill(&mut merged.brand, &details.brand);
        fill(&mut merged.items, &details.items);
        fill(&mut merged.item_name, &details.item_name);
        fill(&mut merged.order_date, &details.order_date);
        fill(&mut merged.tracking_url, &details.tracking_url);
        fill(&mut merged.carrier, &details.carrier);
        fill(&mut merged.carrier_raw, &details.carrier_raw);
        fill(&mut merged.destination_city, &details.destination_city);
        fill(&mut merged.destination_state, &details.destination_state);
        fill(&mut merged.destination_zip, &details.destination_zip);

        if let Some(estimate) = details.estimated_delivery {
            if merged.estimated_delivery.map_or(true, |current| estimate > current) {
                merged.estimated_delivery = Some(estimate);
            }
        }

        if event.status == STATUS_DELIVERED && order.actual_delivery.is_none() {
            order.actual_delivery = Some(event.event_timestamp);
        }
    }

    order
}

/// Merges an order into an existing package.
///
/// First-wins fields and the delivery date only fill gaps. Status and
/// location move only when the order's newest readable event is at least
/// as new as the one the package's status came from.
pub fn merge_into_existing(
    existing: &PackageRow,
    order: &AggregatedOrder,
) -> Result<PackageFields, DatabaseError> {
    let d = &order.details;

    let mut tracking_numbers = existing.tracking_number_list()?;
    for number in &order.tracking_numbers {
        if !tracking_numbers.contains(number) {
            tracking_numbers.push(number.clone());
        }
    }
    let tracking_number = tracking_numbers
        .first()
        .cloned()
        .unwrap_or_else(|| existing.tracking_number.clone());

    let is_newer = match (order.latest_timestamp, existing.status_at) {
        (Some(group), Some(applied)) => group >= applied,
        (Some(_), None) => true,
        (None, _) => false,
    };
    let (status, status_at, current_location) = if is_newer {
        (
            order.status.clone(),
            order.latest_timestamp,
            order
                .location
                .clone()
                .or_else(|| existing.current_location.clone()),
        )
    } else {
        (
            existing.status.clone(),
            existing.status_at,
            existing.current_location.clone(),
        )
    };

    let items = match &existing.items {
        Some(items) => Some(items.clone()),
        None => order
            .encoded_items()
            .map_err(|source| DatabaseError::Json {
                column: "items",
                source,
            })?,
    };

    Ok(PackageFields {
        email_id: existing.email_id.or(order.first_email_id),
        tracking_number,
        tracking_numbers,
        tracking_url: existing.tracking_url.clone().or_else(|| d.tracking_url.clone()),
        carrier: existing.carrier.clone().or_else(|| d.carrier.clone()),
        carrier_raw: existing.carrier_raw.clone().or_else(|| d.carrier_raw.clone()),
        status,
        status_at,
        brand: existing.brand.clone().or_else(|| d.brand.clone()),
        item_name: existing.item_name.clone().or_else(|| d.item_name.clone()),
        items,
        order_number: existing.order_number.clone(),
        order_date: existing.order_date.or(d.order_date),
        estimated_delivery: d.estimated_delivery.or(existing.estimated_delivery),
        actual_delivery: existing.actual_delivery.or(order.actual_delivery),
        current_location,
        destination_city: existing
            .destination_city
            .clone()
            .or_else(|| d.destination_city.clone()),
        destination_state: existing
            .destination_state
            .clone()
            .or_else(|| d.destination_state.clone()),
        destination_zip: existing
            .destination_zip
            .clone()
            .or_else(|| d.destination_zip.clone()),
    })
}

/// Builds packages from orphan package events.
///
/// Clones share the per-account locks, so two passes over the same
/// account within one process run one after the other.
#[derive(Clone)]
pub struct Aggregator {
    db: Database,
    locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl Aggregator {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn account_lock(&self, account_id: i64) -> Result<Arc<Mutex<()>>, PipelineError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned)?;
        Ok(locks.entry(account_id).or_default().clone())
    }

    /// Aggregates the account's orphan events and returns the number of
    /// packages created. Events without an order number stay orphaned.
    pub fn aggregate(&self, account_id: i64) -> Result<usize, PipelineError> {
        let lock = self.account_lock(account_id)?;
        let _guard = lock.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        self.aggregate_locked(account_id)
    }

    fn aggregate_locked(&self, account_id: i64) -> Result<usize, PipelineError> {
        let _span = info_span!("aggregate", account_id).entered();

        let orphans = event_repo::list_orphans_for_account(&self.db, account_id)?;
        if orphans.is_empty() {
            debug!("No orphan events to aggregate");
            return Ok(0);
        }

        let total = orphans.len();
        let mut groups: BTreeMap<String, Vec<EventRow>> = BTreeMap::new();
        for event in orphans {
            if let Some(order_number) = event.order_number.clone() {
                groups.entry(order_number).or_default().push(event);
            }
        }
        info!("Aggregating {} orders from {} events", groups.len(), total);

        let mut created = 0;
        for (order_number, events) in &groups {
            match self.apply_group(order_number, events) {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(order_number = %order_number, error = %e, "Failed to aggregate order");
                }
            }
        }

        info!("Created {} packages", created);
        Ok(created)
    }

    /// Writes one group. Returns `true` when a package was created.
    fn apply_group(&self, order_number: &str, events: &[EventRow]) -> Result<bool, PipelineError> {
        let order = aggregate_group(order_number, events);
        let new_fields = order.new_package_fields()?;
        let event_ids: Vec<i64> = events.iter().map(|e| e.id).collect();

        let outcome = self.db.with_tx(|tx| {
            let (package_id, created) = match package_repo::find_by_order_number_in(tx, order_number)? {
                None => (package_repo::insert_in(tx, &new_fields)?, true),
                Some(existing) => {
                    let fields = merge_into_existing(&existing, &order)?;
                    package_repo::update_in(tx, existing.id, &fields)?;
                    (existing.id, false)
                }
            };
            event_repo::link_to_package(tx, &event_ids, package_id)?;
            Ok((package_id, created))
        })?;

        let (package_id, created) = outcome;
        debug!(
            order_number,
            package_id,
            events = event_ids.len(),
            skipped = order.skipped,
            created,
            "Order aggregated"
        );
        Ok(created)
    }

    /// Deletes the account's packages and aggregates from scratch.
    pub fn rebuild(&self, account_id: i64) -> Result<usize, PipelineError> {
        let lock = self.account_lock(account_id)?;
        let _guard = lock.lock().map_err(|_| DatabaseError::LockPoisoned)?;

        let deleted = package_repo::delete_by_account(&self.db, account_id)?;
        info!(account_id, deleted, "Deleted packages for rebuild");
        self.aggregate_locked(account_id)
    }
}
