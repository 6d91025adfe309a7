//! Package event repository: one timestamped status snapshot per email.
//!
//! Events start out orphaned (`package_id IS NULL`) and are linked to a
//! package by the aggregator.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{first_row, Database, DatabaseError};

/// A raw package event row from the database.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: i64,
    pub package_id: Option<i64>,
    pub email_id: Option<i64>,
    pub order_number: Option<String>,
    pub tracking_number: Option<String>,
    pub status: String,
    pub location: Option<String>,
    /// JSON-encoded secondary fields, see `pipeline::EventDetails`.
    pub description: Option<String>,
    pub event_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            package_id: row.get("package_id")?,
            email_id: row.get("email_id")?,
            order_number: row.get("order_number")?,
            tracking_number: row.get("tracking_number")?,
            status: row.get("status")?,
            location: row.get("location")?,
            description: row.get("description")?,
            event_timestamp: row.get("event_timestamp")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Values for a new (or re-extracted) event.
#[derive(Debug, Clone)]
pub struct NewPackageEvent {
    pub email_id: Option<i64>,
    pub order_number: Option<String>,
    pub tracking_number: Option<String>,
    pub status: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub event_timestamp: DateTime<Utc>,
}

/// Inserts an orphan event and returns its id.
pub fn insert(db: &Database, event: &NewPackageEvent) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO package_events (package_id, email_id, order_number, tracking_number,
             status, location, description, event_timestamp, created_at)
             VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.email_id,
                event.order_number,
                event.tracking_number,
                event.status,
                event.location,
                event.description,
                event.event_timestamp,
                Utc::now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Overwrites the extracted fields of an existing event. `package_id` is kept.
pub fn update_extracted(
    db: &Database,
    id: i64,
    event: &NewPackageEvent,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE package_events SET order_number = ?2, tracking_number = ?3, status = ?4,
             location = ?5, description = ?6, event_timestamp = ?7
             WHERE id = ?1",
            params![
                id,
                event.order_number,
                event.tracking_number,
                event.status,
                event.location,
                event.description,
                event.event_timestamp,
            ],
        )?;
        Ok(())
    })
}

/// Finds the event extracted from an email, if any.
pub fn find_by_email_id(db: &Database, email_id: i64) -> Result<Option<EventRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM package_events WHERE email_id = ?1")?;
        let rows = stmt.query_map(params![email_id], EventRow::from_row)?;
        first_row(rows)
    })
}

/// Lists orphan events whose email belongs to the account, oldest first.
pub fn list_orphans_for_account(
    db: &Database,
    account_id: i64,
) -> Result<Vec<EventRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT e.* FROM package_events e
             JOIN emails m ON m.id = e.email_id
             WHERE e.package_id IS NULL AND m.email_account_id = ?1
             ORDER BY e.event_timestamp, e.id",
        )?;
        let rows = stmt
            .query_map(params![account_id], EventRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists the events linked to a package, oldest first.
pub fn list_by_package(db: &Database, package_id: i64) -> Result<Vec<EventRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM package_events WHERE package_id = ?1 ORDER BY event_timestamp, id",
        )?;
        let rows = stmt
            .query_map(params![package_id], EventRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Links the given events to a package.
pub(crate) fn link_to_package(
    conn: &Connection,
    event_ids: &[i64],
    package_id: i64,
) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare("UPDATE package_events SET package_id = ?1 WHERE id = ?2")?;
    let mut linked = 0;
    for id in event_ids {
        linked += stmt.execute(params![package_id, id])?;
    }
    Ok(linked)
}
