//! Package repository: one canonical row per order number.
//!
//! `items` and `tracking_numbers` are JSON columns. The connection-level
//! helpers are used by the aggregator inside a per-group transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{first_row, Database, DatabaseError};

/// A raw package row from the database.
#[derive(Debug, Clone)]
pub struct PackageRow {
    pub id: i64,
    pub email_id: Option<i64>,
    pub tracking_number: String,
    pub tracking_numbers: String,
    pub tracking_url: Option<String>,
    pub carrier: Option<String>,
    pub carrier_raw: Option<String>,
    pub status: String,
    /// Timestamp of the event the status and location came from.
    pub status_at: Option<DateTime<Utc>>,
    pub brand: Option<String>,
    pub item_name: Option<String>,
    pub items: Option<String>,
    pub order_number: String,
    pub order_date: Option<DateTime<Utc>>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub current_location: Option<String>,
    pub destination_city: Option<String>,
    pub destination_state: Option<String>,
    pub destination_zip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PackageRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            email_id: row.get("email_id")?,
            tracking_number: row.get("tracking_number")?,
            tracking_numbers: row.get("tracking_numbers")?,
            tracking_url: row.get("tracking_url")?,
            carrier: row.get("carrier")?,
            carrier_raw: row.get("carrier_raw")?,
            status: row.get("status")?,
            status_at: row.get("status_at")?,
            brand: row.get("brand")?,
            item_name: row.get("item_name")?,
            items: row.get("items")?,
            order_number: row.get("order_number")?,
            order_date: row.get("order_date")?,
            estimated_delivery: row.get("estimated_delivery")?,
            actual_delivery: row.get("actual_delivery")?,
            current_location: row.get("current_location")?,
            destination_city: row.get("destination_city")?,
            destination_state: row.get("destination_state")?,
            destination_zip: row.get("destination_zip")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Decodes the tracking numbers seen on the order's events. A
    /// placeholder primary number is never part of the list.
    pub fn tracking_number_list(&self) -> Result<Vec<String>, DatabaseError> {
        serde_json::from_str(&self.tracking_numbers).map_err(|source| DatabaseError::Json {
            column: "tracking_numbers",
            source,
        })
    }
}

/// Column values written on create and update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageFields {
    pub email_id: Option<i64>,
    pub tracking_number: String,
    pub tracking_numbers: Vec<String>,
    pub tracking_url: Option<String>,
    pub carrier: Option<String>,
    pub carrier_raw: Option<String>,
    pub status: String,
    pub status_at: Option<DateTime<Utc>>,
    pub brand: Option<String>,
    pub item_name: Option<String>,
    /// JSON array of items, already encoded.
    pub items: Option<String>,
    pub order_number: String,
    pub order_date: Option<DateTime<Utc>>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub current_location: Option<String>,
    pub destination_city: Option<String>,
    pub destination_state: Option<String>,
    pub destination_zip: Option<String>,
}

fn encode_tracking_numbers(numbers: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(numbers).map_err(|source| DatabaseError::Json {
        column: "tracking_numbers",
        source,
    })
}

pub(crate) fn find_by_order_number_in(
    conn: &Connection,
    order_number: &str,
) -> Result<Option<PackageRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM packages WHERE order_number = ?1")?;
    let rows = stmt.query_map(params![order_number], PackageRow::from_row)?;
    first_row(rows)
}

pub(crate) fn insert_in(conn: &Connection, fields: &PackageFields) -> Result<i64, DatabaseError> {
    let tracking_numbers = encode_tracking_numbers(&fields.tracking_numbers)?;
    conn.execute(
        "INSERT INTO packages (email_id, tracking_number, tracking_numbers, tracking_url, carrier,
         carrier_raw, status, status_at, brand, item_name, items, order_number, order_date,
         estimated_delivery, actual_delivery, current_location, destination_city,
         destination_state, destination_zip, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
         ?18, ?19, ?20, ?20)",
        params![
            fields.email_id,
            fields.tracking_number,
            tracking_numbers,
            fields.tracking_url,
            fields.carrier,
            fields.carrier_raw,
            fields.status,
            fields.status_at,
            fields.brand,
            fields.item_name,
            fields.items,
            fields.order_number,
            fields.order_date,
            fields.estimated_delivery,
            fields.actual_delivery,
            fields.current_location,
            fields.destination_city,
            fields.destination_state,
            fields.destination_zip,
            Utc::now(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrites every column except `id`, `order_number` and `created_at`.
pub(crate) fn update_in(
    conn: &Connection,
    id: i64,
    fields: &PackageFields,
) -> Result<(), DatabaseError> {
    let tracking_numbers = encode_tracking_numbers(&fields.tracking_numbers)?;
    conn.execute(
        "UPDATE packages SET email_id = ?2, tracking_number = ?3, tracking_numbers = ?4,
         tracking_url = ?5, carrier = ?6, carrier_raw = ?7, status = ?8, status_at = ?9,
         brand = ?10, item_name = ?11, items = ?12, order_date = ?13, estimated_delivery = ?14,
         actual_delivery = ?15, current_location = ?16, destination_city = ?17,
         destination_state = ?18, destination_zip = ?19, updated_at = ?20
         WHERE id = ?1",
        params![
            id,
            fields.email_id,
            fields.tracking_number,
            tracking_numbers,
            fields.tracking_url,
            fields.carrier,
            fields.carrier_raw,
            fields.status,
            fields.status_at,
            fields.brand,
            fields.item_name,
            fields.items,
            fields.order_date,
            fields.estimated_delivery,
            fields.actual_delivery,
            fields.current_location,
            fields.destination_city,
            fields.destination_state,
            fields.destination_zip,
            Utc::now(),
        ],
    )?;
    Ok(())
}

/// Finds the package for an order number.
pub fn find_by_order_number(
    db: &Database,
    order_number: &str,
) -> Result<Option<PackageRow>, DatabaseError> {
    db.with_conn(|conn| find_by_order_number_in(conn, order_number))
}

/// Finds a package by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<PackageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM packages WHERE id = ?1")?;
        let rows = stmt.query_map(params![id], PackageRow::from_row)?;
        first_row(rows)
    })
}

const ACCOUNT_PACKAGES: &str = "id IN (
        SELECT e.package_id FROM package_events e
        JOIN emails m ON m.id = e.email_id
        WHERE e.package_id IS NOT NULL AND m.email_account_id = ?1
    ) OR email_id IN (SELECT id FROM emails WHERE email_account_id = ?1)";

/// Lists the packages built from an account's emails, newest first.
pub fn list_by_account(db: &Database, account_id: i64) -> Result<Vec<PackageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT * FROM packages WHERE {} ORDER BY updated_at DESC, id DESC",
            ACCOUNT_PACKAGES
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![account_id], PackageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes the packages built from an account's emails. Their events
/// become orphans again through `ON DELETE SET NULL`.
pub fn delete_by_account(db: &Database, account_id: i64) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("DELETE FROM packages WHERE {}", ACCOUNT_PACKAGES);
        Ok(conn.execute(&sql, params![account_id])?)
    })
}
