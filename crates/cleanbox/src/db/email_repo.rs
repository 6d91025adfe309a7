//! Email repository: rows for messages pulled from a mailbox.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{first_row, Database, DatabaseError};

/// A raw email row from the database.
#[derive(Debug, Clone)]
pub struct EmailRow {
    pub id: i64,
    pub email_account_id: i64,
    pub gmail_message_id: String,
    pub category: Option<String>,
    pub subject: String,
    pub from_address: String,
    pub to_address: String,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub size: Option<i64>,
    /// Set once extraction has run to completion. Emails without it are
    /// extracted again on the next scan.
    pub extracted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            email_account_id: row.get("email_account_id")?,
            gmail_message_id: row.get("gmail_message_id")?,
            category: row.get("category")?,
            subject: row.get("subject")?,
            from_address: row.get("from_address")?,
            to_address: row.get("to_address")?,
            snippet: row.get("snippet")?,
            body: row.get("body")?,
            sent_at: row.get("sent_at")?,
            size: row.get("size")?,
            extracted_at: row.get("extracted_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Values for a newly fetched email.
#[derive(Debug, Clone, Default)]
pub struct NewEmail {
    pub email_account_id: i64,
    pub gmail_message_id: String,
    pub category: Option<String>,
    pub subject: String,
    pub from_address: String,
    pub to_address: String,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub size: Option<i64>,
}

/// Inserts an email and returns its id.
pub fn insert(db: &Database, email: &NewEmail) -> Result<i64, DatabaseError> {
    let now = Utc::now();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO emails (email_account_id, gmail_message_id, category, subject,
             from_address, to_address, snippet, body, sent_at, size, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                email.email_account_id,
                email.gmail_message_id,
                email.category,
                email.subject,
                email.from_address,
                email.to_address,
                email.snippet,
                email.body,
                email.sent_at,
                email.size,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Returns `true` if a message with this provider id has already been stored.
pub fn exists_by_message_id(db: &Database, gmail_message_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM emails WHERE gmail_message_id = ?1",
            params![gmail_message_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Finds an email by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<EmailRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM emails WHERE id = ?1")?;
        let rows = stmt.query_map(params![id], EmailRow::from_row)?;
        first_row(rows)
    })
}

/// Finds an email by its provider message id.
pub fn find_by_message_id(
    db: &Database,
    gmail_message_id: &str,
) -> Result<Option<EmailRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM emails WHERE gmail_message_id = ?1")?;
        let rows = stmt.query_map(params![gmail_message_id], EmailRow::from_row)?;
        first_row(rows)
    })
}

/// Fills in the body of an email stored without one. Existing bodies are kept.
///
/// Returns `true` if a row was updated.
pub fn backfill_body(db: &Database, id: i64, body: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE emails SET body = ?2, updated_at = ?3
             WHERE id = ?1 AND (body IS NULL OR body = '')",
            params![id, body, Utc::now()],
        )?;
        Ok(changed > 0)
    })
}

/// Records that extraction finished for an email.
pub fn mark_extracted(db: &Database, id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE emails SET extracted_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(())
    })
}

/// Counts stored emails for an account.
pub fn count_by_account(db: &Database, account_id: i64) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM emails WHERE email_account_id = ?1",
            params![account_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
