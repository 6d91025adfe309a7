//! Scan job repository: CRUD operations for the `scan_jobs` table.
//!
//! Status changes are guarded updates (`WHERE status = <from>`); callers
//! learn from the returned flag whether they won the transition.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{first_row, Database, DatabaseError};

/// A raw scan job row from the database.
#[derive(Debug, Clone)]
pub struct ScanJobRow {
    pub id: i64,
    pub email_account_id: i64,
    pub status: String,
    pub emails_scanned: Option<i64>,
    pub error: Option<String>,
    pub attempts: i64,
    pub retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScanJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            email_account_id: row.get("email_account_id")?,
            status: row.get("status")?,
            emails_scanned: row.get("emails_scanned")?,
            error: row.get("error")?,
            attempts: row.get("attempts")?,
            retry_at: row.get("retry_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a PENDING job and returns its id.
pub fn insert(db: &Database, account_id: i64) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO scan_jobs (email_account_id, status, attempts, created_at, updated_at)
             VALUES (?1, 'PENDING', 0, ?2, ?2)",
            params![account_id, Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<ScanJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM scan_jobs WHERE id = ?1")?;
        let rows = stmt.query_map(params![id], ScanJobRow::from_row)?;
        first_row(rows)
    })
}

/// Lists the most recent jobs, newest first.
pub fn list_recent(db: &Database, limit: u32) -> Result<Vec<ScanJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM scan_jobs ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit], ScanJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Oldest job that is ready to run: PENDING, or FAILED with a retry due.
pub fn next_due(db: &Database, now: DateTime<Utc>) -> Result<Option<ScanJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM scan_jobs
             WHERE status = 'PENDING' OR (status = 'FAILED' AND retry_at IS NOT NULL)
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], ScanJobRow::from_row)?;
        for row in rows {
            let row = row?;
            let due = match (row.status.as_str(), row.retry_at) {
                ("PENDING", _) => true,
                (_, Some(retry_at)) => retry_at <= now,
                _ => false,
            };
            if due {
                return Ok(Some(row));
            }
        }
        Ok(None)
    })
}

/// Moves a job from `from` to IN_PROGRESS and counts the attempt.
pub fn claim(db: &Database, id: i64, from: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE scan_jobs SET status = 'IN_PROGRESS', attempts = attempts + 1,
             retry_at = NULL, updated_at = ?3
             WHERE id = ?1 AND status = ?2",
            params![id, from, Utc::now()],
        )?;
        Ok(changed > 0)
    })
}

/// Moves an IN_PROGRESS job to COMPLETED.
pub fn complete(db: &Database, id: i64, emails_scanned: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE scan_jobs SET status = 'COMPLETED', emails_scanned = ?2, error = NULL,
             updated_at = ?3
             WHERE id = ?1 AND status = 'IN_PROGRESS'",
            params![id, emails_scanned, Utc::now()],
        )?;
        Ok(changed > 0)
    })
}

/// Moves an IN_PROGRESS job to FAILED, optionally scheduling a retry.
pub fn fail(
    db: &Database,
    id: i64,
    error: &str,
    retry_at: Option<DateTime<Utc>>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE scan_jobs SET status = 'FAILED', error = ?2, retry_at = ?3, updated_at = ?4
             WHERE id = ?1 AND status = 'IN_PROGRESS'",
            params![id, error, retry_at, Utc::now()],
        )?;
        Ok(changed > 0)
    })
}
