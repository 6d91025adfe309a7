//! Email account repository: CRUD operations for the `email_accounts` table.
//!
//! Token columns hold ciphertext produced by [`crate::secrets::TokenEncryptor`];
//! this module never sees plaintext tokens.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{first_row, Database, DatabaseError};

/// A raw email account row from the database.
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: i64,
    pub provider: String,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub auto_delete_emails: bool,
    pub auto_scan_enabled: bool,
    pub last_auto_scan_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            provider: row.get("provider")?,
            email: row.get("email")?,
            access_token: row.get("access_token")?,
            refresh_token: row.get("refresh_token")?,
            token_expiry: row.get("token_expiry")?,
            auto_delete_emails: row.get("auto_delete_emails")?,
            auto_scan_enabled: row.get("auto_scan_enabled")?,
            last_auto_scan_at: row.get("last_auto_scan_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Values for a new account row.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub provider: String,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub auto_delete_emails: bool,
    pub auto_scan_enabled: bool,
}

/// Inserts an account and returns its id.
pub fn insert(db: &Database, account: &NewAccount) -> Result<i64, DatabaseError> {
    let now = Utc::now();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO email_accounts (provider, email, access_token, refresh_token, token_expiry,
             auto_delete_emails, auto_scan_enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                account.provider,
                account.email,
                account.access_token,
                account.refresh_token,
                account.token_expiry,
                account.auto_delete_emails,
                account.auto_scan_enabled,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds an account by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<AccountRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM email_accounts WHERE id = ?1")?;
        let rows = stmt.query_map(params![id], AccountRow::from_row)?;
        first_row(rows)
    })
}

/// Lists all accounts ordered by id.
pub fn list(db: &Database) -> Result<Vec<AccountRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM email_accounts ORDER BY id")?;
        let rows = stmt
            .query_map([], AccountRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists accounts with auto-scan enabled.
pub fn list_auto_scan(db: &Database) -> Result<Vec<AccountRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM email_accounts WHERE auto_scan_enabled = 1 ORDER BY id")?;
        let rows = stmt
            .query_map([], AccountRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Stores a refreshed access token.
///
/// `refresh_token` of `None` leaves the stored refresh token unchanged;
/// Google only returns a new one when it rotates it.
pub fn update_tokens(
    db: &Database,
    id: i64,
    access_token: &str,
    refresh_token: Option<&str>,
    token_expiry: Option<DateTime<Utc>>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE email_accounts
             SET access_token = ?2,
                 refresh_token = COALESCE(?3, refresh_token),
                 token_expiry = ?4,
                 updated_at = ?5
             WHERE id = ?1",
            params![id, access_token, refresh_token, token_expiry, Utc::now()],
        )?;
        Ok(())
    })
}

/// Records when an auto-scan job was last created for the account.
pub fn mark_auto_scanned(db: &Database, id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE email_accounts SET last_auto_scan_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(())
    })
}
