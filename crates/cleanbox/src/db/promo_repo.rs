//! Promo code repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw promo code row from the database.
#[derive(Debug, Clone)]
pub struct PromoRow {
    pub id: i64,
    pub email_id: i64,
    /// `None` for a deal without a code.
    pub code: Option<String>,
    pub discount_raw: Option<String>,
    pub brand: Option<String>,
    pub summary: Option<String>,
    pub category: String,
    pub url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PromoRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            email_id: row.get("email_id")?,
            code: row.get("code")?,
            discount_raw: row.get("discount_raw")?,
            brand: row.get("brand")?,
            summary: row.get("summary")?,
            category: row.get("category")?,
            url: row.get("url")?,
            expires_at: row.get("expires_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewPromoCode {
    pub email_id: i64,
    pub code: Option<String>,
    pub discount_raw: Option<String>,
    pub brand: Option<String>,
    pub summary: Option<String>,
    pub category: String,
    pub url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Inserts a promo code and returns its id.
pub fn insert(db: &Database, promo: &NewPromoCode) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO promo_codes (email_id, code, discount_raw, brand, summary, category,
             url, expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                promo.email_id,
                promo.code,
                promo.discount_raw,
                promo.brand,
                promo.summary,
                promo.category,
                promo.url,
                promo.expires_at,
                Utc::now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Lists the promo codes extracted from an email.
pub fn list_by_email(db: &Database, email_id: i64) -> Result<Vec<PromoRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM promo_codes WHERE email_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![email_id], PromoRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
