//! Row fixtures shared by the repository tests.

use super::account_repo::{self, NewAccount};
use super::email_repo::{self, NewEmail};
use super::Database;

/// Inserts a bare gmail account.
pub(crate) fn account(db: &Database) -> i64 {
    account_repo::insert(
        db,
        &NewAccount {
            provider: "gmail".to_string(),
            email: None,
            access_token: "enc".to_string(),
            refresh_token: None,
            token_expiry: None,
            auto_delete_emails: false,
            auto_scan_enabled: false,
        },
    )
    .unwrap()
}

/// Inserts an email with placeholder headers.
pub(crate) fn email(db: &Database, account_id: i64, message_id: &str) -> i64 {
    email_repo::insert(
        db,
        &NewEmail {
            email_account_id: account_id,
            gmail_message_id: message_id.to_string(),
            subject: "Shipped".to_string(),
            from_address: "orders@shop.example".to_string(),
            to_address: "me@example.com".to_string(),
            ..Default::default()
        },
    )
    .unwrap()
}
