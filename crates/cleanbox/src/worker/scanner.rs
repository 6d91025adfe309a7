//! One scan of one email account: fetch, store, extract, aggregate.

use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::ScanError;
use crate::config::{Config, GmailConfig};
use crate::db::account_repo::{self, AccountRow};
use crate::db::email_repo::{self, EmailRow, NewEmail};
use crate::db::{Database, DatabaseError};
use crate::extract::Extractor;
use crate::gmail::{category_query, expires_soon, MailProvider, MessageRef};
use crate::pipeline::{Aggregator, PackageEventWriter, PromoWriter};
use crate::sanitize::redact_address;
use crate::secrets::TokenEncryptor;

const TRASH_CONCURRENCY: usize = 4;

/// Gmail category tab whose messages go to the promo writer.
pub const CATEGORY_PROMOTIONS: &str = "promotions";
/// Gmail category tab whose messages go to the package event writer.
pub const CATEGORY_UPDATES: &str = "updates";

/// What to fetch on each scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub categories: Vec<String>,
    pub max_results: u32,
    pub newer_than_days: u32,
}

impl ScanOptions {
    pub fn from_config(config: &GmailConfig) -> Self {
        Self {
            categories: config.categories.clone(),
            max_results: config.max_results,
            newer_than_days: config.newer_than_days,
        }
    }
}

pub struct AccountScanner {
    db: Database,
    provider: Arc<dyn MailProvider>,
    encryptor: Arc<TokenEncryptor>,
    promo_writer: PromoWriter,
    event_writer: PackageEventWriter,
    aggregator: Aggregator,
    options: ScanOptions,
}

impl AccountScanner {
    pub fn new(
        db: Database,
        provider: Arc<dyn MailProvider>,
        extractor: Arc<dyn Extractor>,
        encryptor: Arc<TokenEncryptor>,
        aggregator: Aggregator,
        config: &Config,
    ) -> Self {
        Self {
            promo_writer: PromoWriter::new(db.clone(), extractor.clone(), &config.extraction),
            event_writer: PackageEventWriter::new(db.clone(), extractor, &config.extraction),
            db,
            provider,
            encryptor,
            aggregator,
            options: ScanOptions::from_config(&config.gmail),
        }
    }

    /// Scans an account and returns the number of messages processed.
    ///
    /// Per-message failures are logged and skipped. Failing to load the
    /// account, obtain a token, list messages or aggregate fails the scan.
    /// A retryable per-message failure fails the scan after the remaining
    /// messages are processed, so the queue schedules a retry; the email
    /// stays pending and is extracted again by that retry.
    pub async fn scan(&self, account_id: i64) -> Result<usize, ScanError> {
        self.scan_account(account_id)
            .instrument(info_span!("scan", account_id))
            .await
    }

    async fn scan_account(&self, account_id: i64) -> Result<usize, ScanError> {
        let account = account_repo::find_by_id(&self.db, account_id)?
            .ok_or(ScanError::AccountNotFound { id: account_id })?;
        info!(
            account = %redact_address(account.email.as_deref().unwrap_or("(unknown)")),
            "Starting scan"
        );

        let access_token = self.access_token(&account).await?;

        let mut processed = 0;
        let mut to_trash = Vec::new();
        let mut deferred: Option<ScanError> = None;

        for category in &self.options.categories {
            let query = category_query(category, self.options.newer_than_days);
            let messages = self
                .provider
                .list_messages(
                    access_token.expose_secret(),
                    &query,
                    self.options.max_results,
                )
                .await?;
            info!(category = %category, count = messages.len(), "Listed messages");

            for message in &messages {
                match self
                    .process_message(&account, access_token.expose_secret(), category, message)
                    .await
                {
                    Ok(true) => {
                        processed += 1;
                        if account.auto_delete_emails {
                            to_trash.push(message.id.clone());
                        }
                    }
                    Ok(false) => {}
                    Err(e) if e.is_retryable() => {
                        warn!(message_id = %message.id, error = %e, "Message left pending for retry");
                        deferred.get_or_insert(e);
                    }
                    Err(e) => {
                        error!(message_id = %message.id, error = %e, "Failed to process message");
                    }
                }
            }
        }

        let created = self.aggregator.aggregate(account_id)?;
        debug!(created, "Aggregation finished");

        if !to_trash.is_empty() {
            let trashed = self
                .trash_messages(access_token.expose_secret(), &to_trash)
                .await;
            info!(trashed, queued = to_trash.len(), "Moved messages to trash");
        }

        if let Some(e) = deferred {
            warn!(processed, "Scan finished with messages pending retry");
            return Err(e);
        }

        info!(processed, "Scan finished");
        Ok(processed)
    }

    /// Returns a usable access token, refreshing and persisting it when
    /// it is about to expire.
    async fn access_token(&self, account: &AccountRow) -> Result<SecretString, ScanError> {
        let access_token = self.encryptor.decrypt(&account.access_token)?;
        let refresh_token = self
            .encryptor
            .decrypt_optional(account.refresh_token.as_deref())?;

        let now = Utc::now();
        let Some(refresh_token) = refresh_token else {
            return Ok(SecretString::from(access_token));
        };
        if !expires_soon(account.token_expiry, now) {
            return Ok(SecretString::from(access_token));
        }

        let refreshed = self
            .provider
            .refresh_access_token(&SecretString::from(refresh_token))
            .await?;

        let encrypted_access = self.encryptor.encrypt(&refreshed.access_token)?;
        let encrypted_refresh = self
            .encryptor
            .encrypt_optional(refreshed.refresh_token.as_deref())?;
        account_repo::update_tokens(
            &self.db,
            account.id,
            &encrypted_access,
            encrypted_refresh.as_deref(),
            refreshed.expiry_from(now),
        )?;
        info!("Access token refreshed");

        Ok(SecretString::from(refreshed.access_token))
    }

    /// Stores and extracts one message. Returns `false` when the message
    /// was skipped.
    ///
    /// A stored message whose extraction never completed is extracted
    /// again, refetching its body first if it was stored without one. Any
    /// event it already has is updated in place.
    async fn process_message(
        &self,
        account: &AccountRow,
        access_token: &str,
        category: &str,
        message: &MessageRef,
    ) -> Result<bool, ScanError> {
        let (email, retrying) = match email_repo::find_by_message_id(&self.db, &message.id)? {
            Some(stored) if stored.extracted_at.is_some() => {
                debug!(message_id = %message.id, "Message already stored");
                return Ok(false);
            }
            Some(stored) => {
                debug!(email_id = stored.id, "Retrying extraction for stored message");
                (self.with_body(access_token, stored).await?, true)
            }
            None => match self
                .fetch_and_store(account, access_token, category, message)
                .await?
            {
                Some(email) => (email, false),
                None => return Ok(false),
            },
        };

        match category {
            CATEGORY_PROMOTIONS => {
                let created = self.promo_writer.extract_promos(&email).await?;
                debug!(email_id = email.id, created, "Promo extraction done");
            }
            CATEGORY_UPDATES => {
                let has_event = self
                    .event_writer
                    .extract_package_event(&email, retrying)
                    .await?;
                debug!(email_id = email.id, has_event, "Package extraction done");
            }
            other => warn!(category = other, "No extractor for category"),
        }
        email_repo::mark_extracted(&self.db, email.id, Utc::now())?;

        Ok(true)
    }

    async fn fetch_and_store(
        &self,
        account: &AccountRow,
        access_token: &str,
        category: &str,
        message: &MessageRef,
    ) -> Result<Option<EmailRow>, ScanError> {
        let Some(fetched) = self.provider.get_message(access_token, &message.id).await? else {
            debug!(message_id = %message.id, "Message vanished before fetch");
            return Ok(None);
        };

        let email_id = email_repo::insert(
            &self.db,
            &NewEmail {
                email_account_id: account.id,
                gmail_message_id: fetched.id.clone(),
                category: Some(category.to_string()),
                subject: fetched.subject,
                from_address: fetched.from,
                to_address: fetched.to,
                snippet: fetched.snippet,
                body: fetched.body,
                sent_at: fetched.sent_at,
                size: fetched.size,
            },
        )?;
        let email = email_repo::find_by_id(&self.db, email_id)?.ok_or(DatabaseError::Sqlite(
            rusqlite::Error::QueryReturnedNoRows,
        ))?;
        Ok(Some(email))
    }

    /// Fills in the body of a pending email stored without one.
    async fn with_body(&self, access_token: &str, email: EmailRow) -> Result<EmailRow, ScanError> {
        if email.body.as_deref().is_some_and(|body| !body.is_empty()) {
            return Ok(email);
        }
        let body = self
            .provider
            .get_message(access_token, &email.gmail_message_id)
            .await?
            .and_then(|fetched| fetched.body)
            .filter(|body| !body.is_empty());
        let Some(body) = body else {
            return Ok(email);
        };

        email_repo::backfill_body(&self.db, email.id, &body)?;
        debug!(email_id = email.id, "Backfilled email body");
        Ok(EmailRow {
            body: Some(body),
            ..email
        })
    }

    async fn trash_messages(&self, access_token: &str, ids: &[String]) -> usize {
        stream::iter(ids)
            .map(|id| async move {
                match self.provider.trash_message(access_token, id).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(message_id = %id, error = %e, "Failed to trash message");
                        false
                    }
                }
            })
            .buffer_unordered(TRASH_CONCURRENCY)
            .filter(|trashed| futures_util::future::ready(*trashed))
            .count()
            .await
    }
}
