//! Test harness for scan and queue tests.
//!
//! `FakeMailProvider` serves canned messages per Gmail category and records
//! every call; `FakeExtractor` answers by subject line.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use cleanbox::db::account_repo::{self, NewAccount};
use cleanbox::extract::{ExtractionInput, PackageDetails, PromoDetails};
use cleanbox::gmail::{FetchedMessage, MessageRef, TokenResponse};
use cleanbox::{
    AccountScanner, Aggregator, Config, Database, ExtractionError, Extractor, GmailError,
    MailProvider, ScanQueue, TokenEncryptor,
};

pub const TEST_TOKEN_KEY: &str =
    "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

/// How `list_messages` should fail.
#[derive(Debug, Clone, Copy)]
pub enum ListFailure {
    Status(u16),
    Unauthorized,
}

#[derive(Default)]
pub struct FakeMailProvider {
    mailbox: Mutex<HashMap<String, Vec<FetchedMessage>>>,
    list_failure: Mutex<Option<ListFailure>>,
    broken_messages: Mutex<Vec<String>>,
    pub list_tokens: Mutex<Vec<String>>,
    pub fetched: Mutex<Vec<String>>,
    pub trashed: Mutex<Vec<String>>,
    refreshes: AtomicUsize,
}

impl FakeMailProvider {
    pub fn add_message(&self, category: &str, message: FetchedMessage) {
        self.mailbox
            .lock()
            .unwrap()
            .entry(category.to_string())
            .or_default()
            .push(message);
    }

    /// Replaces the body served for a message.
    pub fn set_body(&self, id: &str, body: Option<&str>) {
        let mut mailbox = self.mailbox.lock().unwrap();
        if let Some(message) = mailbox.values_mut().flatten().find(|m| m.id == id) {
            message.body = body.map(str::to_string);
        }
    }

    pub fn fail_list(&self, failure: Option<ListFailure>) {
        *self.list_failure.lock().unwrap() = failure;
    }

    /// Makes `get_message` fail for one id.
    pub fn break_message(&self, id: &str) {
        self.broken_messages.lock().unwrap().push(id.to_string());
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn trashed(&self) -> Vec<String> {
        let mut ids = self.trashed.lock().unwrap().clone();
        ids.sort();
        ids
    }

    fn category_of(query: &str) -> String {
        query
            .split_whitespace()
            .find_map(|part| part.strip_prefix("category:"))
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl MailProvider for FakeMailProvider {
    async fn list_messages(
        &self,
        access_token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, GmailError> {
        self.list_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());
        match *self.list_failure.lock().unwrap() {
            Some(ListFailure::Status(status)) => {
                return Err(GmailError::Http {
                    status,
                    message: "backend error".to_string(),
                })
            }
            Some(ListFailure::Unauthorized) => return Err(GmailError::Unauthorized),
            None => {}
        }

        let mailbox = self.mailbox.lock().unwrap();
        Ok(mailbox
            .get(&Self::category_of(query))
            .map(|messages| {
                messages
                    .iter()
                    .take(max_results as usize)
                    .map(|m| MessageRef {
                        id: m.id.clone(),
                        thread_id: None,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_message(
        &self,
        _access_token: &str,
        message_id: &str,
    ) -> Result<Option<FetchedMessage>, GmailError> {
        self.fetched.lock().unwrap().push(message_id.to_string());
        if self
            .broken_messages
            .lock()
            .unwrap()
            .iter()
            .any(|id| id == message_id)
        {
            return Err(GmailError::Decode(format!("message {} is corrupt", message_id)));
        }

        let mailbox = self.mailbox.lock().unwrap();
        Ok(mailbox
            .values()
            .flatten()
            .find(|m| m.id == message_id)
            .cloned())
    }

    async fn trash_message(&self, _access_token: &str, message_id: &str) -> Result<(), GmailError> {
        self.trashed.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &SecretString,
    ) -> Result<TokenResponse, GmailError> {
        assert_eq!(refresh_token.expose_secret(), "refresh-1");
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(TokenResponse {
            access_token: "access-2".to_string(),
            token_type: Some("Bearer".to_string()),
            expires_in: Some(3600),
            refresh_token: None,
            scope: None,
        })
    }
}

/// Answers extraction calls from maps keyed by subject line.
#[derive(Default)]
pub struct FakeExtractor {
    promos: Mutex<HashMap<String, PromoDetails>>,
    packages: Mutex<HashMap<String, PackageDetails>>,
    rate_limited_packages: AtomicUsize,
    pub package_subjects: Mutex<Vec<String>>,
    pub promo_subjects: Mutex<Vec<String>>,
}

impl FakeExtractor {
    pub fn promo(&self, subject: &str, details: PromoDetails) {
        self.promos
            .lock()
            .unwrap()
            .insert(subject.to_string(), details);
    }

    pub fn package(&self, subject: &str, details: PackageDetails) {
        self.packages
            .lock()
            .unwrap()
            .insert(subject.to_string(), details);
    }

    /// Makes the next `calls` package extractions fail with a rate limit.
    pub fn rate_limit_packages(&self, calls: usize) {
        self.rate_limited_packages.store(calls, Ordering::SeqCst);
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract_promo(
        &self,
        input: &ExtractionInput,
    ) -> Result<Option<PromoDetails>, ExtractionError> {
        self.promo_subjects
            .lock()
            .unwrap()
            .push(input.subject.clone());
        Ok(self.promos.lock().unwrap().get(&input.subject).cloned())
    }

    async fn extract_package(
        &self,
        input: &ExtractionInput,
    ) -> Result<Option<PackageDetails>, ExtractionError> {
        self.package_subjects
            .lock()
            .unwrap()
            .push(input.subject.clone());
        if self
            .rate_limited_packages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ExtractionError::RateLimited {
                retry_after: Some(1),
            });
        }
        Ok(self.packages.lock().unwrap().get(&input.subject).cloned())
    }
}

/// In-memory database plus fake backends, wired the way the binary
/// wires the real ones.
pub struct TestHarness {
    pub db: Database,
    pub provider: Arc<FakeMailProvider>,
    pub extractor: Arc<FakeExtractor>,
    pub encryptor: Arc<TokenEncryptor>,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.queue.backoff_base_secs = 60;
        Self {
            db: Database::open_in_memory().expect("Failed to open database"),
            provider: Arc::new(FakeMailProvider::default()),
            extractor: Arc::new(FakeExtractor::default()),
            encryptor: Arc::new(TokenEncryptor::from_hex_key(TEST_TOKEN_KEY).unwrap()),
            config,
        }
    }

    /// Adds an account with encrypted `access-1` / `refresh-1` tokens.
    pub fn add_account(&self, token_expiry: Option<DateTime<Utc>>) -> i64 {
        self.add_account_with(token_expiry, false, false)
    }

    pub fn add_account_with(
        &self,
        token_expiry: Option<DateTime<Utc>>,
        auto_delete_emails: bool,
        auto_scan_enabled: bool,
    ) -> i64 {
        account_repo::insert(
            &self.db,
            &NewAccount {
                provider: "gmail".to_string(),
                email: Some("me@example.com".to_string()),
                access_token: self.encryptor.encrypt("access-1").unwrap(),
                refresh_token: Some(self.encryptor.encrypt("refresh-1").unwrap()),
                token_expiry,
                auto_delete_emails,
                auto_scan_enabled,
            },
        )
        .unwrap()
    }

    pub fn scanner(&self) -> AccountScanner {
        AccountScanner::new(
            self.db.clone(),
            self.provider.clone(),
            self.extractor.clone(),
            self.encryptor.clone(),
            Aggregator::new(self.db.clone()),
            &self.config,
        )
    }

    pub fn queue(&self) -> ScanQueue {
        ScanQueue::new(self.db.clone(), Arc::new(self.scanner()), &self.config.queue)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
