//! End-to-end scans and queued jobs against fake Gmail and OpenAI backends.

mod common;

use chrono::{Duration, Utc};

use cleanbox::db::{account_repo, email_repo, event_repo, package_repo, promo_repo, scan_job_repo};
use cleanbox::extract::PromoDetails;
use cleanbox::worker::{queue, ScanJobStatus};
use cleanbox::ScanError;
use common::{message, tracking_details, ListFailure, TestHarness};

/// One promotions message, two tracking updates for the same order and a
/// PayPal receipt.
fn stock_mailbox(h: &TestHarness) {
    h.provider.add_message(
        "promotions",
        message("p1", "Spring sale", "Deals <deals@shop.example>", 1),
    );
    h.provider.add_message(
        "updates",
        message("u1", "Your order shipped", "Acme <orders@acme.example>", 2),
    );
    h.provider.add_message(
        "updates",
        message("u2", "Out for delivery", "Acme <orders@acme.example>", 3),
    );
    h.provider.add_message(
        "updates",
        message("u3", "Receipt from PayPal", "PayPal <service@paypal.com>", 4),
    );

    h.extractor.promo(
        "Spring sale",
        PromoDetails {
            code: Some("SPRING20".to_string()),
            discount_raw: Some("20% off".to_string()),
            brand: Some("Shop".to_string()),
            ..Default::default()
        },
    );
    h.extractor
        .package("Your order shipped", tracking_details("O-1", "shipped"));
    h.extractor
        .package("Out for delivery", tracking_details("O-1", "out_for_delivery"));
    h.extractor
        .package("Receipt from PayPal", tracking_details("O-9", "ordered"));
}

fn future_expiry() -> Option<chrono::DateTime<Utc>> {
    Some(Utc::now() + Duration::days(1))
}

#[tokio::test]
async fn test_scan_stores_and_extracts() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    stock_mailbox(&h);

    let processed = h.scanner().scan(account).await.unwrap();
    assert_eq!(processed, 4);
    assert_eq!(email_repo::count_by_account(&h.db, account).unwrap(), 4);

    let promo_email = email_repo::find_by_message_id(&h.db, "p1").unwrap().unwrap();
    let promos = promo_repo::list_by_email(&h.db, promo_email.id).unwrap();
    assert_eq!(promos.len(), 1);
    assert_eq!(promos[0].code.as_deref(), Some("SPRING20"));
    assert_eq!(promos[0].category, "Other");

    let packages = package_repo::list_by_account(&h.db, account).unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].order_number, "O-1");
    assert_eq!(packages[0].status, "out_for_delivery");
    assert_eq!(packages[0].item_name.as_deref(), Some("Desk lamp"));
}

#[tokio::test]
async fn test_blacklisted_sender_is_stored_but_not_extracted() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    stock_mailbox(&h);

    h.scanner().scan(account).await.unwrap();

    assert!(email_repo::find_by_message_id(&h.db, "u3").unwrap().is_some());
    assert!(!h
        .extractor
        .package_subjects
        .lock()
        .unwrap()
        .iter()
        .any(|s| s == "Receipt from PayPal"));
    assert!(package_repo::find_by_order_number(&h.db, "O-9").unwrap().is_none());
}

#[tokio::test]
async fn test_rescan_skips_stored_messages() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    stock_mailbox(&h);
    let scanner = h.scanner();

    assert_eq!(scanner.scan(account).await.unwrap(), 4);
    let fetched_once = h.provider.fetched.lock().unwrap().len();

    assert_eq!(scanner.scan(account).await.unwrap(), 0);
    assert_eq!(h.provider.fetched.lock().unwrap().len(), fetched_once);
    assert_eq!(email_repo::count_by_account(&h.db, account).unwrap(), 4);
    assert_eq!(package_repo::list_by_account(&h.db, account).unwrap().len(), 1);

    let promo_email = email_repo::find_by_message_id(&h.db, "p1").unwrap().unwrap();
    assert_eq!(promo_repo::list_by_email(&h.db, promo_email.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_message_does_not_fail_scan() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    stock_mailbox(&h);
    h.provider.break_message("u1");

    let processed = h.scanner().scan(account).await.unwrap();
    assert_eq!(processed, 3);
    assert!(email_repo::find_by_message_id(&h.db, "u1").unwrap().is_none());

    let package = package_repo::find_by_order_number(&h.db, "O-1").unwrap().unwrap();
    assert_eq!(package.status, "out_for_delivery");
}

#[tokio::test]
async fn test_rate_limited_extraction_stays_pending() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    stock_mailbox(&h);
    h.extractor.rate_limit_packages(1);
    let scanner = h.scanner();

    let err = scanner.scan(account).await.unwrap_err();
    assert!(err.is_retryable());

    let pending = email_repo::find_by_message_id(&h.db, "u1").unwrap().unwrap();
    assert!(pending.extracted_at.is_none());
    assert!(event_repo::find_by_email_id(&h.db, pending.id).unwrap().is_none());
    let done = email_repo::find_by_message_id(&h.db, "u2").unwrap().unwrap();
    assert!(done.extracted_at.is_some());

    let fetched_once = h.provider.fetched.lock().unwrap().len();
    assert_eq!(scanner.scan(account).await.unwrap(), 1);
    assert_eq!(h.provider.fetched.lock().unwrap().len(), fetched_once);

    let event = event_repo::find_by_email_id(&h.db, pending.id).unwrap().unwrap();
    assert_eq!(event.status, "shipped");
    let package = package_repo::find_by_order_number(&h.db, "O-1").unwrap().unwrap();
    assert_eq!(package.status, "out_for_delivery");
    assert_eq!(event_repo::list_by_package(&h.db, package.id).unwrap().len(), 2);
    assert!(email_repo::find_by_message_id(&h.db, "u1")
        .unwrap()
        .unwrap()
        .extracted_at
        .is_some());
}

#[tokio::test]
async fn test_pending_email_without_body_is_backfilled() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    let mut bare = message("u1", "Your order shipped", "Acme <orders@acme.example>", 2);
    bare.body = None;
    h.provider.add_message("updates", bare);
    h.extractor
        .package("Your order shipped", tracking_details("O-1", "shipped"));
    h.extractor.rate_limit_packages(1);
    let scanner = h.scanner();

    assert!(scanner.scan(account).await.is_err());
    let stored = email_repo::find_by_message_id(&h.db, "u1").unwrap().unwrap();
    assert!(stored.body.is_none());

    h.provider.set_body("u1", Some("<p>Order O-1 shipped</p>"));
    assert_eq!(scanner.scan(account).await.unwrap(), 1);

    let stored = email_repo::find_by_message_id(&h.db, "u1").unwrap().unwrap();
    assert_eq!(stored.body.as_deref(), Some("<p>Order O-1 shipped</p>"));
    assert!(stored.extracted_at.is_some());
    let fetches = h
        .provider
        .fetched
        .lock()
        .unwrap()
        .iter()
        .filter(|id| *id == "u1")
        .count();
    assert_eq!(fetches, 2);
}

#[tokio::test]
async fn test_auto_delete_trashes_processed_messages() {
    let h = TestHarness::new();
    let account = h.add_account_with(future_expiry(), true, false);
    stock_mailbox(&h);

    h.scanner().scan(account).await.unwrap();

    assert_eq!(h.provider.trashed(), vec!["p1", "u1", "u2", "u3"]);
}

#[tokio::test]
async fn test_messages_are_kept_without_auto_delete() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    stock_mailbox(&h);

    h.scanner().scan(account).await.unwrap();

    assert!(h.provider.trashed().is_empty());
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_and_persisted() {
    let h = TestHarness::new();
    let account = h.add_account(Some(Utc::now() - Duration::minutes(5)));
    stock_mailbox(&h);

    h.scanner().scan(account).await.unwrap();

    assert_eq!(h.provider.refresh_count(), 1);
    assert!(h
        .provider
        .list_tokens
        .lock()
        .unwrap()
        .iter()
        .all(|token| token == "access-2"));

    let row = account_repo::find_by_id(&h.db, account).unwrap().unwrap();
    assert_eq!(h.encryptor.decrypt(&row.access_token).unwrap(), "access-2");
    assert_eq!(
        h.encryptor
            .decrypt_optional(row.refresh_token.as_deref())
            .unwrap()
            .as_deref(),
        Some("refresh-1")
    );
    assert!(row.token_expiry.unwrap() > Utc::now() + Duration::minutes(50));
}

#[tokio::test]
async fn test_valid_token_is_not_refreshed() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());

    h.scanner().scan(account).await.unwrap();

    assert_eq!(h.provider.refresh_count(), 0);
    assert!(h
        .provider
        .list_tokens
        .lock()
        .unwrap()
        .iter()
        .all(|token| token == "access-1"));
}

#[tokio::test]
async fn test_scan_unknown_account() {
    let h = TestHarness::new();

    let err = h.scanner().scan(42).await.unwrap_err();
    assert!(matches!(err, ScanError::AccountNotFound { id: 42 }));
}

#[tokio::test]
async fn test_queued_job_completes() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    stock_mailbox(&h);
    let scan_queue = h.queue();

    let job_id = scan_queue.enqueue(account).unwrap();
    assert_eq!(scan_queue.process_next().await.unwrap(), Some(job_id));
    assert_eq!(scan_queue.process_next().await.unwrap(), None);

    let job = scan_job_repo::find_by_id(&h.db, job_id).unwrap().unwrap();
    assert_eq!(job.status, "COMPLETED");
    assert_eq!(job.emails_scanned, Some(4));
    assert_eq!(job.attempts, 1);
    assert!(job.error.is_none());
}

#[tokio::test]
async fn test_finished_job_is_not_rerun() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    let scan_queue = h.queue();

    let job_id = scan_queue.enqueue(account).unwrap();
    assert_eq!(scan_queue.run_job(job_id).await.unwrap(), ScanJobStatus::Completed);
    assert_eq!(scan_queue.run_job(job_id).await.unwrap(), ScanJobStatus::Completed);

    let job = scan_job_repo::find_by_id(&h.db, job_id).unwrap().unwrap();
    assert_eq!(job.attempts, 1);
}

#[tokio::test]
async fn test_job_for_missing_account_fails_without_retry() {
    let h = TestHarness::new();
    let job_id = h
        .db
        .with_conn(|conn| {
            conn.execute_batch("PRAGMA foreign_keys=OFF;")?;
            Ok(())
        })
        .and_then(|_| scan_job_repo::insert(&h.db, 999))
        .unwrap();

    let status = h.queue().run_job(job_id).await.unwrap();
    assert_eq!(status, ScanJobStatus::Failed);

    let job = scan_job_repo::find_by_id(&h.db, job_id).unwrap().unwrap();
    assert_eq!(job.status, "FAILED");
    assert_eq!(job.error.as_deref(), Some("Email account 999 not found"));
    assert!(job.retry_at.is_none());
}

#[tokio::test]
async fn test_retryable_failure_schedules_retry() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    h.provider.fail_list(Some(ListFailure::Status(503)));
    let scan_queue = h.queue();

    let job_id = scan_queue.enqueue(account).unwrap();
    let before = Utc::now();
    assert_eq!(scan_queue.run_job(job_id).await.unwrap(), ScanJobStatus::Failed);

    let job = scan_job_repo::find_by_id(&h.db, job_id).unwrap().unwrap();
    assert_eq!(job.status, "FAILED");
    assert_eq!(job.attempts, 1);
    assert!(job.error.unwrap().contains("503"));
    let retry_at = job.retry_at.expect("retry scheduled");
    assert!(retry_at >= before + Duration::seconds(59));

    // Not due yet.
    assert_eq!(scan_queue.process_next().await.unwrap(), None);
    assert_eq!(scan_queue.run_job(job_id).await.unwrap(), ScanJobStatus::Failed);
    let job = scan_job_repo::find_by_id(&h.db, job_id).unwrap().unwrap();
    assert_eq!(job.attempts, 1);
}

#[tokio::test]
async fn test_unauthorized_failure_is_final() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    h.provider.fail_list(Some(ListFailure::Unauthorized));
    let scan_queue = h.queue();

    let job_id = scan_queue.enqueue(account).unwrap();
    scan_queue.run_job(job_id).await.unwrap();

    let job = scan_job_repo::find_by_id(&h.db, job_id).unwrap().unwrap();
    assert_eq!(job.status, "FAILED");
    assert!(job.retry_at.is_none());
    assert!(job.error.unwrap().contains("rejected"));
}

#[tokio::test]
async fn test_due_retry_runs_again() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    h.provider.fail_list(Some(ListFailure::Status(500)));
    let scan_queue = h.queue();

    let job_id = scan_queue.enqueue(account).unwrap();
    scan_queue.run_job(job_id).await.unwrap();

    h.db.with_conn(|conn| {
        conn.execute(
            "UPDATE scan_jobs SET retry_at = ?2 WHERE id = ?1",
            rusqlite::params![job_id, Utc::now() - Duration::seconds(1)],
        )?;
        Ok(())
    })
    .unwrap();
    h.provider.fail_list(None);

    assert_eq!(scan_queue.process_next().await.unwrap(), Some(job_id));
    let job = scan_job_repo::find_by_id(&h.db, job_id).unwrap().unwrap();
    assert_eq!(job.status, "COMPLETED");
    assert_eq!(job.attempts, 2);
    assert!(job.error.is_none());
}

#[tokio::test]
async fn test_rate_limited_extraction_is_retried_by_queue() {
    let h = TestHarness::new();
    let account = h.add_account(future_expiry());
    h.provider.add_message(
        "updates",
        message("u1", "Your order shipped", "Acme <orders@acme.example>", 2),
    );
    h.extractor
        .package("Your order shipped", tracking_details("O-1", "shipped"));
    h.extractor.rate_limit_packages(1);
    let scan_queue = h.queue();

    let job_id = scan_queue.enqueue(account).unwrap();
    assert_eq!(scan_queue.run_job(job_id).await.unwrap(), ScanJobStatus::Failed);

    let job = scan_job_repo::find_by_id(&h.db, job_id).unwrap().unwrap();
    assert!(job.error.unwrap().contains("rate limit"));
    assert!(job.retry_at.is_some());
    assert!(package_repo::find_by_order_number(&h.db, "O-1").unwrap().is_none());

    h.db.with_conn(|conn| {
        conn.execute(
            "UPDATE scan_jobs SET retry_at = ?2 WHERE id = ?1",
            rusqlite::params![job_id, Utc::now() - Duration::seconds(1)],
        )?;
        Ok(())
    })
    .unwrap();

    assert_eq!(scan_queue.process_next().await.unwrap(), Some(job_id));
    let job = scan_job_repo::find_by_id(&h.db, job_id).unwrap().unwrap();
    assert_eq!(job.status, "COMPLETED");
    assert_eq!(job.attempts, 2);
    assert_eq!(job.emails_scanned, Some(1));

    let package = package_repo::find_by_order_number(&h.db, "O-1").unwrap().unwrap();
    assert_eq!(package.status, "shipped");
    assert_eq!(h.extractor.package_subjects.lock().unwrap().len(), 2);

    let recent = scan_job_repo::list_recent(&h.db, 5).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, job_id);
}

#[test]
fn test_enqueue_unknown_account() {
    let h = TestHarness::new();

    let err = queue::enqueue(&h.db, 7).unwrap_err();
    assert!(matches!(err, ScanError::AccountNotFound { id: 7 }));
}

#[test]
fn test_enqueue_auto_scans_only_opted_in_accounts() {
    let h = TestHarness::new();
    let opted_in = h.add_account_with(None, false, true);
    let manual = h.add_account(None);

    let jobs = queue::enqueue_auto_scans(&h.db).unwrap();
    assert_eq!(jobs.len(), 1);

    let job = scan_job_repo::find_by_id(&h.db, jobs[0]).unwrap().unwrap();
    assert_eq!(job.email_account_id, opted_in);
    assert_eq!(job.status, "PENDING");

    let stamped = account_repo::find_by_id(&h.db, opted_in).unwrap().unwrap();
    assert!(stamped.last_auto_scan_at.is_some());
    let untouched = account_repo::find_by_id(&h.db, manual).unwrap().unwrap();
    assert!(untouched.last_auto_scan_at.is_none());
}
