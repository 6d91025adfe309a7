//! Database-backed scan job queue.
//!
//! Jobs live in `scan_jobs`; every status change is a guarded update so a
//! job is claimed by at most one worker even across processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::job::{RetryPolicy, ScanJobStatus};
use super::scanner::AccountScanner;
use super::ScanError;
use crate::config::QueueConfig;
use crate::db::{account_repo, scan_job_repo, Database};

/// Upper bound on one sleep slice of the worker loop, so shutdown is
/// noticed promptly.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(250);

pub struct ScanQueue {
    db: Database,
    scanner: Arc<AccountScanner>,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl ScanQueue {
    pub fn new(db: Database, scanner: Arc<AccountScanner>, config: &QueueConfig) -> Self {
        Self {
            db,
            scanner,
            retry: RetryPolicy::from_config(config),
            poll_interval: config.poll_interval(),
        }
    }

    /// Creates a PENDING job for the account.
    pub fn enqueue(&self, account_id: i64) -> Result<i64, ScanError> {
        enqueue(&self.db, account_id)
    }

    /// Claims and runs a job, returning the status it ended in.
    ///
    /// A job that is not claimable (already running, finished, or a retry
    /// that is not due yet) is left untouched and its status returned.
    pub async fn run_job(&self, job_id: i64) -> Result<ScanJobStatus, ScanError> {
        let job = scan_job_repo::find_by_id(&self.db, job_id)?
            .ok_or(ScanError::JobNotFound { id: job_id })?;
        let status = ScanJobStatus::parse(&job.status).unwrap_or(ScanJobStatus::Failed);

        let due = match status {
            ScanJobStatus::Pending => true,
            ScanJobStatus::Failed => job.retry_at.is_some_and(|at| at <= Utc::now()),
            ScanJobStatus::InProgress | ScanJobStatus::Completed => false,
        };
        if !due || !status.can_transition(ScanJobStatus::InProgress) {
            debug!(job_id, status = %status, "Job is not claimable");
            return Ok(status);
        }
        if !scan_job_repo::claim(&self.db, job_id, status.as_str())? {
            debug!(job_id, "Job was claimed by another worker");
            return Ok(ScanJobStatus::InProgress);
        }

        let attempts = u32::try_from(job.attempts + 1).unwrap_or(u32::MAX);
        info!(job_id, account_id = job.email_account_id, attempts, "Running scan job");

        match self.scanner.scan(job.email_account_id).await {
            Ok(scanned) => {
                scan_job_repo::complete(&self.db, job_id, scanned as i64)?;
                info!(job_id, scanned, "Scan job completed");
                Ok(ScanJobStatus::Completed)
            }
            Err(e) => {
                let retry_at = if e.is_retryable() {
                    self.retry.retry_at(attempts, Utc::now())
                } else {
                    None
                };
                scan_job_repo::fail(&self.db, job_id, &e.to_string(), retry_at)?;
                match retry_at {
                    Some(at) => warn!(job_id, error = %e, retry_at = %at, "Scan job failed, retry scheduled"),
                    None => error!(job_id, error = %e, "Scan job failed"),
                }
                Ok(ScanJobStatus::Failed)
            }
        }
    }

    /// Runs the oldest due job, if any, and returns its id.
    pub async fn process_next(&self) -> Result<Option<i64>, ScanError> {
        let Some(job) = scan_job_repo::next_due(&self.db, Utc::now())? else {
            return Ok(None);
        };
        self.run_job(job.id).await?;
        Ok(Some(job.id))
    }

    /// Polls for due jobs until `shutdown` is set.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        info!(poll_interval = ?self.poll_interval, "Scan worker started");

        while !shutdown.load(Ordering::Relaxed) {
            match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!(error = %e, "Failed to process scan job"),
            }

            let mut waited = Duration::ZERO;
            while waited < self.poll_interval && !shutdown.load(Ordering::Relaxed) {
                let slice = SHUTDOWN_CHECK_INTERVAL.min(self.poll_interval - waited);
                tokio::time::sleep(slice).await;
                waited += slice;
            }
        }

        info!("Scan worker stopped");
    }

    /// Queues a job for every account with auto-scan enabled.
    pub fn enqueue_auto_scans(&self) -> Result<Vec<i64>, ScanError> {
        enqueue_auto_scans(&self.db)
    }
}

/// Creates a PENDING job for an existing account.
///
/// Queueing needs no scanner, so producers can call this without the
/// Gmail and OpenAI credentials a worker requires.
pub fn enqueue(db: &Database, account_id: i64) -> Result<i64, ScanError> {
    if account_repo::find_by_id(db, account_id)?.is_none() {
        return Err(ScanError::AccountNotFound { id: account_id });
    }
    let job_id = scan_job_repo::insert(db, account_id)?;
    info!(job_id, account_id, "Scan job queued");
    Ok(job_id)
}

/// Queues a job for every auto-scan account and stamps `last_auto_scan_at`.
pub fn enqueue_auto_scans(db: &Database) -> Result<Vec<i64>, ScanError> {
    let now = Utc::now();
    let mut job_ids = Vec::new();
    for account in account_repo::list_auto_scan(db)? {
        job_ids.push(scan_job_repo::insert(db, account.id)?);
        account_repo::mark_auto_scanned(db, account.id, now)?;
    }
    info!(count = job_ids.len(), "Auto-scan jobs queued");
    Ok(job_ids)
}
