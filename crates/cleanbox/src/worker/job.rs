use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::QueueConfig;

/// Lifecycle of a scan job.
///
/// PENDING -> IN_PROGRESS -> COMPLETED | FAILED, and FAILED -> IN_PROGRESS
/// when a scheduled retry comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanJobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ScanJobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanJobStatus::Pending => "PENDING",
            ScanJobStatus::InProgress => "IN_PROGRESS",
            ScanJobStatus::Completed => "COMPLETED",
            ScanJobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(ScanJobStatus::Pending),
            "IN_PROGRESS" => Some(ScanJobStatus::InProgress),
            "COMPLETED" => Some(ScanJobStatus::Completed),
            "FAILED" => Some(ScanJobStatus::Failed),
            _ => None,
        }
    }

    pub fn can_transition(self, to: ScanJobStatus) -> bool {
        use ScanJobStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Failed, InProgress)
        )
    }
}

impl fmt::Display for ScanJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exponential backoff for retryable scan failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: Duration::from_secs(config.backoff_base_secs),
        }
    }

    /// Delay before the retry that follows attempt number `attempts`
    /// (1-based): `base * 2^(attempts - 1)`.
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1 << exponent)
    }

    /// When to retry after `attempts` attempts, or `None` once they are
    /// used up.
    pub fn retry_at(&self, attempts: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if attempts >= self.max_attempts {
            return None;
        }
        let delay = chrono::Duration::from_std(self.delay(attempts)).ok()?;
        now.checked_add_signed(delay)
    }
}
