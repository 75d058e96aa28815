//! # Retry Policy
//!
//! One reusable value object describing how an operation is retried. The
//! storage adapters, the configuration manager and the catalog client all
//! consume it; only the executor that sleeps between attempts lives outside
//! this crate (`shelf_store::retry`).
//!
//! ## Backoff Formula
//! ```text
//! delay(attempt) = min(base_delay × multiplier^(attempt − 1), max_delay)
//!
//! base = 100ms, multiplier = 2, max = 2s
//!   attempt 1 fails → wait 100ms
//!   attempt 2 fails → wait 200ms
//!   attempt 3 fails → give up (max_attempts = 3)
//! ```
//!
//! ## What Is Retried
//! ```text
//! status listed in retryable_statuses   → retry   (408, 429 for the catalog)
//! any other 4xx                         → never   (caller's fault)
//! code listed in retryable_codes        → retry   (locked, connection, 5xx)
//! anything else                         → never
//! ```

use std::time::Duration;

use crate::error::{ConfigError, ErrorCode};
use crate::platform::PlatformType;

/// Storage codes that describe a transient backend condition.
const TRANSIENT_STORAGE_CODES: &[ErrorCode] = &[
    ErrorCode::SaveFailed,
    ErrorCode::InitializationFailed,
    ErrorCode::DatabaseConnection,
    ErrorCode::DatabaseLocked,
];

/// HTTP statuses the catalog API may recover from.
const TRANSIENT_HTTP_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

// =============================================================================
// Classification
// =============================================================================

/// Anything a [`RetryPolicy`] can classify.
pub trait RetryClassify {
    /// Taxonomy code, when the error comes from the storage layer.
    fn error_code(&self) -> Option<ErrorCode>;

    /// HTTP-like status.
    fn status_code(&self) -> u16;
}

impl RetryClassify for ConfigError {
    fn error_code(&self) -> Option<ErrorCode> {
        Some(self.code)
    }

    fn status_code(&self) -> u16 {
        self.status
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Retry/backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Storage codes worth another attempt.
    pub retryable_codes: Vec<ErrorCode>,

    /// HTTP statuses worth another attempt (checked before the 4xx rule).
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            retryable_codes: TRANSIENT_STORAGE_CODES.to_vec(),
            retryable_statuses: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Embedded SQLite: local and fast, so retry quickly.
    pub fn relational() -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Networked blob store: slower round trips, slower retries.
    pub fn blob_store() -> Self {
        RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Local JSON files.
    pub fn file_based() -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Storage policy for a platform.
    pub fn for_platform(platform: PlatformType) -> Self {
        match platform {
            PlatformType::FileBased => Self::file_based(),
            PlatformType::RelationalEmbedded => Self::relational(),
            PlatformType::BlobStore => Self::blob_store(),
        }
    }

    /// Catalog API calls: retry timeouts, rate limits and 5xx.
    pub fn catalog() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            retryable_codes: Vec::new(),
            retryable_statuses: TRANSIENT_HTTP_STATUSES.to_vec(),
        }
    }

    /// Configuration manager reads: two quick attempts, then fall back.
    pub fn config_read() -> Self {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Configuration manager writes: three patient attempts.
    pub fn config_write() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Overrides the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Overrides the first delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Overrides the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay to wait after `attempt` (1-based) has failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.base_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        let cap = self.max_delay.as_nanos() as f64;

        if !nanos.is_finite() || nanos >= cap {
            self.max_delay
        } else if nanos <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// Sum of every delay the policy can impose; the longest a logical
    /// operation spends sleeping before it gives up.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_for_attempt(a)).sum()
    }

    /// Whether `err` is worth another attempt at all.
    pub fn is_retryable<E: RetryClassify + ?Sized>(&self, err: &E) -> bool {
        let status = err.status_code();

        if self.retryable_statuses.contains(&status) {
            return true;
        }

        if (400..500).contains(&status) {
            return false;
        }

        err.error_code()
            .map(|code| self.retryable_codes.contains(&code))
            .unwrap_or(false)
    }

    /// Whether to try again after `attempt` (1-based) failed with `err`.
    pub fn should_retry<E: RetryClassify + ?Sized>(&self, err: &E, attempt: u32) -> bool {
        attempt < self.max_attempts && self.is_retryable(err)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
