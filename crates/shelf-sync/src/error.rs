//! # Sync Error Types
//!
//! Error handling for the configuration manager, the local cache, the TOML
//! configuration file and the catalog client.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Local Cache   │  │     Catalog API         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  CacheRead      │  │  NotConfigured          │ │
//! │  │  ConfigLoad     │  │  CacheWrite     │  │  Http / Network         │ │
//! │  │  ConfigSave     │  │                 │  │  Timeout / Malformed    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Storage(ConfigError) wraps the shared storage taxonomy unchanged.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use shelf_core::{ConfigError, ErrorCode, RetryClassify};
use thiserror::Error;

/// Result type alias for client-layer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failures raised by the client layer.
///
/// The configuration manager never hands these to its callers; they surface
/// from the catalog client, the config file loader and `shelfctl`.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid `shelf.toml` contents.
    #[error("Invalid shelf configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Local Cache Errors
    // =========================================================================
    /// Local cache could not be read.
    #[error("Failed to read local cache: {0}")]
    CacheReadFailed(String),

    /// Local cache could not be written.
    #[error("Failed to write local cache: {0}")]
    CacheWriteFailed(String),

    // =========================================================================
    // Catalog Errors
    // =========================================================================
    /// Catalog credentials are incomplete.
    #[error("Catalog API is not configured: {0}")]
    NotConfigured(String),

    /// Catalog answered with a non-success status.
    #[error("Catalog API returned {status}: {message}")]
    Http { status: u16, message: String },

    /// Request never got an answer.
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Response did not have the expected shape.
    #[error("Malformed catalog response: {0}")]
    MalformedResponse(String),

    /// Every item of a batched lookup failed.
    #[error("All {failed} catalog lookups failed; last error: {last_error}")]
    BatchFailed { failed: usize, last_error: String },

    // =========================================================================
    // Passthrough
    // =========================================================================
    /// Storage layer failure.
    #[error(transparent)]
    Storage(#[from] ConfigError),

    /// JSON (de)serialization failure.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            SyncError::MalformedResponse(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl RetryClassify for SyncError {
    fn error_code(&self) -> Option<ErrorCode> {
        match self {
            SyncError::Storage(err) => Some(err.code),
            _ => None,
        }
    }

    /// HTTP-like status. Transport failures count as 503, timeouts as 408.
    fn status_code(&self) -> u16 {
        match self {
            SyncError::Http { status, .. } => *status,
            SyncError::Network(_) => 503,
            SyncError::Timeout(_) => 408,
            SyncError::Storage(err) => err.status,
            SyncError::NotConfigured(_) | SyncError::InvalidConfig(_) => 400,
            SyncError::MalformedResponse(_) => 422,
            _ => 500,
        }
    }
}

impl SyncError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::NotConfigured(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{PlatformType, RetryPolicy};

    #[test]
    fn test_catalog_policy_classification() {
        let policy = RetryPolicy::catalog();

        assert!(policy.is_retryable(&SyncError::Http { status: 503, message: "down".into() }));
        assert!(policy.is_retryable(&SyncError::Http { status: 429, message: "slow".into() }));
        assert!(policy.is_retryable(&SyncError::Timeout("10s".into())));
        assert!(policy.is_retryable(&SyncError::Network("reset".into())));

        assert!(!policy.is_retryable(&SyncError::Http { status: 404, message: "gone".into() }));
        assert!(!policy.is_retryable(&SyncError::NotConfigured("apiKey".into())));
        assert!(!policy.is_retryable(&SyncError::MalformedResponse("no sku".into())));
    }

    #[test]
    fn test_storage_errors_keep_their_code() {
        let err: SyncError =
            ConfigError::new(ErrorCode::DatabaseLocked, PlatformType::RelationalEmbedded, "locked").into();

        assert_eq!(err.error_code(), Some(ErrorCode::DatabaseLocked));
        assert!(RetryPolicy::config_write().is_retryable(&err));
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::InvalidConfig("ttl".into()).is_config_error());
        assert!(!SyncError::Network("x".into()).is_config_error());
    }
}
