//! # Storage Error Helpers
//!
//! Every backend reports failures as a platform-tagged [`ConfigError`].
//! This module converts the raw errors each backend library produces.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error / io::Error / reqwest::Error / serde_json::Error          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  from_sqlx / from_io / from_http / from_json (this module)             │
//! │       │      (ConfigError::translate picks the code)                   │
//! │       ▼                                                                 │
//! │  ConfigError { code, platform, status }                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ConfigManager absorbs it and falls back to cache/defaults             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use shelf_core::{ConfigError, ErrorCode, PlatformType};

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, ConfigError>;

/// Converts a sqlx error from the embedded-relational backend.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::PoolTimedOut   → DATABASE_CONNECTION
/// sqlx::Error::PoolClosed     → DATABASE_CONNECTION
/// sqlx::Error::Io             → DATABASE_CONNECTION
/// other                       → ConfigError::translate on the message
/// ```
pub fn from_sqlx(err: sqlx::Error) -> ConfigError {
    let platform = PlatformType::RelationalEmbedded;

    match err {
        sqlx::Error::PoolTimedOut => {
            ConfigError::new(ErrorCode::DatabaseConnection, platform, "Connection pool timed out")
        }
        sqlx::Error::PoolClosed => {
            ConfigError::new(ErrorCode::DatabaseConnection, platform, "Pool is closed")
        }
        sqlx::Error::Io(io) => ConfigError::new(ErrorCode::DatabaseConnection, platform, io.to_string()),
        other => ConfigError::translate(platform, &other.to_string()),
    }
}

/// Converts a filesystem error.
pub fn from_io(platform: PlatformType, context: &str, err: std::io::Error) -> ConfigError {
    ConfigError::translate(platform, &format!("{}: {}", context, err))
}

/// Converts a (de)serialization error.
pub fn from_json(platform: PlatformType, context: &str, err: serde_json::Error) -> ConfigError {
    ConfigError::save_failed(platform, format!("{}: {}", context, err))
}

/// Converts a transport-level HTTP error from the blob store.
pub fn from_http(err: reqwest::Error) -> ConfigError {
    ConfigError::translate(PlatformType::BlobStore, &err.to_string())
}

/// Converts a non-success HTTP status from the blob store.
///
/// The status line is part of the message so `translate` can recognise
/// `403 Forbidden`, `507 Insufficient Storage` and friends.
pub fn from_status(status: reqwest::StatusCode, body: &str) -> ConfigError {
    let reason = status.canonical_reason().unwrap_or("");
    ConfigError::translate(
        PlatformType::BlobStore,
        &format!("{} {}: {}", status.as_u16(), reason, body.trim()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_connection_errors() {
        let err = from_sqlx(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code, ErrorCode::DatabaseConnection);
        assert_eq!(err.platform, PlatformType::RelationalEmbedded);
    }

    #[test]
    fn test_status_translation() {
        let err = from_status(reqwest::StatusCode::FORBIDDEN, "");
        assert_eq!(err.code, ErrorCode::BlobAccessDenied);

        let err = from_status(reqwest::StatusCode::INSUFFICIENT_STORAGE, "bucket full");
        assert_eq!(err.code, ErrorCode::BlobQuotaExceeded);

        let err = from_status(reqwest::StatusCode::BAD_GATEWAY, "upstream");
        assert_eq!(err.code, ErrorCode::SaveFailed);
        assert_eq!(err.status, 500);
    }

    #[test]
    fn test_io_errors_keep_context() {
        let err = from_io(
            PlatformType::FileBased,
            "writing admin-config.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.code, ErrorCode::SaveFailed);
        assert!(err.message.contains("admin-config.json"));
    }
}
