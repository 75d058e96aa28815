//! # Error Types
//!
//! Error taxonomy shared by every Shelf crate.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shelf-core errors (this file)                                         │
//! │  ├── ValidationError  - Document rule violations (SKU, bounds, creds)  │
//! │  ├── ErrorCode        - Machine-readable code + status-like number     │
//! │  └── ConfigError      - Storage failure tagged with code + platform    │
//! │                                                                         │
//! │  shelf-sync errors (separate crate)                                    │
//! │  └── SyncError        - Cache, config file, catalog API failures       │
//! │                                                                         │
//! │  Flow: raw backend error ──translate()──► ConfigError ──► ConfigManager │
//! │        (absorbed there: callers get cached/default values instead)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, list name, platform)
//! 3. Every `ConfigError` carries a status-like code for boundary translation
//! 4. Unrecognized backend failures map to `SAVE_FAILED`

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use ts_rs::TS;

use crate::platform::PlatformType;

// =============================================================================
// Error Codes
// =============================================================================

/// Machine-readable storage error codes.
///
/// The first four are shared by every backend; the rest are specific to the
/// embedded-relational and blob-store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ErrorCode {
    /// Document failed validation (400)
    InvalidConfig,
    /// Write failed for an unrecognized reason (500)
    SaveFailed,
    /// Requested resource does not exist (404)
    NotFound,
    /// Backend could not be prepared (500)
    InitializationFailed,

    /// SQLite file could not be opened / pool unavailable (503)
    DatabaseConnection,
    /// SQLite busy / locked by another writer (503)
    DatabaseLocked,
    /// SQLite file is malformed (500)
    DatabaseCorrupt,

    /// Blob store refused the write for size/quota reasons (507)
    BlobQuotaExceeded,
    /// Blob store rejected our credentials (403)
    BlobAccessDenied,
    /// Blob key does not exist (404)
    BlobNotFound,
}

impl ErrorCode {
    /// Returns the wire name (`INVALID_CONFIG`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::SaveFailed => "SAVE_FAILED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InitializationFailed => "INITIALIZATION_FAILED",
            ErrorCode::DatabaseConnection => "DATABASE_CONNECTION",
            ErrorCode::DatabaseLocked => "DATABASE_LOCKED",
            ErrorCode::DatabaseCorrupt => "DATABASE_CORRUPT",
            ErrorCode::BlobQuotaExceeded => "BLOB_QUOTA_EXCEEDED",
            ErrorCode::BlobAccessDenied => "BLOB_ACCESS_DENIED",
            ErrorCode::BlobNotFound => "BLOB_NOT_FOUND",
        }
    }

    /// Returns the HTTP-like status used when this error crosses a boundary.
    ///
    /// ```text
    /// 4xx → caller's fault, never retried
    /// 5xx → backend's fault, retried when the policy lists the code
    /// ```
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::InvalidConfig => 400,
            ErrorCode::BlobAccessDenied => 403,
            ErrorCode::NotFound | ErrorCode::BlobNotFound => 404,
            ErrorCode::SaveFailed
            | ErrorCode::InitializationFailed
            | ErrorCode::DatabaseCorrupt => 500,
            ErrorCode::DatabaseConnection | ErrorCode::DatabaseLocked => 503,
            ErrorCode::BlobQuotaExceeded => 507,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Config Error
// =============================================================================

/// A storage-layer failure, tagged with enough context for translation at
/// the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} [{code} on {platform}]")]
pub struct ConfigError {
    /// Human-readable description.
    pub message: String,

    /// Taxonomy code.
    pub code: ErrorCode,

    /// Backend the failure came from.
    pub platform: PlatformType,

    /// HTTP-like status derived from `code`.
    pub status: u16,
}

impl ConfigError {
    /// Creates an error whose status is derived from its code.
    pub fn new(code: ErrorCode, platform: PlatformType, message: impl Into<String>) -> Self {
        ConfigError {
            message: message.into(),
            code,
            platform,
            status: code.status(),
        }
    }

    /// Wraps a validation failure as `INVALID_CONFIG`.
    pub fn invalid(platform: PlatformType, err: &ValidationError) -> Self {
        ConfigError::new(ErrorCode::InvalidConfig, platform, err.to_string())
    }

    /// Creates a `SAVE_FAILED` error.
    pub fn save_failed(platform: PlatformType, message: impl Into<String>) -> Self {
        ConfigError::new(ErrorCode::SaveFailed, platform, message)
    }

    /// Creates an `INITIALIZATION_FAILED` error.
    pub fn initialization(platform: PlatformType, message: impl Into<String>) -> Self {
        ConfigError::new(ErrorCode::InitializationFailed, platform, message)
    }

    /// Creates a `NOT_FOUND` error.
    pub fn not_found(platform: PlatformType, what: impl Into<String>) -> Self {
        ConfigError::new(ErrorCode::NotFound, platform, format!("{} not found", what.into()))
    }

    /// Translates a raw backend error message into a tagged `ConfigError`.
    ///
    /// ## Error Mapping
    /// ```text
    /// relationalEmbedded:
    ///   "database is locked", "busy"           → DATABASE_LOCKED
    ///   "malformed", "not a database"          → DATABASE_CORRUPT
    ///   "unable to open", "pool", "connection" → DATABASE_CONNECTION
    /// blobStore:
    ///   "quota", "insufficient storage"        → BLOB_QUOTA_EXCEEDED
    ///   "forbidden", "unauthorized", "denied"  → BLOB_ACCESS_DENIED
    ///   "not found", "no such key"             → BLOB_NOT_FOUND
    /// anything else                            → SAVE_FAILED
    /// ```
    pub fn translate(platform: PlatformType, raw: &str) -> Self {
        let lower = raw.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        let code = match platform {
            PlatformType::RelationalEmbedded => {
                if has(&["database is locked", "database table is locked", "sqlite_busy", "busy"]) {
                    ErrorCode::DatabaseLocked
                } else if has(&["malformed", "not a database", "corrupt"]) {
                    ErrorCode::DatabaseCorrupt
                } else if has(&["unable to open", "pool", "connection", "cantopen"]) {
                    ErrorCode::DatabaseConnection
                } else {
                    ErrorCode::SaveFailed
                }
            }
            PlatformType::BlobStore => {
                if has(&["quota", "insufficient storage", "storage limit"]) {
                    ErrorCode::BlobQuotaExceeded
                } else if has(&["forbidden", "unauthorized", "access denied"]) {
                    ErrorCode::BlobAccessDenied
                } else if has(&["not found", "no such key"]) {
                    ErrorCode::BlobNotFound
                } else {
                    ErrorCode::SaveFailed
                }
            }
            PlatformType::FileBased => ErrorCode::SaveFailed,
        };

        ConfigError::new(code, platform, raw)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Document rule violations.
///
/// Raised by the validators in [`crate::validation`] and by the scoped
/// helpers of the configuration manager before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (bad characters, bad URL).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A bounded product list is already at capacity.
    ///
    /// ## User Workflow
    /// ```text
    /// recommendations = [A, B, C]   (max 3)
    ///      │
    ///      ▼
    /// add_to_list(Recommendations, "SKU999")
    ///      │
    ///      ▼
    /// ListFull { list: "recommendations", max: 3 }
    /// ```
    #[error("{list} cannot hold more than {max} SKUs")]
    ListFull { list: String, max: usize },

    /// Value already present.
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Value expected in a list is not there.
    #[error("{field} does not contain '{value}'")]
    NotPresent { field: String, value: String },

    /// Fields disagree with each other.
    #[error("{0}")]
    Inconsistent(String),
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_names() {
        assert_eq!(ErrorCode::InvalidConfig.to_string(), "INVALID_CONFIG");
        assert_eq!(
            serde_json::to_string(&ErrorCode::BlobQuotaExceeded).unwrap(),
            "\"BLOB_QUOTA_EXCEEDED\""
        );
    }

    #[test]
    fn test_status_classes() {
        assert_eq!(ErrorCode::InvalidConfig.status(), 400);
        assert_eq!(ErrorCode::BlobAccessDenied.status(), 403);
        assert_eq!(ErrorCode::DatabaseLocked.status(), 503);
        assert_eq!(ErrorCode::SaveFailed.status(), 500);
    }

    #[test]
    fn test_translate_relational() {
        let err = ConfigError::translate(
            PlatformType::RelationalEmbedded,
            "error returned from database: (code: 5) database is locked",
        );
        assert_eq!(err.code, ErrorCode::DatabaseLocked);
        assert_eq!(err.status, 503);

        let err = ConfigError::translate(
            PlatformType::RelationalEmbedded,
            "database disk image is malformed",
        );
        assert_eq!(err.code, ErrorCode::DatabaseCorrupt);

        let err = ConfigError::translate(PlatformType::RelationalEmbedded, "unable to open database file");
        assert_eq!(err.code, ErrorCode::DatabaseConnection);
    }

    #[test]
    fn test_translate_blob() {
        assert_eq!(
            ConfigError::translate(PlatformType::BlobStore, "Storage quota exceeded").code,
            ErrorCode::BlobQuotaExceeded
        );
        assert_eq!(
            ConfigError::translate(PlatformType::BlobStore, "403 Forbidden").code,
            ErrorCode::BlobAccessDenied
        );
        assert_eq!(
            ConfigError::translate(PlatformType::BlobStore, "key not found").code,
            ErrorCode::BlobNotFound
        );
    }

    #[test]
    fn test_unrecognized_maps_to_save_failed() {
        let err = ConfigError::translate(PlatformType::FileBased, "disk on fire");
        assert_eq!(err.code, ErrorCode::SaveFailed);
        assert_eq!(err.platform, PlatformType::FileBased);

        // Relational-only wording means nothing to the blob store.
        let err = ConfigError::translate(PlatformType::BlobStore, "database is locked");
        assert_eq!(err.code, ErrorCode::SaveFailed);
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::ListFull {
            list: "recommendations".to_string(),
            max: 3,
        };
        assert_eq!(err.to_string(), "recommendations cannot hold more than 3 SKUs");

        let cfg_err = ConfigError::invalid(PlatformType::FileBased, &err);
        assert_eq!(cfg_err.code, ErrorCode::InvalidConfig);
        assert!(cfg_err.to_string().contains("INVALID_CONFIG"));
    }
}
