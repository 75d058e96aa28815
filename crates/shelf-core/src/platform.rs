//! # Platform Detection
//!
//! Maps deployment environment signals to one of three storage platforms.
//!
//! ## Detection Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Platform Detection                                 │
//! │                                                                         │
//! │  1. SHELF_PLATFORM=fileBased|relationalEmbedded|blobStore (override)   │
//! │       │ (unset or unknown)                                             │
//! │       ▼                                                                 │
//! │  2. SHELF_BLOB_URL set, or serverless marker present                   │
//! │     (AWS_LAMBDA_FUNCTION_NAME, NETLIFY, VERCEL)   → blobStore          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. SHELF_DATABASE_PATH set                       → relationalEmbedded │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  4. Otherwise                                     → fileBased          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The environment is read once; [`detect`] returns the same answer for the
//! lifetime of the process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use ts_rs::TS;

// =============================================================================
// Platform Type
// =============================================================================

/// The storage platform the configuration document lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum PlatformType {
    /// JSON documents on a local filesystem.
    FileBased,

    /// Embedded SQLite database.
    RelationalEmbedded,

    /// Single JSON document in an object/blob store.
    BlobStore,
}

impl PlatformType {
    /// Returns the wire tag (`fileBased`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformType::FileBased => "fileBased",
            PlatformType::RelationalEmbedded => "relationalEmbedded",
            PlatformType::BlobStore => "blobStore",
        }
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "filebased" | "file" | "local" => Ok(PlatformType::FileBased),
            "relationalembedded" | "sqlite" | "relational" => Ok(PlatformType::RelationalEmbedded),
            "blobstore" | "blob" => Ok(PlatformType::BlobStore),
            other => Err(format!(
                "Unknown platform: '{}'. Valid options: fileBased, relationalEmbedded, blobStore",
                other
            )),
        }
    }
}

/// Kind of storage primitive a platform offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum StorageKind {
    /// Whole-file JSON documents.
    JsonFiles,
    /// SQLite tables.
    Sqlite,
    /// One JSON object in a blob bucket.
    ObjectBlob,
}

// =============================================================================
// Platform Info
// =============================================================================

/// Static capability metadata for a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PlatformInfo {
    /// Platform tag.
    #[serde(rename = "type")]
    pub platform_type: PlatformType,

    /// Human-readable name for admin screens.
    pub display_name: String,

    /// Whether the platform has a writable local filesystem.
    pub supports_file_system: bool,

    /// Underlying storage primitive.
    pub storage_kind: StorageKind,
}

/// Returns capability metadata for `platform`, or for the detected platform
/// when `None`.
pub fn describe(platform: Option<PlatformType>) -> PlatformInfo {
    let platform_type = platform.unwrap_or_else(detect);

    let (display_name, supports_file_system, storage_kind) = match platform_type {
        PlatformType::FileBased => ("Local filesystem", true, StorageKind::JsonFiles),
        PlatformType::RelationalEmbedded => ("Embedded SQLite", true, StorageKind::Sqlite),
        PlatformType::BlobStore => ("Object blob store", false, StorageKind::ObjectBlob),
    };

    PlatformInfo {
        platform_type,
        display_name: display_name.to_string(),
        supports_file_system,
        storage_kind,
    }
}

// =============================================================================
// Environment Signals
// =============================================================================

/// The environment variables detection looks at, captured as plain data so
/// the decision itself stays a pure function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSignals {
    /// `SHELF_PLATFORM` explicit override.
    pub platform_override: Option<String>,

    /// `SHELF_BLOB_URL`.
    pub blob_url: Option<String>,

    /// `SHELF_DATABASE_PATH`.
    pub database_path: Option<String>,

    /// Any serverless marker (`AWS_LAMBDA_FUNCTION_NAME`, `NETLIFY`, `VERCEL`).
    pub serverless: bool,
}

impl EnvSignals {
    /// Captures the signals from the process environment.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        EnvSignals {
            platform_override: non_empty("SHELF_PLATFORM"),
            blob_url: non_empty("SHELF_BLOB_URL"),
            database_path: non_empty("SHELF_DATABASE_PATH"),
            serverless: ["AWS_LAMBDA_FUNCTION_NAME", "NETLIFY", "VERCEL"]
                .iter()
                .any(|key| non_empty(key).is_some()),
        }
    }
}

/// Decides the platform from captured signals.
///
/// Deterministic: the same signals always give the same answer. An unknown
/// override value is ignored rather than treated as an error.
pub fn detect_from(signals: &EnvSignals) -> PlatformType {
    if let Some(parsed) = signals
        .platform_override
        .as_deref()
        .and_then(|raw| raw.parse::<PlatformType>().ok())
    {
        return parsed;
    }

    if signals.blob_url.is_some() || signals.serverless {
        return PlatformType::BlobStore;
    }

    if signals.database_path.is_some() {
        return PlatformType::RelationalEmbedded;
    }

    PlatformType::FileBased
}

/// Detects the platform for this process (memoized).
pub fn detect() -> PlatformType {
    static DETECTED: OnceLock<PlatformType> = OnceLock::new();
    *DETECTED.get_or_init(|| detect_from(&EnvSignals::from_env()))
}

// =============================================================================
// Unit Tests
// =============================================================================
