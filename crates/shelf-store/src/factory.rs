//! # Adapter Factory
//!
//! Picks and prepares the backend for this process.
//!
//! ## Selection
//! ```text
//! StorageSettings.platform (explicit)
//!        │ None
//!        ▼
//! platform::detect()  (env signals, memoized)
//!        │
//!        ├── fileBased          → FileAdapter(data_dir)
//!        ├── relationalEmbedded → SqliteAdapter(database_path or data_dir/shelf.db)
//!        └── blobStore          → BlobAdapter(HttpBlobStore(blob_url, blob_token))
//!        │
//!        ▼
//! initialize() → migrate() → Arc<dyn StorageAdapter>
//! ```
//!
//! [`shared_adapter`] keeps one instance per process; tests swap it with
//! [`install_shared_adapter`] and clear it with [`reset_shared_adapter`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use shelf_core::platform::detect;
use shelf_core::{ConfigError, PlatformType};

use crate::adapter::StorageAdapter;
use crate::blob::{BlobAdapter, HttpBlobStore};
use crate::error::StoreResult;
use crate::file::FileAdapter;
use crate::pool::DbConfig;
use crate::sqlite::SqliteAdapter;

/// Default SQLite file name inside the data directory.
pub const DEFAULT_DATABASE_FILE: &str = "shelf.db";

// =============================================================================
// Settings
// =============================================================================

/// Where and how the configuration document is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Explicit platform; detected from the environment when unset.
    pub platform: Option<PlatformType>,

    /// Directory for the file backend (and the default SQLite location).
    pub data_dir: PathBuf,

    /// SQLite database file.
    pub database_path: Option<PathBuf>,

    /// Base URL of the blob store.
    pub blob_url: Option<String>,

    /// Bearer token for the blob store.
    pub blob_token: Option<String>,

    /// Per-request timeout for networked backends.
    pub request_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            platform: None,
            data_dir: PathBuf::from("data"),
            database_path: None,
            blob_url: None,
            blob_token: None,
            request_timeout_secs: 10,
        }
    }
}

impl StorageSettings {
    /// Platform these settings resolve to.
    pub fn resolve_platform(&self) -> PlatformType {
        self.platform.unwrap_or_else(detect)
    }

    /// SQLite file these settings resolve to.
    pub fn resolve_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_DATABASE_FILE))
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds an adapter for `settings` without touching any backend.
pub fn build_adapter(settings: &StorageSettings) -> StoreResult<Arc<dyn StorageAdapter>> {
    let platform = settings.resolve_platform();

    let adapter: Arc<dyn StorageAdapter> = match platform {
        PlatformType::FileBased => Arc::new(FileAdapter::new(settings.data_dir.clone())),
        PlatformType::RelationalEmbedded => {
            Arc::new(SqliteAdapter::new(DbConfig::new(settings.resolve_database_path())))
        }
        PlatformType::BlobStore => {
            let url = settings
                .blob_url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| ConfigError::initialization(platform, "blob store URL is not configured"))?;

            let store = HttpBlobStore::new(
                url,
                settings.blob_token.clone(),
                Duration::from_secs(settings.request_timeout_secs),
            )?;
            Arc::new(BlobAdapter::new(Arc::new(store)))
        }
    };

    Ok(adapter)
}

/// Builds, initializes and migrates an adapter.
pub async fn create_adapter(settings: &StorageSettings) -> StoreResult<Arc<dyn StorageAdapter>> {
    let adapter = build_adapter(settings)?;
    prepare(adapter).await
}

/// Initializes and migrates an already built adapter.
pub async fn prepare(adapter: Arc<dyn StorageAdapter>) -> StoreResult<Arc<dyn StorageAdapter>> {
    adapter.initialize().await?;
    let report = adapter.migrate().await?;

    info!(
        platform = %adapter.platform(),
        schema_version = report.to_version,
        "Storage adapter ready"
    );
    Ok(adapter)
}

// =============================================================================
// Process-Wide Instance
// =============================================================================

fn shared_slot() -> &'static Mutex<Option<Arc<dyn StorageAdapter>>> {
    static SHARED: OnceLock<Mutex<Option<Arc<dyn StorageAdapter>>>> = OnceLock::new();
    SHARED.get_or_init(|| Mutex::new(None))
}

/// The process-wide adapter, created from `settings` on first use.
///
/// Later calls return the same instance regardless of `settings`. A failed
/// creation leaves the slot empty so the next call tries again.
pub async fn shared_adapter(settings: &StorageSettings) -> StoreResult<Arc<dyn StorageAdapter>> {
    let mut slot = shared_slot().lock().await;

    if let Some(adapter) = slot.as_ref() {
        return Ok(Arc::clone(adapter));
    }

    let adapter = create_adapter(settings).await?;
    *slot = Some(Arc::clone(&adapter));
    Ok(adapter)
}

/// Replaces the process-wide adapter.
pub async fn install_shared_adapter(adapter: Arc<dyn StorageAdapter>) {
    *shared_slot().lock().await = Some(adapter);
}

/// Drops the process-wide adapter.
pub async fn reset_shared_adapter() {
    *shared_slot().lock().await = None;
}

// =============================================================================
// Unit Tests
// =============================================================================
