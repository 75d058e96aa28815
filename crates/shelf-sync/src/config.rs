//! # Shelf Configuration
//!
//! Process settings for the client layer: where the document is stored, where
//! the local cache lives and how the catalog client behaves.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SHELF_PLATFORM=relationalEmbedded                                  │
//! │     SHELF_DATABASE_PATH=/var/lib/shelf/shelf.db                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/shelf/shelf.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.shelf.shelf/shelf.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     detected platform, ./data, 1h catalog TTL                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # shelf.toml
//! [storage]
//! platform = "blobStore"        # fileBased | relationalEmbedded | blobStore
//! blob_url = "https://blobs.example.com/shelf"
//! request_timeout_secs = 10
//!
//! [manager]
//! cache_path = "data/config-cache.json"
//! health_check_interval_secs = 30
//!
//! [catalog]
//! ttl_secs = 3600
//! max_entries = 1000
//! requests_per_window = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use shelf_core::PlatformType;
use shelf_store::StorageSettings;

use crate::error::{SyncError, SyncResult};

/// Config file name inside the project config directory.
pub const CONFIG_FILE_NAME: &str = "shelf.toml";

// =============================================================================
// Manager Settings
// =============================================================================

/// Configuration manager behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Local cache file that survives restarts.
    pub cache_path: PathBuf,

    /// Minimum spacing between two backend health probes.
    pub health_check_interval_secs: u64,

    /// Actor tag used when no authenticated session supplies one.
    pub default_actor: Option<String>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        ManagerSettings {
            cache_path: PathBuf::from("data").join("config-cache.json"),
            health_check_interval_secs: 30,
            default_actor: None,
        }
    }
}

impl ManagerSettings {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

// =============================================================================
// Catalog Settings
// =============================================================================

/// Catalog client cache and pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// How long a cached response stays fresh.
    pub ttl_secs: u64,

    /// Cache size that triggers eviction of the oldest 10%.
    pub max_entries: usize,

    /// Interval of the background sweep of expired entries.
    pub sweep_interval_secs: u64,

    /// Requests allowed per window across all clients.
    pub requests_per_window: usize,

    /// Rate window length.
    pub window_ms: u64,

    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        CatalogSettings {
            ttl_secs: 3600,
            max_entries: 1000,
            sweep_interval_secs: 300,
            requests_per_window: 10,
            window_ms: 1000,
            request_timeout_secs: 10,
        }
    }
}

impl CatalogSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Shelf Config
// =============================================================================

/// Complete client-layer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfConfig {
    /// Backend selection and location.
    #[serde(default)]
    pub storage: StorageSettings,

    /// Configuration manager settings.
    #[serde(default)]
    pub manager: ManagerSettings,

    /// Catalog client settings.
    #[serde(default)]
    pub catalog: CatalogSettings,
}

impl ShelfConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (shelf.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading shelf config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load shelf config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Shelf config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(ref raw) = self.storage.blob_url {
            let parsed = url::Url::parse(raw)
                .map_err(|e| SyncError::InvalidConfig(format!("storage.blob_url: {}", e)))?;

            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(SyncError::InvalidConfig(format!(
                    "storage.blob_url must start with http:// or https://, got: {}",
                    raw
                )));
            }
        }

        if self.storage.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "storage.request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.catalog.ttl_secs == 0 {
            return Err(SyncError::InvalidConfig("catalog.ttl_secs must be greater than 0".into()));
        }

        if self.catalog.max_entries == 0 {
            return Err(SyncError::InvalidConfig(
                "catalog.max_entries must be greater than 0".into(),
            ));
        }

        if self.catalog.requests_per_window == 0 || self.catalog.window_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "catalog rate window must allow at least one request".into(),
            ));
        }

        Ok(())
    }

    /// Applies `SHELF_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup.
    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(platform) = lookup("SHELF_PLATFORM") {
            match platform.parse::<PlatformType>() {
                Ok(parsed) => {
                    debug!(platform = %parsed, "Overriding platform from environment");
                    self.storage.platform = Some(parsed);
                }
                Err(_) => warn!(platform = %platform, "Unknown platform in environment"),
            }
        }

        if let Some(dir) = lookup("SHELF_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Some(path) = lookup("SHELF_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("SHELF_BLOB_URL") {
            debug!(url = %url, "Overriding blob URL from environment");
            self.storage.blob_url = Some(url);
        }

        if let Some(token) = lookup("SHELF_BLOB_TOKEN") {
            self.storage.blob_token = Some(token);
        }

        if let Some(path) = lookup("SHELF_CACHE_PATH") {
            self.manager.cache_path = PathBuf::from(path);
        }

        if let Some(actor) = lookup("SHELF_ACTOR") {
            self.manager.default_actor = Some(actor);
        }

        if let Some(ttl) = lookup("SHELF_CATALOG_TTL_SECS") {
            if let Ok(secs) = ttl.parse::<u64>() {
                self.catalog.ttl_secs = secs;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "shelf", "shelf")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}
