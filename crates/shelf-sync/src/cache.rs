//! # Local Cache
//!
//! Last-known-good copy of the configuration kept next to the client. It
//! outlives the process so a restart with an unreachable backend still
//! serves the most recent snapshot instead of defaults.
//!
//! ```text
//! FileCache: <cache_path>          whole-file JSON, temp + rename
//! MemoryCache: Mutex<Option<..>>   tests and embedded use
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use shelf_core::Configuration;

use crate::error::{SyncError, SyncResult};

/// Storage for the client-side copy of the configuration.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Cached snapshot; `None` when empty or unreadable as a configuration.
    async fn load(&self) -> SyncResult<Option<Configuration>>;

    /// Replaces the cached snapshot.
    async fn store(&self, config: &Configuration) -> SyncResult<()>;

    /// Drops the cached snapshot.
    async fn clear(&self) -> SyncResult<()>;
}

// =============================================================================
// File Cache
// =============================================================================

/// JSON file cache.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCache { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LocalCache for FileCache {
    async fn load(&self) -> SyncResult<Option<Configuration>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::CacheReadFailed(e.to_string())),
        };

        match serde_json::from_slice::<Configuration>(&raw) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Ignoring unreadable local cache");
                Ok(None)
            }
        }
    }

    async fn store(&self, config: &Configuration) -> SyncResult<()> {
        let write_err = |e: std::io::Error| SyncError::CacheWriteFailed(e.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let body = serde_json::to_vec_pretty(config)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await.map_err(write_err)?;
        tokio::fs::rename(&temp, &self.path).await.map_err(write_err)?;

        debug!(path = ?self.path, "Local cache updated");
        Ok(())
    }

    async fn clear(&self) -> SyncResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::CacheWriteFailed(e.to_string())),
        }
    }
}

// =============================================================================
// Memory Cache
// =============================================================================

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Mutex<Option<Configuration>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-filled with `config`.
    pub fn with(config: Configuration) -> Self {
        MemoryCache {
            slot: Mutex::new(Some(config)),
        }
    }

    fn lock(&self) -> SyncResult<std::sync::MutexGuard<'_, Option<Configuration>>> {
        self.slot
            .lock()
            .map_err(|_| SyncError::CacheReadFailed("memory cache lock poisoned".into()))
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn load(&self) -> SyncResult<Option<Configuration>> {
        Ok(self.lock()?.clone())
    }

    async fn store(&self, config: &Configuration) -> SyncResult<()> {
        *self.lock()? = Some(config.clone());
        Ok(())
    }

    async fn clear(&self) -> SyncResult<()> {
        *self.lock()? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::FeatureId;

    #[tokio::test]
    async fn test_file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache").join("config-cache.json"));

        assert_eq!(cache.load().await.unwrap(), None);

        let mut config = Configuration::default();
        config.upselling.insert(FeatureId::BundleOffers, false);
        cache.store(&config).await.unwrap();

        assert_eq!(cache.load().await.unwrap(), Some(config));
        assert!(!cache.temp_path().exists());

        cache.clear().await.unwrap();
        assert_eq!(cache.load().await.unwrap(), None);
        cache.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_cache_ignores_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config-cache.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert_eq!(FileCache::new(&path).load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache() {
        let cache = MemoryCache::with(Configuration::default());
        assert!(cache.load().await.unwrap().is_some());
        cache.clear().await.unwrap();
        assert!(cache.load().await.unwrap().is_none());
    }
}
