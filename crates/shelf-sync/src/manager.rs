//! # Configuration Manager
//!
//! Client-facing resilience layer over the storage adapter. Callers always
//! get a configuration back; backend failures degrade to the local cache or
//! the defaults and flip the availability flag instead of surfacing.
//!
//! ## Read Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get_config()                                                           │
//! │     │                                                                   │
//! │     ├── backend read (RetryPolicy::config_read: 2 attempts, 200ms)      │
//! │     │      ├── Some(cfg) → cache write-through, snapshot, return        │
//! │     │      ├── None      → persist defaults (CREATE), return them       │
//! │     │      └── Err       → warn, unavailable, cache or defaults         │
//! │                                                                         │
//! │  get_config_sync()                                                      │
//! │     snapshot → cached copy → defaults, immediately                      │
//! │     + background get_config() → broadcast to subscribers                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Path
//! ```text
//! save_config(cfg)
//!    │ validate ──fail──► Rejected (nothing changes)
//!    ▼
//! backend write (RetryPolicy::config_write: 3 attempts, 1s → 2s)
//!    ├── Ok  → Synced        (cache + snapshot updated, available)
//!    └── Err → cache only    → SavedLocally (unavailable)  or  Failed
//! ```
//!
//! Concurrent saves are last-write-wins: each one replaces the whole
//! snapshot, and the backend stamps them in arrival order.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use shelf_core::validation::{
    validate_configuration, validate_credentials, validate_sku, validate_sku_list,
};
use shelf_core::{
    ApiCredentials, AuditEntry, Configuration, FeatureId, PlatformInfo, ProductList, RetryPolicy,
    ValidationError,
};
use shelf_store::{best_effort, with_retry, StorageAdapter, StoreResult};

use crate::auth::{actor_tag, AuthProvider, NoAuth};
use crate::cache::{FileCache, LocalCache};
use crate::config::ManagerSettings;

/// Buffered update notifications per subscriber.
const UPDATE_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a write through the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Stored by the backend.
    Synced(Configuration),

    /// Backend unreachable; kept in the local cache until the next sync.
    SavedLocally(Configuration),

    /// Neither the backend nor the local cache accepted the write.
    Failed(String),

    /// Refused before anything was written.
    Rejected(ValidationError),
}

impl SaveOutcome {
    /// Whether the backend holds the change.
    pub fn is_synced(&self) -> bool {
        matches!(self, SaveOutcome::Synced(_))
    }

    /// Whether the change was kept somewhere.
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Synced(_) | SaveOutcome::SavedLocally(_))
    }

    /// The configuration that was kept, if any.
    pub fn config(&self) -> Option<&Configuration> {
        match self {
            SaveOutcome::Synced(c) | SaveOutcome::SavedLocally(c) => Some(c),
            _ => None,
        }
    }

    /// Short user-facing status line.
    pub fn message(&self) -> String {
        match self {
            SaveOutcome::Synced(_) => "Configuration saved".to_string(),
            SaveOutcome::SavedLocally(_) => "Saved locally, not yet synced".to_string(),
            SaveOutcome::Failed(reason) => format!("Save failed: {}", reason),
            SaveOutcome::Rejected(err) => err.to_string(),
        }
    }
}

/// Result of [`ConfigManager::migrate_from_local_cache`].
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    /// The local copy now lives in the backend.
    Migrated(Configuration),

    /// The backend already has a configuration; nothing was pushed.
    BackendHasConfig,

    /// The local cache is empty.
    NothingToMigrate,

    /// Reading or writing failed.
    Failed(String),
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Default)]
struct ManagerState {
    /// Last configuration confirmed by the backend or saved locally.
    snapshot: Option<Configuration>,

    /// What the local cache held when last read or written.
    cached: Option<Configuration>,

    server_available: bool,

    last_health_check: Option<Instant>,
}

/// Which adapter operation a write goes through.
#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Save,
    Reset,
    Import,
}

impl WriteKind {
    fn label(&self) -> &'static str {
        match self {
            WriteKind::Save => "save_config",
            WriteKind::Reset => "reset_to_defaults",
            WriteKind::Import => "import_config",
        }
    }
}

// =============================================================================
// Config Manager
// =============================================================================

/// Server-first configuration access with local fallback.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConfigManager {
    adapter: Arc<dyn StorageAdapter>,
    cache: Arc<dyn LocalCache>,
    auth: Arc<dyn AuthProvider>,
    state: Arc<RwLock<ManagerState>>,
    updates: broadcast::Sender<Configuration>,
    refreshing: Arc<AtomicBool>,
    read_policy: RetryPolicy,
    write_policy: RetryPolicy,
    health_check_interval: Duration,
    default_actor: Option<String>,
}

impl ConfigManager {
    /// Creates a manager and loads whatever the local cache holds.
    pub async fn new(adapter: Arc<dyn StorageAdapter>, cache: Arc<dyn LocalCache>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let settings = ManagerSettings::default();

        let cached = best_effort("load_local_cache", cache.load()).await.flatten();

        ConfigManager {
            adapter,
            cache,
            auth: Arc::new(NoAuth),
            state: Arc::new(RwLock::new(ManagerState {
                cached,
                server_available: true,
                ..Default::default()
            })),
            updates,
            refreshing: Arc::new(AtomicBool::new(false)),
            read_policy: RetryPolicy::config_read(),
            write_policy: RetryPolicy::config_write(),
            health_check_interval: settings.health_check_interval(),
            default_actor: settings.default_actor,
        }
    }

    /// Creates a manager with a file cache from `settings`.
    pub async fn from_settings(adapter: Arc<dyn StorageAdapter>, settings: &ManagerSettings) -> Self {
        let cache = Arc::new(FileCache::new(settings.cache_path.clone()));
        let mut manager = Self::new(adapter, cache).await;
        manager.health_check_interval = settings.health_check_interval();
        manager.default_actor = settings.default_actor.clone();
        manager
    }

    /// Uses `auth` to tag audit entries.
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    /// Overrides the read retry policy.
    pub fn with_read_policy(mut self, policy: RetryPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    /// Overrides the write retry policy.
    pub fn with_write_policy(mut self, policy: RetryPolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Overrides the spacing between health probes.
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current configuration, from the backend when reachable.
    pub async fn get_config(&self) -> Configuration {
        match self.read_backend().await {
            Ok(Some(config)) => {
                self.remember(&config).await;
                config
            }
            Ok(None) => {
                debug!(platform = %self.adapter.platform(), "Backend is empty, persisting defaults");
                match self.write_backend(Configuration::default(), WriteKind::Save).await {
                    Ok(saved) => {
                        self.remember(&saved).await;
                        saved
                    }
                    Err(err) => {
                        warn!(
                            platform = %err.platform,
                            error = %err,
                            "Could not persist default configuration"
                        );
                        self.mark_unavailable();
                        self.local_copy().await
                    }
                }
            }
            Err(err) => {
                warn!(
                    platform = %err.platform,
                    code = %err.code,
                    error = %err,
                    "Backend read failed, serving local copy"
                );
                self.mark_unavailable();
                self.local_copy().await
            }
        }
    }

    /// Whatever is already known, without waiting on the backend.
    ///
    /// Starts a background [`get_config`](Self::get_config) whose result is
    /// broadcast to [`subscribe`](Self::subscribe) receivers. Outside a Tokio
    /// runtime no refresh is started.
    pub fn get_config_sync(&self) -> Configuration {
        let known = {
            let state = self.read_state();
            state.snapshot.clone().or_else(|| state.cached.clone())
        };

        self.spawn_refresh();
        known.unwrap_or_default()
    }

    /// Receives every configuration the manager learns about after a
    /// background refresh or a write.
    pub fn subscribe(&self) -> broadcast::Receiver<Configuration> {
        self.updates.subscribe()
    }

    /// Most recent audit entries, empty when the backend is unreachable.
    pub async fn audit_log(&self) -> Vec<AuditEntry> {
        match self.adapter.get_audit_log().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(platform = %err.platform, error = %err, "Audit log unavailable");
                Vec::new()
            }
        }
    }

    pub fn platform_info(&self) -> PlatformInfo {
        self.adapter.platform_info()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Saves a whole snapshot.
    pub async fn save_config(&self, config: Configuration) -> SaveOutcome {
        if let Err(err) = validate_configuration(&config) {
            debug!(error = %err, "Rejected configuration");
            return SaveOutcome::Rejected(err);
        }

        self.write(config, WriteKind::Save).await
    }

    /// Saves the defaults, audited as RESET.
    pub async fn reset_to_defaults(&self) -> SaveOutcome {
        info!("Resetting configuration to defaults");
        self.write(Configuration::default(), WriteKind::Reset).await
    }

    /// Turns one upselling feature on or off.
    pub async fn update_feature(&self, feature: FeatureId, enabled: bool) -> SaveOutcome {
        let mut config = self.latest().await;
        config.upselling.insert(feature, enabled);
        self.save_config(config).await
    }

    /// Appends a SKU to a bounded product list.
    pub async fn add_to_list(&self, list: ProductList, sku: &str) -> SaveOutcome {
        let sku = sku.trim();
        if let Err(err) = validate_sku(sku) {
            return SaveOutcome::Rejected(err);
        }

        let mut config = self.latest().await;
        let entries = config.product_configuration.list_mut(list);

        if entries.iter().any(|s| s == sku) {
            return SaveOutcome::Rejected(ValidationError::Duplicate {
                field: list.field_name().to_string(),
                value: sku.to_string(),
            });
        }

        if entries.len() >= list.max_len() {
            return SaveOutcome::Rejected(ValidationError::ListFull {
                list: list.field_name().to_string(),
                max: list.max_len(),
            });
        }

        entries.push(sku.to_string());
        if let Err(err) = validate_sku_list(list, entries.as_slice()) {
            return SaveOutcome::Rejected(err);
        }

        self.save_config(config).await
    }

    /// Removes a SKU from a bounded product list.
    pub async fn remove_from_list(&self, list: ProductList, sku: &str) -> SaveOutcome {
        let sku = sku.trim();
        let mut config = self.latest().await;
        let entries = config.product_configuration.list_mut(list);

        let Some(position) = entries.iter().position(|s| s == sku) else {
            return SaveOutcome::Rejected(ValidationError::NotPresent {
                field: list.field_name().to_string(),
                value: sku.to_string(),
            });
        };

        entries.remove(position);
        self.save_config(config).await
    }

    /// Sets or clears the highlighted primary product.
    pub async fn set_primary_reference(&self, sku: Option<&str>) -> SaveOutcome {
        let sku = sku.map(str::trim).filter(|s| !s.is_empty());
        if let Some(sku) = sku {
            if let Err(err) = validate_sku(sku) {
                return SaveOutcome::Rejected(err);
            }
        }

        let mut config = self.latest().await;
        config.product_configuration.primary_reference = sku.map(str::to_string);
        self.save_config(config).await
    }

    /// Replaces the catalog API credentials.
    pub async fn set_api_credentials(&self, credentials: ApiCredentials) -> SaveOutcome {
        if let Err(err) = validate_credentials(&credentials) {
            return SaveOutcome::Rejected(err);
        }

        let mut config = self.latest().await;
        config.api_credentials = credentials;
        self.save_config(config).await
    }

    /// Pushes a purely local configuration to an empty backend.
    ///
    /// Never overwrites a configuration the backend already has.
    pub async fn migrate_from_local_cache(&self) -> MigrationOutcome {
        let local = match self.cache.load().await {
            Ok(Some(config)) => config,
            Ok(None) => return MigrationOutcome::NothingToMigrate,
            Err(err) => return MigrationOutcome::Failed(err.to_string()),
        };

        match self.read_backend().await {
            Ok(Some(_)) => {
                debug!("Backend already configured, keeping local cache as-is");
                MigrationOutcome::BackendHasConfig
            }
            Ok(None) => match self.write_backend(local, WriteKind::Import).await {
                Ok(saved) => {
                    info!(platform = %self.adapter.platform(), "Local configuration migrated to backend");
                    self.remember(&saved).await;
                    MigrationOutcome::Migrated(saved)
                }
                Err(err) => MigrationOutcome::Failed(err.to_string()),
            },
            Err(err) => MigrationOutcome::Failed(err.to_string()),
        }
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Probes the backend, at most once per health check interval.
    pub async fn check_server(&self) -> bool {
        {
            let state = self.read_state();
            if let Some(last) = state.last_health_check {
                if last.elapsed() < self.health_check_interval {
                    return state.server_available;
                }
            }
        }

        let healthy = self.adapter.check_health().await;
        debug!(platform = %self.adapter.platform(), healthy, "Backend health probed");

        let mut state = self.write_state();
        state.server_available = healthy;
        state.last_health_check = Some(Instant::now());
        healthy
    }

    /// Last known availability, without probing.
    pub fn is_server_available(&self) -> bool {
        self.read_state().server_available
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn read_backend(&self) -> StoreResult<Option<Configuration>> {
        let adapter = Arc::clone(&self.adapter);
        with_retry(&self.read_policy, "get_config", move || {
            let adapter = Arc::clone(&adapter);
            async move { adapter.get_config().await }
        })
        .await
    }

    async fn write_backend(&self, config: Configuration, kind: WriteKind) -> StoreResult<Configuration> {
        let actor = self.actor().await;
        let adapter = Arc::clone(&self.adapter);

        with_retry(&self.write_policy, kind.label(), move || {
            let adapter = Arc::clone(&adapter);
            let config = config.clone();
            let actor = actor.clone();
            async move {
                match kind {
                    WriteKind::Save => adapter.save_config(config, actor.as_deref()).await,
                    WriteKind::Reset => adapter.reset_to_defaults(actor.as_deref()).await,
                    WriteKind::Import => adapter.import_config(config, actor.as_deref()).await,
                }
            }
        })
        .await
    }

    /// Backend write with local fallback.
    async fn write(&self, config: Configuration, kind: WriteKind) -> SaveOutcome {
        let err = match self.write_backend(config.clone(), kind).await {
            Ok(saved) => {
                self.remember(&saved).await;
                self.notify(&saved);
                return SaveOutcome::Synced(saved);
            }
            Err(err) => err,
        };

        warn!(
            platform = %err.platform,
            code = %err.code,
            error = %err,
            "Backend write failed, keeping change locally"
        );
        self.mark_unavailable();

        let mut local = config;
        local.last_updated = Utc::now();

        match self.cache.store(&local).await {
            Ok(()) => {
                {
                    let mut state = self.write_state();
                    state.snapshot = Some(local.clone());
                    state.cached = Some(local.clone());
                }
                self.notify(&local);
                SaveOutcome::SavedLocally(local)
            }
            Err(cache_err) => {
                error!(error = %cache_err, "Local cache write failed, change lost");
                SaveOutcome::Failed(format!("{}; {}", err, cache_err))
            }
        }
    }

    /// Records a configuration the backend confirmed.
    async fn remember(&self, config: &Configuration) {
        let cached = best_effort("cache_write_through", self.cache.store(config))
            .await
            .is_some();

        let mut state = self.write_state();
        state.snapshot = Some(config.clone());
        if cached {
            state.cached = Some(config.clone());
        }
        state.server_available = true;
        state.last_health_check = Some(Instant::now());
    }

    /// Local cache, then in-memory snapshot, then defaults.
    async fn local_copy(&self) -> Configuration {
        if let Some(config) = best_effort("load_local_cache", self.cache.load()).await.flatten() {
            self.write_state().cached = Some(config.clone());
            return config;
        }

        self.read_state().snapshot.clone().unwrap_or_default()
    }

    /// Base for scoped read-modify-write helpers.
    async fn latest(&self) -> Configuration {
        let known = self.read_state().snapshot.clone();
        match known {
            Some(config) => config,
            None => self.get_config().await,
        }
    }

    async fn actor(&self) -> Option<String> {
        actor_tag(self.auth.as_ref())
            .await
            .or_else(|| self.default_actor.clone())
    }

    fn mark_unavailable(&self) {
        let mut state = self.write_state();
        state.server_available = false;
        state.last_health_check = Some(Instant::now());
    }

    fn notify(&self, config: &Configuration) {
        // No subscribers is fine.
        let _ = self.updates.send(config.clone());
    }

    fn spawn_refresh(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime, skipping background refresh");
            return;
        };

        if self.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }

        let manager = self.clone();
        handle.spawn(async move {
            let config = manager.get_config().await;
            manager.refreshing.store(false, Ordering::Release);
            manager.notify(&config);
        });
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticActor;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;
    use shelf_core::{AuditAction, ConfigError, PlatformType};
    use shelf_store::migrations::MigrationTarget;
    use shelf_store::{BlobAdapter, MemoryBlobStore};
    use std::sync::atomic::AtomicUsize;

    /// Blob adapter whose reads and writes can be switched to fail.
    struct FlakyAdapter {
        inner: BlobAdapter,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl FlakyAdapter {
        async fn ready() -> Arc<Self> {
            let adapter = Arc::new(FlakyAdapter {
                inner: BlobAdapter::new(Arc::new(MemoryBlobStore::new())),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            });
            adapter.initialize().await.unwrap();
            adapter.migrate().await.unwrap();
            adapter
        }

        fn outage(&self) -> ConfigError {
            ConfigError::translate(PlatformType::BlobStore, "500 Internal Server Error")
        }
    }

    #[async_trait]
    impl StorageAdapter for FlakyAdapter {
        fn platform(&self) -> PlatformType {
            self.inner.platform()
        }

        fn migration_target(&self) -> &dyn MigrationTarget {
            self.inner.migration_target()
        }

        fn save_lock(&self) -> &tokio::sync::Mutex<()> {
            self.inner.save_lock()
        }

        async fn initialize(&self) -> StoreResult<()> {
            self.inner.initialize().await
        }

        async fn get_config(&self) -> StoreResult<Option<Configuration>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(self.outage());
            }
            self.inner.get_config().await
        }

        async fn write_config(&self, config: &Configuration) -> StoreResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(self.outage());
            }
            self.inner.write_config(config).await
        }

        async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
            self.inner.append_audit(entry).await
        }

        async fn get_audit_log(&self) -> StoreResult<Vec<AuditEntry>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(self.outage());
            }
            self.inner.get_audit_log().await
        }

        async fn check_health(&self) -> bool {
            !self.fail_reads.load(Ordering::SeqCst)
        }
    }

    async fn manager_with(adapter: Arc<FlakyAdapter>, cache: Arc<MemoryCache>) -> ConfigManager {
        ConfigManager::new(adapter, cache).await
    }

    #[tokio::test]
    async fn test_empty_backend_returns_and_persists_defaults() {
        let adapter = FlakyAdapter::ready().await;
        let cache = Arc::new(MemoryCache::new());
        let manager = manager_with(Arc::clone(&adapter), Arc::clone(&cache)).await;

        let config = manager.get_config().await;
        assert!(config.same_content(&Configuration::default()));
        assert!(FeatureId::ALL.iter().all(|f| config.is_enabled(*f)));

        assert_eq!(adapter.inner.get_config().await.unwrap(), Some(config.clone()));
        assert_eq!(cache.load().await.unwrap(), Some(config));
        assert_eq!(manager.audit_log().await[0].action, AuditAction::Create);
    }

    #[tokio::test]
    async fn test_fourth_recommendation_rejected() {
        let adapter = FlakyAdapter::ready().await;
        let manager = manager_with(Arc::clone(&adapter), Arc::new(MemoryCache::new())).await;

        for sku in ["SKU001", "SKU002", "SKU003"] {
            assert!(manager.add_to_list(ProductList::Recommendations, sku).await.is_synced());
        }
        let writes_before = adapter.writes.load(Ordering::SeqCst);

        let outcome = manager.add_to_list(ProductList::Recommendations, "SKU004").await;
        assert!(matches!(outcome, SaveOutcome::Rejected(ValidationError::ListFull { max: 3, .. })));
        assert_eq!(adapter.writes.load(Ordering::SeqCst), writes_before);

        let stored = adapter.inner.get_config().await.unwrap().unwrap();
        assert_eq!(
            stored.product_configuration.recommendations,
            vec!["SKU001", "SKU002", "SKU003"]
        );
        assert_eq!(manager.get_config_sync(), stored);
    }

    #[tokio::test]
    async fn test_scoped_helpers_validate() {
        let manager = manager_with(FlakyAdapter::ready().await, Arc::new(MemoryCache::new())).await;

        assert!(matches!(
            manager.add_to_list(ProductList::CrossSellReferences, "ab-12").await,
            SaveOutcome::Rejected(ValidationError::InvalidFormat { .. })
        ));
        assert!(manager.add_to_list(ProductList::BundleReferences, "BUNDLE1").await.is_synced());
        assert!(matches!(
            manager.add_to_list(ProductList::BundleReferences, "BUNDLE1").await,
            SaveOutcome::Rejected(ValidationError::Duplicate { .. })
        ));
        assert!(matches!(
            manager.remove_from_list(ProductList::BundleReferences, "MISSING1").await,
            SaveOutcome::Rejected(ValidationError::NotPresent { .. })
        ));
        assert!(manager.remove_from_list(ProductList::BundleReferences, "BUNDLE1").await.is_synced());

        let outcome = manager.set_primary_reference(Some("HERO001")).await;
        assert_eq!(
            outcome.config().unwrap().product_configuration.primary_reference.as_deref(),
            Some("HERO001")
        );

        let bad = ApiCredentials {
            country: "USA".into(),
            ..ApiCredentials::default()
        };
        assert!(matches!(manager.set_api_credentials(bad).await, SaveOutcome::Rejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_outage_saves_locally() {
        let adapter = FlakyAdapter::ready().await;
        let cache = Arc::new(MemoryCache::new());
        let manager = manager_with(Arc::clone(&adapter), Arc::clone(&cache)).await;
        manager.get_config().await;

        adapter.fail_writes.store(true, Ordering::SeqCst);
        let writes_before = adapter.writes.load(Ordering::SeqCst);

        let mut config = Configuration::default();
        config.upselling.insert(FeatureId::CrossSell, false);
        let outcome = manager.save_config(config).await;

        assert!(matches!(outcome, SaveOutcome::SavedLocally(_)));
        assert_eq!(outcome.message(), "Saved locally, not yet synced");
        assert_eq!(adapter.writes.load(Ordering::SeqCst) - writes_before, 3);
        assert!(!manager.is_server_available());

        let cached = cache.load().await.unwrap().unwrap();
        assert!(!cached.is_enabled(FeatureId::CrossSell));

        let stored = adapter.inner.get_config().await.unwrap().unwrap();
        assert!(stored.is_enabled(FeatureId::CrossSell));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_outage_serves_cache() {
        let adapter = FlakyAdapter::ready().await;
        let mut cached = Configuration::default();
        cached.product_configuration.primary_reference = Some("CACHED01".into());
        let manager = manager_with(Arc::clone(&adapter), Arc::new(MemoryCache::with(cached.clone()))).await;

        adapter.fail_reads.store(true, Ordering::SeqCst);
        let reads_before = adapter.reads.load(Ordering::SeqCst);
        let config = manager.get_config().await;

        assert_eq!(config, cached);
        assert_eq!(adapter.reads.load(Ordering::SeqCst) - reads_before, 2);
        assert!(!manager.is_server_available());
        assert!(manager.audit_log().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_outage_without_cache_serves_defaults() {
        let adapter = FlakyAdapter::ready().await;
        adapter.fail_reads.store(true, Ordering::SeqCst);
        let manager = manager_with(adapter, Arc::new(MemoryCache::new())).await;

        assert!(manager.get_config().await.same_content(&Configuration::default()));
    }

    #[tokio::test]
    async fn test_sequential_feature_toggles_both_persist() {
        let adapter = FlakyAdapter::ready().await;
        let manager = manager_with(Arc::clone(&adapter), Arc::new(MemoryCache::new()))
            .await
            .with_auth(Arc::new(StaticActor::new("admin@shop")));

        let first = manager.update_feature(FeatureId::BundleOffers, false).await;
        let second = manager.update_feature(FeatureId::PostPurchaseOffers, false).await;
        assert!(first.is_synced() && second.is_synced());

        let first_stamp = first.config().unwrap().last_updated;
        let second_stamp = second.config().unwrap().last_updated;
        assert!(second_stamp > first_stamp);

        let stored = adapter.inner.get_config().await.unwrap().unwrap();
        assert_eq!(stored.last_updated, second_stamp);
        assert!(!stored.is_enabled(FeatureId::BundleOffers));
        assert!(!stored.is_enabled(FeatureId::PostPurchaseOffers));
        assert!(stored.is_enabled(FeatureId::CrossSell));

        let log = manager.audit_log().await;
        assert_eq!(log[0].actor_tag.as_deref(), Some("admin@shop"));
    }

    #[tokio::test]
    async fn test_get_config_sync_answers_then_broadcasts() {
        let adapter = FlakyAdapter::ready().await;
        let mut remote = Configuration::default();
        remote.upselling.insert(FeatureId::PrimaryProductHighlight, false);
        adapter.inner.save_config(remote, None).await.unwrap();

        let manager = manager_with(Arc::clone(&adapter), Arc::new(MemoryCache::new())).await;
        let mut updates = manager.subscribe();

        let immediate = manager.get_config_sync();
        assert!(immediate.is_enabled(FeatureId::PrimaryProductHighlight));

        let refreshed = updates.recv().await.unwrap();
        assert!(!refreshed.is_enabled(FeatureId::PrimaryProductHighlight));
        assert_eq!(manager.get_config_sync(), refreshed);
    }

    #[tokio::test]
    async fn test_reset_to_defaults() {
        let manager = manager_with(FlakyAdapter::ready().await, Arc::new(MemoryCache::new())).await;
        manager.update_feature(FeatureId::CrossSell, false).await;

        let outcome = manager.reset_to_defaults().await;
        assert!(outcome.config().unwrap().same_content(&Configuration::default()));
        assert_eq!(manager.audit_log().await[0].action, AuditAction::Reset);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_probe_is_throttled() {
        let adapter = FlakyAdapter::ready().await;
        let manager = manager_with(Arc::clone(&adapter), Arc::new(MemoryCache::new()))
            .await
            .with_health_check_interval(Duration::from_secs(30));

        assert!(manager.check_server().await);

        adapter.fail_reads.store(true, Ordering::SeqCst);
        assert!(manager.check_server().await, "cached within interval");

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!manager.check_server().await);
        assert!(!manager.is_server_available());
    }

    #[tokio::test]
    async fn test_migrate_from_local_cache() {
        let mut local = Configuration::default();
        local.product_configuration.recommendations = vec!["LOCAL001".into()];

        let adapter = FlakyAdapter::ready().await;
        let manager = manager_with(Arc::clone(&adapter), Arc::new(MemoryCache::with(local.clone()))).await;

        let saved = match manager.migrate_from_local_cache().await {
            MigrationOutcome::Migrated(saved) => saved,
            other => panic!("expected migration, got {:?}", other),
        };
        assert!(saved.same_content(&local));
        assert_eq!(manager.audit_log().await[0].action, AuditAction::Import);

        assert_eq!(manager.migrate_from_local_cache().await, MigrationOutcome::BackendHasConfig);
    }

    #[tokio::test]
    async fn test_migrate_with_empty_cache() {
        let manager = manager_with(FlakyAdapter::ready().await, Arc::new(MemoryCache::new())).await;
        assert_eq!(manager.migrate_from_local_cache().await, MigrationOutcome::NothingToMigrate);
    }
}
