//! # File-Based Backend
//!
//! JSON documents in a local directory.
//!
//! ## Layout
//! ```text
//! <data_dir>/
//! ├── admin-config.json    ← current Configuration
//! ├── config-audit.json    ← AuditEntry[] newest-first, ≤ 100
//! └── config-schema.json   ← MigrationLedgerEntry[]
//! ```
//!
//! Every write goes to `<name>.tmp` first and is renamed over the target, so
//! a crash never leaves a half-written document behind. Writers inside one
//! process are serialized by a mutex.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shelf_core::{AuditEntry, ConfigError, Configuration, MigrationLedgerEntry, PlatformType, AUDIT_LOG_CAPACITY};

use crate::adapter::{checked, StorageAdapter};
use crate::error::{from_io, from_json, StoreResult};
use crate::migrations::{MigrationStep, MigrationTarget};

pub const CONFIG_FILE: &str = "admin-config.json";
pub const AUDIT_FILE: &str = "config-audit.json";
pub const SCHEMA_FILE: &str = "config-schema.json";

const PLATFORM: PlatformType = PlatformType::FileBased;

static STEPS: &[MigrationStep] = &[
    MigrationStep {
        version: 1,
        description: "create audit log file",
    },
    MigrationStep {
        version: 2,
        description: "order audit log newest-first and cap it",
    },
];

/// JSON-file storage adapter.
#[derive(Debug)]
pub struct FileAdapter {
    dir: PathBuf,
    write_lock: Mutex<()>,
    save_lock: Mutex<()>,
}

impl FileAdapter {
    /// Creates an adapter rooted at `dir`. Nothing touches the disk until
    /// [`StorageAdapter::initialize`].
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileAdapter {
            dir: dir.into(),
            write_lock: Mutex::new(()),
            save_lock: Mutex::new(()),
        }
    }

    /// Directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    async fn exists(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.path(name)).await.unwrap_or(false)
    }

    /// Reads and parses a document; `Ok(None)` when the file is missing.
    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> StoreResult<Option<T>> {
        let raw = match tokio::fs::read(self.path(name)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(from_io(PLATFORM, &format!("reading {}", name), e)),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| from_json(PLATFORM, &format!("parsing {}", name), e))
    }

    /// Writes a document through a temp file and rename.
    async fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> StoreResult<()> {
        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| from_json(PLATFORM, &format!("serializing {}", name), e))?;

        let target = self.path(name);
        let tmp = self.path(&format!("{}.tmp", name));

        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| from_io(PLATFORM, &format!("writing {}", tmp.display()), e))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| from_io(PLATFORM, &format!("replacing {}", target.display()), e))?;

        debug!(file = name, bytes = body.len(), "Document written");
        Ok(())
    }

    /// Audit entries as stored; unreadable files count as empty.
    async fn read_audit(&self) -> Vec<AuditEntry> {
        match self.read_json::<Vec<AuditEntry>>(AUDIT_FILE).await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "Audit log unreadable, starting a new one");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl MigrationTarget for FileAdapter {
    fn migration_platform(&self) -> PlatformType {
        PLATFORM
    }

    fn steps(&self) -> &'static [MigrationStep] {
        STEPS
    }

    async fn ledger(&self) -> StoreResult<Vec<MigrationLedgerEntry>> {
        Ok(self.read_json(SCHEMA_FILE).await?.unwrap_or_default())
    }

    async fn apply(&self, step: &MigrationStep) -> StoreResult<MigrationLedgerEntry> {
        let _guard = self.write_lock.lock().await;

        match step.version {
            1 => {
                if !self.exists(AUDIT_FILE).await {
                    self.write_json(AUDIT_FILE, &Vec::<AuditEntry>::new()).await?;
                }
            }
            2 => {
                let mut entries = self.read_audit().await;
                entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                entries.truncate(AUDIT_LOG_CAPACITY);
                self.write_json(AUDIT_FILE, &entries).await?;
            }
            other => {
                return Err(ConfigError::initialization(
                    PLATFORM,
                    format!("unknown schema step {}", other),
                ))
            }
        }

        let entry = MigrationLedgerEntry {
            version: step.version,
            description: step.description.to_string(),
            applied_at: Utc::now(),
        };

        let mut ledger: Vec<MigrationLedgerEntry> = self.read_json(SCHEMA_FILE).await?.unwrap_or_default();
        ledger.push(entry.clone());
        self.write_json(SCHEMA_FILE, &ledger).await?;

        Ok(entry)
    }

    async fn verify(&self, step: &MigrationStep) -> Result<(), String> {
        match step.version {
            1 => {
                if self.exists(AUDIT_FILE).await {
                    Ok(())
                } else {
                    Err(format!("{} is missing", AUDIT_FILE))
                }
            }
            2 => match self.read_json::<Vec<AuditEntry>>(AUDIT_FILE).await {
                Ok(Some(entries)) if entries.len() <= AUDIT_LOG_CAPACITY => Ok(()),
                Ok(Some(entries)) => Err(format!(
                    "{} holds {} entries, more than {}",
                    AUDIT_FILE,
                    entries.len(),
                    AUDIT_LOG_CAPACITY
                )),
                Ok(None) => Err(format!("{} is missing", AUDIT_FILE)),
                Err(err) => Err(err.message),
            },
            other => Err(format!("unknown schema step {}", other)),
        }
    }
}

#[async_trait]
impl StorageAdapter for FileAdapter {
    fn platform(&self) -> PlatformType {
        PLATFORM
    }

    fn migration_target(&self) -> &dyn MigrationTarget {
        self
    }

    fn save_lock(&self) -> &Mutex<()> {
        &self.save_lock
    }

    async fn initialize(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            ConfigError::initialization(
                PLATFORM,
                format!("creating {}: {}", self.dir.display(), e),
            )
        })?;

        info!(dir = %self.dir.display(), "File storage ready");
        Ok(())
    }

    async fn get_config(&self) -> StoreResult<Option<Configuration>> {
        let raw = match tokio::fs::read(self.path(CONFIG_FILE)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(from_io(PLATFORM, &format!("reading {}", CONFIG_FILE), e)),
        };

        match serde_json::from_slice::<Configuration>(&raw) {
            Ok(config) => Ok(checked(PLATFORM, config)),
            Err(err) => {
                warn!(file = CONFIG_FILE, error = %err, "Stored configuration is malformed, ignoring it");
                Ok(None)
            }
        }
    }

    async fn write_config(&self, config: &Configuration) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(CONFIG_FILE, config).await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.read_audit().await;
        entries.insert(0, entry.clone());
        entries.truncate(AUDIT_LOG_CAPACITY);

        self.write_json(AUDIT_FILE, &entries).await
    }

    async fn get_audit_log(&self) -> StoreResult<Vec<AuditEntry>> {
        let mut entries: Vec<AuditEntry> = self.read_json(AUDIT_FILE).await?.unwrap_or_default();
        entries.truncate(AUDIT_LOG_CAPACITY);
        Ok(entries)
    }

    async fn check_health(&self) -> bool {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{AuditAction, ErrorCode, FeatureId};

    async fn adapter() -> (tempfile::TempDir, FileAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::new(dir.path().join("data"));
        adapter.initialize().await.unwrap();
        adapter.migrate().await.unwrap();
        (dir, adapter)
    }

    #[tokio::test]
    async fn test_empty_backend_has_no_config() {
        let (_dir, adapter) = adapter().await;
        assert!(adapter.get_config().await.unwrap().is_none());
        assert!(adapter.check_health().await);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_dir, adapter) = adapter().await;

        let mut config = Configuration::default();
        config.upselling.insert(FeatureId::BundleOffers, false);
        config.product_configuration.recommendations = vec!["SKU12345".into()];

        let saved = adapter.save_config(config.clone(), Some("tester")).await.unwrap();
        let loaded = adapter.get_config().await.unwrap().unwrap();

        assert_eq!(loaded, saved);
        assert!(loaded.same_content(&config));
        assert!(!adapter.path(&format!("{}.tmp", CONFIG_FILE)).exists());
    }

    #[tokio::test]
    async fn test_first_save_is_create_then_update() {
        let (_dir, adapter) = adapter().await;

        adapter.save_config(Configuration::default(), None).await.unwrap();
        adapter.save_config(Configuration::default(), None).await.unwrap();

        let log = adapter.get_audit_log().await.unwrap();
        // Newest first; the migration entry is the oldest.
        assert_eq!(log[0].action, AuditAction::Update);
        assert_eq!(log[1].action, AuditAction::Create);
        assert_eq!(log[2].action, AuditAction::Migrate);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (_dir, adapter) = adapter().await;

        let mut config = Configuration::default();
        config.product_configuration.bundle_references =
            vec!["SKU001".into(), "SKU002".into(), "SKU003".into(), "SKU004".into()];

        let err = adapter.save_config(config, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
        assert_eq!(err.status, 400);
        assert!(adapter.get_config().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_document_reads_as_none() {
        let (_dir, adapter) = adapter().await;
        tokio::fs::write(adapter.path(CONFIG_FILE), b"{\"upselling\": 42}")
            .await
            .unwrap();

        assert!(adapter.get_config().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_schema_health() {
        let (_dir, adapter) = adapter().await;
        let health = adapter.schema_health().await;
        assert!(health.healthy);
        assert_eq!(health.version, 2);

        tokio::fs::remove_file(adapter.path(AUDIT_FILE)).await.unwrap();
        let health = adapter.schema_health().await;
        assert!(!health.healthy);
        assert!(health.diagnostic.unwrap().contains(AUDIT_FILE));
    }

    #[tokio::test]
    async fn test_migrate_twice_is_noop() {
        let (_dir, adapter) = adapter().await;
        let report = adapter.migrate().await.unwrap();
        assert!(!report.applied_any());
        assert_eq!(report.to_version, 2);
    }
}
