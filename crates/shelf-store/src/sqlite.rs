//! # Embedded-Relational Backend
//!
//! SQLite via sqlx.
//!
//! ## Schema
//! ```text
//! config                          audit                              schema_version
//! ──────────────────────────      ────────────────────────────       ──────────────────
//! id          TEXT PK             id         INTEGER PK AUTOINC      version     INTEGER PK
//! data        TEXT (JSON)         entry_id   TEXT UNIQUE             applied_at  TEXT
//! updated_at  TEXT                action     TEXT                    description TEXT
//! version     INTEGER (v3)        data       TEXT (JSON)
//!                                 timestamp  TEXT (indexed)
//!                                 actor_tag  TEXT NULL
//!                                 platform   TEXT
//! ```
//!
//! `config` holds exactly one row keyed by [`CONFIG_DOCUMENT_ID`]; saves are
//! upserts that bump `version`. `audit` is append-only and trimmed to the
//! newest [`AUDIT_LOG_CAPACITY`] rows after each insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use shelf_core::{
    AuditAction, AuditEntry, ConfigError, Configuration, MigrationLedgerEntry, PlatformType,
    AUDIT_LOG_CAPACITY, CONFIG_DOCUMENT_ID,
};

use crate::adapter::{checked, StorageAdapter};
use crate::error::{from_json, from_sqlx, StoreResult};
use crate::migrations::{MigrationStep, MigrationTarget};
use crate::pool::{Database, DbConfig};

const PLATFORM: PlatformType = PlatformType::RelationalEmbedded;

static STEPS: &[MigrationStep] = &[
    MigrationStep {
        version: 1,
        description: "create config table",
    },
    MigrationStep {
        version: 2,
        description: "create audit table with timestamp index",
    },
    MigrationStep {
        version: 3,
        description: "add version column to config",
    },
];

/// DDL for each step, by version.
fn step_sql(version: i64) -> &'static [&'static str] {
    match version {
        1 => &["CREATE TABLE IF NOT EXISTS config (
                id TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"],
        2 => &[
            "CREATE TABLE IF NOT EXISTS audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id TEXT NOT NULL UNIQUE,
                action TEXT NOT NULL,
                data TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                actor_tag TEXT,
                platform TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit(timestamp)",
        ],
        3 => &["ALTER TABLE config ADD COLUMN version INTEGER NOT NULL DEFAULT 1"],
        _ => &[],
    }
}

/// SQLite storage adapter.
#[derive(Debug)]
pub struct SqliteAdapter {
    config: DbConfig,
    db: OnceCell<Database>,
    save_lock: Mutex<()>,
}

impl SqliteAdapter {
    /// Creates an adapter; the pool opens on [`StorageAdapter::initialize`].
    pub fn new(config: DbConfig) -> Self {
        SqliteAdapter {
            config,
            db: OnceCell::new(),
            save_lock: Mutex::new(()),
        }
    }

    fn db(&self) -> StoreResult<&Database> {
        self.db
            .get()
            .ok_or_else(|| ConfigError::initialization(PLATFORM, "database not initialized"))
    }

    async fn table_exists(&self, db: &Database, name: &str) -> Result<bool, String> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'index') AND name = ?")
                .bind(name)
                .fetch_one(db.pool())
                .await
                .map_err(|e| e.to_string())?;
        Ok(count > 0)
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> StoreResult<AuditEntry> {
        let action: String = row.try_get("action").map_err(from_sqlx)?;
        let platform: String = row.try_get("platform").map_err(from_sqlx)?;

        Ok(AuditEntry {
            id: row.try_get("entry_id").map_err(from_sqlx)?,
            action: action
                .parse::<AuditAction>()
                .map_err(|e| ConfigError::save_failed(PLATFORM, e))?,
            config_snapshot: row.try_get("data").map_err(from_sqlx)?,
            timestamp: row.try_get::<DateTime<Utc>, _>("timestamp").map_err(from_sqlx)?,
            actor_tag: row.try_get("actor_tag").map_err(from_sqlx)?,
            platform: platform
                .parse::<PlatformType>()
                .map_err(|e| ConfigError::save_failed(PLATFORM, e))?,
        })
    }
}

#[async_trait]
impl MigrationTarget for SqliteAdapter {
    fn migration_platform(&self) -> PlatformType {
        PLATFORM
    }

    fn steps(&self) -> &'static [MigrationStep] {
        STEPS
    }

    async fn ledger(&self) -> StoreResult<Vec<MigrationLedgerEntry>> {
        let rows = sqlx::query("SELECT version, applied_at, description FROM schema_version ORDER BY version")
            .fetch_all(self.db()?.pool())
            .await
            .map_err(from_sqlx)?;

        rows.iter()
            .map(|row| {
                Ok(MigrationLedgerEntry {
                    version: row.try_get("version").map_err(from_sqlx)?,
                    description: row.try_get("description").map_err(from_sqlx)?,
                    applied_at: row.try_get("applied_at").map_err(from_sqlx)?,
                })
            })
            .collect()
    }

    async fn apply(&self, step: &MigrationStep) -> StoreResult<MigrationLedgerEntry> {
        let mut tx = self.db()?.pool().begin().await.map_err(from_sqlx)?;

        for sql in step_sql(step.version) {
            sqlx::query(sql).execute(&mut *tx).await.map_err(from_sqlx)?;
        }

        let entry = MigrationLedgerEntry {
            version: step.version,
            description: step.description.to_string(),
            applied_at: Utc::now(),
        };

        sqlx::query("INSERT INTO schema_version (version, applied_at, description) VALUES (?, ?, ?)")
            .bind(entry.version)
            .bind(entry.applied_at)
            .bind(&entry.description)
            .execute(&mut *tx)
            .await
            .map_err(from_sqlx)?;

        tx.commit().await.map_err(from_sqlx)?;
        Ok(entry)
    }

    async fn verify(&self, step: &MigrationStep) -> Result<(), String> {
        let db = self.db().map_err(|e| e.message)?;

        match step.version {
            1 => {
                if !self.table_exists(db, "config").await? {
                    return Err("table config is missing".to_string());
                }
            }
            2 => {
                if !self.table_exists(db, "audit").await? {
                    return Err("table audit is missing".to_string());
                }
                if !self.table_exists(db, "idx_audit_timestamp").await? {
                    return Err("index idx_audit_timestamp is missing".to_string());
                }
            }
            3 => {
                let count: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info('config') WHERE name = 'version'")
                        .fetch_one(db.pool())
                        .await
                        .map_err(|e| e.to_string())?;
                if count == 0 {
                    return Err("column config.version is missing".to_string());
                }
            }
            other => return Err(format!("unknown schema step {}", other)),
        }

        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteAdapter {
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
        let db = self
            .db
            .get_or_try_init(|| Database::connect(self.config.clone()))
            .await
            .map_err(|e| ConfigError::initialization(PLATFORM, e.message))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY NOT NULL,
                applied_at TEXT NOT NULL,
                description TEXT NOT NULL
            )",
        )
        .execute(db.pool())
        .await
        .map_err(|e| ConfigError::initialization(PLATFORM, from_sqlx(e).message))?;

        info!(path = %self.config.database_path.display(), "SQLite storage ready");
        Ok(())
    }

    async fn get_config(&self) -> StoreResult<Option<Configuration>> {
        let Some(db) = self.db.get() else {
            return Ok(None);
        };

        let data: Option<String> = sqlx::query_scalar("SELECT data FROM config WHERE id = ?")
            .bind(CONFIG_DOCUMENT_ID)
            .fetch_optional(db.pool())
            .await
            .map_err(from_sqlx)?;

        Ok(data.and_then(|raw| match serde_json::from_str::<Configuration>(&raw) {
            Ok(config) => checked(PLATFORM, config),
            Err(err) => {
                warn!(error = %err, "Stored configuration is malformed, ignoring it");
                None
            }
        }))
    }

    async fn write_config(&self, config: &Configuration) -> StoreResult<()> {
        let data = serde_json::to_string(config).map_err(|e| from_json(PLATFORM, "serializing configuration", e))?;

        sqlx::query(
            "INSERT INTO config (id, data, updated_at, version) VALUES (?, ?, ?, 1)
             ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                version = config.version + 1",
        )
        .bind(CONFIG_DOCUMENT_ID)
        .bind(data)
        .bind(config.last_updated)
        .execute(self.db()?.pool())
        .await
        .map_err(from_sqlx)?;

        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        let mut tx = self.db()?.pool().begin().await.map_err(from_sqlx)?;

        sqlx::query(
            "INSERT INTO audit (entry_id, action, data, timestamp, actor_tag, platform)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(entry.action.as_str())
        .bind(&entry.config_snapshot)
        .bind(entry.timestamp)
        .bind(entry.actor_tag.as_deref())
        .bind(entry.platform.as_str())
        .execute(&mut *tx)
        .await
        .map_err(from_sqlx)?;

        sqlx::query("DELETE FROM audit WHERE id NOT IN (SELECT id FROM audit ORDER BY id DESC LIMIT ?)")
            .bind(AUDIT_LOG_CAPACITY as i64)
            .execute(&mut *tx)
            .await
            .map_err(from_sqlx)?;

        tx.commit().await.map_err(from_sqlx)?;
        Ok(())
    }

    async fn get_audit_log(&self) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT entry_id, action, data, timestamp, actor_tag, platform
             FROM audit ORDER BY id DESC LIMIT ?",
        )
        .bind(AUDIT_LOG_CAPACITY as i64)
        .fetch_all(self.db()?.pool())
        .await
        .map_err(from_sqlx)?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn check_health(&self) -> bool {
        match self.db.get() {
            Some(db) => db.health_check().await,
            None => false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{ErrorCode, FeatureId};

    async fn adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::new(DbConfig::in_memory());
        adapter.initialize().await.unwrap();
        adapter.migrate().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_uninitialized() {
        let adapter = SqliteAdapter::new(DbConfig::in_memory());
        assert!(adapter.get_config().await.unwrap().is_none());
        assert!(!adapter.check_health().await);

        let err = adapter.write_config(&Configuration::default()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InitializationFailed);
    }

    #[tokio::test]
    async fn test_unopenable_database_fails_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("plain-file");
        std::fs::write(&blocker, b"").unwrap();

        let adapter = SqliteAdapter::new(DbConfig::new(blocker.join("sub").join("shelf.db")));
        let err = adapter.initialize().await.unwrap_err();

        assert_eq!(err.code, ErrorCode::InitializationFailed);
        assert_eq!(err.platform, PlatformType::RelationalEmbedded);
        assert!(!adapter.check_health().await);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let adapter = adapter().await;
        adapter.initialize().await.unwrap();
        assert!(adapter.check_health().await);
    }

    #[tokio::test]
    async fn test_round_trip_and_version_bump() {
        let adapter = adapter().await;

        let mut config = Configuration::default();
        config.upselling.insert(FeatureId::CrossSell, false);
        config.product_configuration.primary_reference = Some("PRIMARY01".into());

        let first = adapter.save_config(config.clone(), None).await.unwrap();
        let second = adapter.save_config(config, None).await.unwrap();
        assert!(second.last_updated > first.last_updated);

        assert_eq!(adapter.get_config().await.unwrap().unwrap(), second);

        let version: i64 = sqlx::query_scalar("SELECT version FROM config WHERE id = ?")
            .bind(CONFIG_DOCUMENT_ID)
            .fetch_one(adapter.db().unwrap().pool())
            .await
            .unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn test_schema_health_detects_missing_index() {
        let adapter = adapter().await;
        assert!(adapter.schema_health().await.healthy);

        sqlx::query("DROP INDEX idx_audit_timestamp")
            .execute(adapter.db().unwrap().pool())
            .await
            .unwrap();

        let health = adapter.schema_health().await;
        assert!(!health.healthy);
        assert_eq!(health.version, 3);
        assert!(health.diagnostic.unwrap().contains("idx_audit_timestamp"));
    }

    #[tokio::test]
    async fn test_audit_entries_round_trip() {
        let adapter = adapter().await;
        adapter.reset_to_defaults(Some("ops")).await.unwrap();

        let log = adapter.get_audit_log().await.unwrap();
        assert_eq!(log[0].action, AuditAction::Reset);
        assert_eq!(log[0].actor_tag.as_deref(), Some("ops"));
        assert_eq!(log[0].platform, PlatformType::RelationalEmbedded);
        assert!(log[0].snapshot().is_ok());
    }
}
