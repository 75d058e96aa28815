//! # Storage Adapter Contract
//!
//! One trait, three backends. Callers hold an `Arc<dyn StorageAdapter>` and
//! never know which backend is behind it.
//!
//! ## Save Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         save_config(cfg)                                │
//! │                                                                         │
//! │  1. validate_configuration(cfg)      ──fail──► INVALID_CONFIG           │
//! │       │                                                                 │
//! │  2. save_lock()                       (held through step 5)             │
//! │       │                                                                 │
//! │  3. previous = get_config()           (None → action CREATE)            │
//! │       │                                                                 │
//! │  4. lastUpdated = max(now, previous.lastUpdated + 1ms)                  │
//! │       │                                                                 │
//! │  5. commit(stamped, audit entry)      (config atomic, audit best-effort)│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Saves are last-write-wins: whichever save takes the lock second reads the
//! first one's stamp, so the stored document always carries the greatest
//! `lastUpdated` handed out.
//!
//! Backends implement the required methods; `save_config`, `reset_to_defaults`,
//! `import_config`, `migrate` and friends are provided on top of them.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shelf_core::platform::describe;
use shelf_core::validation::validate_configuration;
use shelf_core::{AuditAction, AuditEntry, ConfigError, Configuration, PlatformInfo, PlatformType};

use crate::error::{from_json, StoreResult};
use crate::migrations::{check_schema, run_migrations, MigrationReport, MigrationTarget, SchemaHealth};
use crate::retry::best_effort;

/// The storage contract shared by every backend.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Platform this adapter stores on.
    fn platform(&self) -> PlatformType;

    /// Schema steps of this backend.
    fn migration_target(&self) -> &dyn MigrationTarget;

    /// Creates backing resources if absent. Idempotent.
    async fn initialize(&self) -> StoreResult<()>;

    /// Serializes the read-stamp-commit sequence of saves.
    fn save_lock(&self) -> &Mutex<()>;

    /// Current snapshot; `None` when nothing is stored yet or the stored
    /// document does not parse or validate.
    async fn get_config(&self) -> StoreResult<Option<Configuration>>;

    /// Atomically replaces the stored snapshot. Input is already validated
    /// and stamped.
    async fn write_config(&self, config: &Configuration) -> StoreResult<()>;

    /// Appends one audit entry, evicting the oldest beyond capacity.
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()>;

    /// Most recent entries, newest first.
    async fn get_audit_log(&self) -> StoreResult<Vec<AuditEntry>>;

    /// Cheap round-trip probe.
    async fn check_health(&self) -> bool;

    // -------------------------------------------------------------------------
    // Provided
    // -------------------------------------------------------------------------

    /// Writes a stamped snapshot and its audit entry. The config write must
    /// succeed; the audit append is best-effort.
    async fn commit(&self, config: &Configuration, entry: Option<AuditEntry>) -> StoreResult<()> {
        self.write_config(config).await?;
        if let Some(entry) = entry {
            best_effort("append_audit", self.append_audit(&entry)).await;
        }
        Ok(())
    }

    /// Static capability metadata.
    fn platform_info(&self) -> PlatformInfo {
        describe(Some(self.platform()))
    }

    /// Applies pending schema steps and records a MIGRATE audit entry when
    /// anything changed.
    async fn migrate(&self) -> StoreResult<MigrationReport> {
        let report = run_migrations(self.migration_target()).await?;

        if report.applied_any() {
            let current = self.get_config().await.ok().flatten().unwrap_or_default();
            self.log_config_change(AuditAction::Migrate, &current, None).await;
        }

        Ok(report)
    }

    /// Ledger vs. structure cross-check.
    async fn schema_health(&self) -> SchemaHealth {
        check_schema(self.migration_target()).await
    }

    /// Validates, stamps and persists a snapshot; audited as CREATE when the
    /// backend was empty and UPDATE otherwise.
    async fn save_config(&self, config: Configuration, actor: Option<&str>) -> StoreResult<Configuration> {
        self.persist_config(config, None, actor).await
    }

    /// Saves the defaults, audited as RESET.
    async fn reset_to_defaults(&self, actor: Option<&str>) -> StoreResult<Configuration> {
        info!(platform = %self.platform(), "Resetting configuration to defaults");
        self.persist_config(Configuration::default(), Some(AuditAction::Reset), actor)
            .await
    }

    /// Saves a snapshot brought in from elsewhere, audited as IMPORT.
    async fn import_config(&self, config: Configuration, actor: Option<&str>) -> StoreResult<Configuration> {
        self.persist_config(config, Some(AuditAction::Import), actor).await
    }

    /// Shared body of the save operations. `action` of `None` picks
    /// CREATE/UPDATE from the current state.
    async fn persist_config(
        &self,
        config: Configuration,
        action: Option<AuditAction>,
        actor: Option<&str>,
    ) -> StoreResult<Configuration> {
        let platform = self.platform();

        validate_configuration(&config).map_err(|e| ConfigError::invalid(platform, &e))?;

        let _guard = self.save_lock().lock().await;

        let previous = self.get_config().await?;
        let action = action.unwrap_or(if previous.is_some() {
            AuditAction::Update
        } else {
            AuditAction::Create
        });

        let mut stamped = config;
        stamped.last_updated = next_stamp(previous.as_ref().map(|p| p.last_updated), Utc::now());

        let entry = audit_entry(platform, action, &stamped, actor).await;
        self.commit(&stamped, entry).await?;
        debug!(platform = %platform, action = %action, "Configuration written");

        Ok(stamped)
    }

    /// Records an audit entry. Failures are logged and swallowed.
    async fn log_config_change(&self, action: AuditAction, config: &Configuration, actor: Option<&str>) {
        if let Some(entry) = audit_entry(self.platform(), action, config, actor).await {
            best_effort("append_audit", self.append_audit(&entry)).await;
        }
    }
}

async fn audit_entry(
    platform: PlatformType,
    action: AuditAction,
    config: &Configuration,
    actor: Option<&str>,
) -> Option<AuditEntry> {
    let entry = AuditEntry::new(action, config, actor, platform)
        .map_err(|e| from_json(platform, "serializing audit snapshot", e));
    best_effort("audit_entry", async { entry }).await
}

/// Passes a freshly read document through the same rules a save applies.
/// A stored document that breaks them is reported and treated as absent.
pub(crate) fn checked(platform: PlatformType, config: Configuration) -> Option<Configuration> {
    match validate_configuration(&config) {
        Ok(()) => Some(config),
        Err(err) => {
            warn!(platform = %platform, error = %err, "Stored configuration is invalid, ignoring it");
            None
        }
    }
}

/// Next `lastUpdated` value: the current time, bumped past the previous stamp
/// when the clock has not moved forward.
pub fn next_stamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_stamp_is_strictly_monotonic() {
        let now = Utc::now();
        assert_eq!(next_stamp(None, now), now);

        let earlier = now - Duration::seconds(5);
        assert_eq!(next_stamp(Some(earlier), now), now);

        // Clock went backwards or did not move.
        let later = now + Duration::seconds(5);
        assert_eq!(next_stamp(Some(later), now), later + Duration::milliseconds(1));
        assert!(next_stamp(Some(now), now) > now);
    }
}
