//! # Schema Migrations
//!
//! Versioned, backend-agnostic schema steps.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  adapter.migrate()                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Read ledger → current = max(version), 0 when empty                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Compare the backend's steps vs applied                                │
//! │       │                                                                 │
//! │       ├── v1 create config store   ✓ (already applied)                 │
//! │       ├── v2 create audit trail    ✓ (already applied)                 │
//! │       └── v3 add version column    ⬜ (NEW - needs to run)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Apply pending steps in ascending order                                │
//! │  (structural change + ledger row are ONE unit)                         │
//! │       │                                                                 │
//! │       ├── step fails? stop; ledger stays at last good version          │
//! │       ▼                                                                 │
//! │  MigrationReport { from, to, applied }                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Steps
//!
//! 1. Append a step with the next version to the backend's step list
//! 2. Teach the backend's `apply` and `verify` about it
//! 3. **NEVER** modify existing steps - always add new ones

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use shelf_core::{MigrationLedgerEntry, PlatformType};

use crate::error::StoreResult;

// =============================================================================
// Step & Target
// =============================================================================

/// One schema step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStep {
    pub version: i64,
    pub description: &'static str,
}

/// A backend whose schema can be migrated.
#[async_trait]
pub trait MigrationTarget: Send + Sync {
    /// Platform the target lives on (for logs and errors).
    fn migration_platform(&self) -> PlatformType;

    /// Every step the backend knows, in ascending version order.
    fn steps(&self) -> &'static [MigrationStep];

    /// Applied steps, in any order.
    async fn ledger(&self) -> StoreResult<Vec<MigrationLedgerEntry>>;

    /// Applies `step` and records it in the ledger as one unit.
    async fn apply(&self, step: &MigrationStep) -> StoreResult<MigrationLedgerEntry>;

    /// Checks that the structures `step` creates exist. Returns a diagnostic
    /// when they don't.
    async fn verify(&self, step: &MigrationStep) -> Result<(), String>;
}

// =============================================================================
// Reports
// =============================================================================

/// Outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    pub applied: Vec<MigrationLedgerEntry>,
}

impl MigrationReport {
    /// Whether the run changed anything.
    pub fn applied_any(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Ledger vs. actual structure cross-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaHealth {
    pub healthy: bool,
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Highest version recorded in a ledger, 0 when empty.
pub fn current_version(ledger: &[MigrationLedgerEntry]) -> i64 {
    ledger.iter().map(|e| e.version).max().unwrap_or(0)
}

// =============================================================================
// Runner
// =============================================================================

/// Applies every pending step of `target` in ascending order.
///
/// A failing step aborts the run; steps before it stay applied.
pub async fn run_migrations(target: &dyn MigrationTarget) -> StoreResult<MigrationReport> {
    let platform = target.migration_platform();
    let from_version = current_version(&target.ledger().await?);

    let mut pending: Vec<&MigrationStep> = target
        .steps()
        .iter()
        .filter(|s| s.version > from_version)
        .collect();
    pending.sort_by_key(|s| s.version);

    let mut applied = Vec::with_capacity(pending.len());
    let mut to_version = from_version;

    for step in pending {
        info!(
            platform = %platform,
            version = step.version,
            description = step.description,
            "Applying schema step"
        );

        match target.apply(step).await {
            Ok(entry) => {
                to_version = entry.version;
                applied.push(entry);
            }
            Err(err) => {
                error!(
                    platform = %platform,
                    version = step.version,
                    error = %err,
                    "Schema step failed, aborting migration"
                );
                return Err(err);
            }
        }
    }

    if applied.is_empty() {
        info!(platform = %platform, version = from_version, "Schema up to date");
    } else {
        info!(
            platform = %platform,
            from = from_version,
            to = to_version,
            steps = applied.len(),
            "Migrations complete"
        );
    }

    Ok(MigrationReport {
        from_version,
        to_version,
        applied,
    })
}

/// Cross-checks that every structure implied by the ledger version exists.
/// Reports, never repairs.
pub async fn check_schema(target: &dyn MigrationTarget) -> SchemaHealth {
    let ledger = match target.ledger().await {
        Ok(ledger) => ledger,
        Err(err) => {
            return SchemaHealth {
                healthy: false,
                version: 0,
                diagnostic: Some(format!("ledger unreadable: {}", err)),
            }
        }
    };

    let version = current_version(&ledger);
    let known = target.steps().iter().map(|s| s.version).max().unwrap_or(0);

    if version > known {
        return SchemaHealth {
            healthy: false,
            version,
            diagnostic: Some(format!(
                "ledger is at version {} but only {} steps are known",
                version, known
            )),
        };
    }

    for step in target.steps().iter().filter(|s| s.version <= version) {
        if let Err(diagnostic) = target.verify(step).await {
            return SchemaHealth {
                healthy: false,
                version,
                diagnostic: Some(format!("v{} ({}): {}", step.version, step.description, diagnostic)),
            };
        }
    }

    SchemaHealth {
        healthy: true,
        version,
        diagnostic: None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
