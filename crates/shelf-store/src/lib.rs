//! # shelf-store: Storage Layer for Shelf
//!
//! Persists the admin configuration document, its audit trail and its
//! schema ledger on one of three backends behind a single trait.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shelf Data Flow                                  │
//! │                                                                         │
//! │  ConfigManager (shelf-sync)                                            │
//! │       │  Arc<dyn StorageAdapter>                                       │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   shelf-store (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │   │
//! │  │   │ FileAdapter  │   │SqliteAdapter │   │   BlobAdapter    │  │   │
//! │  │   │ (file.rs)    │   │ (sqlite.rs)  │   │   (blob.rs)      │  │   │
//! │  │   │ JSON + temp  │   │ WAL pool     │   │ one JSON object  │  │   │
//! │  │   │ + rename     │   │ (pool.rs)    │   │ via BlobStore    │  │   │
//! │  │   └──────────────┘   └──────────────┘   └──────────────────┘  │   │
//! │  │          ▲                  ▲                    ▲             │   │
//! │  │          └────── migrations.rs (versioned steps) ┘             │   │
//! │  │                                                                 │   │
//! │  │   factory.rs: pick backend, initialize, migrate, share          │   │
//! │  │   retry.rs:   with_retry executor + best_effort helper          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shelf_store::{create_adapter, StorageSettings};
//!
//! let adapter = create_adapter(&StorageSettings::default()).await?;
//! let config = adapter.get_config().await?.unwrap_or_default();
//! adapter.save_config(config, Some("admin@shop")).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adapter;
pub mod blob;
pub mod error;
pub mod factory;
pub mod file;
pub mod migrations;
pub mod pool;
pub mod retry;
pub mod sqlite;

// =============================================================================
// Re-exports
// =============================================================================

pub use adapter::StorageAdapter;
pub use blob::{BlobAdapter, BlobStore, HttpBlobStore, MemoryBlobStore};
pub use error::StoreResult;
pub use factory::{
    build_adapter, create_adapter, install_shared_adapter, reset_shared_adapter, shared_adapter,
    StorageSettings,
};
pub use file::FileAdapter;
pub use migrations::{MigrationReport, SchemaHealth};
pub use pool::{Database, DbConfig};
pub use retry::{best_effort, with_retry};
pub use sqlite::SqliteAdapter;
