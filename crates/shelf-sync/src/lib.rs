//! # shelf-sync: Client Resilience Layer for Shelf
//!
//! Keeps callers responsive while the authoritative store is slow or gone,
//! and hydrates configured SKUs from the external product catalog.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shelf Data Flow                                  │
//! │                                                                         │
//! │  Admin UI / storefront displays                                        │
//! │       │                                   │                            │
//! │       ▼                                   ▼                            │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   shelf-sync (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ConfigManager ──► LocalCache        CatalogClient             │   │
//! │  │   (manager.rs)      (cache.rs)        (catalog/)                │   │
//! │  │        │                                   │                    │   │
//! │  │        │ AuthProvider (auth.rs)            │ TtlCache, RequestLog│  │
//! │  │        ▼                                   ▼                    │   │
//! │  └────────┼───────────────────────────────────┼────────────────────┘   │
//! │           ▼                                   ▼                        │
//! │   shelf-store (StorageAdapter)         external catalog API            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shelf_sync::{ConfigManager, ShelfConfig};
//!
//! let config = ShelfConfig::load_or_default(None);
//! let adapter = shelf_store::shared_adapter(&config.storage).await?;
//! let manager = ConfigManager::from_settings(adapter, &config.manager).await;
//!
//! let current = manager.get_config_sync();
//! let outcome = manager.update_feature(FeatureId::CrossSell, false).await;
//! println!("{}", outcome.message());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod manager;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{AuthProvider, NoAuth, StaticActor, ACTOR_HEADER};
pub use cache::{FileCache, LocalCache, MemoryCache};
pub use catalog::{CatalogClient, CatalogProduct, ProductPage, VariantGroup};
pub use config::{CatalogSettings, ManagerSettings, ShelfConfig};
pub use error::{SyncError, SyncResult};
pub use manager::{ConfigManager, MigrationOutcome, SaveOutcome};
