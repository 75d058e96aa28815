//! # shelf-core: Pure Configuration Logic for Shelf
//!
//! This crate is the **heart** of Shelf. It defines the admin configuration
//! document and every rule that applies to it, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Shelf Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Admin UI / storefront widgets                      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │      shelf-sync: ConfigManager + CatalogClient                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ shelf-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ validation│  │   error   │  │   retry   │  │   │
//! │  │   │  Config   │  │  SKU fmt  │  │ ErrorCode │  │  policy   │  │   │
//! │  │   │  Audit    │  │  bounds   │  │ translate │  │  delays   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │         shelf-store (File / SQLite / Blob adapters)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Configuration document, audit entries, wire envelope
//! - [`validation`] - SKU format and list-bound rules
//! - [`error`] - `ValidationError`, `ConfigError` and the error-code taxonomy
//! - [`platform`] - Deployment platform detection
//! - [`retry`] - Retry policy value object shared by storage and catalog calls
//!
//! ## Example Usage
//!
//! ```rust
//! use shelf_core::types::{Configuration, ProductList};
//! use shelf_core::validation::validate_configuration;
//!
//! let mut config = Configuration::default();
//! config
//!     .product_configuration
//!     .list_mut(ProductList::Recommendations)
//!     .push("SKU123".to_string());
//!
//! assert!(validate_configuration(&config).is_ok());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod platform;
pub mod retry;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{ConfigError, ErrorCode, ValidationError};
pub use platform::{PlatformInfo, PlatformType, StorageKind};
pub use retry::{RetryClassify, RetryPolicy};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of audit entries any backend keeps.
///
/// Older entries are evicted first once the ring buffer is full.
pub const AUDIT_LOG_CAPACITY: usize = 100;

/// Minimum SKU length accepted in a product list.
pub const SKU_MIN_LEN: usize = 6;

/// Maximum SKU length accepted in a product list.
pub const SKU_MAX_LEN: usize = 20;

/// Fixed key of the single configuration row / document.
pub const CONFIG_DOCUMENT_ID: &str = "admin-config";
