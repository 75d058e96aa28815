//! # Validation Module
//!
//! Rules every configuration snapshot must satisfy before any backend
//! accepts it.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Admin UI (TypeScript)                                        │
//! │  └── Immediate feedback while typing                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: ConfigManager scoped helpers                                 │
//! │  ├── Duplicate / capacity checks per list                              │
//! │  └── THIS MODULE on the candidate snapshot                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: StorageAdapter::save_config                                  │
//! │  └── THIS MODULE again → INVALID_CONFIG on failure                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use shelf_core::validation::{validate_sku, validate_configuration};
//! use shelf_core::Configuration;
//!
//! validate_sku("ABC123").unwrap();
//! validate_configuration(&Configuration::default()).unwrap();
//! ```

use url::Url;

use crate::error::ValidationError;
use crate::types::{ApiCredentials, Configuration, ProductConfiguration, ProductList};
use crate::{SKU_MAX_LEN, SKU_MIN_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// SKU
// =============================================================================

/// Validates a product SKU.
///
/// ## Rules
/// - Must not be empty
/// - Between 6 and 20 characters
/// - ASCII letters and digits only
///
/// ## Example
/// ```rust
/// use shelf_core::validation::validate_sku;
///
/// assert!(validate_sku("SKU12345").is_ok());
/// assert!(validate_sku("AB1").is_err());
/// assert!(validate_sku("SKU-1234").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if !sku.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: format!("'{}' must contain only letters and numbers", sku),
        });
    }

    if sku.len() < SKU_MIN_LEN {
        return Err(ValidationError::TooShort {
            field: "sku".to_string(),
            min: SKU_MIN_LEN,
        });
    }

    if sku.len() > SKU_MAX_LEN {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: SKU_MAX_LEN,
        });
    }

    Ok(())
}

/// Validates a list of SKUs against its bound.
pub fn validate_sku_list(list: ProductList, skus: &[String]) -> ValidationResult<()> {
    if skus.len() > list.max_len() {
        return Err(ValidationError::ListFull {
            list: list.field_name().to_string(),
            max: list.max_len(),
        });
    }

    for (i, sku) in skus.iter().enumerate() {
        validate_sku(sku)?;

        if skus[..i].contains(sku) {
            return Err(ValidationError::Duplicate {
                field: list.field_name().to_string(),
                value: sku.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Document Sections
// =============================================================================

/// Validates the product references.
pub fn validate_product_configuration(products: &ProductConfiguration) -> ValidationResult<()> {
    if let Some(primary) = &products.primary_reference {
        validate_sku(primary)?;
    }

    for list in ProductList::ALL {
        validate_sku_list(list, products.list(list))?;
    }

    Ok(())
}

/// Validates catalog API credentials.
///
/// ## Rules
/// - `baseUrl` parses as an absolute `http`/`https` URL
/// - `country` is two ASCII letters
/// - `apiKey`, when present, is not blank
/// - `isConfigured` requires both `apiKey` and `accountId`
pub fn validate_credentials(credentials: &ApiCredentials) -> ValidationResult<()> {
    let url = Url::parse(credentials.base_url.trim()).map_err(|e| ValidationError::InvalidFormat {
        field: "baseUrl".to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidFormat {
            field: "baseUrl".to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    let country = credentials.country.trim();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: "country".to_string(),
            reason: "must be a two-letter ISO code".to_string(),
        });
    }

    if credentials.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        return Err(ValidationError::Required {
            field: "apiKey".to_string(),
        });
    }

    if credentials.is_configured
        && (credentials.api_key.is_none() || credentials.account_id.is_none())
    {
        return Err(ValidationError::Inconsistent(
            "apiCredentials cannot be configured without apiKey and accountId".to_string(),
        ));
    }

    Ok(())
}

/// Validates a whole snapshot.
pub fn validate_configuration(config: &Configuration) -> ValidationResult<()> {
    validate_product_configuration(&config.product_configuration)?;
    validate_credentials(&config.api_credentials)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
