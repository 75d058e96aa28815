//! # Domain Types
//!
//! The admin configuration document and everything stored alongside it.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Configuration                                   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌─────────────────┐  │
//! │  │   upselling     │   │ productConfiguration │   │ apiCredentials  │  │
//! │  │  ─────────────  │   │  ──────────────────  │   │  ─────────────  │  │
//! │  │  FeatureId→bool │   │  primaryReference    │   │  apiKey         │  │
//! │  │  (all true by   │   │  recommendations ≤3  │   │  accountId      │  │
//! │  │   default)      │   │  bundleReferences ≤3 │   │  baseUrl        │  │
//! │  └─────────────────┘   │  postPurchase    ≤10 │   │  country        │  │
//! │                        │  crossSell        ≤6 │   │  isConfigured   │  │
//! │                        └──────────────────────┘   └─────────────────┘  │
//! │                                                                         │
//! │  lastUpdated: stamped by the backend on every save                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Alongside the document every backend keeps an audit trail of
//! [`AuditEntry`] values and a migration ledger of [`MigrationLedgerEntry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ConfigError;
use crate::platform::{PlatformInfo, PlatformType};

// =============================================================================
// Feature Flags
// =============================================================================

/// Upselling features that can be toggled from the admin screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum FeatureId {
    /// "You may also like" block on the product page.
    ProductRecommendations,
    /// Bundle offers on the product page.
    BundleOffers,
    /// Offers shown after checkout.
    PostPurchaseOffers,
    /// Cross-sell block in the cart.
    CrossSell,
    /// Highlight of the primary product.
    PrimaryProductHighlight,
}

impl FeatureId {
    /// Every feature, in display order.
    pub const ALL: [FeatureId; 5] = [
        FeatureId::ProductRecommendations,
        FeatureId::BundleOffers,
        FeatureId::PostPurchaseOffers,
        FeatureId::CrossSell,
        FeatureId::PrimaryProductHighlight,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureId::ProductRecommendations => "productRecommendations",
            FeatureId::BundleOffers => "bundleOffers",
            FeatureId::PostPurchaseOffers => "postPurchaseOffers",
            FeatureId::CrossSell => "crossSell",
            FeatureId::PrimaryProductHighlight => "primaryProductHighlight",
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FeatureId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureId::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown feature: '{}'", s))
    }
}

// =============================================================================
// Product Configuration
// =============================================================================

/// The bounded SKU lists of [`ProductConfiguration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductList {
    Recommendations,
    BundleReferences,
    PostPurchaseOffers,
    CrossSellReferences,
}

impl ProductList {
    /// Every list, in document order.
    pub const ALL: [ProductList; 4] = [
        ProductList::Recommendations,
        ProductList::BundleReferences,
        ProductList::PostPurchaseOffers,
        ProductList::CrossSellReferences,
    ];

    /// Maximum number of SKUs the list may hold.
    pub const fn max_len(&self) -> usize {
        match self {
            ProductList::Recommendations => 3,
            ProductList::BundleReferences => 3,
            ProductList::PostPurchaseOffers => 10,
            ProductList::CrossSellReferences => 6,
        }
    }

    /// Field name in the wire document.
    pub fn field_name(&self) -> &'static str {
        match self {
            ProductList::Recommendations => "recommendations",
            ProductList::BundleReferences => "bundleReferences",
            ProductList::PostPurchaseOffers => "postPurchaseOffers",
            ProductList::CrossSellReferences => "crossSellReferences",
        }
    }
}

impl std::str::FromStr for ProductList {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductList::ALL
            .into_iter()
            .find(|l| l.field_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown product list: '{}'", s))
    }
}

/// Product references used by the upselling widgets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProductConfiguration {
    /// Main product the storefront is built around.
    #[serde(default)]
    pub primary_reference: Option<String>,

    /// At most 3 SKUs.
    #[serde(default)]
    pub recommendations: Vec<String>,

    /// At most 3 SKUs.
    #[serde(default)]
    pub bundle_references: Vec<String>,

    /// At most 10 SKUs.
    #[serde(default)]
    pub post_purchase_offers: Vec<String>,

    /// At most 6 SKUs.
    #[serde(default)]
    pub cross_sell_references: Vec<String>,
}

impl ProductConfiguration {
    /// Borrows one of the bounded lists.
    pub fn list(&self, list: ProductList) -> &Vec<String> {
        match list {
            ProductList::Recommendations => &self.recommendations,
            ProductList::BundleReferences => &self.bundle_references,
            ProductList::PostPurchaseOffers => &self.post_purchase_offers,
            ProductList::CrossSellReferences => &self.cross_sell_references,
        }
    }

    /// Mutably borrows one of the bounded lists.
    pub fn list_mut(&mut self, list: ProductList) -> &mut Vec<String> {
        match list {
            ProductList::Recommendations => &mut self.recommendations,
            ProductList::BundleReferences => &mut self.bundle_references,
            ProductList::PostPurchaseOffers => &mut self.post_purchase_offers,
            ProductList::CrossSellReferences => &mut self.cross_sell_references,
        }
    }

    /// Every SKU referenced anywhere in the configuration, primary first,
    /// without duplicates.
    pub fn all_references(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let lists = ProductList::ALL.iter().flat_map(|l| self.list(*l).iter());
        for sku in self.primary_reference.iter().chain(lists) {
            if !out.contains(sku) {
                out.push(sku.clone());
            }
        }
        out
    }
}

// =============================================================================
// API Credentials
// =============================================================================

/// Default catalog API base URL.
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://catalog-api.example.com/v1";

/// Default catalog country.
pub const DEFAULT_CATALOG_COUNTRY: &str = "US";

/// Credentials for the external product-catalog API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ApiCredentials {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub account_id: Option<u64>,

    pub base_url: String,

    pub country: String,

    /// True only once key and account id are set and a validation request
    /// succeeded.
    #[serde(default)]
    pub is_configured: bool,

    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub last_validated: Option<DateTime<Utc>>,
}

impl Default for ApiCredentials {
    fn default() -> Self {
        ApiCredentials {
            api_key: None,
            account_id: None,
            base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            country: DEFAULT_CATALOG_COUNTRY.to_string(),
            is_configured: false,
            last_validated: None,
        }
    }
}

impl ApiCredentials {
    /// Whether every field a catalog request needs is present.
    pub fn has_required_fields(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            && self.account_id.is_some()
            && !self.base_url.trim().is_empty()
            && !self.country.trim().is_empty()
    }

    /// Returns a copy marked as validated at `when`.
    pub fn validated_at(&self, when: DateTime<Utc>) -> Self {
        ApiCredentials {
            is_configured: true,
            last_validated: Some(when),
            ..self.clone()
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// The single configuration snapshot a backend holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Configuration {
    pub upselling: BTreeMap<FeatureId, bool>,

    pub product_configuration: ProductConfiguration,

    pub api_credentials: ApiCredentials,

    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

impl Default for Configuration {
    /// Every feature enabled, no product references, unconfigured API.
    fn default() -> Self {
        Configuration {
            upselling: FeatureId::ALL.into_iter().map(|f| (f, true)).collect(),
            product_configuration: ProductConfiguration::default(),
            api_credentials: ApiCredentials::default(),
            last_updated: Utc::now(),
        }
    }
}

impl Configuration {
    /// Whether a feature is enabled. Features missing from an older document
    /// count as enabled.
    pub fn is_enabled(&self, feature: FeatureId) -> bool {
        self.upselling.get(&feature).copied().unwrap_or(true)
    }

    /// Compares everything except `last_updated`.
    pub fn same_content(&self, other: &Configuration) -> bool {
        self.upselling == other.upselling
            && self.product_configuration == other.product_configuration
            && self.api_credentials == other.api_credentials
    }
}

// =============================================================================
// Audit Trail
// =============================================================================

/// What kind of change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum AuditAction {
    Create,
    Update,
    Reset,
    Import,
    Migrate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Reset => "RESET",
            AuditAction::Import => "IMPORT",
            AuditAction::Migrate => "MIGRATE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "RESET" => Ok(AuditAction::Reset),
            "IMPORT" => Ok(AuditAction::Import),
            "MIGRATE" => Ok(AuditAction::Migrate),
            other => Err(format!("Unknown audit action: '{}'", other)),
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuditEntry {
    /// UUID v4.
    pub id: String,

    pub action: AuditAction,

    /// Serialized [`Configuration`] as it was after the change.
    pub config_snapshot: String,

    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,

    /// Caller identity supplied by the auth collaborator, when known.
    #[serde(default)]
    pub actor_tag: Option<String>,

    pub platform: PlatformType,
}

impl AuditEntry {
    /// Builds an entry with a fresh id and the current time.
    pub fn new(
        action: AuditAction,
        config: &Configuration,
        actor_tag: Option<&str>,
        platform: PlatformType,
    ) -> Result<Self, serde_json::Error> {
        Ok(AuditEntry {
            id: Uuid::new_v4().to_string(),
            action,
            config_snapshot: serde_json::to_string(config)?,
            timestamp: Utc::now(),
            actor_tag: actor_tag.map(str::to_string),
            platform,
        })
    }

    /// Parses the stored snapshot back into a configuration.
    pub fn snapshot(&self) -> Result<Configuration, serde_json::Error> {
        serde_json::from_str(&self.config_snapshot)
    }
}

// =============================================================================
// Migration Ledger
// =============================================================================

/// One applied schema step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MigrationLedgerEntry {
    pub version: i64,
    pub description: String,
    #[ts(as = "String")]
    pub applied_at: DateTime<Utc>,
}

// =============================================================================
// Wire Envelope
// =============================================================================

/// Envelope every config read/write endpoint answers with.
///
/// ```json
/// {
///   "success": true,
///   "data": { "upselling": { ... }, ... },
///   "platform": { "type": "blobStore", ... },
///   "timestamp": "2024-05-01T12:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformInfo>,

    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

impl<T> ApiEnvelope<T> {
    /// Successful response.
    pub fn success(data: T, platform: Option<PlatformInfo>) -> Self {
        ApiEnvelope {
            success: true,
            data: Some(data),
            error: None,
            platform,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Failed response.
    pub fn failure(error: impl Into<String>, platform: Option<PlatformInfo>) -> Self {
        ApiEnvelope {
            success: false,
            data: None,
            error: Some(error.into()),
            platform,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Unwraps into a `Result`.
    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(self.error.unwrap_or_else(|| "empty response".to_string())),
        }
    }
}

impl<T> From<ConfigError> for ApiEnvelope<T> {
    fn from(err: ConfigError) -> Self {
        let platform = crate::platform::describe(Some(err.platform));
        ApiEnvelope::failure(err.to_string(), Some(platform))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
