//! # Catalog API Client
//!
//! Cached, retrying, rate-limited client for the external product catalog
//! that hydrates configured SKUs into display-ready records.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get_product / get_variant_group / list_products                        │
//! │     │                                                                   │
//! │     ├── credentials incomplete → NotConfigured (no request, no retry)   │
//! │     │                                                                   │
//! │     ├── TtlCache hit (key = op + account + URL) → return                │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  with_retry(RetryPolicy::catalog)  retries 408, 429, 500, 502-504       │
//! │     │   RequestLog::acquire()      at most N requests per window        │
//! │     │   GET {base}/products/{sku}?country=..                           │
//! │     │   X-Api-Key, X-Account-Id                                         │
//! │     ▼                                                                   │
//! │  parse + validate shape ──fail──► MalformedResponse (not cached)        │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  cache insert → return                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Endpoints
//! | Operation            | Path                          | Query                  |
//! |----------------------|-------------------------------|------------------------|
//! | `get_product`        | `/products/{sku}`             | `country`              |
//! | `get_variant_group`  | `/products/{sku}/variants`    | `country`              |
//! | `list_products`      | `/products`                   | `country,page,pageSize`|
//! | `validate_credentials` | `/products`                 | `page=1,pageSize=1`    |
//!
//! `validate_credentials` skips both the cache and the retry loop.

pub mod cache;
pub mod rate;
pub mod types;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use shelf_core::{ApiCredentials, RetryPolicy};
use shelf_store::with_retry;

use crate::config::CatalogSettings;
use crate::error::{SyncError, SyncResult};

pub use cache::{reset_shared_cache, shared_cache, CacheEntry, CacheSweeper, ResponseCache, TtlCache};
pub use rate::{reset_shared_request_log, shared_request_log, RequestLog};
pub use types::{CatalogPayload, CatalogProduct, ProductPage, VariantGroup};

/// API key header.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Account id header.
pub const ACCOUNT_ID_HEADER: &str = "X-Account-Id";

/// Credentials resolved for one request.
struct Resolved<'a> {
    api_key: &'a str,
    account_id: u64,
    base: Url,
}

/// Product catalog client.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    credentials: ApiCredentials,
    cache: Arc<ResponseCache>,
    rate: Arc<RequestLog>,
    policy: RetryPolicy,
}

impl CatalogClient {
    /// Client sharing the process-wide cache and request log.
    pub fn new(credentials: ApiCredentials, settings: &CatalogSettings) -> SyncResult<Self> {
        Self::with_parts(
            credentials,
            settings.request_timeout(),
            shared_cache(settings),
            shared_request_log(settings),
        )
    }

    /// Client with its own cache and request log.
    pub fn with_parts(
        credentials: ApiCredentials,
        timeout: Duration,
        cache: Arc<ResponseCache>,
        rate: Arc<RequestLog>,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(CatalogClient {
            http,
            credentials,
            cache,
            rate,
            policy: RetryPolicy::catalog(),
        })
    }

    /// Overrides the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether every field a request needs is present.
    pub fn is_configured(&self) -> bool {
        self.credentials.has_required_fields()
    }

    pub fn credentials(&self) -> &ApiCredentials {
        &self.credentials
    }

    /// Starts the background purge of expired responses.
    pub fn spawn_sweeper(&self, interval: Duration) -> CacheSweeper {
        CacheSweeper::spawn(Arc::clone(&self.cache), interval)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// One product by SKU.
    pub async fn get_product(&self, sku: &str) -> SyncResult<CatalogProduct> {
        let resolved = self.resolve()?;
        let url = self.endpoint(&resolved, &["products", sku], &[])?;
        self.fetch("product", &resolved, url, Some(&self.policy)).await
    }

    /// Every variant of the product `sku` belongs to.
    pub async fn get_variant_group(&self, sku: &str) -> SyncResult<VariantGroup> {
        let resolved = self.resolve()?;
        let url = self.endpoint(&resolved, &["products", sku, "variants"], &[])?;
        self.fetch("variants", &resolved, url, Some(&self.policy)).await
    }

    /// Several products; failed items are logged and left out.
    ///
    /// Fails only when every item failed.
    pub async fn get_products(&self, skus: &[String]) -> SyncResult<Vec<CatalogProduct>> {
        self.resolve()?;

        let mut products = Vec::with_capacity(skus.len());
        let mut last_error = None;

        for sku in skus {
            match self.get_product(sku).await {
                Ok(product) => products.push(product),
                Err(err) => {
                    warn!(sku = %sku, error = %err, "Catalog lookup failed, skipping item");
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) if products.is_empty() => Err(SyncError::BatchFailed {
                failed: skus.len(),
                last_error: err.to_string(),
            }),
            _ => Ok(products),
        }
    }

    /// One page of the catalog listing (1-based pages).
    pub async fn list_products(&self, page: u32, page_size: u32) -> SyncResult<ProductPage> {
        let resolved = self.resolve()?;
        let url = self.endpoint(
            &resolved,
            &["products"],
            &[("page", page.max(1).to_string()), ("pageSize", page_size.max(1).to_string())],
        )?;
        self.fetch("list", &resolved, url, Some(&self.policy)).await
    }

    /// Checks the credentials with one minimal request: uncached and never
    /// retried.
    ///
    /// Any structurally valid answer counts as proof; the returned copy is
    /// marked configured and stamped with the validation time.
    pub async fn validate_credentials(&self) -> SyncResult<ApiCredentials> {
        let resolved = self.resolve()?;
        let url = self.endpoint(
            &resolved,
            &["products"],
            &[("page", "1".to_string()), ("pageSize", "1".to_string())],
        )?;

        let _: ProductPage = self.fetch("validate", &resolved, url, None).await?;

        info!(account_id = resolved.account_id, "Catalog credentials validated");
        Ok(self.credentials.validated_at(Utc::now()))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn resolve(&self) -> SyncResult<Resolved<'_>> {
        let creds = &self.credentials;

        let api_key = creds
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SyncError::NotConfigured("apiKey is missing".into()))?;
        let account_id = creds
            .account_id
            .ok_or_else(|| SyncError::NotConfigured("accountId is missing".into()))?;
        if creds.country.trim().is_empty() {
            return Err(SyncError::NotConfigured("country is missing".into()));
        }

        let base = Url::parse(creds.base_url.trim())
            .map_err(|e| SyncError::NotConfigured(format!("baseUrl is invalid: {}", e)))?;

        Ok(Resolved {
            api_key,
            account_id,
            base,
        })
    }

    fn endpoint(&self, resolved: &Resolved<'_>, segments: &[&str], query: &[(&str, String)]) -> SyncResult<Url> {
        let mut url = resolved.base.clone();

        url.path_segments_mut()
            .map_err(|_| SyncError::NotConfigured("baseUrl cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("country", self.credentials.country.trim());
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }

        Ok(url)
    }

    /// Cached lookups go through `policy`; `None` means a single uncached
    /// attempt.
    async fn fetch<T: CatalogPayload>(
        &self,
        op: &str,
        resolved: &Resolved<'_>,
        url: Url,
        policy: Option<&RetryPolicy>,
    ) -> SyncResult<T> {
        let key = format!("{}:{}:{}", op, resolved.account_id, url);
        let cached = policy.is_some();

        if cached {
            if let Some(hit) = self.cache.get(&key) {
                match serde_json::from_value::<T>(hit) {
                    Ok(value) => {
                        debug!(key = %key, "Catalog cache hit");
                        return Ok(value);
                    }
                    Err(e) => warn!(key = %key, error = %e, "Discarding unreadable cache entry"),
                }
            }
        }

        let value: T = match policy {
            Some(policy) => {
                let client = self;
                let url = &url;
                with_retry(policy, op, move || client.request::<T>(url, resolved)).await?
            }
            None => self.request::<T>(&url, resolved).await?,
        };

        if cached {
            self.cache.insert(key, serde_json::to_value(&value)?);
        }
        Ok(value)
    }

    async fn request<T: CatalogPayload>(&self, url: &Url, resolved: &Resolved<'_>) -> SyncResult<T> {
        self.rate.acquire().await;

        let response = self
            .http
            .get(url.clone())
            .header(API_KEY_HEADER, resolved.api_key)
            .header(ACCOUNT_ID_HEADER, resolved.account_id.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        let payload: T =
            serde_json::from_slice(&body).map_err(|e| SyncError::MalformedResponse(e.to_string()))?;
        payload.validate().map_err(SyncError::MalformedResponse)?;

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> ApiCredentials {
        ApiCredentials {
            api_key: Some("key-123".into()),
            account_id: Some(42),
            base_url: "https://catalog.example.com/v1/".into(),
            country: "DE".into(),
            ..ApiCredentials::default()
        }
    }

    fn client(credentials: ApiCredentials) -> CatalogClient {
        CatalogClient::with_parts(
            credentials,
            Duration::from_secs(1),
            Arc::new(TtlCache::new(Duration::from_secs(60), 10)),
            Arc::new(RequestLog::new(10, Duration::from_secs(1))),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_building() {
        let client = client(configured());
        let resolved = client.resolve().unwrap();

        let url = client
            .endpoint(&resolved, &["products", "SKU 1/2", "variants"], &[])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://catalog.example.com/v1/products/SKU%201%2F2/variants?country=DE"
        );

        let url = client
            .endpoint(&resolved, &["products"], &[("page", "2".into()), ("pageSize", "20".into())])
            .unwrap();
        assert_eq!(url.query(), Some("country=DE&page=2&pageSize=20"));
    }

    #[tokio::test]
    async fn test_unconfigured_fails_fast() {
        let client = client(ApiCredentials::default());
        assert!(!client.is_configured());

        let err = client.get_product("SKU001").await.unwrap_err();
        assert!(matches!(err, SyncError::NotConfigured(_)));
        assert!(!RetryPolicy::catalog().is_retryable(&err));

        assert!(matches!(
            client.get_products(&["SKU001".to_string()]).await,
            Err(SyncError::NotConfigured(_))
        ));
        assert!(matches!(client.validate_credentials().await, Err(SyncError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_empty_batch_is_ok() {
        let client = client(configured());
        assert!(client.get_products(&[]).await.unwrap().is_empty());
    }
}
