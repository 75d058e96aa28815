//! # Blob-Store Backend
//!
//! The whole configuration state lives in one JSON document that is
//! read-modify-written on every change.
//!
//! ## Document
//! ```json
//! {
//!   "config":   { ...Configuration... } | null,
//!   "metadata": { "createdAt": "...", "updatedAt": "...", "version": 7 },
//!   "audit":    [ ...AuditEntry, newest first, ≤ 100... ]
//! }
//! ```
//!
//! The migration ledger is a second object next to it.
//!
//! ## Blob Access
//! ```text
//! BlobAdapter ──► dyn BlobStore ─┬─► MemoryBlobStore (tests, local dev)
//!                                └─► HttpBlobStore   (GET/PUT + bearer token)
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shelf_core::{
    AuditEntry, ConfigError, Configuration, MigrationLedgerEntry, PlatformType, AUDIT_LOG_CAPACITY,
};

use crate::adapter::{checked, StorageAdapter};
use crate::error::{from_http, from_json, from_status, StoreResult};
use crate::migrations::{MigrationStep, MigrationTarget};

pub const DOCUMENT_KEY: &str = "admin-config.json";
pub const LEDGER_KEY: &str = "config-schema.json";

const PLATFORM: PlatformType = PlatformType::BlobStore;

static STEPS: &[MigrationStep] = &[
    MigrationStep {
        version: 1,
        description: "create configuration document",
    },
    MigrationStep {
        version: 2,
        description: "order audit trail newest-first and cap it",
    },
];

// =============================================================================
// Blob Store Trait
// =============================================================================

/// Minimal object storage used by [`BlobAdapter`].
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Object body, or `None` when the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Creates or replaces an object.
    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()>;

    /// Removes an object. Missing keys are not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// In-memory blob store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> ConfigError {
        ConfigError::save_failed(PLATFORM, "lock poisoned")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;
        Ok(objects.get(key).cloned())
    }

    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned())?;
        objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut objects = self.objects.write().map_err(|_| Self::poisoned())?;
        objects.remove(key);
        Ok(())
    }
}

/// Blob store reached over HTTP: `GET`/`PUT`/`DELETE {base_url}/{key}` with
/// an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBlobStore {
    /// Creates a client with a per-request timeout.
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::initialization(PLATFORM, e.to_string()))?;

        Ok(HttpBlobStore {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let response = self
            .authorize(self.client.get(self.url(key)))
            .send()
            .await
            .map_err(from_http)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(from_status(status, &body));
        }

        response.bytes().await.map(Some).map_err(from_http)
    }

    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()> {
        let response = self
            .authorize(self.client.put(self.url(key)))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(from_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(from_status(status, &body));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let response = self
            .authorize(self.client.delete(self.url(key)))
            .send()
            .await
            .map_err(from_http)?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(from_status(status, &body));
        }
        Ok(())
    }
}

// =============================================================================
// Document
// =============================================================================

/// Document bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every write.
    pub version: u64,
}

/// The single stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDocument {
    #[serde(default)]
    pub config: Option<Configuration>,
    pub metadata: BlobMetadata,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

impl BlobDocument {
    fn empty() -> Self {
        let now = Utc::now();
        BlobDocument {
            config: None,
            metadata: BlobMetadata {
                created_at: now,
                updated_at: now,
                version: 0,
            },
            audit: Vec::new(),
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Blob-store storage adapter.
#[derive(Debug)]
pub struct BlobAdapter {
    store: Arc<dyn BlobStore>,
    write_lock: Mutex<()>,
    save_lock: Mutex<()>,
}

impl BlobAdapter {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        BlobAdapter {
            store,
            write_lock: Mutex::new(()),
            save_lock: Mutex::new(()),
        }
    }

    /// Reads the document. `Ok(None)` when absent; parse failures surface as
    /// `SAVE_FAILED`.
    async fn read_document(&self) -> StoreResult<Option<BlobDocument>> {
        match self.store.get(DOCUMENT_KEY).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| from_json(PLATFORM, "parsing blob document", e)),
            None => Ok(None),
        }
    }

    async fn write_document(&self, doc: &BlobDocument) -> StoreResult<()> {
        let body = serde_json::to_vec(doc).map_err(|e| from_json(PLATFORM, "serializing blob document", e))?;
        let len = body.len();
        self.store.put(DOCUMENT_KEY, Bytes::from(body)).await?;
        debug!(bytes = len, version = doc.metadata.version, "Blob document written");
        Ok(())
    }

    /// Read-modify-write under the adapter's write lock. A document that no
    /// longer parses is replaced by a fresh one.
    async fn update_document<F>(&self, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut BlobDocument) + Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut doc = match self.store.get(DOCUMENT_KEY).await? {
            Some(raw) => match serde_json::from_slice::<BlobDocument>(&raw) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(error = %err, "Blob document unreadable, replacing it");
                    BlobDocument::empty()
                }
            },
            None => BlobDocument::empty(),
        };

        mutate(&mut doc);
        doc.metadata.updated_at = Utc::now();
        doc.metadata.version += 1;

        self.write_document(&doc).await
    }

    async fn read_ledger(&self) -> StoreResult<Vec<MigrationLedgerEntry>> {
        match self.store.get(LEDGER_KEY).await? {
            Some(raw) => {
                serde_json::from_slice(&raw).map_err(|e| from_json(PLATFORM, "parsing schema ledger", e))
            }
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl MigrationTarget for BlobAdapter {
    fn migration_platform(&self) -> PlatformType {
        PLATFORM
    }

    fn steps(&self) -> &'static [MigrationStep] {
        STEPS
    }

    async fn ledger(&self) -> StoreResult<Vec<MigrationLedgerEntry>> {
        self.read_ledger().await
    }

    async fn apply(&self, step: &MigrationStep) -> StoreResult<MigrationLedgerEntry> {
        match step.version {
            1 => {
                if self.store.get(DOCUMENT_KEY).await?.is_none() {
                    let _guard = self.write_lock.lock().await;
                    self.write_document(&BlobDocument::empty()).await?;
                }
            }
            2 => {
                self.update_document(|doc| {
                    doc.audit.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                    doc.audit.truncate(AUDIT_LOG_CAPACITY);
                })
                .await?;
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

        let mut ledger = self.read_ledger().await?;
        ledger.push(entry.clone());
        let body = serde_json::to_vec(&ledger).map_err(|e| from_json(PLATFORM, "serializing schema ledger", e))?;
        self.store.put(LEDGER_KEY, Bytes::from(body)).await?;

        Ok(entry)
    }

    async fn verify(&self, step: &MigrationStep) -> Result<(), String> {
        let doc = self.read_document().await.map_err(|e| e.message)?;

        match (step.version, doc) {
            (_, None) => Err(format!("{} is missing", DOCUMENT_KEY)),
            (1, Some(_)) => Ok(()),
            (2, Some(doc)) if doc.audit.len() <= AUDIT_LOG_CAPACITY => Ok(()),
            (2, Some(doc)) => Err(format!(
                "audit trail holds {} entries, more than {}",
                doc.audit.len(),
                AUDIT_LOG_CAPACITY
            )),
            (other, Some(_)) => Err(format!("unknown schema step {}", other)),
        }
    }
}

#[async_trait]
impl StorageAdapter for BlobAdapter {
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
        // Reachability probe; a missing document is fine.
        self.store
            .get(LEDGER_KEY)
            .await
            .map_err(|e| ConfigError::initialization(PLATFORM, e.message))?;

        info!("Blob storage ready");
        Ok(())
    }

    async fn get_config(&self) -> StoreResult<Option<Configuration>> {
        let Some(raw) = self.store.get(DOCUMENT_KEY).await? else {
            return Ok(None);
        };

        let doc: serde_json::Value = match serde_json::from_slice(&raw) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(error = %err, "Blob document is malformed, ignoring it");
                return Ok(None);
            }
        };

        match doc.get("config") {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(config) => match serde_json::from_value::<Configuration>(config.clone()) {
                Ok(config) => Ok(checked(PLATFORM, config)),
                Err(err) => {
                    warn!(error = %err, "Stored configuration is malformed, ignoring it");
                    Ok(None)
                }
            },
        }
    }

    async fn write_config(&self, config: &Configuration) -> StoreResult<()> {
        let config = config.clone();
        self.update_document(move |doc| doc.config = Some(config)).await
    }

    /// Config and audit entry land in one document write.
    async fn commit(&self, config: &Configuration, entry: Option<AuditEntry>) -> StoreResult<()> {
        let config = config.clone();
        self.update_document(move |doc| {
            doc.config = Some(config);
            if let Some(entry) = entry {
                doc.audit.insert(0, entry);
                doc.audit.truncate(AUDIT_LOG_CAPACITY);
            }
        })
        .await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        let entry = entry.clone();
        self.update_document(move |doc| {
            doc.audit.insert(0, entry);
            doc.audit.truncate(AUDIT_LOG_CAPACITY);
        })
        .await
    }

    async fn get_audit_log(&self) -> StoreResult<Vec<AuditEntry>> {
        Ok(self
            .read_document()
            .await?
            .map(|doc| doc.audit.into_iter().take(AUDIT_LOG_CAPACITY).collect())
            .unwrap_or_default())
    }

    async fn check_health(&self) -> bool {
        self.store.get(DOCUMENT_KEY).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
