//! Behaviour every backend must share.

use std::sync::Arc;

use shelf_core::{
    AuditAction, Configuration, FeatureId, PlatformType, AUDIT_LOG_CAPACITY, CONFIG_DOCUMENT_ID,
};
use shelf_store::blob::{BlobDocument, BlobMetadata, DOCUMENT_KEY};
use shelf_store::file::CONFIG_FILE;
use shelf_store::{
    BlobAdapter, BlobStore, Database, DbConfig, FileAdapter, MemoryBlobStore, SqliteAdapter,
    StorageAdapter,
};

async fn ready(adapter: Arc<dyn StorageAdapter>) -> Arc<dyn StorageAdapter> {
    adapter.initialize().await.unwrap();
    adapter.migrate().await.unwrap();
    adapter
}

/// One adapter per backend. The temp dir must outlive the file adapter.
async fn all_backends(dir: &tempfile::TempDir) -> Vec<Arc<dyn StorageAdapter>> {
    vec![
        ready(Arc::new(FileAdapter::new(dir.path().join("files")))).await,
        ready(Arc::new(SqliteAdapter::new(DbConfig::in_memory()))).await,
        ready(Arc::new(BlobAdapter::new(Arc::new(MemoryBlobStore::new())))).await,
    ]
}

#[tokio::test]
async fn audit_log_keeps_newest_hundred() {
    let dir = tempfile::tempdir().unwrap();

    for adapter in all_backends(&dir).await {
        let mut last_recommendation = String::new();

        for i in 0..150 {
            let mut config = Configuration::default();
            last_recommendation = format!("SKU{:05}", i);
            config.product_configuration.recommendations = vec![last_recommendation.clone()];
            adapter.save_config(config, None).await.unwrap();
        }

        let log = adapter.get_audit_log().await.unwrap();
        assert_eq!(log.len(), AUDIT_LOG_CAPACITY, "{}", adapter.platform());

        let newest = log[0].snapshot().unwrap();
        assert_eq!(newest.product_configuration.recommendations, vec![last_recommendation]);
        assert!(log.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert!(log.iter().all(|e| e.action == AuditAction::Update || e.action == AuditAction::Create));
    }
}

#[tokio::test]
async fn last_write_wins() {
    let dir = tempfile::tempdir().unwrap();

    for adapter in all_backends(&dir).await {
        let mut first = Configuration::default();
        first.upselling.insert(FeatureId::CrossSell, false);

        let mut second = Configuration::default();
        second.upselling.insert(FeatureId::BundleOffers, false);

        let a = adapter.save_config(first, Some("alice")).await.unwrap();
        let b = adapter.save_config(second.clone(), Some("bob")).await.unwrap();
        assert!(b.last_updated > a.last_updated);

        let stored = adapter.get_config().await.unwrap().unwrap();
        assert!(stored.same_content(&second), "{}", adapter.platform());
        assert!(stored.is_enabled(FeatureId::CrossSell));

        let log = adapter.get_audit_log().await.unwrap();
        assert_eq!(log[0].actor_tag.as_deref(), Some("bob"));
    }
}

#[tokio::test]
async fn concurrent_saves_leave_one_whole_document() {
    let dir = tempfile::tempdir().unwrap();

    for adapter in all_backends(&dir).await {
        let mut first = Configuration::default();
        first.upselling.insert(FeatureId::CrossSell, false);
        first.product_configuration.recommendations = vec!["ALICE001".into()];

        let mut second = Configuration::default();
        second.upselling.insert(FeatureId::BundleOffers, false);
        second.product_configuration.primary_reference = Some("BOB00001".into());

        let (a, b) = tokio::join!(
            adapter.save_config(first, Some("alice")),
            adapter.save_config(second, Some("bob")),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.last_updated, b.last_updated, "{}", adapter.platform());

        let (winner, loser) = if a.last_updated > b.last_updated { (a, b) } else { (b, a) };

        // The stored document is exactly the later save, stamp included.
        let stored = adapter.get_config().await.unwrap().unwrap();
        assert_eq!(stored, winner, "{}", adapter.platform());
        assert!(stored.last_updated > loser.last_updated);

        let log = adapter.get_audit_log().await.unwrap();
        assert_eq!(log[0].snapshot().unwrap(), winner);
        assert_eq!(log[1].snapshot().unwrap(), loser);
    }
}

#[tokio::test]
async fn reset_and_import_are_audited() {
    let dir = tempfile::tempdir().unwrap();

    for adapter in all_backends(&dir).await {
        let mut imported = Configuration::default();
        imported.product_configuration.primary_reference = Some("IMPORTED1".into());

        adapter.import_config(imported, None).await.unwrap();
        let reset = adapter.reset_to_defaults(None).await.unwrap();

        assert!(reset.same_content(&Configuration::default()));

        let actions: Vec<AuditAction> = adapter
            .get_audit_log()
            .await
            .unwrap()
            .iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(&actions[..3], &[AuditAction::Reset, AuditAction::Import, AuditAction::Migrate]);
    }
}

#[tokio::test]
async fn platform_info_matches_backend() {
    let dir = tempfile::tempdir().unwrap();
    let platforms: Vec<PlatformType> = all_backends(&dir)
        .await
        .iter()
        .map(|a| a.platform_info().platform_type)
        .collect();

    assert_eq!(
        platforms,
        vec![PlatformType::FileBased, PlatformType::RelationalEmbedded, PlatformType::BlobStore]
    );
}

#[tokio::test]
async fn file_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("files");

    let saved = {
        let adapter = ready(Arc::new(FileAdapter::new(&path))).await;
        adapter.save_config(Configuration::default(), None).await.unwrap()
    };

    let reopened = ready(Arc::new(FileAdapter::new(&path))).await;
    assert_eq!(reopened.get_config().await.unwrap(), Some(saved));

    // Migrations already ran; no second MIGRATE entry.
    let migrates = reopened
        .get_audit_log()
        .await
        .unwrap()
        .iter()
        .filter(|e| e.action == AuditAction::Migrate)
        .count();
    assert_eq!(migrates, 1);
}

#[tokio::test]
async fn sqlite_file_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelf.db");

    let saved = {
        let adapter = ready(Arc::new(SqliteAdapter::new(DbConfig::new(&path)))).await;
        adapter.save_config(Configuration::default(), None).await.unwrap()
    };

    let reopened = ready(Arc::new(SqliteAdapter::new(DbConfig::new(&path)))).await;
    assert_eq!(reopened.get_config().await.unwrap(), Some(saved));
    assert_eq!(reopened.schema_health().await.version, 3);
}

// =============================================================================
// Stored documents that break the rules
// =============================================================================

fn rule_breaking_documents() -> Vec<Configuration> {
    let mut too_many = Configuration::default();
    too_many.product_configuration.recommendations =
        vec!["REC00001".into(), "REC00002".into(), "REC00003".into(), "REC00004".into()];

    let mut bad_sku = Configuration::default();
    bad_sku.product_configuration.primary_reference = Some("bad!".into());

    vec![too_many, bad_sku]
}

/// A planted document reads as empty, and the next save replaces it as a
/// fresh CREATE.
async fn assert_ignored(adapter: &Arc<dyn StorageAdapter>) {
    assert!(adapter.get_config().await.unwrap().is_none(), "{}", adapter.platform());

    let saved = adapter.save_config(Configuration::default(), None).await.unwrap();
    assert_eq!(adapter.get_config().await.unwrap(), Some(saved));
    assert_eq!(adapter.get_audit_log().await.unwrap()[0].action, AuditAction::Create);
}

#[tokio::test]
async fn file_backend_ignores_rule_breaking_document() {
    for planted in rule_breaking_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files");
        let adapter = ready(Arc::new(FileAdapter::new(&path))).await;

        std::fs::write(path.join(CONFIG_FILE), serde_json::to_vec(&planted).unwrap()).unwrap();

        assert_ignored(&adapter).await;
    }
}

#[tokio::test]
async fn sqlite_backend_ignores_rule_breaking_document() {
    for planted in rule_breaking_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.db");
        let adapter = ready(Arc::new(SqliteAdapter::new(DbConfig::new(&path)))).await;

        let other = Database::connect(DbConfig::new(&path)).await.unwrap();
        sqlx::query("INSERT INTO config (id, data, updated_at, version) VALUES (?, ?, ?, 1)")
            .bind(CONFIG_DOCUMENT_ID)
            .bind(serde_json::to_string(&planted).unwrap())
            .bind(planted.last_updated)
            .execute(other.pool())
            .await
            .unwrap();
        other.close().await;

        assert_ignored(&adapter).await;
    }
}

#[tokio::test]
async fn blob_backend_ignores_rule_breaking_document() {
    for planted in rule_breaking_documents() {
        let store = MemoryBlobStore::new();
        let adapter = ready(Arc::new(BlobAdapter::new(Arc::new(store.clone())))).await;

        let doc = BlobDocument {
            metadata: BlobMetadata {
                created_at: planted.last_updated,
                updated_at: planted.last_updated,
                version: 1,
            },
            config: Some(planted),
            audit: Vec::new(),
        };
        store
            .put(DOCUMENT_KEY, serde_json::to_vec(&doc).unwrap().into())
            .await
            .unwrap();

        assert_ignored(&adapter).await;
    }
}
