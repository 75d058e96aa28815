//! Configuration manager over real backends and a file cache.

use std::sync::Arc;
use std::time::Duration;

use shelf_core::{AuditAction, Configuration, FeatureId, PlatformType, ProductList, RetryPolicy};
use shelf_store::{create_adapter, BlobAdapter, HttpBlobStore, StorageAdapter};
use shelf_sync::{ConfigManager, FileCache, LocalCache, MigrationOutcome, SaveOutcome, ShelfConfig};

fn file_config(dir: &tempfile::TempDir) -> ShelfConfig {
    let mut config = ShelfConfig::default();
    config.storage.platform = Some(PlatformType::FileBased);
    config.storage.data_dir = dir.path().join("store");
    config.manager.cache_path = dir.path().join("cache").join("config-cache.json");
    config.manager.default_actor = Some("integration".into());
    config
}

/// Blob backend nobody listens on.
fn unreachable_backend() -> Arc<dyn StorageAdapter> {
    let store = HttpBlobStore::new("http://127.0.0.1:9", None, Duration::from_millis(200)).unwrap();
    Arc::new(BlobAdapter::new(Arc::new(store)))
}

fn quick_reads() -> RetryPolicy {
    RetryPolicy::config_read().with_base_delay(Duration::from_millis(5))
}

fn quick_writes() -> RetryPolicy {
    RetryPolicy::config_write()
        .with_base_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(10))
}

#[tokio::test]
async fn changes_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(&dir);

    {
        let adapter = create_adapter(&config.storage).await.unwrap();
        let manager = ConfigManager::from_settings(adapter, &config.manager).await;

        assert!(manager.update_feature(FeatureId::CrossSell, false).await.is_synced());
        assert!(manager
            .add_to_list(ProductList::PostPurchaseOffers, "THANKS01")
            .await
            .is_synced());
    }

    let adapter = create_adapter(&config.storage).await.unwrap();
    let manager = ConfigManager::from_settings(adapter, &config.manager).await;

    let current = manager.get_config().await;
    assert!(!current.is_enabled(FeatureId::CrossSell));
    assert_eq!(current.product_configuration.post_purchase_offers, vec!["THANKS01"]);

    let log = manager.audit_log().await;
    let actions: Vec<AuditAction> = log.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::Update, AuditAction::Update, AuditAction::Create, AuditAction::Migrate]
    );
    assert!(log[..3].iter().all(|e| e.actor_tag.as_deref() == Some("integration")));
}

#[tokio::test]
async fn local_cache_answers_when_backend_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(&dir);

    let saved = {
        let adapter = create_adapter(&config.storage).await.unwrap();
        let manager = ConfigManager::from_settings(adapter, &config.manager).await;
        manager
            .set_primary_reference(Some("HERO0001"))
            .await
            .config()
            .cloned()
            .unwrap()
    };

    let manager = ConfigManager::from_settings(unreachable_backend(), &config.manager)
        .await
        .with_read_policy(quick_reads())
        .with_write_policy(quick_writes());

    assert_eq!(manager.get_config_sync(), saved);
    assert_eq!(manager.get_config().await, saved);
    assert!(!manager.is_server_available());
    assert!(manager.audit_log().await.is_empty());
}

#[tokio::test]
async fn offline_save_is_kept_locally_then_migrated() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(&dir);

    let offline = ConfigManager::from_settings(unreachable_backend(), &config.manager)
        .await
        .with_read_policy(quick_reads())
        .with_write_policy(quick_writes());

    let mut draft = Configuration::default();
    draft.upselling.insert(FeatureId::BundleOffers, false);
    let outcome = offline.save_config(draft).await;
    assert!(matches!(outcome, SaveOutcome::SavedLocally(_)));

    let cached = FileCache::new(&config.manager.cache_path);
    assert!(cached.load().await.unwrap().is_some());

    // Backend comes back empty: the local copy is pushed.
    let adapter = create_adapter(&config.storage).await.unwrap();
    let online = ConfigManager::from_settings(Arc::clone(&adapter), &config.manager).await;

    let migrated = online.migrate_from_local_cache().await;
    assert!(matches!(migrated, MigrationOutcome::Migrated(_)));

    let stored = adapter.get_config().await.unwrap().unwrap();
    assert!(!stored.is_enabled(FeatureId::BundleOffers));
    assert_eq!(online.audit_log().await[0].action, AuditAction::Import);
}
