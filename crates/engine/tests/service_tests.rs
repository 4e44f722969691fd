//! End-to-end engine tests over the filesystem/SQLite/memory/file-lock
//! stack.

use snip_core::config::{CacheConfig, LockConfig, MetadataConfig, StorageConfig};
use snip_core::AppConfig;
use snip_engine::{blob_key, NewPaste, PasteError, PasteService, UpdatePaste};
use snip_lock::LockManager;
use snip_storage::BlobStore;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

struct TestEngine {
    _temp: tempfile::TempDir,
    service: Arc<PasteService>,
    storage: Arc<dyn BlobStore>,
}

async fn engine() -> TestEngine {
    engine_with(|_| {}).await
}

async fn engine_with(tweak: impl FnOnce(&mut AppConfig)) -> TestEngine {
    let temp = tempfile::tempdir().unwrap();

    let mut config = AppConfig::default();
    config.storage = StorageConfig::Filesystem {
        path: temp.path().join("blobs"),
    };
    config.metadata = MetadataConfig::Sqlite {
        path: temp.path().join("metadata.db"),
    };
    config.cache = CacheConfig::Memory {
        max_entries: 64,
        sweep_interval_secs: 60,
    };
    config.lock = LockConfig::Filesystem {
        dir: temp.path().join("locks"),
        lease_ttl_secs: 30,
        retry_interval_ms: 10,
    };
    config.paste.lock_wait_ms = 2_000;
    tweak(&mut config);

    let storage = snip_storage::from_config(&config.storage).await.unwrap();
    let store = snip_metadata::from_config(&config.metadata).await.unwrap();
    let cache = snip_cache::from_config(&config.cache).await.unwrap();
    let locks = snip_lock::from_config(&config.lock).await.unwrap();

    let service = Arc::new(PasteService::new(
        &config,
        storage.clone(),
        store,
        cache,
        locks,
    ));

    TestEngine {
        _temp: temp,
        service,
        storage,
    }
}

fn new_paste(content: &str) -> NewPaste {
    NewPaste {
        title: "test paste".to_string(),
        content_language: "plain_text".to_string(),
        content: content.to_string(),
        expires_at: None,
    }
}

fn update_content(content: &str) -> UpdatePaste {
    UpdatePaste {
        content: Some(content.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn create_then_get_returns_same_content() {
    let engine = engine().await;

    let created = engine.service.create(new_paste("hello world")).await.unwrap();
    assert_eq!(created.paste.version, 1);
    assert!(!created.edit_token.is_empty());
    assert!(!created.delete_token.is_empty());
    assert_ne!(created.edit_token, created.delete_token);

    let fetched = engine.service.get(created.paste.id).await.unwrap();
    assert_eq!(fetched.content, "hello world");
    assert_eq!(fetched.content_language, "plain_text");
    assert_eq!(fetched.title, "test paste");
    assert_eq!(fetched.version, 1);
}

#[tokio::test]
async fn create_then_get_roundtrips_compressed_content() {
    let engine = engine().await;

    // Well above the default 1 KiB compression threshold.
    let content = "a highly repetitive line of paste content\n".repeat(200);
    let created = engine.service.create(new_paste(&content)).await.unwrap();

    let fetched = engine.service.get(created.paste.id).await.unwrap();
    assert_eq!(fetched.content, content);
    assert_eq!(fetched.size_bytes, content.len() as i64);
}

#[tokio::test]
async fn get_unknown_id_is_not_found() {
    let engine = engine().await;
    match engine.service.get(Uuid::new_v4()).await {
        Err(PasteError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn wrong_edit_token_is_unauthorized_and_leaves_paste_unchanged() {
    let engine = engine().await;
    let created = engine.service.create(new_paste("original")).await.unwrap();

    match engine
        .service
        .update(created.paste.id, update_content("tampered"), "wrong-token")
        .await
    {
        Err(PasteError::Unauthorized) => {}
        other => panic!("expected Unauthorized, got {other:?}"),
    }

    let fetched = engine.service.get(created.paste.id).await.unwrap();
    assert_eq!(fetched.content, "original");
    assert_eq!(fetched.version, 1);
}

#[tokio::test]
async fn wrong_delete_token_is_unauthorized() {
    let engine = engine().await;
    let created = engine.service.create(new_paste("keep me")).await.unwrap();

    // The edit token does not grant delete rights.
    match engine
        .service
        .soft_delete(created.paste.id, &created.edit_token)
        .await
    {
        Err(PasteError::Unauthorized) => {}
        other => panic!("expected Unauthorized, got {other:?}"),
    }

    assert_eq!(
        engine.service.get(created.paste.id).await.unwrap().version,
        1
    );
}

#[tokio::test]
async fn update_on_missing_id_is_unauthorized_not_not_found() {
    let engine = engine().await;
    match engine
        .service
        .update(Uuid::new_v4(), update_content("x"), "some-token")
        .await
    {
        Err(PasteError::Unauthorized) => {}
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn update_rewrites_content_and_bumps_version() {
    let engine = engine().await;
    let created = engine.service.create(new_paste("hello world")).await.unwrap();
    let id = created.paste.id;

    let updated = engine
        .service
        .update(id, update_content("hello mars"), &created.edit_token)
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.content, "hello mars");

    let fetched = engine.service.get(id).await.unwrap();
    assert_eq!(fetched.content, "hello mars");
    assert_eq!(fetched.version, 2);

    // The superseded blob is gone, the new version's blob exists.
    assert!(!engine.storage.exists(&blob_key(id, 1)).await.unwrap());
    assert!(engine.storage.exists(&blob_key(id, 2)).await.unwrap());
}

#[tokio::test]
async fn update_title_only_keeps_content() {
    let engine = engine().await;
    let created = engine.service.create(new_paste("body")).await.unwrap();

    let updated = engine
        .service
        .update(
            created.paste.id,
            UpdatePaste {
                title: Some("renamed".to_string()),
                ..Default::default()
            },
            &created.edit_token,
        )
        .await
        .unwrap();

    assert_eq!(updated.title, "renamed");
    assert_eq!(updated.content, "body");
    assert_eq!(updated.version, 2);
}

#[tokio::test]
async fn update_can_clear_expiry() {
    let engine = engine().await;
    let mut paste = new_paste("short lived");
    paste.expires_at = Some(OffsetDateTime::now_utc() + time::Duration::hours(1));
    let created = engine.service.create(paste).await.unwrap();

    engine
        .service
        .update(
            created.paste.id,
            UpdatePaste {
                expires_at: Some(None),
                ..Default::default()
            },
            &created.edit_token,
        )
        .await
        .unwrap();

    let fetched = engine.service.get(created.paste.id).await.unwrap();
    assert!(fetched.expires_at.is_none());
}

#[tokio::test]
async fn empty_update_is_a_validation_error() {
    let engine = engine().await;
    let created = engine.service.create(new_paste("x")).await.unwrap();

    match engine
        .service
        .update(created.paste.id, UpdatePaste::default(), &created.edit_token)
        .await
    {
        Err(PasteError::Validation(_)) => {}
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_content_is_rejected() {
    let engine = engine_with(|config| {
        config.paste.max_content_bytes = 16;
    })
    .await;

    match engine.service.create(new_paste(&"x".repeat(17))).await {
        Err(PasteError::Validation(_)) => {}
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_updates_observe_distinct_successive_versions() {
    let engine = engine().await;
    let created = engine.service.create(new_paste("v1")).await.unwrap();
    let id = created.paste.id;
    let token = created.edit_token.clone();

    const WRITERS: usize = 4;
    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let service = engine.service.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            service
                .update(id, update_content(&format!("writer {i}")), &token)
                .await
        }));
    }

    let mut versions = Vec::new();
    for handle in handles {
        let paste = handle.await.unwrap().expect("no writer may fail");
        versions.push(paste.version);
    }

    // No lost updates: every writer observed a distinct prior version, so
    // the successful versions are exactly 2..=WRITERS+1.
    versions.sort_unstable();
    let expected: Vec<i64> = (2..=(WRITERS as i64 + 1)).collect();
    assert_eq!(versions, expected);

    let fetched = engine.service.get(id).await.unwrap();
    assert_eq!(fetched.version, WRITERS as i64 + 1);
}

#[tokio::test]
async fn soft_delete_hides_paste_even_with_warm_cache() {
    let engine = engine().await;
    let created = engine.service.create(new_paste("cached body")).await.unwrap();
    let id = created.paste.id;

    // Warm the cache with the pre-delete entry.
    engine.service.get(id).await.unwrap();

    engine
        .service
        .soft_delete(id, &created.delete_token)
        .await
        .unwrap();

    match engine.service.get(id).await {
        Err(PasteError::Deleted(_)) => {}
        other => panic!("expected Deleted, got {other:?}"),
    }
}

#[tokio::test]
async fn soft_deleted_paste_rejects_further_mutation() {
    let engine = engine().await;
    let created = engine.service.create(new_paste("going away")).await.unwrap();
    let id = created.paste.id;

    engine
        .service
        .soft_delete(id, &created.delete_token)
        .await
        .unwrap();

    match engine
        .service
        .update(id, update_content("resurrect"), &created.edit_token)
        .await
    {
        Err(PasteError::Deleted(_)) => {}
        other => panic!("expected Deleted, got {other:?}"),
    }
    match engine.service.soft_delete(id, &created.delete_token).await {
        Err(PasteError::Deleted(_)) => {}
        other => panic!("expected Deleted, got {other:?}"),
    }
}

#[tokio::test]
async fn paste_born_expired_returns_expired_on_first_get() {
    let engine = engine().await;
    let mut paste = new_paste("already gone");
    paste.expires_at = Some(OffsetDateTime::now_utc() - time::Duration::minutes(1));
    let created = engine.service.create(paste).await.unwrap();

    match engine.service.get(created.paste.id).await {
        Err(PasteError::Expired(_)) => {}
        other => panic!("expected Expired, got {other:?}"),
    }

    // Expired pastes reject mutation as well.
    match engine
        .service
        .update(created.paste.id, update_content("x"), &created.edit_token)
        .await
    {
        Err(PasteError::Expired(_)) => {}
        other => panic!("expected Expired, got {other:?}"),
    }
}

#[tokio::test]
async fn purge_removes_expired_paste_and_blob() {
    let engine = engine().await;
    let mut paste = new_paste("expired body");
    paste.expires_at = Some(OffsetDateTime::now_utc() - time::Duration::minutes(1));
    let created = engine.service.create(paste).await.unwrap();
    let id = created.paste.id;

    assert!(engine.storage.exists(&blob_key(id, 1)).await.unwrap());

    let stats = engine.service.purge_expired().await.unwrap();
    assert_eq!(stats.purged, 1);
    assert_eq!(stats.errors, 0);

    match engine.service.get(id).await {
        Err(PasteError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(!engine.storage.exists(&blob_key(id, 1)).await.unwrap());
}

#[tokio::test]
async fn purge_honors_soft_delete_retention_window() {
    let engine = engine_with(|config| {
        config.sweeper.keep_deleted_hours = Some(0);
    })
    .await;

    let created = engine.service.create(new_paste("soft deleted")).await.unwrap();
    let id = created.paste.id;
    engine
        .service
        .soft_delete(id, &created.delete_token)
        .await
        .unwrap();

    // Zero retention: the record is already past its window.
    let stats = engine.service.purge_expired().await.unwrap();
    assert_eq!(stats.purged, 1);

    match engine.service.get(id).await {
        Err(PasteError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(!engine.storage.exists(&blob_key(id, 1)).await.unwrap());
}

#[tokio::test]
async fn purge_without_retention_keeps_soft_deleted_pastes() {
    let engine = engine().await;

    let created = engine.service.create(new_paste("kept")).await.unwrap();
    engine
        .service
        .soft_delete(created.paste.id, &created.delete_token)
        .await
        .unwrap();

    let stats = engine.service.purge_expired().await.unwrap();
    assert_eq!(stats.purged, 0);

    // Still soft-deleted, not purged.
    match engine.service.get(created.paste.id).await {
        Err(PasteError::Deleted(_)) => {}
        other => panic!("expected Deleted, got {other:?}"),
    }
}

#[tokio::test]
async fn purge_is_a_noop_on_live_pastes() {
    let engine = engine().await;
    let created = engine.service.create(new_paste("live")).await.unwrap();

    let stats = engine.service.purge_expired().await.unwrap();
    assert_eq!(stats.scanned, 0);
    assert_eq!(engine.service.get(created.paste.id).await.unwrap().version, 1);
}

#[tokio::test]
async fn full_lifecycle_scenario() {
    let engine = engine().await;

    // create -> get -> update -> get -> soft delete -> get
    let created = engine
        .service
        .create(NewPaste {
            title: "t".to_string(),
            content_language: "plain_text".to_string(),
            content: "hello world".to_string(),
            expires_at: None,
        })
        .await
        .unwrap();
    let id = created.paste.id;

    assert_eq!(engine.service.get(id).await.unwrap().content, "hello world");

    let updated = engine
        .service
        .update(id, update_content("hello mars"), &created.edit_token)
        .await
        .unwrap();
    assert_eq!(updated.version, 2);

    assert_eq!(engine.service.get(id).await.unwrap().content, "hello mars");

    engine
        .service
        .soft_delete(id, &created.delete_token)
        .await
        .unwrap();

    match engine.service.get(id).await {
        Err(PasteError::Deleted(_)) => {}
        other => panic!("expected Deleted, got {other:?}"),
    }
}

#[tokio::test]
async fn update_holds_lease_so_contender_times_out_busy() {
    let engine = engine_with(|config| {
        config.paste.lock_wait_ms = 50;
    })
    .await;
    let created = engine.service.create(new_paste("locked")).await.unwrap();
    let id = created.paste.id;

    // Hold the paste's lease directly, as a stuck peer instance would.
    let locks = snip_lock::from_config(&snip_core::config::LockConfig::Filesystem {
        dir: engine._temp.path().join("locks"),
        lease_ttl_secs: 30,
        retry_interval_ms: 10,
    })
    .await
    .unwrap();
    let lease = locks
        .acquire(&id.to_string(), Duration::from_millis(200))
        .await
        .unwrap();

    match engine
        .service
        .update(id, update_content("blocked"), &created.edit_token)
        .await
    {
        Err(PasteError::Busy(_)) => {}
        other => panic!("expected Busy, got {other:?}"),
    }

    locks.release(&lease).await.unwrap();

    // With the lease free the same update goes through.
    let updated = engine
        .service
        .update(id, update_content("unblocked"), &created.edit_token)
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
}
