//! Integration tests for API key operations and the status classifier.

mod common;

use chrono::{Duration, Utc};
use common::{sample_api_key, sample_permission, sample_user, TestStore};
use identity_store::models::{ApiKey, ApiKeyStatus, STALE_AFTER_DAYS};
use identity_store::{Error, Ident, Store};
use uuid::Uuid;

// ============================================================================
// Create and Retrieve
// ============================================================================

#[tokio::test]
async fn create_and_retrieve_round_trip() {
    let ts = TestStore::open().await;
    let store = ts.store.as_ref();

    let owner = store
        .create_user(sample_user("owner@example.com"))
        .await
        .expect("create owner");
    store
        .create_permission(sample_permission("metrics:read"))
        .await
        .expect("create permission");

    let mut key = sample_api_key("svc-metrics", owner.base.id);
    key.description = Some("metrics scraper".to_string());
    key.set_permissions(vec!["metrics:read".to_string()]);
    let created = store.create_api_key(key).await.expect("create key");

    assert!(!created.base.id.is_nil());
    assert_eq!(created.permissions().expect("loaded"), ["metrics:read"]);

    let by_id = store
        .retrieve_api_key(Ident::Id(created.base.id))
        .await
        .expect("retrieve by id");
    assert_eq!(by_id.client_id, "svc-metrics");
    assert_eq!(by_id.secret, "key-secret");
    assert_eq!(by_id.description.as_deref(), Some("metrics scraper"));
    assert_eq!(by_id.created_by, owner.base.id);
    assert_eq!(by_id.permissions().expect("loaded"), ["metrics:read"]);

    let by_client_id = store
        .retrieve_api_key(Ident::Key("svc-metrics".to_string()))
        .await
        .expect("retrieve by client id");
    assert_eq!(by_client_id.base.id, created.base.id);

    let result = store.retrieve_api_key(Ident::RowId(3)).await;
    assert!(matches!(
        result,
        Err(Error::UnsupportedIdent {
            entity: "api key",
            ..
        })
    ));
}

#[tokio::test]
async fn unknown_permission_title_rolls_the_create_back() {
    let ts = TestStore::open().await;
    let owner = ts
        .store
        .create_user(sample_user("owner@example.com"))
        .await
        .expect("create owner");

    let mut key = sample_api_key("svc-broken", owner.base.id);
    key.set_permissions(vec!["ghost".to_string()]);
    let err = ts
        .store
        .create_api_key(key)
        .await
        .expect_err("unknown permission must fail");
    match err {
        Error::Attach { entity, name, .. } => {
            assert_eq!(entity, "permission");
            assert_eq!(name, "ghost");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let result = ts
        .store
        .retrieve_api_key(Ident::Key("svc-broken".to_string()))
        .await;
    assert!(matches!(result, Err(Error::NotFound)));
}

#[tokio::test]
async fn required_fields_are_checked_before_insert() {
    let ts = TestStore::open().await;

    let err = ts
        .store
        .create_api_key(ApiKey::new("svc", "secret", Uuid::nil()))
        .await
        .expect_err("nil creator");
    assert!(matches!(err, Error::ZeroValuedNotNull(column) if column == "api_keys.created_by"));

    let err = ts
        .store
        .create_api_key(ApiKey::new("", "secret", Uuid::now_v7()))
        .await
        .expect_err("empty client id");
    assert!(matches!(err, Error::ZeroValuedNotNull(column) if column == "api_keys.client_id"));

    let err = ts
        .store
        .create_api_key(ApiKey::new("svc", "", Uuid::now_v7()))
        .await
        .expect_err("empty secret");
    assert!(matches!(err, Error::ZeroValuedNotNull(column) if column == "api_keys.secret"));
}

#[tokio::test]
async fn duplicate_client_id_is_a_conflict() {
    let ts = TestStore::open().await;
    let owner = ts
        .store
        .create_user(sample_user("owner@example.com"))
        .await
        .expect("create owner");

    ts.store
        .create_api_key(sample_api_key("svc-dup", owner.base.id))
        .await
        .expect("first create");
    let err = ts
        .store
        .create_api_key(sample_api_key("svc-dup", owner.base.id))
        .await
        .expect_err("duplicate client id");
    assert!(err.is_already_exists(), "unexpected error: {err:?}");
}

// ============================================================================
// Status Lifecycle
// ============================================================================

#[tokio::test]
async fn status_follows_usage_and_revocation() {
    let ts = TestStore::open().await;
    let store = ts.store.as_ref();
    let owner = store
        .create_user(sample_user("owner@example.com"))
        .await
        .expect("create owner");

    let created = store
        .create_api_key(sample_api_key("svc-status", owner.base.id))
        .await
        .expect("create key");
    assert_eq!(created.status(), ApiKeyStatus::Unused);

    store
        .update_api_key_last_seen(Ident::Id(created.base.id))
        .await
        .expect("record usage");
    let seen = store
        .retrieve_api_key(Ident::Id(created.base.id))
        .await
        .expect("retrieve key");
    assert_eq!(seen.status(), ApiKeyStatus::Active);

    // The same record classifies as stale once enough time has passed.
    let later = Utc::now() + Duration::days(STALE_AFTER_DAYS + 1);
    assert_eq!(seen.status_at(later), ApiKeyStatus::Stale);

    store
        .revoke_api_key(Ident::Id(created.base.id))
        .await
        .expect("revoke key");
    let revoked = store
        .retrieve_api_key(Ident::Id(created.base.id))
        .await
        .expect("retrieve key");
    assert_eq!(revoked.status(), ApiKeyStatus::Revoked);
    assert_eq!(revoked.status_at(later), ApiKeyStatus::Revoked);
}

#[tokio::test]
async fn revoke_is_idempotent_and_keeps_the_first_timestamp() {
    let ts = TestStore::open().await;
    let owner = ts
        .store
        .create_user(sample_user("owner@example.com"))
        .await
        .expect("create owner");
    let created = ts
        .store
        .create_api_key(sample_api_key("svc-revoke", owner.base.id))
        .await
        .expect("create key");

    ts.store
        .revoke_api_key(Ident::Id(created.base.id))
        .await
        .expect("first revoke");
    let first = ts
        .store
        .retrieve_api_key(Ident::Id(created.base.id))
        .await
        .expect("retrieve key");
    let first_stamp = first.revoked.expect("revoked set");

    ts.store
        .revoke_api_key(Ident::Id(created.base.id))
        .await
        .expect("second revoke is a no-op");
    let second = ts
        .store
        .retrieve_api_key(Ident::Id(created.base.id))
        .await
        .expect("retrieve key");
    assert_eq!(second.revoked, Some(first_stamp));

    let result = ts.store.revoke_api_key(Ident::Key("absent".to_string())).await;
    assert!(matches!(result, Err(Error::NotFound)));
}

// ============================================================================
// Update and Delete
// ============================================================================

#[tokio::test]
async fn update_leaves_lifecycle_columns_alone() {
    let ts = TestStore::open().await;
    let store = ts.store.as_ref();
    let owner = store
        .create_user(sample_user("owner@example.com"))
        .await
        .expect("create owner");

    let created = store
        .create_api_key(sample_api_key("svc-edit", owner.base.id))
        .await
        .expect("create key");
    store
        .update_api_key_last_seen(Ident::Id(created.base.id))
        .await
        .expect("record usage");

    let mut key = created.clone();
    key.description = Some("rotated".to_string());
    key.secret = "new-secret".to_string();
    let updated = store.update_api_key(key).await.expect("update key");

    assert_eq!(updated.description.as_deref(), Some("rotated"));
    assert_eq!(updated.secret, "new-secret");
    // last_seen is owned by update_api_key_last_seen, not by update.
    assert!(updated.last_seen.is_some());
    assert!(updated.revoked.is_none());
    assert!(matches!(
        updated.permissions(),
        Err(Error::MissingAssociation("permissions"))
    ));
}

#[tokio::test]
async fn keys_outlive_their_creator() {
    let ts = TestStore::open().await;
    let store = ts.store.as_ref();
    let owner = store
        .create_user(sample_user("owner@example.com"))
        .await
        .expect("create owner");
    let created = store
        .create_api_key(sample_api_key("svc-orphan", owner.base.id))
        .await
        .expect("create key");

    store
        .delete_user(Ident::Id(owner.base.id))
        .await
        .expect("delete owner");

    let key = store
        .retrieve_api_key(Ident::Id(created.base.id))
        .await
        .expect("key survives");
    assert_eq!(key.created_by, owner.base.id);
}

#[tokio::test]
async fn delete_removes_the_key_and_its_permission_links() {
    let ts = TestStore::open().await;
    let store = ts.store.as_ref();
    let owner = store
        .create_user(sample_user("owner@example.com"))
        .await
        .expect("create owner");
    store
        .create_permission(sample_permission("jobs:run"))
        .await
        .expect("create permission");

    let mut key = sample_api_key("svc-del", owner.base.id);
    key.set_permissions(vec!["jobs:run".to_string()]);
    let created = store.create_api_key(key).await.expect("create key");

    let pool = ts.raw_pool().await;
    let links: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM api_key_permissions WHERE api_key_id = ?1")
            .bind(created.base.id)
            .fetch_one(&pool)
            .await
            .expect("count permission links");
    assert_eq!(links, 1);

    store
        .delete_api_key(Ident::Key("svc-del".to_string()))
        .await
        .expect("delete key");
    assert!(matches!(
        store.retrieve_api_key(Ident::Id(created.base.id)).await,
        Err(Error::NotFound)
    ));
    assert!(matches!(
        store.delete_api_key(Ident::Id(created.base.id)).await,
        Err(Error::NotFound)
    ));

    // The join rows went with the key; the permission itself survives.
    let links: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM api_key_permissions WHERE api_key_id = ?1")
            .bind(created.base.id)
            .fetch_one(&pool)
            .await
            .expect("count permission links");
    assert_eq!(links, 0);
    pool.close().await;

    store
        .retrieve_permission(Ident::Key("jobs:run".to_string()))
        .await
        .expect("permission survives");
}
