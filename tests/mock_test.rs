//! Integration tests for the scriptable mock store.

use identity_store::config::StoreConfig;
use identity_store::models::{Role, User};
use identity_store::store::{open, MockStore};
use identity_store::{Error, Ident, Store, Transaction, TxOptions};

#[tokio::test]
async fn wrappers_run_the_stub_and_commit() {
    let store = MockStore::new();
    let handle = store.clone();
    store.stub(|stubs| {
        stubs.create_role = Some(Box::new(|mut role: Role| {
            role.base.id = 7;
            Ok(role)
        }));
    });

    let created = store
        .create_role(Role::new("admin", ""))
        .await
        .expect("create role");
    assert_eq!(created.base.id, 7);
    assert_eq!(created.title, "admin");

    assert_eq!(handle.calls("create_role"), 1);
    assert_eq!(handle.commits(), 1);
    assert_eq!(handle.rollbacks(), 0);
}

#[tokio::test]
async fn a_failing_stub_skips_the_commit() {
    let store = MockStore::new();
    store.stub(|stubs| {
        stubs.retrieve_user = Some(Box::new(|_ident| Err(Error::NotFound)));
    });

    let result = store.retrieve_user(Ident::Id(uuid::Uuid::now_v7())).await;
    assert!(matches!(result, Err(Error::NotFound)));
    assert_eq!(store.calls("retrieve_user"), 1);
    assert_eq!(store.commits(), 0);
}

#[tokio::test]
#[should_panic(expected = "no stub for `delete_role`")]
async fn unstubbed_operations_panic_with_the_operation_name() {
    let store = MockStore::new();
    let mut txn = store
        .begin(TxOptions::read_write())
        .await
        .expect("begin");
    let _ = txn.delete_role(Ident::RowId(1)).await;
}

#[tokio::test]
async fn stubs_see_the_arguments_the_caller_passed() {
    let store = MockStore::new();
    store.stub(|stubs| {
        stubs.update_password = Some(Box::new(|(ident, password): (Ident, String)| {
            assert_eq!(ident, Ident::Key("ana@example.com".to_string()));
            assert_eq!(password, "rehashed");
            Ok(())
        }));
    });

    store
        .update_password(Ident::Key("ana@example.com".to_string()), "rehashed")
        .await
        .expect("update password");
    assert_eq!(store.calls("update_password"), 1);
}

#[tokio::test]
async fn scripted_transactions_count_explicit_rollbacks() {
    let store = MockStore::new();
    store.stub(|stubs| {
        stubs.list_users = Some(Box::new(|_| Ok(vec![User::new("a@b.example", "pw")])));
    });

    let mut txn = store
        .begin(TxOptions::read_write())
        .await
        .expect("begin");
    let users = txn.list_users().await.expect("list users");
    assert_eq!(users.len(), 1);
    txn.rollback().await.expect("rollback");

    assert_eq!(store.calls("list_users"), 1);
    assert_eq!(store.rollbacks(), 1);
    assert_eq!(store.commits(), 0);
}

#[tokio::test]
async fn factory_builds_read_only_mocks_from_the_descriptor() {
    let config = StoreConfig::new("mock://stub?readonly=true");
    let stub = open(&config).await.expect("open mock store");

    let result = stub.begin(TxOptions::read_write()).await;
    assert!(matches!(result, Err(Error::ReadOnly)));

    let txn = stub.begin(TxOptions::read_only()).await.expect("begin read-only");
    txn.commit().await.expect("commit");
}

#[tokio::test]
async fn reset_returns_the_store_to_a_clean_slate() {
    let store = MockStore::new();
    store.stub(|stubs| {
        stubs.list_roles = Some(Box::new(|_| Ok(Vec::new())));
    });
    store.list_roles().await.expect("list roles");
    assert_eq!(store.calls("list_roles"), 1);
    assert_eq!(store.commits(), 1);

    store.reset();
    assert_eq!(store.calls("list_roles"), 0);
    assert_eq!(store.commits(), 0);
}
