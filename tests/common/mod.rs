//! Shared fixtures for store integration tests.
#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{Duration, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use identity_store::config::{Environment, StoreConfig};
use identity_store::models::{
    ApiKey, OidcClient, Permission, Role, TokenType, User, VerificationToken,
};
use identity_store::store::{self, Store};

/// A store backed by a fresh database file in a temporary directory.
///
/// The directory lives as long as the fixture, so reopening the same file
/// (for read-only and migration tests) is possible.
pub struct TestStore {
    pub store: Box<dyn Store>,
    pub uri: String,
    pub path: PathBuf,
    _dir: TempDir,
}

impl TestStore {
    /// Open with dev-environment (debug) validation.
    pub async fn open() -> Self {
        Self::open_with_environment(Environment::Dev).await
    }

    pub async fn open_with_environment(environment: Environment) -> Self {
        // Initialize tracing if not already initialized
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();

        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("identity.db");
        let uri = format!("sqlite3://{}", path.display());
        let config = StoreConfig::new(&uri).with_environment(environment);
        let opened = store::open(&config).await.expect("open store");
        TestStore {
            store: opened,
            uri,
            path,
            _dir: dir,
        }
    }

    /// Open a second store over the same database file.
    pub async fn reopen(&self, read_only: bool) -> Box<dyn Store> {
        let uri = format!("{}?readonly={}", self.uri, read_only);
        let config = StoreConfig::new(uri);
        store::open(&config).await.expect("reopen store")
    }

    /// A direct connection for schema-level assertions.
    pub async fn raw_pool(&self) -> sqlx::SqlitePool {
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&self.path)
            .read_only(true);
        sqlx::SqlitePool::connect_with(options)
            .await
            .expect("open raw pool")
    }
}

pub fn sample_user(email: &str) -> User {
    let mut user = User::new(email, "argon2id$stub-hash");
    user.name = Some("Sample User".to_string());
    user
}

pub fn sample_role(title: &str) -> Role {
    Role::new(title, format!("{title} role"))
}

pub fn sample_permission(title: &str) -> Permission {
    Permission::new(title, format!("grants {title}"))
}

pub fn sample_api_key(client_id: &str, created_by: Uuid) -> ApiKey {
    ApiKey::new(client_id, "key-secret", created_by)
}

pub fn sample_oidc_client(client_id: &str, created_by: Uuid) -> OidcClient {
    let mut client = OidcClient::new("Sample App", client_id, "client-secret", created_by);
    client.redirect_uris = vec!["https://app.example.com/callback".to_string()];
    client.contacts = vec!["ops@example.com".to_string()];
    client
}

pub fn sample_vero_token(email: &str, token_type: TokenType) -> VerificationToken {
    VerificationToken::new(
        token_type,
        email,
        Utc::now() + Duration::hours(24),
        vec![0xde, 0xad, 0xbe, 0xef],
    )
}

/// Create a permission and a role granting it; returns both as stored.
pub async fn seed_role_with_permission(
    store: &dyn Store,
    role_title: &str,
    permission_title: &str,
) -> (Role, Permission) {
    let permission = store
        .create_permission(sample_permission(permission_title))
        .await
        .expect("create permission");
    let mut role = sample_role(role_title);
    role.set_permissions(vec![permission.clone()]);
    let role = store.create_role(role).await.expect("create role");
    (role, permission)
}
