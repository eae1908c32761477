//! Storage abstraction: transactions, identifier resolution, and the
//! backend factory.
//!
//! Every entity operation exists twice: on [`Transaction`], where it runs
//! inside the caller's transaction, and on [`Store`], where a provided
//! wrapper opens a transaction, runs the operation, and commits on
//! success. A failed operation drops the transaction, which rolls it
//! back. The wrappers are the only atomicity mechanism; backends never
//! commit partial work.

pub mod dsn;
pub mod ident;
pub mod mock;
pub mod sqlite;

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::error::Error;
use crate::models::{ApiKey, OidcClient, Permission, Role, TokenType, User, VerificationToken};

pub use dsn::Dsn;
pub use ident::Ident;
pub use mock::MockStore;
pub use sqlite::SqliteStore;

/// Options for [`Store::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub read_only: bool,
}

impl TxOptions {
    pub fn read_write() -> Self {
        TxOptions { read_only: false }
    }

    pub fn read_only() -> Self {
        TxOptions { read_only: true }
    }
}

/// Open a store for the configured connection descriptor.
///
/// The scheme selects the backend: `sqlite`/`sqlite3` for the embedded
/// file engine, `mock` for the in-memory test double.
pub async fn open(config: &StoreConfig) -> Result<Box<dyn Store>, Error> {
    let dsn = Dsn::parse(&config.uri)?;
    match dsn.scheme.as_str() {
        "sqlite" | "sqlite3" => {
            let store =
                SqliteStore::open(&dsn, config.environment.validation_mode()).await?;
            Ok(Box::new(store))
        }
        "mock" => Ok(Box::new(MockStore::with_read_only(dsn.read_only))),
        other => Err(Error::UnknownScheme(other.to_string())),
    }
}

/// A unit of work against one backend.
///
/// Mutating operations fail with [`Error::ReadOnly`] on a transaction begun
/// with [`TxOptions::read_only`]. `commit` and `rollback` consume the
/// transaction; dropping an unfinished transaction rolls it back.
#[async_trait]
pub trait Transaction: Send {
    // ==================== User Operations ====================

    async fn list_users(&mut self) -> Result<Vec<User>, Error>;
    async fn create_user(&mut self, user: User) -> Result<User, Error>;
    async fn retrieve_user(&mut self, ident: Ident) -> Result<User, Error>;
    async fn update_user(&mut self, user: User) -> Result<User, Error>;
    async fn update_password(&mut self, ident: Ident, password: &str) -> Result<(), Error>;
    async fn update_last_login(&mut self, ident: Ident) -> Result<(), Error>;
    async fn delete_user(&mut self, ident: Ident) -> Result<(), Error>;

    // ==================== Role Operations ====================

    async fn list_roles(&mut self) -> Result<Vec<Role>, Error>;
    async fn create_role(&mut self, role: Role) -> Result<Role, Error>;
    async fn retrieve_role(&mut self, ident: Ident) -> Result<Role, Error>;
    async fn update_role(&mut self, role: Role) -> Result<Role, Error>;
    async fn add_role_permission(&mut self, role: Ident, permission: Ident) -> Result<(), Error>;
    async fn remove_role_permission(&mut self, role: Ident, permission: Ident)
        -> Result<(), Error>;
    async fn delete_role(&mut self, ident: Ident) -> Result<(), Error>;

    // ==================== Permission Operations ====================

    async fn list_permissions(&mut self) -> Result<Vec<Permission>, Error>;
    async fn create_permission(&mut self, permission: Permission) -> Result<Permission, Error>;
    async fn retrieve_permission(&mut self, ident: Ident) -> Result<Permission, Error>;
    async fn update_permission(&mut self, permission: Permission) -> Result<Permission, Error>;
    async fn delete_permission(&mut self, ident: Ident) -> Result<(), Error>;

    // ==================== API Key Operations ====================

    async fn list_api_keys(&mut self) -> Result<Vec<ApiKey>, Error>;
    async fn create_api_key(&mut self, key: ApiKey) -> Result<ApiKey, Error>;
    async fn retrieve_api_key(&mut self, ident: Ident) -> Result<ApiKey, Error>;
    async fn update_api_key(&mut self, key: ApiKey) -> Result<ApiKey, Error>;
    async fn update_api_key_last_seen(&mut self, ident: Ident) -> Result<(), Error>;
    async fn revoke_api_key(&mut self, ident: Ident) -> Result<(), Error>;
    async fn delete_api_key(&mut self, ident: Ident) -> Result<(), Error>;

    // ==================== OIDC Client Operations ====================

    async fn list_oidc_clients(&mut self) -> Result<Vec<OidcClient>, Error>;
    async fn create_oidc_client(&mut self, client: OidcClient) -> Result<OidcClient, Error>;
    async fn retrieve_oidc_client(&mut self, ident: Ident) -> Result<OidcClient, Error>;
    async fn update_oidc_client(&mut self, client: OidcClient) -> Result<OidcClient, Error>;
    async fn revoke_oidc_client(&mut self, ident: Ident) -> Result<(), Error>;
    async fn delete_oidc_client(&mut self, ident: Ident) -> Result<(), Error>;

    // ==================== Verification Token Operations ====================

    async fn create_vero_token(
        &mut self,
        token: VerificationToken,
    ) -> Result<VerificationToken, Error>;
    async fn retrieve_vero_token(&mut self, ident: Ident) -> Result<VerificationToken, Error>;
    async fn retrieve_vero_token_by_email(
        &mut self,
        email: &str,
        token_type: TokenType,
    ) -> Result<VerificationToken, Error>;
    async fn update_vero_token(
        &mut self,
        token: VerificationToken,
    ) -> Result<VerificationToken, Error>;
    async fn delete_vero_token(&mut self, ident: Ident) -> Result<(), Error>;

    // ==================== Lifecycle ====================

    async fn commit(self: Box<Self>) -> Result<(), Error>;
    async fn rollback(self: Box<Self>) -> Result<(), Error>;
}

/// A storage backend.
///
/// The entity operations are provided wrappers over [`Store::begin`]: each
/// opens a transaction, runs the matching [`Transaction`] operation, and
/// commits on success. A failure propagates after the dropped transaction
/// has rolled back, so no wrapper ever leaves partial work behind.
#[async_trait]
pub trait Store: Send + Sync {
    /// Start a transaction. Fails with [`Error::ReadOnly`] when a
    /// read-write transaction is requested from a read-only store.
    async fn begin(&self, opts: TxOptions) -> Result<Box<dyn Transaction>, Error>;

    /// Verify the backend is reachable.
    async fn ping(&self) -> Result<(), Error>;

    // ==================== User Operations ====================

    async fn list_users(&self) -> Result<Vec<User>, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let users = txn.list_users().await?;
        txn.commit().await?;
        Ok(users)
    }

    async fn create_user(&self, user: User) -> Result<User, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let created = txn.create_user(user).await?;
        txn.commit().await?;
        Ok(created)
    }

    async fn retrieve_user(&self, ident: Ident) -> Result<User, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let user = txn.retrieve_user(ident).await?;
        txn.commit().await?;
        Ok(user)
    }

    async fn update_user(&self, user: User) -> Result<User, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let updated = txn.update_user(user).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn update_password(&self, ident: Ident, password: &str) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.update_password(ident, password).await?;
        txn.commit().await
    }

    async fn update_last_login(&self, ident: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.update_last_login(ident).await?;
        txn.commit().await
    }

    async fn delete_user(&self, ident: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.delete_user(ident).await?;
        txn.commit().await
    }

    // ==================== Role Operations ====================

    async fn list_roles(&self) -> Result<Vec<Role>, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let roles = txn.list_roles().await?;
        txn.commit().await?;
        Ok(roles)
    }

    async fn create_role(&self, role: Role) -> Result<Role, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let created = txn.create_role(role).await?;
        txn.commit().await?;
        Ok(created)
    }

    async fn retrieve_role(&self, ident: Ident) -> Result<Role, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let role = txn.retrieve_role(ident).await?;
        txn.commit().await?;
        Ok(role)
    }

    async fn update_role(&self, role: Role) -> Result<Role, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let updated = txn.update_role(role).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn add_role_permission(&self, role: Ident, permission: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.add_role_permission(role, permission).await?;
        txn.commit().await
    }

    async fn remove_role_permission(&self, role: Ident, permission: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.remove_role_permission(role, permission).await?;
        txn.commit().await
    }

    async fn delete_role(&self, ident: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.delete_role(ident).await?;
        txn.commit().await
    }

    // ==================== Permission Operations ====================

    async fn list_permissions(&self) -> Result<Vec<Permission>, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let permissions = txn.list_permissions().await?;
        txn.commit().await?;
        Ok(permissions)
    }

    async fn create_permission(&self, permission: Permission) -> Result<Permission, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let created = txn.create_permission(permission).await?;
        txn.commit().await?;
        Ok(created)
    }

    async fn retrieve_permission(&self, ident: Ident) -> Result<Permission, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let permission = txn.retrieve_permission(ident).await?;
        txn.commit().await?;
        Ok(permission)
    }

    async fn update_permission(&self, permission: Permission) -> Result<Permission, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let updated = txn.update_permission(permission).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn delete_permission(&self, ident: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.delete_permission(ident).await?;
        txn.commit().await
    }

    // ==================== API Key Operations ====================

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let keys = txn.list_api_keys().await?;
        txn.commit().await?;
        Ok(keys)
    }

    async fn create_api_key(&self, key: ApiKey) -> Result<ApiKey, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let created = txn.create_api_key(key).await?;
        txn.commit().await?;
        Ok(created)
    }

    async fn retrieve_api_key(&self, ident: Ident) -> Result<ApiKey, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let key = txn.retrieve_api_key(ident).await?;
        txn.commit().await?;
        Ok(key)
    }

    async fn update_api_key(&self, key: ApiKey) -> Result<ApiKey, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let updated = txn.update_api_key(key).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn update_api_key_last_seen(&self, ident: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.update_api_key_last_seen(ident).await?;
        txn.commit().await
    }

    async fn revoke_api_key(&self, ident: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.revoke_api_key(ident).await?;
        txn.commit().await
    }

    async fn delete_api_key(&self, ident: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.delete_api_key(ident).await?;
        txn.commit().await
    }

    // ==================== OIDC Client Operations ====================

    async fn list_oidc_clients(&self) -> Result<Vec<OidcClient>, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let clients = txn.list_oidc_clients().await?;
        txn.commit().await?;
        Ok(clients)
    }

    async fn create_oidc_client(&self, client: OidcClient) -> Result<OidcClient, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let created = txn.create_oidc_client(client).await?;
        txn.commit().await?;
        Ok(created)
    }

    async fn retrieve_oidc_client(&self, ident: Ident) -> Result<OidcClient, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let client = txn.retrieve_oidc_client(ident).await?;
        txn.commit().await?;
        Ok(client)
    }

    async fn update_oidc_client(&self, client: OidcClient) -> Result<OidcClient, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let updated = txn.update_oidc_client(client).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn revoke_oidc_client(&self, ident: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.revoke_oidc_client(ident).await?;
        txn.commit().await
    }

    async fn delete_oidc_client(&self, ident: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.delete_oidc_client(ident).await?;
        txn.commit().await
    }

    // ==================== Verification Token Operations ====================

    async fn create_vero_token(&self, token: VerificationToken) -> Result<VerificationToken, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let created = txn.create_vero_token(token).await?;
        txn.commit().await?;
        Ok(created)
    }

    async fn retrieve_vero_token(&self, ident: Ident) -> Result<VerificationToken, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let token = txn.retrieve_vero_token(ident).await?;
        txn.commit().await?;
        Ok(token)
    }

    async fn retrieve_vero_token_by_email(
        &self,
        email: &str,
        token_type: TokenType,
    ) -> Result<VerificationToken, Error> {
        let mut txn = self.begin(TxOptions::read_only()).await?;
        let token = txn.retrieve_vero_token_by_email(email, token_type).await?;
        txn.commit().await?;
        Ok(token)
    }

    async fn update_vero_token(&self, token: VerificationToken) -> Result<VerificationToken, Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        let updated = txn.update_vero_token(token).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn delete_vero_token(&self, ident: Ident) -> Result<(), Error> {
        let mut txn = self.begin(TxOptions::read_write()).await?;
        txn.delete_vero_token(ident).await?;
        txn.commit().await
    }
}
