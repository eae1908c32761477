//! Scriptable in-memory store for tests.
//!
//! Every [`Transaction`] operation has a stub slot in [`MockStubs`].
//! Calling an operation without a stub panics with the operation name, so
//! a test that exercises an unexpected code path fails loudly instead of
//! returning a silent default. Stubs are shared by all transactions from
//! one store, and call counts survive commit and rollback.
//!
//! ```no_run
//! use identity_store::store::MockStore;
//! use identity_store::Error;
//!
//! let store = MockStore::new();
//! store.stub(|stubs| {
//!     stubs.retrieve_user = Some(Box::new(|_ident| Err(Error::NotFound)));
//! });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::Error;
use crate::models::{ApiKey, OidcClient, Permission, Role, TokenType, User, VerificationToken};
use crate::store::{Ident, Store, Transaction, TxOptions};

/// A scripted response for one operation.
pub type Stub<A, R> = Box<dyn Fn(A) -> Result<R, Error> + Send + Sync>;

/// One optional stub per operation, named after the operation it answers.
#[derive(Default)]
pub struct MockStubs {
    // Users
    pub list_users: Option<Stub<(), Vec<User>>>,
    pub create_user: Option<Stub<User, User>>,
    pub retrieve_user: Option<Stub<Ident, User>>,
    pub update_user: Option<Stub<User, User>>,
    pub update_password: Option<Stub<(Ident, String), ()>>,
    pub update_last_login: Option<Stub<Ident, ()>>,
    pub delete_user: Option<Stub<Ident, ()>>,
    // Roles
    pub list_roles: Option<Stub<(), Vec<Role>>>,
    pub create_role: Option<Stub<Role, Role>>,
    pub retrieve_role: Option<Stub<Ident, Role>>,
    pub update_role: Option<Stub<Role, Role>>,
    pub add_role_permission: Option<Stub<(Ident, Ident), ()>>,
    pub remove_role_permission: Option<Stub<(Ident, Ident), ()>>,
    pub delete_role: Option<Stub<Ident, ()>>,
    // Permissions
    pub list_permissions: Option<Stub<(), Vec<Permission>>>,
    pub create_permission: Option<Stub<Permission, Permission>>,
    pub retrieve_permission: Option<Stub<Ident, Permission>>,
    pub update_permission: Option<Stub<Permission, Permission>>,
    pub delete_permission: Option<Stub<Ident, ()>>,
    // API keys
    pub list_api_keys: Option<Stub<(), Vec<ApiKey>>>,
    pub create_api_key: Option<Stub<ApiKey, ApiKey>>,
    pub retrieve_api_key: Option<Stub<Ident, ApiKey>>,
    pub update_api_key: Option<Stub<ApiKey, ApiKey>>,
    pub update_api_key_last_seen: Option<Stub<Ident, ()>>,
    pub revoke_api_key: Option<Stub<Ident, ()>>,
    pub delete_api_key: Option<Stub<Ident, ()>>,
    // OIDC clients
    pub list_oidc_clients: Option<Stub<(), Vec<OidcClient>>>,
    pub create_oidc_client: Option<Stub<OidcClient, OidcClient>>,
    pub retrieve_oidc_client: Option<Stub<Ident, OidcClient>>,
    pub update_oidc_client: Option<Stub<OidcClient, OidcClient>>,
    pub revoke_oidc_client: Option<Stub<Ident, ()>>,
    pub delete_oidc_client: Option<Stub<Ident, ()>>,
    // Verification tokens
    pub create_vero_token: Option<Stub<VerificationToken, VerificationToken>>,
    pub retrieve_vero_token: Option<Stub<Ident, VerificationToken>>,
    pub retrieve_vero_token_by_email: Option<Stub<(String, TokenType), VerificationToken>>,
    pub update_vero_token: Option<Stub<VerificationToken, VerificationToken>>,
    pub delete_vero_token: Option<Stub<Ident, ()>>,
}

#[derive(Default)]
struct MockInner {
    stubs: MockStubs,
    calls: HashMap<&'static str, u64>,
    commits: u64,
    rollbacks: u64,
}

fn lock(inner: &Mutex<MockInner>) -> MutexGuard<'_, MockInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// Test double selected by the `mock://` scheme.
///
/// Clones share stubs and counters, so a test can keep a handle while the
/// store itself is boxed behind [`Store`].
#[derive(Clone)]
pub struct MockStore {
    inner: Arc<Mutex<MockInner>>,
    read_only: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::with_read_only(false)
    }

    pub fn with_read_only(read_only: bool) -> Self {
        MockStore {
            inner: Arc::new(Mutex::new(MockInner::default())),
            read_only,
        }
    }

    /// Install or replace stubs.
    pub fn stub(&self, configure: impl FnOnce(&mut MockStubs)) {
        let mut inner = lock(&self.inner);
        configure(&mut inner.stubs);
    }

    /// How many times the named operation ran, across all transactions.
    pub fn calls(&self, op: &str) -> u64 {
        lock(&self.inner).calls.get(op).copied().unwrap_or(0)
    }

    pub fn commits(&self) -> u64 {
        lock(&self.inner).commits
    }

    pub fn rollbacks(&self) -> u64 {
        lock(&self.inner).rollbacks
    }

    /// Drop all stubs and zero the counters.
    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.stubs = MockStubs::default();
        inner.calls.clear();
        inner.commits = 0;
        inner.rollbacks = 0;
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MockStore {
    async fn begin(&self, opts: TxOptions) -> Result<Box<dyn Transaction>, Error> {
        if self.read_only && !opts.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(Box::new(MockTxn {
            inner: Arc::clone(&self.inner),
            opts,
        }))
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// A transaction over the shared stub table.
pub struct MockTxn {
    inner: Arc<Mutex<MockInner>>,
    opts: TxOptions,
}

impl MockTxn {
    fn check_writable(&self) -> Result<(), Error> {
        if self.opts.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    fn invoke<A, R>(
        &self,
        op: &'static str,
        arg: A,
        select: impl FnOnce(&MockStubs) -> Option<&Stub<A, R>>,
    ) -> Result<R, Error> {
        let mut inner = lock(&self.inner);
        *inner.calls.entry(op).or_insert(0) += 1;
        match select(&inner.stubs) {
            Some(stub) => stub(arg),
            None => panic!("mock store: no stub for `{op}`"),
        }
    }
}

#[async_trait]
impl Transaction for MockTxn {
    // ==================== User Operations ====================

    async fn list_users(&mut self) -> Result<Vec<User>, Error> {
        self.invoke("list_users", (), |s| s.list_users.as_ref())
    }

    async fn create_user(&mut self, user: User) -> Result<User, Error> {
        self.check_writable()?;
        self.invoke("create_user", user, |s| s.create_user.as_ref())
    }

    async fn retrieve_user(&mut self, ident: Ident) -> Result<User, Error> {
        self.invoke("retrieve_user", ident, |s| s.retrieve_user.as_ref())
    }

    async fn update_user(&mut self, user: User) -> Result<User, Error> {
        self.check_writable()?;
        self.invoke("update_user", user, |s| s.update_user.as_ref())
    }

    async fn update_password(&mut self, ident: Ident, password: &str) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("update_password", (ident, password.to_string()), |s| {
            s.update_password.as_ref()
        })
    }

    async fn update_last_login(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("update_last_login", ident, |s| s.update_last_login.as_ref())
    }

    async fn delete_user(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("delete_user", ident, |s| s.delete_user.as_ref())
    }

    // ==================== Role Operations ====================

    async fn list_roles(&mut self) -> Result<Vec<Role>, Error> {
        self.invoke("list_roles", (), |s| s.list_roles.as_ref())
    }

    async fn create_role(&mut self, role: Role) -> Result<Role, Error> {
        self.check_writable()?;
        self.invoke("create_role", role, |s| s.create_role.as_ref())
    }

    async fn retrieve_role(&mut self, ident: Ident) -> Result<Role, Error> {
        self.invoke("retrieve_role", ident, |s| s.retrieve_role.as_ref())
    }

    async fn update_role(&mut self, role: Role) -> Result<Role, Error> {
        self.check_writable()?;
        self.invoke("update_role", role, |s| s.update_role.as_ref())
    }

    async fn add_role_permission(&mut self, role: Ident, permission: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("add_role_permission", (role, permission), |s| {
            s.add_role_permission.as_ref()
        })
    }

    async fn remove_role_permission(
        &mut self,
        role: Ident,
        permission: Ident,
    ) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("remove_role_permission", (role, permission), |s| {
            s.remove_role_permission.as_ref()
        })
    }

    async fn delete_role(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("delete_role", ident, |s| s.delete_role.as_ref())
    }

    // ==================== Permission Operations ====================

    async fn list_permissions(&mut self) -> Result<Vec<Permission>, Error> {
        self.invoke("list_permissions", (), |s| s.list_permissions.as_ref())
    }

    async fn create_permission(&mut self, permission: Permission) -> Result<Permission, Error> {
        self.check_writable()?;
        self.invoke("create_permission", permission, |s| {
            s.create_permission.as_ref()
        })
    }

    async fn retrieve_permission(&mut self, ident: Ident) -> Result<Permission, Error> {
        self.invoke("retrieve_permission", ident, |s| {
            s.retrieve_permission.as_ref()
        })
    }

    async fn update_permission(&mut self, permission: Permission) -> Result<Permission, Error> {
        self.check_writable()?;
        self.invoke("update_permission", permission, |s| {
            s.update_permission.as_ref()
        })
    }

    async fn delete_permission(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("delete_permission", ident, |s| s.delete_permission.as_ref())
    }

    // ==================== API Key Operations ====================

    async fn list_api_keys(&mut self) -> Result<Vec<ApiKey>, Error> {
        self.invoke("list_api_keys", (), |s| s.list_api_keys.as_ref())
    }

    async fn create_api_key(&mut self, key: ApiKey) -> Result<ApiKey, Error> {
        self.check_writable()?;
        self.invoke("create_api_key", key, |s| s.create_api_key.as_ref())
    }

    async fn retrieve_api_key(&mut self, ident: Ident) -> Result<ApiKey, Error> {
        self.invoke("retrieve_api_key", ident, |s| s.retrieve_api_key.as_ref())
    }

    async fn update_api_key(&mut self, key: ApiKey) -> Result<ApiKey, Error> {
        self.check_writable()?;
        self.invoke("update_api_key", key, |s| s.update_api_key.as_ref())
    }

    async fn update_api_key_last_seen(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("update_api_key_last_seen", ident, |s| {
            s.update_api_key_last_seen.as_ref()
        })
    }

    async fn revoke_api_key(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("revoke_api_key", ident, |s| s.revoke_api_key.as_ref())
    }

    async fn delete_api_key(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("delete_api_key", ident, |s| s.delete_api_key.as_ref())
    }

    // ==================== OIDC Client Operations ====================

    async fn list_oidc_clients(&mut self) -> Result<Vec<OidcClient>, Error> {
        self.invoke("list_oidc_clients", (), |s| s.list_oidc_clients.as_ref())
    }

    async fn create_oidc_client(&mut self, client: OidcClient) -> Result<OidcClient, Error> {
        self.check_writable()?;
        self.invoke("create_oidc_client", client, |s| {
            s.create_oidc_client.as_ref()
        })
    }

    async fn retrieve_oidc_client(&mut self, ident: Ident) -> Result<OidcClient, Error> {
        self.invoke("retrieve_oidc_client", ident, |s| {
            s.retrieve_oidc_client.as_ref()
        })
    }

    async fn update_oidc_client(&mut self, client: OidcClient) -> Result<OidcClient, Error> {
        self.check_writable()?;
        self.invoke("update_oidc_client", client, |s| {
            s.update_oidc_client.as_ref()
        })
    }

    async fn revoke_oidc_client(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("revoke_oidc_client", ident, |s| s.revoke_oidc_client.as_ref())
    }

    async fn delete_oidc_client(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("delete_oidc_client", ident, |s| s.delete_oidc_client.as_ref())
    }

    // ==================== Verification Token Operations ====================

    async fn create_vero_token(
        &mut self,
        token: VerificationToken,
    ) -> Result<VerificationToken, Error> {
        self.check_writable()?;
        self.invoke("create_vero_token", token, |s| s.create_vero_token.as_ref())
    }

    async fn retrieve_vero_token(&mut self, ident: Ident) -> Result<VerificationToken, Error> {
        self.invoke("retrieve_vero_token", ident, |s| {
            s.retrieve_vero_token.as_ref()
        })
    }

    async fn retrieve_vero_token_by_email(
        &mut self,
        email: &str,
        token_type: TokenType,
    ) -> Result<VerificationToken, Error> {
        self.invoke(
            "retrieve_vero_token_by_email",
            (email.to_string(), token_type),
            |s| s.retrieve_vero_token_by_email.as_ref(),
        )
    }

    async fn update_vero_token(
        &mut self,
        token: VerificationToken,
    ) -> Result<VerificationToken, Error> {
        self.check_writable()?;
        self.invoke("update_vero_token", token, |s| s.update_vero_token.as_ref())
    }

    async fn delete_vero_token(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        self.invoke("delete_vero_token", ident, |s| s.delete_vero_token.as_ref())
    }

    // ==================== Lifecycle ====================

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        lock(&self.inner).commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        lock(&self.inner).rollbacks += 1;
        Ok(())
    }
}
