//! Entity operations executed inside a SQLite transaction.
//!
//! All SQL lives here as fixed statements over the column contracts
//! declared in [`super::rows`].

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{
    ApiKey, OidcClient, Permission, Role, TokenType, User, VerificationToken,
};
use crate::store::{Ident, Transaction};

use super::SqliteTxn;

// ==================== User SQL ====================

const SELECT_USERS: &str = "SELECT id, created, modified, name, email, password, last_login, \
     email_verified FROM users ORDER BY id";
const SELECT_USER_BY_ID: &str = "SELECT id, created, modified, name, email, password, \
     last_login, email_verified FROM users WHERE id = ?1";
const SELECT_USER_BY_EMAIL: &str = "SELECT id, created, modified, name, email, password, \
     last_login, email_verified FROM users WHERE email = ?1";
const INSERT_USER: &str = "INSERT INTO users (id, created, modified, name, email, password, \
     last_login, email_verified) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";
const UPDATE_USER: &str = "UPDATE users SET modified = ?1, name = ?2, email = ?3, \
     password = ?4, email_verified = ?5 WHERE id = ?6";
const UPDATE_USER_PASSWORD: &str = "UPDATE users SET password = ?1, modified = ?2 WHERE id = ?3";
const UPDATE_USER_LAST_LOGIN: &str =
    "UPDATE users SET last_login = ?1, modified = ?2 WHERE id = ?3";
const DELETE_USER: &str = "DELETE FROM users WHERE id = ?1";

const SELECT_USER_ROLES: &str = "SELECT r.id, r.created, r.modified, r.title, r.description, \
     r.is_default FROM roles r JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = ?1 \
     ORDER BY r.id";
const SELECT_USER_PERMISSIONS: &str = "SELECT DISTINCT p.title FROM permissions p \
     JOIN role_permissions rp ON rp.permission_id = p.id \
     JOIN user_roles ur ON ur.role_id = rp.role_id WHERE ur.user_id = ?1 ORDER BY p.title";
const INSERT_USER_ROLE: &str = "INSERT INTO user_roles (user_id, role_id) VALUES (?1, ?2)";

// ==================== Role SQL ====================

const SELECT_ROLES: &str =
    "SELECT id, created, modified, title, description, is_default FROM roles ORDER BY id";
const SELECT_ROLE_BY_ID: &str =
    "SELECT id, created, modified, title, description, is_default FROM roles WHERE id = ?1";
const SELECT_ROLE_BY_TITLE: &str =
    "SELECT id, created, modified, title, description, is_default FROM roles WHERE title = ?1";
const SELECT_DEFAULT_ROLES: &str = "SELECT id, created, modified, title, description, \
     is_default FROM roles WHERE is_default = 1 ORDER BY id";
const INSERT_ROLE: &str = "INSERT INTO roles (created, modified, title, description, \
     is_default) VALUES (?1, ?2, ?3, ?4, ?5)";
const UPDATE_ROLE: &str = "UPDATE roles SET modified = ?1, title = ?2, description = ?3, \
     is_default = ?4 WHERE id = ?5";
const DELETE_ROLE: &str = "DELETE FROM roles WHERE id = ?1";

const SELECT_ROLE_PERMISSIONS: &str = "SELECT p.id, p.created, p.modified, p.title, \
     p.description FROM permissions p JOIN role_permissions rp ON rp.permission_id = p.id \
     WHERE rp.role_id = ?1 ORDER BY p.id";
const INSERT_ROLE_PERMISSION: &str =
    "INSERT INTO role_permissions (role_id, permission_id) VALUES (?1, ?2)";
const DELETE_ROLE_PERMISSION: &str =
    "DELETE FROM role_permissions WHERE role_id = ?1 AND permission_id = ?2";

// ==================== Permission SQL ====================

const SELECT_PERMISSIONS: &str =
    "SELECT id, created, modified, title, description FROM permissions ORDER BY id";
const SELECT_PERMISSION_BY_ID: &str =
    "SELECT id, created, modified, title, description FROM permissions WHERE id = ?1";
const SELECT_PERMISSION_BY_TITLE: &str =
    "SELECT id, created, modified, title, description FROM permissions WHERE title = ?1";
const INSERT_PERMISSION: &str =
    "INSERT INTO permissions (created, modified, title, description) VALUES (?1, ?2, ?3, ?4)";
const UPDATE_PERMISSION: &str =
    "UPDATE permissions SET modified = ?1, title = ?2, description = ?3 WHERE id = ?4";
const DELETE_PERMISSION: &str = "DELETE FROM permissions WHERE id = ?1";

// ==================== API Key SQL ====================

const SELECT_API_KEYS: &str = "SELECT id, created, modified, description, client_id, secret, \
     created_by, last_seen, revoked FROM api_keys ORDER BY id";
const SELECT_API_KEY_BY_ID: &str = "SELECT id, created, modified, description, client_id, \
     secret, created_by, last_seen, revoked FROM api_keys WHERE id = ?1";
const SELECT_API_KEY_BY_CLIENT_ID: &str = "SELECT id, created, modified, description, \
     client_id, secret, created_by, last_seen, revoked FROM api_keys WHERE client_id = ?1";
const INSERT_API_KEY: &str = "INSERT INTO api_keys (id, created, modified, description, \
     client_id, secret, created_by, last_seen, revoked) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";
const UPDATE_API_KEY: &str = "UPDATE api_keys SET modified = ?1, description = ?2, \
     client_id = ?3, secret = ?4, created_by = ?5 WHERE id = ?6";
const UPDATE_API_KEY_LAST_SEEN: &str =
    "UPDATE api_keys SET last_seen = ?1, modified = ?2 WHERE id = ?3";
const REVOKE_API_KEY: &str =
    "UPDATE api_keys SET revoked = ?1, modified = ?2 WHERE id = ?3 AND revoked IS NULL";
const DELETE_API_KEY: &str = "DELETE FROM api_keys WHERE id = ?1";

const SELECT_API_KEY_PERMISSIONS: &str = "SELECT p.title FROM permissions p \
     JOIN api_key_permissions akp ON akp.permission_id = p.id WHERE akp.api_key_id = ?1 \
     ORDER BY p.title";
const INSERT_API_KEY_PERMISSION: &str =
    "INSERT INTO api_key_permissions (api_key_id, permission_id) VALUES (?1, ?2)";

// ==================== OIDC Client SQL ====================

const SELECT_OIDC_CLIENTS: &str = "SELECT id, created, modified, client_name, client_uri, \
     logo_uri, policy_uri, tos_uri, contacts, client_id, secret, redirect_uris, created_by, \
     revoked FROM oidc_clients ORDER BY id";
const SELECT_OIDC_CLIENT_BY_ID: &str = "SELECT id, created, modified, client_name, \
     client_uri, logo_uri, policy_uri, tos_uri, contacts, client_id, secret, redirect_uris, \
     created_by, revoked FROM oidc_clients WHERE id = ?1";
const SELECT_OIDC_CLIENT_BY_CLIENT_ID: &str = "SELECT id, created, modified, client_name, \
     client_uri, logo_uri, policy_uri, tos_uri, contacts, client_id, secret, redirect_uris, \
     created_by, revoked FROM oidc_clients WHERE client_id = ?1";
const INSERT_OIDC_CLIENT: &str = "INSERT INTO oidc_clients (id, created, modified, \
     client_name, client_uri, logo_uri, policy_uri, tos_uri, contacts, client_id, secret, \
     redirect_uris, created_by, revoked) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";
const UPDATE_OIDC_CLIENT: &str = "UPDATE oidc_clients SET modified = ?1, client_name = ?2, \
     client_uri = ?3, logo_uri = ?4, policy_uri = ?5, tos_uri = ?6, contacts = ?7, \
     client_id = ?8, secret = ?9, redirect_uris = ?10, created_by = ?11 WHERE id = ?12";
const REVOKE_OIDC_CLIENT: &str =
    "UPDATE oidc_clients SET revoked = ?1, modified = ?2 WHERE id = ?3 AND revoked IS NULL";
const DELETE_OIDC_CLIENT: &str = "DELETE FROM oidc_clients WHERE id = ?1";

// ==================== Verification Token SQL ====================

const SELECT_VERO_TOKEN_BY_ID: &str = "SELECT id, created, modified, token_type, resource_id, \
     email, expiration, signature, sent_on FROM vero_tokens WHERE id = ?1";
const SELECT_VERO_TOKENS_BY_EMAIL: &str = "SELECT id, created, modified, token_type, \
     resource_id, email, expiration, signature, sent_on FROM vero_tokens \
     WHERE email = ?1 AND token_type = ?2 ORDER BY id";
const INSERT_VERO_TOKEN: &str = "INSERT INTO vero_tokens (id, created, modified, token_type, \
     resource_id, email, expiration, signature, sent_on) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";
const UPDATE_VERO_TOKEN: &str = "UPDATE vero_tokens SET modified = ?1, token_type = ?2, \
     resource_id = ?3, email = ?4, expiration = ?5, signature = ?6, sent_on = ?7 WHERE id = ?8";
const DELETE_VERO_TOKEN: &str = "DELETE FROM vero_tokens WHERE id = ?1";

/// Reject an empty value destined for a NOT NULL text column before it
/// reaches the engine.
fn require(column: &'static str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::ZeroValuedNotNull(column.to_string()));
    }
    Ok(())
}

fn encode_json(values: &[String]) -> Result<String, Error> {
    serde_json::to_string(values).map_err(|e| Error::Internal(anyhow::anyhow!(e)))
}

fn role_ident(role: &Role) -> Result<Ident, Error> {
    if role.base.id != 0 {
        Ok(Ident::RowId(role.base.id))
    } else if !role.title.is_empty() {
        Ok(Ident::Key(role.title.clone()))
    } else {
        Err(Error::MissingId)
    }
}

fn role_label(role: &Role) -> String {
    if role.base.id != 0 {
        role.base.id.to_string()
    } else {
        role.title.clone()
    }
}

fn permission_ident(permission: &Permission) -> Result<Ident, Error> {
    if permission.base.id != 0 {
        Ok(Ident::RowId(permission.base.id))
    } else if !permission.title.is_empty() {
        Ok(Ident::Key(permission.title.clone()))
    } else {
        Err(Error::MissingId)
    }
}

fn permission_label(permission: &Permission) -> String {
    if permission.base.id != 0 {
        permission.base.id.to_string()
    } else {
        permission.title.clone()
    }
}

impl SqliteTxn {
    // ==================== Lookup helpers ====================

    async fn fetch_user(&mut self, ident: &Ident) -> Result<User, Error> {
        if ident.is_zero() {
            return Err(Error::MissingId);
        }
        let query = match ident {
            Ident::Id(id) => sqlx::query_as::<_, User>(SELECT_USER_BY_ID).bind(*id),
            Ident::Key(email) => {
                sqlx::query_as::<_, User>(SELECT_USER_BY_EMAIL).bind(email.as_str())
            }
            Ident::RowId(_) => {
                return Err(Error::UnsupportedIdent {
                    entity: "user",
                    kind: ident.kind(),
                })
            }
        };
        query
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(Error::NotFound)
    }

    async fn fetch_role(&mut self, ident: &Ident) -> Result<Role, Error> {
        if ident.is_zero() {
            return Err(Error::MissingId);
        }
        let query = match ident {
            Ident::RowId(id) => sqlx::query_as::<_, Role>(SELECT_ROLE_BY_ID).bind(*id),
            Ident::Key(title) => {
                sqlx::query_as::<_, Role>(SELECT_ROLE_BY_TITLE).bind(title.as_str())
            }
            Ident::Id(_) => {
                return Err(Error::UnsupportedIdent {
                    entity: "role",
                    kind: ident.kind(),
                })
            }
        };
        query
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(Error::NotFound)
    }

    async fn fetch_permission(&mut self, ident: &Ident) -> Result<Permission, Error> {
        if ident.is_zero() {
            return Err(Error::MissingId);
        }
        let query = match ident {
            Ident::RowId(id) => {
                sqlx::query_as::<_, Permission>(SELECT_PERMISSION_BY_ID).bind(*id)
            }
            Ident::Key(title) => {
                sqlx::query_as::<_, Permission>(SELECT_PERMISSION_BY_TITLE).bind(title.as_str())
            }
            Ident::Id(_) => {
                return Err(Error::UnsupportedIdent {
                    entity: "permission",
                    kind: ident.kind(),
                })
            }
        };
        query
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(Error::NotFound)
    }

    async fn fetch_api_key(&mut self, ident: &Ident) -> Result<ApiKey, Error> {
        if ident.is_zero() {
            return Err(Error::MissingId);
        }
        let query = match ident {
            Ident::Id(id) => sqlx::query_as::<_, ApiKey>(SELECT_API_KEY_BY_ID).bind(*id),
            Ident::Key(client_id) => {
                sqlx::query_as::<_, ApiKey>(SELECT_API_KEY_BY_CLIENT_ID).bind(client_id.as_str())
            }
            Ident::RowId(_) => {
                return Err(Error::UnsupportedIdent {
                    entity: "api key",
                    kind: ident.kind(),
                })
            }
        };
        query
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(Error::NotFound)
    }

    async fn fetch_oidc_client(&mut self, ident: &Ident) -> Result<OidcClient, Error> {
        if ident.is_zero() {
            return Err(Error::MissingId);
        }
        let query = match ident {
            Ident::Id(id) => sqlx::query_as::<_, OidcClient>(SELECT_OIDC_CLIENT_BY_ID).bind(*id),
            Ident::Key(client_id) => sqlx::query_as::<_, OidcClient>(SELECT_OIDC_CLIENT_BY_CLIENT_ID)
                .bind(client_id.as_str()),
            Ident::RowId(_) => {
                return Err(Error::UnsupportedIdent {
                    entity: "oidc client",
                    kind: ident.kind(),
                })
            }
        };
        query
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(Error::NotFound)
    }

    async fn fetch_vero_token(&mut self, ident: &Ident) -> Result<VerificationToken, Error> {
        if ident.is_zero() {
            return Err(Error::MissingId);
        }
        let query = match ident {
            Ident::Id(id) => {
                sqlx::query_as::<_, VerificationToken>(SELECT_VERO_TOKEN_BY_ID).bind(*id)
            }
            Ident::RowId(_) | Ident::Key(_) => {
                return Err(Error::UnsupportedIdent {
                    entity: "verification token",
                    kind: ident.kind(),
                })
            }
        };
        query
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(Error::NotFound)
    }

    // ==================== Association helpers ====================

    async fn user_roles(&mut self, user_id: Uuid) -> Result<Vec<Role>, Error> {
        let roles = sqlx::query_as::<_, Role>(SELECT_USER_ROLES)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(roles)
    }

    /// Distinct permission titles granted through the user's roles,
    /// recomputed from the join tables on every call.
    async fn user_permissions(&mut self, user_id: Uuid) -> Result<Vec<String>, Error> {
        let titles = sqlx::query_scalar::<_, String>(SELECT_USER_PERMISSIONS)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(titles)
    }

    async fn role_permissions(&mut self, role_id: i64) -> Result<Vec<Permission>, Error> {
        let permissions = sqlx::query_as::<_, Permission>(SELECT_ROLE_PERMISSIONS)
            .bind(role_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(permissions)
    }

    async fn api_key_permissions(&mut self, key_id: Uuid) -> Result<Vec<String>, Error> {
        let titles = sqlx::query_scalar::<_, String>(SELECT_API_KEY_PERMISSIONS)
            .bind(key_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(titles)
    }

    async fn default_roles(&mut self) -> Result<Vec<Role>, Error> {
        let roles = sqlx::query_as::<_, Role>(SELECT_DEFAULT_ROLES)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(roles)
    }
}

#[async_trait]
impl Transaction for SqliteTxn {
    // ==================== User Operations ====================

    async fn list_users(&mut self) -> Result<Vec<User>, Error> {
        let users = sqlx::query_as::<_, User>(SELECT_USERS)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(users)
    }

    async fn create_user(&mut self, mut user: User) -> Result<User, Error> {
        self.check_writable()?;
        if !user.base.is_unsaved() {
            return Err(Error::NoIdOnCreate);
        }
        require("users.email", &user.email)?;
        require("users.password", &user.password)?;

        user.base.stamp(Uuid::now_v7(), Utc::now());
        sqlx::query(INSERT_USER)
            .bind(user.base.id)
            .bind(user.base.created)
            .bind(user.base.modified)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password)
            .bind(user.last_login)
            .bind(user.email_verified)
            .execute(&mut *self.tx)
            .await?;

        // An explicitly loaded role set wins, even when empty; otherwise
        // the default roles apply.
        let roles = match user.roles_if_loaded() {
            Some(wanted) => {
                let mut resolved = Vec::with_capacity(wanted.len());
                for role in wanted {
                    let ident = role_ident(role)
                        .map_err(|e| Error::attach("role", role_label(role), e))?;
                    let found = self
                        .fetch_role(&ident)
                        .await
                        .map_err(|e| Error::attach("role", role_label(role), e))?;
                    resolved.push(found);
                }
                resolved
            }
            None => self.default_roles().await?,
        };
        for role in &roles {
            sqlx::query(INSERT_USER_ROLE)
                .bind(user.base.id)
                .bind(role.base.id)
                .execute(&mut *self.tx)
                .await?;
        }

        let permissions = self.user_permissions(user.base.id).await?;
        user.set_roles(roles);
        user.set_permissions(permissions);

        tracing::debug!(user_id = %user.base.id, "Created user");
        Ok(user)
    }

    async fn retrieve_user(&mut self, ident: Ident) -> Result<User, Error> {
        let mut user = self.fetch_user(&ident).await?;
        let roles = self.user_roles(user.base.id).await?;
        let permissions = self.user_permissions(user.base.id).await?;
        user.set_roles(roles);
        user.set_permissions(permissions);
        Ok(user)
    }

    async fn update_user(&mut self, user: User) -> Result<User, Error> {
        self.check_writable()?;
        if user.base.is_unsaved() {
            return Err(Error::MissingId);
        }
        require("users.email", &user.email)?;
        require("users.password", &user.password)?;

        let result = sqlx::query(UPDATE_USER)
            .bind(Utc::now())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password)
            .bind(user.email_verified)
            .bind(user.base.id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        self.fetch_user(&Ident::Id(user.base.id)).await
    }

    async fn update_password(&mut self, ident: Ident, password: &str) -> Result<(), Error> {
        self.check_writable()?;
        require("users.password", password)?;
        let user = self.fetch_user(&ident).await?;
        sqlx::query(UPDATE_USER_PASSWORD)
            .bind(password)
            .bind(Utc::now())
            .bind(user.base.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_last_login(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let user = self.fetch_user(&ident).await?;
        let now = Utc::now();
        sqlx::query(UPDATE_USER_LAST_LOGIN)
            .bind(now)
            .bind(now)
            .bind(user.base.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_user(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let user = self.fetch_user(&ident).await?;
        sqlx::query(DELETE_USER)
            .bind(user.base.id)
            .execute(&mut *self.tx)
            .await?;
        tracing::debug!(user_id = %user.base.id, "Deleted user");
        Ok(())
    }

    // ==================== Role Operations ====================

    async fn list_roles(&mut self) -> Result<Vec<Role>, Error> {
        let roles = sqlx::query_as::<_, Role>(SELECT_ROLES)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(roles)
    }

    async fn create_role(&mut self, mut role: Role) -> Result<Role, Error> {
        self.check_writable()?;
        if !role.base.is_unsaved() {
            return Err(Error::NoIdOnCreate);
        }
        require("roles.title", &role.title)?;

        let now = Utc::now();
        let result = sqlx::query(INSERT_ROLE)
            .bind(now)
            .bind(now)
            .bind(&role.title)
            .bind(&role.description)
            .bind(role.is_default)
            .execute(&mut *self.tx)
            .await?;
        role.base.stamp(result.last_insert_rowid(), now);

        let permissions = match role.permissions_if_loaded() {
            Some(wanted) => {
                let mut resolved = Vec::with_capacity(wanted.len());
                for permission in wanted {
                    let ident = permission_ident(permission)
                        .map_err(|e| Error::attach("permission", permission_label(permission), e))?;
                    let found = self
                        .fetch_permission(&ident)
                        .await
                        .map_err(|e| Error::attach("permission", permission_label(permission), e))?;
                    resolved.push(found);
                }
                resolved
            }
            None => Vec::new(),
        };
        for permission in &permissions {
            sqlx::query(INSERT_ROLE_PERMISSION)
                .bind(role.base.id)
                .bind(permission.base.id)
                .execute(&mut *self.tx)
                .await?;
        }
        role.set_permissions(permissions);

        Ok(role)
    }

    async fn retrieve_role(&mut self, ident: Ident) -> Result<Role, Error> {
        let mut role = self.fetch_role(&ident).await?;
        let permissions = self.role_permissions(role.base.id).await?;
        role.set_permissions(permissions);
        Ok(role)
    }

    async fn update_role(&mut self, role: Role) -> Result<Role, Error> {
        self.check_writable()?;
        if role.base.is_unsaved() {
            return Err(Error::MissingId);
        }
        require("roles.title", &role.title)?;

        let result = sqlx::query(UPDATE_ROLE)
            .bind(Utc::now())
            .bind(&role.title)
            .bind(&role.description)
            .bind(role.is_default)
            .bind(role.base.id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        self.fetch_role(&Ident::RowId(role.base.id)).await
    }

    async fn add_role_permission(&mut self, role: Ident, permission: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let role = self.fetch_role(&role).await?;
        let permission = self.fetch_permission(&permission).await?;
        sqlx::query(INSERT_ROLE_PERMISSION)
            .bind(role.base.id)
            .bind(permission.base.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn remove_role_permission(
        &mut self,
        role: Ident,
        permission: Ident,
    ) -> Result<(), Error> {
        self.check_writable()?;
        let role = self.fetch_role(&role).await?;
        let permission = self.fetch_permission(&permission).await?;
        let result = sqlx::query(DELETE_ROLE_PERMISSION)
            .bind(role.base.id)
            .bind(permission.base.id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn delete_role(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let role = self.fetch_role(&ident).await?;
        sqlx::query(DELETE_ROLE)
            .bind(role.base.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // ==================== Permission Operations ====================

    async fn list_permissions(&mut self) -> Result<Vec<Permission>, Error> {
        let permissions = sqlx::query_as::<_, Permission>(SELECT_PERMISSIONS)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(permissions)
    }

    async fn create_permission(&mut self, mut permission: Permission) -> Result<Permission, Error> {
        self.check_writable()?;
        if !permission.base.is_unsaved() {
            return Err(Error::NoIdOnCreate);
        }
        require("permissions.title", &permission.title)?;

        let now = Utc::now();
        let result = sqlx::query(INSERT_PERMISSION)
            .bind(now)
            .bind(now)
            .bind(&permission.title)
            .bind(&permission.description)
            .execute(&mut *self.tx)
            .await?;
        permission.base.stamp(result.last_insert_rowid(), now);
        Ok(permission)
    }

    async fn retrieve_permission(&mut self, ident: Ident) -> Result<Permission, Error> {
        self.fetch_permission(&ident).await
    }

    async fn update_permission(&mut self, permission: Permission) -> Result<Permission, Error> {
        self.check_writable()?;
        if permission.base.is_unsaved() {
            return Err(Error::MissingId);
        }
        require("permissions.title", &permission.title)?;

        let result = sqlx::query(UPDATE_PERMISSION)
            .bind(Utc::now())
            .bind(&permission.title)
            .bind(&permission.description)
            .bind(permission.base.id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        self.fetch_permission(&Ident::RowId(permission.base.id)).await
    }

    async fn delete_permission(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let permission = self.fetch_permission(&ident).await?;
        sqlx::query(DELETE_PERMISSION)
            .bind(permission.base.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // ==================== API Key Operations ====================

    async fn list_api_keys(&mut self) -> Result<Vec<ApiKey>, Error> {
        let keys = sqlx::query_as::<_, ApiKey>(SELECT_API_KEYS)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(keys)
    }

    async fn create_api_key(&mut self, mut key: ApiKey) -> Result<ApiKey, Error> {
        self.check_writable()?;
        if !key.base.is_unsaved() {
            return Err(Error::NoIdOnCreate);
        }
        require("api_keys.client_id", &key.client_id)?;
        require("api_keys.secret", &key.secret)?;
        if key.created_by.is_nil() {
            return Err(Error::ZeroValuedNotNull("api_keys.created_by".to_string()));
        }

        key.base.stamp(Uuid::now_v7(), Utc::now());
        sqlx::query(INSERT_API_KEY)
            .bind(key.base.id)
            .bind(key.base.created)
            .bind(key.base.modified)
            .bind(&key.description)
            .bind(&key.client_id)
            .bind(&key.secret)
            .bind(key.created_by)
            .bind(key.last_seen)
            .bind(key.revoked)
            .execute(&mut *self.tx)
            .await?;

        let permissions = match key.permissions_if_loaded() {
            Some(wanted) => {
                let mut resolved = Vec::with_capacity(wanted.len());
                for title in wanted {
                    let found = self
                        .fetch_permission(&Ident::Key(title.clone()))
                        .await
                        .map_err(|e| Error::attach("permission", title.clone(), e))?;
                    resolved.push(found);
                }
                resolved
            }
            None => Vec::new(),
        };
        for permission in &permissions {
            sqlx::query(INSERT_API_KEY_PERMISSION)
                .bind(key.base.id)
                .bind(permission.base.id)
                .execute(&mut *self.tx)
                .await?;
        }
        key.set_permissions(permissions.into_iter().map(|p| p.title).collect());

        tracing::debug!(api_key_id = %key.base.id, client_id = %key.client_id, "Created API key");
        Ok(key)
    }

    async fn retrieve_api_key(&mut self, ident: Ident) -> Result<ApiKey, Error> {
        let mut key = self.fetch_api_key(&ident).await?;
        let permissions = self.api_key_permissions(key.base.id).await?;
        key.set_permissions(permissions);
        Ok(key)
    }

    async fn update_api_key(&mut self, key: ApiKey) -> Result<ApiKey, Error> {
        self.check_writable()?;
        if key.base.is_unsaved() {
            return Err(Error::MissingId);
        }
        require("api_keys.client_id", &key.client_id)?;
        require("api_keys.secret", &key.secret)?;
        if key.created_by.is_nil() {
            return Err(Error::ZeroValuedNotNull("api_keys.created_by".to_string()));
        }

        let result = sqlx::query(UPDATE_API_KEY)
            .bind(Utc::now())
            .bind(&key.description)
            .bind(&key.client_id)
            .bind(&key.secret)
            .bind(key.created_by)
            .bind(key.base.id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        self.fetch_api_key(&Ident::Id(key.base.id)).await
    }

    async fn update_api_key_last_seen(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let key = self.fetch_api_key(&ident).await?;
        let now = Utc::now();
        sqlx::query(UPDATE_API_KEY_LAST_SEEN)
            .bind(now)
            .bind(now)
            .bind(key.base.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn revoke_api_key(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let key = self.fetch_api_key(&ident).await?;
        // The earliest revocation timestamp is kept; revoking twice is a
        // no-op, not an error.
        let now = Utc::now();
        sqlx::query(REVOKE_API_KEY)
            .bind(now)
            .bind(now)
            .bind(key.base.id)
            .execute(&mut *self.tx)
            .await?;
        tracing::debug!(api_key_id = %key.base.id, "Revoked API key");
        Ok(())
    }

    async fn delete_api_key(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let key = self.fetch_api_key(&ident).await?;
        sqlx::query(DELETE_API_KEY)
            .bind(key.base.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // ==================== OIDC Client Operations ====================

    async fn list_oidc_clients(&mut self) -> Result<Vec<OidcClient>, Error> {
        let clients = sqlx::query_as::<_, OidcClient>(SELECT_OIDC_CLIENTS)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(clients)
    }

    async fn create_oidc_client(&mut self, mut client: OidcClient) -> Result<OidcClient, Error> {
        self.check_writable()?;
        if !client.base.is_unsaved() {
            return Err(Error::NoIdOnCreate);
        }
        client.validate(self.mode).map_err(|errors| Error::Validation {
            entity: "oidc client",
            errors,
        })?;

        let contacts = encode_json(&client.contacts)?;
        let redirect_uris = encode_json(&client.redirect_uris)?;

        client.base.stamp(Uuid::now_v7(), Utc::now());
        sqlx::query(INSERT_OIDC_CLIENT)
            .bind(client.base.id)
            .bind(client.base.created)
            .bind(client.base.modified)
            .bind(&client.client_name)
            .bind(&client.client_uri)
            .bind(&client.logo_uri)
            .bind(&client.policy_uri)
            .bind(&client.tos_uri)
            .bind(contacts)
            .bind(&client.client_id)
            .bind(&client.secret)
            .bind(redirect_uris)
            .bind(client.created_by)
            .bind(client.revoked)
            .execute(&mut *self.tx)
            .await?;

        tracing::debug!(
            oidc_client_id = %client.base.id,
            client_id = %client.client_id,
            "Created OIDC client"
        );
        Ok(client)
    }

    async fn retrieve_oidc_client(&mut self, ident: Ident) -> Result<OidcClient, Error> {
        self.fetch_oidc_client(&ident).await
    }

    async fn update_oidc_client(&mut self, client: OidcClient) -> Result<OidcClient, Error> {
        self.check_writable()?;
        if client.base.is_unsaved() {
            return Err(Error::MissingId);
        }
        client.validate(self.mode).map_err(|errors| Error::Validation {
            entity: "oidc client",
            errors,
        })?;

        let contacts = encode_json(&client.contacts)?;
        let redirect_uris = encode_json(&client.redirect_uris)?;

        let result = sqlx::query(UPDATE_OIDC_CLIENT)
            .bind(Utc::now())
            .bind(&client.client_name)
            .bind(&client.client_uri)
            .bind(&client.logo_uri)
            .bind(&client.policy_uri)
            .bind(&client.tos_uri)
            .bind(contacts)
            .bind(&client.client_id)
            .bind(&client.secret)
            .bind(redirect_uris)
            .bind(client.created_by)
            .bind(client.base.id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        self.fetch_oidc_client(&Ident::Id(client.base.id)).await
    }

    async fn revoke_oidc_client(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let client = self.fetch_oidc_client(&ident).await?;
        let now = Utc::now();
        sqlx::query(REVOKE_OIDC_CLIENT)
            .bind(now)
            .bind(now)
            .bind(client.base.id)
            .execute(&mut *self.tx)
            .await?;
        tracing::debug!(oidc_client_id = %client.base.id, "Revoked OIDC client");
        Ok(())
    }

    async fn delete_oidc_client(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let client = self.fetch_oidc_client(&ident).await?;
        sqlx::query(DELETE_OIDC_CLIENT)
            .bind(client.base.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // ==================== Verification Token Operations ====================

    async fn create_vero_token(
        &mut self,
        mut token: VerificationToken,
    ) -> Result<VerificationToken, Error> {
        self.check_writable()?;
        if !token.base.is_unsaved() {
            return Err(Error::NoIdOnCreate);
        }
        require("vero_tokens.email", &token.email)?;
        if token.signature.is_empty() {
            return Err(Error::ZeroValuedNotNull("vero_tokens.signature".to_string()));
        }

        token.base.stamp(Uuid::now_v7(), Utc::now());
        sqlx::query(INSERT_VERO_TOKEN)
            .bind(token.base.id)
            .bind(token.base.created)
            .bind(token.base.modified)
            .bind(token.token_type.as_str())
            .bind(token.resource_id)
            .bind(&token.email)
            .bind(token.expiration)
            .bind(&token.signature)
            .bind(token.sent_on)
            .execute(&mut *self.tx)
            .await?;
        Ok(token)
    }

    async fn retrieve_vero_token(&mut self, ident: Ident) -> Result<VerificationToken, Error> {
        self.fetch_vero_token(&ident).await
    }

    async fn retrieve_vero_token_by_email(
        &mut self,
        email: &str,
        token_type: TokenType,
    ) -> Result<VerificationToken, Error> {
        if email.is_empty() {
            return Err(Error::MissingId);
        }
        let mut tokens = sqlx::query_as::<_, VerificationToken>(SELECT_VERO_TOKENS_BY_EMAIL)
            .bind(email)
            .bind(token_type.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        if tokens.len() > 1 {
            return Err(Error::Ambiguous);
        }
        tokens.pop().ok_or(Error::NotFound)
    }

    async fn update_vero_token(
        &mut self,
        token: VerificationToken,
    ) -> Result<VerificationToken, Error> {
        self.check_writable()?;
        if token.base.is_unsaved() {
            return Err(Error::MissingId);
        }
        require("vero_tokens.email", &token.email)?;
        if token.signature.is_empty() {
            return Err(Error::ZeroValuedNotNull("vero_tokens.signature".to_string()));
        }

        let result = sqlx::query(UPDATE_VERO_TOKEN)
            .bind(Utc::now())
            .bind(token.token_type.as_str())
            .bind(token.resource_id)
            .bind(&token.email)
            .bind(token.expiration)
            .bind(&token.signature)
            .bind(token.sent_on)
            .bind(token.base.id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        self.fetch_vero_token(&Ident::Id(token.base.id)).await
    }

    async fn delete_vero_token(&mut self, ident: Ident) -> Result<(), Error> {
        self.check_writable()?;
        let token = self.fetch_vero_token(&ident).await?;
        sqlx::query(DELETE_VERO_TOKEN)
            .bind(token.base.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // ==================== Lifecycle ====================

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::rows::{
        API_KEY_COLUMNS, OIDC_CLIENT_COLUMNS, PERMISSION_COLUMNS, ROLE_COLUMNS, USER_COLUMNS,
        VERO_TOKEN_COLUMNS,
    };
    use super::*;

    #[test]
    fn selects_follow_the_column_contracts() {
        let cases = [
            (SELECT_USERS, USER_COLUMNS),
            (SELECT_USER_BY_ID, USER_COLUMNS),
            (SELECT_USER_BY_EMAIL, USER_COLUMNS),
            (SELECT_ROLES, ROLE_COLUMNS),
            (SELECT_ROLE_BY_ID, ROLE_COLUMNS),
            (SELECT_ROLE_BY_TITLE, ROLE_COLUMNS),
            (SELECT_DEFAULT_ROLES, ROLE_COLUMNS),
            (SELECT_PERMISSIONS, PERMISSION_COLUMNS),
            (SELECT_PERMISSION_BY_ID, PERMISSION_COLUMNS),
            (SELECT_PERMISSION_BY_TITLE, PERMISSION_COLUMNS),
            (SELECT_API_KEYS, API_KEY_COLUMNS),
            (SELECT_API_KEY_BY_ID, API_KEY_COLUMNS),
            (SELECT_API_KEY_BY_CLIENT_ID, API_KEY_COLUMNS),
            (SELECT_OIDC_CLIENTS, OIDC_CLIENT_COLUMNS),
            (SELECT_OIDC_CLIENT_BY_ID, OIDC_CLIENT_COLUMNS),
            (SELECT_OIDC_CLIENT_BY_CLIENT_ID, OIDC_CLIENT_COLUMNS),
            (SELECT_VERO_TOKEN_BY_ID, VERO_TOKEN_COLUMNS),
            (SELECT_VERO_TOKENS_BY_EMAIL, VERO_TOKEN_COLUMNS),
        ];
        for (sql, columns) in cases {
            assert!(
                sql.contains(columns),
                "statement drifted from its column contract: {sql}"
            );
        }
    }

    #[test]
    fn inserts_follow_the_column_contracts() {
        // Engine-assigned row ids are absent from the numeric-id inserts.
        let cases = [
            (INSERT_USER, USER_COLUMNS.to_string()),
            (INSERT_API_KEY, API_KEY_COLUMNS.to_string()),
            (INSERT_OIDC_CLIENT, OIDC_CLIENT_COLUMNS.to_string()),
            (INSERT_VERO_TOKEN, VERO_TOKEN_COLUMNS.to_string()),
            (INSERT_ROLE, ROLE_COLUMNS.trim_start_matches("id, ").to_string()),
            (
                INSERT_PERMISSION,
                PERMISSION_COLUMNS.trim_start_matches("id, ").to_string(),
            ),
        ];
        for (sql, columns) in cases {
            assert!(
                sql.contains(&columns),
                "insert drifted from its column contract: {sql}"
            );
        }
    }

    #[test]
    fn ident_helpers_prefer_row_ids() {
        let mut role = Role::new("admin", "");
        assert_eq!(role_ident(&role).unwrap(), Ident::Key("admin".to_string()));
        role.base.id = 9;
        assert_eq!(role_ident(&role).unwrap(), Ident::RowId(9));
        assert_eq!(role_label(&role), "9");

        let blank = Role::new("", "");
        assert!(matches!(role_ident(&blank), Err(Error::MissingId)));

        let mut permission = Permission::new("users:read", "");
        assert_eq!(
            permission_ident(&permission).unwrap(),
            Ident::Key("users:read".to_string())
        );
        permission.base.id = 4;
        assert_eq!(permission_ident(&permission).unwrap(), Ident::RowId(4));
        assert_eq!(permission_label(&permission), "4");
    }

    #[test]
    fn require_flags_empty_values() {
        assert!(require("users.email", "a@b.example").is_ok());
        assert!(matches!(
            require("users.email", ""),
            Err(Error::ZeroValuedNotNull(column)) if column == "users.email"
        ));
    }
}
