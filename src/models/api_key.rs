//! Machine credentials with directly attached permissions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::models::{Model, User};

/// Days without use after which an otherwise live key is considered stale.
pub const STALE_AFTER_DAYS: i64 = 90;

/// Lifecycle state of an API key, derived on demand and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyStatus {
    Revoked,
    Unused,
    Stale,
    Active,
}

impl ApiKeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKeyStatus::Revoked => "revoked",
            ApiKeyStatus::Unused => "unused",
            ApiKeyStatus::Stale => "stale",
            ApiKeyStatus::Active => "active",
        }
    }
}

/// A machine credential.
///
/// Permissions are attached to the key directly, never through roles.
/// `secret` is opaque to the store; `client_id` is the public secondary
/// identifier the key can be looked up by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    #[serde(flatten)]
    pub base: Model<Uuid>,
    pub description: Option<String>,
    pub client_id: String,
    pub secret: String,
    pub created_by: Uuid,
    pub last_seen: Option<DateTime<Utc>>,
    pub revoked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    creator: Option<User>,
}

impl ApiKey {
    /// Create a new, unsaved API key.
    pub fn new(client_id: impl Into<String>, secret: impl Into<String>, created_by: Uuid) -> Self {
        Self {
            base: Model::default(),
            description: None,
            client_id: client_id.into(),
            secret: secret.into(),
            created_by,
            last_seen: None,
            revoked: None,
            permissions: None,
            creator: None,
        }
    }

    /// Classify the key against the current clock.
    pub fn status(&self) -> ApiKeyStatus {
        self.status_at(Utc::now())
    }

    /// Classify the key against an explicit instant. First match wins:
    /// revoked, then never used, then stale, then active.
    pub fn status_at(&self, now: DateTime<Utc>) -> ApiKeyStatus {
        if self.revoked.is_some() {
            return ApiKeyStatus::Revoked;
        }
        match self.last_seen {
            None => ApiKeyStatus::Unused,
            Some(seen) if now - seen > Duration::days(STALE_AFTER_DAYS) => ApiKeyStatus::Stale,
            Some(_) => ApiKeyStatus::Active,
        }
    }

    /// Permission titles attached directly to this key.
    ///
    /// Fails with [`Error::MissingAssociation`] when the association was
    /// not loaded.
    pub fn permissions(&self) -> Result<&[String], Error> {
        self.permissions
            .as_deref()
            .ok_or(Error::MissingAssociation("permissions"))
    }

    pub fn set_permissions(&mut self, permissions: Vec<String>) {
        self.permissions = Some(permissions);
    }

    /// The user that created this key.
    ///
    /// Fails with [`Error::MissingAssociation`] when the association was
    /// not loaded.
    pub fn creator(&self) -> Result<&User, Error> {
        self.creator.as_ref().ok_or(Error::MissingAssociation("creator"))
    }

    /// Attach the creator and keep the denormalized `created_by` id in sync.
    pub fn set_creator(&mut self, user: User) {
        self.created_by = user.base.id;
        self.creator = Some(user);
    }

    pub(crate) fn permissions_if_loaded(&self) -> Option<&[String]> {
        self.permissions.as_deref()
    }
}
