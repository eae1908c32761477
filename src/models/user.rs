//! User accounts and their role and permission associations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::models::{Model, Role};

/// A human account.
///
/// `password` is an opaque, already-hashed secret supplied by the caller;
/// the store never interprets it. Roles and the permissions derived from
/// them are lazy associations: they are only present on records returned
/// by operations documented to populate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub base: Model<Uuid>,
    pub name: Option<String>,
    pub email: String,
    pub password: String,
    pub last_login: Option<DateTime<Utc>>,
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    roles: Option<Vec<Role>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permissions: Option<Vec<String>>,
}

impl User {
    /// Create a new, unsaved user.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base: Model::default(),
            name: None,
            email: email.into(),
            password: password.into(),
            last_login: None,
            email_verified: false,
            roles: None,
            permissions: None,
        }
    }

    /// Roles attached to this user.
    ///
    /// Fails with [`Error::MissingAssociation`] when the association was
    /// not loaded. An empty slice means the association was loaded and the
    /// user genuinely has no roles.
    pub fn roles(&self) -> Result<&[Role], Error> {
        self.roles
            .as_deref()
            .ok_or(Error::MissingAssociation("roles"))
    }

    pub fn set_roles(&mut self, roles: Vec<Role>) {
        self.roles = Some(roles);
    }

    /// Distinct permission titles granted through the user's roles.
    pub fn permissions(&self) -> Result<&[String], Error> {
        self.permissions
            .as_deref()
            .ok_or(Error::MissingAssociation("permissions"))
    }

    pub fn set_permissions(&mut self, permissions: Vec<String>) {
        self.permissions = Some(permissions);
    }

    pub(crate) fn roles_if_loaded(&self) -> Option<&[Role]> {
        self.roles.as_deref()
    }
}
