//! Roles grouping permissions for RBAC.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::{Model, Permission};

/// A named group of permissions.
///
/// Roles flagged `is_default` are attached automatically to users created
/// without an explicit role set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(flatten)]
    pub base: Model<i64>,
    pub title: String,
    pub description: String,
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permissions: Option<Vec<Permission>>,
}

impl Role {
    /// Create a new, unsaved role.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            base: Model::default(),
            title: title.into(),
            description: description.into(),
            is_default: false,
            permissions: None,
        }
    }

    /// Permissions attached to this role.
    ///
    /// Fails with [`Error::MissingAssociation`] when the association was
    /// not loaded.
    pub fn permissions(&self) -> Result<&[Permission], Error> {
        self.permissions
            .as_deref()
            .ok_or(Error::MissingAssociation("permissions"))
    }

    pub fn set_permissions(&mut self, permissions: Vec<Permission>) {
        self.permissions = Some(permissions);
    }

    pub(crate) fn permissions_if_loaded(&self) -> Option<&[Permission]> {
        self.permissions.as_deref()
    }
}
