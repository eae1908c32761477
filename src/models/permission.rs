//! Permission records referenced by roles and API keys.

use serde::{Deserialize, Serialize};

use crate::models::Model;

/// A single named capability, addressed by numeric id or unique title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(flatten)]
    pub base: Model<i64>,
    pub title: String,
    pub description: String,
}

impl Permission {
    /// Create a new, unsaved permission.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            base: Model::default(),
            title: title.into(),
            description: description.into(),
        }
    }
}
