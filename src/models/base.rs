//! Base record fields embedded by every entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary-key types used by the store.
///
/// A zero id marks a record that has never been persisted; the store
/// assigns the real id on create.
pub trait EntityId: Copy + PartialEq + Send + Sync {
    fn is_zero(&self) -> bool;
}

impl EntityId for Uuid {
    fn is_zero(&self) -> bool {
        self.is_nil()
    }
}

impl EntityId for i64 {
    fn is_zero(&self) -> bool {
        *self == 0
    }
}

/// Common record fields: identifier plus creation and modification times.
///
/// All three are owned by the store. `created` is set once, `modified` is
/// refreshed on every successful mutation, and both are equal immediately
/// after create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model<I> {
    pub id: I,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl<I: EntityId> Model<I> {
    /// A record that has not been persisted yet. The timestamps are
    /// placeholders; the store overwrites them on create.
    pub fn unsaved(id: I) -> Self {
        let now = Utc::now();
        Self {
            id,
            created: now,
            modified: now,
        }
    }

    pub fn is_unsaved(&self) -> bool {
        self.id.is_zero()
    }

    /// Stamp the record as freshly created: assign the id and set both
    /// timestamps to the same instant.
    pub(crate) fn stamp(&mut self, id: I, now: DateTime<Utc>) {
        self.id = id;
        self.created = now;
        self.modified = now;
    }
}

impl Default for Model<Uuid> {
    fn default() -> Self {
        Model::unsaved(Uuid::nil())
    }
}

impl Default for Model<i64> {
    fn default() -> Self {
        Model::unsaved(0)
    }
}
