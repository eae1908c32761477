//! Polymorphic record identifiers.

use uuid::Uuid;

/// The identifier shapes an operation can resolve a record by.
///
/// Which shapes an entity supports is decided by each backend operation:
/// users accept `Id` and `Key` (email), roles and permissions accept
/// `RowId` and `Key` (title), API keys and OIDC clients accept `Id` and
/// `Key` (client id), verification tokens accept `Id` only. Unsupported
/// shapes fail with [`crate::Error::UnsupportedIdent`] naming the entity
/// and the shape; zero values fail with [`crate::Error::MissingId`] before
/// any query runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ident {
    /// Sortable unique id assigned at create time.
    Id(Uuid),
    /// Engine-assigned numeric row id.
    RowId(i64),
    /// Entity-specific unique string key.
    Key(String),
}

impl Ident {
    /// Shape name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Ident::Id(_) => "id",
            Ident::RowId(_) => "row id",
            Ident::Key(_) => "key",
        }
    }

    /// A nil uuid, zero row id, or empty key can never address a record.
    pub fn is_zero(&self) -> bool {
        match self {
            Ident::Id(id) => id.is_nil(),
            Ident::RowId(id) => *id == 0,
            Ident::Key(key) => key.is_empty(),
        }
    }
}

impl From<Uuid> for Ident {
    fn from(id: Uuid) -> Self {
        Ident::Id(id)
    }
}

impl From<i64> for Ident {
    fn from(id: i64) -> Self {
        Ident::RowId(id)
    }
}

impl From<&str> for Ident {
    fn from(key: &str) -> Self {
        Ident::Key(key.to_string())
    }
}

impl From<String> for Ident {
    fn from(key: String) -> Self {
        Ident::Key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_per_shape() {
        assert!(Ident::Id(Uuid::nil()).is_zero());
        assert!(Ident::RowId(0).is_zero());
        assert!(Ident::Key(String::new()).is_zero());
        assert!(!Ident::Id(Uuid::now_v7()).is_zero());
        assert!(!Ident::RowId(1).is_zero());
        assert!(!Ident::Key("admin".to_string()).is_zero());
    }

    #[test]
    fn conversions_pick_the_right_shape() {
        assert_eq!(Ident::from(7_i64).kind(), "row id");
        assert_eq!(Ident::from(Uuid::nil()).kind(), "id");
        assert_eq!(Ident::from("admin").kind(), "key");
        assert_eq!(Ident::from("admin".to_string()), Ident::Key("admin".into()));
    }
}
