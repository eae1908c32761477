//! Error taxonomy shared by every storage backend.
//!
//! Callers branch on these variants, never on backend-specific errors.

use thiserror::Error;
use validator::ValidationErrors;

#[derive(Error, Debug)]
pub enum Error {
    #[error("record not found")]
    NotFound,

    #[error("record already exists")]
    AlreadyExists,

    #[error("store is read-only")]
    ReadOnly,

    #[error("record has no id")]
    MissingId,

    #[error("id must be unset when creating a record")]
    NoIdOnCreate,

    #[error("zero value for required column: {0}")]
    ZeroValuedNotNull(String),

    #[error("association not loaded: {0}")]
    MissingAssociation(&'static str),

    #[error("identifier matches more than one record")]
    Ambiguous,

    #[error("unsupported identifier type for {entity}: {kind}")]
    UnsupportedIdent {
        entity: &'static str,
        kind: &'static str,
    },

    #[error("invalid {entity}: {errors}")]
    Validation {
        entity: &'static str,
        errors: ValidationErrors,
    },

    #[error("cannot attach {entity} {name:?}: {source}")]
    Attach {
        entity: &'static str,
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("unknown store scheme: {0}")]
    UnknownScheme(String),

    #[error("invalid store uri: {0}")]
    InvalidUri(String),

    #[error("config error: {0}")]
    Config(anyhow::Error),

    #[error("internal store error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Error::ReadOnly)
    }

    /// Wrap an association attachment failure with the name of the record
    /// that could not be attached.
    pub(crate) fn attach(entity: &'static str, name: impl Into<String>, source: Error) -> Self {
        Error::Attach {
            entity,
            name: name.into(),
            source: Box::new(source),
        }
    }
}

/// Translate backend errors into the shared taxonomy.
///
/// This is the single point where engine error codes are interpreted;
/// everything unrecognized is preserved as [`Error::Internal`].
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound,
            sqlx::Error::Database(db) => {
                if db.is_unique_violation() {
                    Error::AlreadyExists
                } else if matches!(db.kind(), sqlx::error::ErrorKind::NotNullViolation) {
                    Error::ZeroValuedNotNull(db.message().to_string())
                } else if db.code().as_deref() == Some("8")
                    || db.message().contains("readonly database")
                {
                    Error::ReadOnly
                } else {
                    Error::Internal(anyhow::anyhow!(sqlx::Error::Database(db)))
                }
            }
            other => Error::Internal(anyhow::anyhow!(other)),
        }
    }
}
