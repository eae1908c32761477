//! Embedded SQLite backend.
//!
//! One writer at a time, WAL journaling, foreign keys on. The schema is
//! bootstrapped by [`migrate`] on open.

mod migrate;
mod rows;
mod txn;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;

use crate::error::Error;
use crate::models::ValidationMode;
use crate::store::{Dsn, Store, Transaction, TxOptions};

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
    read_only: bool,
    mode: ValidationMode,
}

impl SqliteStore {
    /// Open (and create, unless read-only) the database file named by the
    /// descriptor, then bring its schema up to date.
    pub async fn open(dsn: &Dsn, mode: ValidationMode) -> Result<Self, Error> {
        let file = dsn.file_path();
        if file.is_empty() {
            return Err(Error::InvalidUri(format!(
                "{}: missing database path",
                dsn.scheme
            )));
        }

        tracing::info!(file = %file, read_only = dsn.read_only, "Opening SQLite store");

        let connect = SqliteConnectOptions::new()
            .filename(&file)
            .create_if_missing(!dsn.read_only)
            .read_only(dsn.read_only)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // A pooled in-memory database lives and dies with its one
        // connection, so that connection must never be reaped.
        let pool_opts = if dsn.is_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(30))
        };

        let pool = pool_opts.connect_with(connect).await?;

        if dsn.read_only {
            tracing::debug!("Read-only store, skipping schema bootstrap");
        } else {
            migrate::run(&pool).await?;
        }

        Ok(SqliteStore {
            pool,
            read_only: dsn.read_only,
            mode,
        })
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&self, opts: TxOptions) -> Result<Box<dyn Transaction>, Error> {
        if self.read_only && !opts.read_only {
            return Err(Error::ReadOnly);
        }
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTxn {
            tx,
            opts,
            mode: self.mode,
        }))
    }

    async fn ping(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Store ping failed: {}", e);
            Error::from(e)
        })?;
        Ok(())
    }
}

/// One open transaction against the SQLite database.
///
/// Dropping the transaction without committing rolls it back.
pub struct SqliteTxn {
    tx: sqlx::Transaction<'static, Sqlite>,
    opts: TxOptions,
    mode: ValidationMode,
}

impl SqliteTxn {
    /// Mutating operations call this before touching the database.
    fn check_writable(&self) -> Result<(), Error> {
        if self.opts.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }
}
