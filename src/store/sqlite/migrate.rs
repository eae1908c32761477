//! Schema bootstrap: applies embedded migration files in sequence and
//! records each one in the `migrations` ledger table.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;

use crate::error::Error;

struct Migration {
    sequence: i64,
    name: &'static str,
    sql: &'static str,
}

/// Embedded migration files, ascending by sequence.
const MIGRATIONS: &[Migration] = &[
    Migration {
        sequence: 1,
        name: "initial_schema",
        sql: include_str!("../../../migrations/0001_initial_schema.sql"),
    },
    Migration {
        sequence: 2,
        name: "indexes",
        sql: include_str!("../../../migrations/0002_indexes.sql"),
    },
];

const CREATE_LEDGER: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    sequence INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied TEXT NOT NULL
)
"#;

/// Apply every migration newer than the last ledger entry.
///
/// Each migration runs inside its own transaction together with its ledger
/// insert. Any failure aborts store open; a half-applied file is never
/// recorded as done.
pub(crate) async fn run(pool: &SqlitePool) -> Result<(), Error> {
    sqlx::query(CREATE_LEDGER).execute(pool).await?;

    let applied: Option<i64> = sqlx::query_scalar("SELECT MAX(sequence) FROM migrations")
        .fetch_one(pool)
        .await?;
    let applied = applied.unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.sequence <= applied {
            continue;
        }

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!(
                    sequence = migration.sequence,
                    name = migration.name,
                    error = %e,
                    "Migration failed"
                );
                Error::Internal(anyhow::anyhow!(
                    "migration {} ({}) failed: {}",
                    migration.sequence,
                    migration.name,
                    e
                ))
            })?;
        sqlx::query("INSERT INTO migrations (sequence, name, applied) VALUES (?1, ?2, ?3)")
            .bind(migration.sequence)
            .bind(migration.name)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            sequence = migration.sequence,
            name = migration.name,
            "Applied migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_unique() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(
                migration.sequence > last,
                "sequence {} out of order",
                migration.sequence
            );
            assert!(!migration.sql.trim().is_empty(), "{} is empty", migration.name);
            last = migration.sequence;
        }
    }
}
