//! Versioned schema changes.
//!
//! `migration_NN_up.sql` takes the schema from version `NN-1` to `NN` and `migration_NN_down.sql`
//! reverses it. The version is kept in the single-row `schema_version` table.

use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

use crate::Result;

/// `(up, down)` SQL, where entry `i` is the migration to version `i + 1`.
const MIGRATIONS: &[(&str, &str)] = &[(
    include_str!("migration_01_up.sql"),
    include_str!("migration_01_down.sql"),
)];

/// The newest schema version the migrations can produce.
pub(crate) fn latest() -> i32 {
    MIGRATIONS.len() as i32
}

/// Moves the schema from version `from` to version `to`, one migration per transaction.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Result<()> {
    for version in [from, to] {
        if !(0..=latest()).contains(&version) {
            bail!(
                "There is no migration path to schema version {version}, known versions are 0 \
                through {}",
                latest()
            );
        }
    }

    if from < to {
        for version in from + 1..=to {
            debug!("Migrating the schema up to version {version}");
            apply(pool, MIGRATIONS[(version - 1) as usize].0, version).await?;
        }
    } else {
        for version in (to + 1..=from).rev() {
            debug!("Migrating the schema down from version {version}");
            apply(pool, MIGRATIONS[(version - 1) as usize].1, version - 1).await?;
        }
    }
    Ok(())
}

async fn apply(pool: &SqlitePool, sql: &str, version: i32) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin the migration")?;
    tx.execute(sql)
        .await
        .with_context(|| format!("Failed to migrate the schema to version {version}"))?;
    sqlx::query("UPDATE schema_version SET version = ?")
        .bind(version)
        .execute(&mut *tx)
        .await
        .context("Failed to record the schema version")?;
    tx.commit()
        .await
        .context("Failed to commit the migration")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::TempDir;

    async fn empty_db() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("lumos.sqlite"))
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        pool.execute("CREATE TABLE schema_version (version INTEGER NOT NULL);")
            .await
            .unwrap();
        pool.execute("INSERT INTO schema_version (version) VALUES (0);")
            .await
            .unwrap();
        (dir, pool)
    }

    async fn version(pool: &SqlitePool) -> i32 {
        let (v,): (i32,) = sqlx::query_as("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await
            .unwrap();
        v
    }

    /// Tables and named indexes, sorted.
    async fn objects(pool: &SqlitePool) -> Vec<String> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'index') \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .unwrap();
        rows.into_iter().map(|(name,)| name).collect()
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap();
        n
    }

    async fn insert_document(pool: &SqlitePool, source_id: i64, month: i32) -> sqlx::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO documents (owner, source_id, sheet_id, sheet_name, year, month, csv, \
             processed_at, updated_at) VALUES ('tester', ?, 's', 'Monthly budget', 2025, ?, '', \
             'now', 'now')",
        )
        .bind(source_id)
        .bind(month)
        .execute(pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    #[tokio::test]
    async fn test_up_creates_lumos_schema() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, latest()).await.unwrap();
        assert_eq!(version(&pool).await, 1);
        assert_eq!(
            objects(&pool).await,
            vec![
                "document_sources",
                "documents",
                "idx_documents_source",
                "idx_transactions_document",
                "schema_version",
                "transactions",
            ]
        );
    }

    #[tokio::test]
    async fn test_down_leaves_only_schema_version() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, 1).await.unwrap();
        run(&pool, 1, 0).await.unwrap();
        assert_eq!(version(&pool).await, 0);
        assert_eq!(objects(&pool).await, vec!["schema_version"]);
        // and back up again
        run(&pool, 0, 1).await.unwrap();
        assert_eq!(version(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_one_document_per_period() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, 1).await.unwrap();
        let source = sqlx::query(
            "INSERT INTO document_sources (owner, name, source_type, name_pattern, created_at) \
             VALUES ('tester', 'Main', 'google_drive', '.*', 'now')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        insert_document(&pool, source, 8).await.unwrap();
        assert!(insert_document(&pool, source, 8).await.is_err());
        assert!(insert_document(&pool, source, 13).await.is_err());
    }

    #[tokio::test]
    async fn test_removing_a_source_cascades() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, 1).await.unwrap();
        let source = sqlx::query(
            "INSERT INTO document_sources (owner, name, source_type, name_pattern, created_at) \
             VALUES ('tester', 'Main', 'google_drive', '.*', 'now')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();
        let document = insert_document(&pool, source, 7).await.unwrap();
        sqlx::query(
            "INSERT INTO transactions (document_id, transaction_type, amount, created_at) \
             VALUES (?, 'expense', '15000', 'now')",
        )
        .bind(document)
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query("DELETE FROM document_sources WHERE id = ?")
            .bind(source)
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(count(&pool, "documents").await, 0);
        assert_eq!(count(&pool, "transactions").await, 0);
    }

    #[tokio::test]
    async fn test_unknown_version_changes_nothing() {
        let (_dir, pool) = empty_db().await;
        assert!(run(&pool, 0, 2).await.is_err());
        assert!(run(&pool, -1, 1).await.is_err());
        assert_eq!(version(&pool).await, 0);
        assert_eq!(objects(&pool).await, vec!["schema_version"]);
    }

    #[tokio::test]
    async fn test_same_version_is_a_no_op() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, 0).await.unwrap();
        assert_eq!(version(&pool).await, 0);
    }
}
