use super::{parse_optional_timestamp, parse_timestamp, timestamp, Db};
use crate::model::{DocumentSource, NewSource, SourceType};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

const SELECT_SOURCE: &str = "SELECT id, owner, name, source_type, folder_id, credentials, \
    name_pattern, is_active, last_sync, created_at FROM document_sources";

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: i64,
    owner: String,
    name: String,
    source_type: String,
    folder_id: String,
    credentials: Option<String>,
    name_pattern: String,
    is_active: bool,
    last_sync: Option<String>,
    created_at: String,
}

impl TryFrom<SourceRow> for DocumentSource {
    type Error = crate::Error;

    fn try_from(row: SourceRow) -> Result<Self> {
        let source_type: SourceType = row
            .source_type
            .parse()
            .with_context(|| format!("Invalid source type '{}'", row.source_type))?;
        Ok(DocumentSource {
            id: row.id,
            owner: row.owner,
            name: row.name,
            source_type,
            folder_id: row.folder_id,
            credentials: row.credentials.map(PathBuf::from),
            name_pattern: row.name_pattern,
            is_active: row.is_active,
            last_sync: parse_optional_timestamp(row.last_sync.as_deref())?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl Db {
    /// Inserts a new source. Fails if the owner already has a source with the same name.
    pub(crate) async fn add_source(&self, source: &NewSource) -> Result<DocumentSource> {
        let credentials = source
            .credentials
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let result = sqlx::query(
            "INSERT INTO document_sources \
            (owner, name, source_type, folder_id, credentials, name_pattern, is_active, created_at) \
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&source.owner)
        .bind(&source.name)
        .bind(source.source_type.to_string())
        .bind(&source.folder_id)
        .bind(credentials)
        .bind(&source.name_pattern)
        .bind(timestamp(Utc::now()))
        .execute(self.pool())
        .await
        .with_context(|| format!("Unable to add the source '{}'", source.name))?;

        let id = result.last_insert_rowid();
        debug!("Added source '{}' with id {id}", source.name);
        self.source(id)
            .await?
            .context("The source disappeared after it was inserted")
    }

    pub(crate) async fn source(&self, id: i64) -> Result<Option<DocumentSource>> {
        let row: Option<SourceRow> = sqlx::query_as(&format!("{SELECT_SOURCE} WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .context("Unable to query sources")?;
        row.map(DocumentSource::try_from).transpose()
    }

    pub(crate) async fn source_by_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<DocumentSource>> {
        let row: Option<SourceRow> =
            sqlx::query_as(&format!("{SELECT_SOURCE} WHERE owner = ? AND name = ?"))
                .bind(owner)
                .bind(name)
                .fetch_optional(self.pool())
                .await
                .context("Unable to query sources")?;
        row.map(DocumentSource::try_from).transpose()
    }

    /// All sources of `owner`, optionally only the active ones, ordered by name.
    pub(crate) async fn list_sources(
        &self,
        owner: &str,
        active_only: bool,
    ) -> Result<Vec<DocumentSource>> {
        let sql = if active_only {
            format!("{SELECT_SOURCE} WHERE owner = ? AND is_active = 1 ORDER BY name")
        } else {
            format!("{SELECT_SOURCE} WHERE owner = ? ORDER BY name")
        };
        let rows: Vec<SourceRow> = sqlx::query_as(&sql)
            .bind(owner)
            .fetch_all(self.pool())
            .await
            .context("Unable to list sources")?;
        rows.into_iter().map(DocumentSource::try_from).collect()
    }

    /// Deletes a source together with its documents and their transactions. Returns `false` if
    /// there was no such source.
    pub(crate) async fn remove_source(&self, owner: &str, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM document_sources WHERE owner = ? AND name = ?")
            .bind(owner)
            .bind(name)
            .execute(self.pool())
            .await
            .with_context(|| format!("Unable to remove the source '{name}'"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Enables or disables a source. Returns the updated source, or `None` if it does not exist.
    pub(crate) async fn set_source_active(
        &self,
        owner: &str,
        name: &str,
        active: bool,
    ) -> Result<Option<DocumentSource>> {
        sqlx::query("UPDATE document_sources SET is_active = ? WHERE owner = ? AND name = ?")
            .bind(active)
            .bind(owner)
            .bind(name)
            .execute(self.pool())
            .await
            .with_context(|| format!("Unable to update the source '{name}'"))?;
        self.source_by_name(owner, name).await
    }

    pub(crate) async fn set_last_sync(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE document_sources SET last_sync = ? WHERE id = ?")
            .bind(timestamp(at))
            .bind(id)
            .execute(self.pool())
            .await
            .context("Unable to record the sync time")?;
        Ok(())
    }

    /// Takes the sync lock of a source if it is free, or if the current holder took it before
    /// `stale_before`. The check and the write are one statement, so two processes cannot both win.
    pub(crate) async fn acquire_sync_lock(
        &self,
        id: i64,
        token: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE document_sources SET sync_lock = ?, sync_locked_at = ? \
            WHERE id = ? AND (sync_lock IS NULL OR sync_locked_at IS NULL OR sync_locked_at < ?)",
        )
        .bind(token)
        .bind(timestamp(now))
        .bind(id)
        .bind(timestamp(stale_before))
        .execute(self.pool())
        .await
        .context("Unable to take the sync lock")?;
        Ok(result.rows_affected() == 1)
    }

    /// Releases the sync lock if it is still held with `token`.
    pub(crate) async fn release_sync_lock(&self, id: i64, token: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE document_sources SET sync_lock = NULL, sync_locked_at = NULL \
            WHERE id = ? AND sync_lock = ?",
        )
        .bind(id)
        .bind(token)
        .execute(self.pool())
        .await
        .context("Unable to release the sync lock")?;
        if result.rows_affected() == 0 {
            debug!("The sync lock of source {id} was taken over by another process");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;
    use chrono::Duration;

    fn new_source(name: &str) -> NewSource {
        NewSource::new(
            "tester",
            name,
            SourceType::GoogleDrive,
            "folder-1",
            Some(PathBuf::from("service_account.json")),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_and_list_sources() {
        let env = TestEnv::new().await;
        let db = env.config().db().clone();
        let added = db.add_source(&new_source("Personal")).await.unwrap();
        assert_eq!(added.name(), "Personal");
        assert!(added.is_active());
        assert!(added.last_sync().is_none());
        assert_eq!(
            added.credentials(),
            Some(PathBuf::from("service_account.json").as_path())
        );
        db.add_source(&new_source("Another")).await.unwrap();

        let names: Vec<String> = db
            .list_sources("tester", false)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["Another", "Personal"]);
        assert!(db.list_sources("someone-else", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let env = TestEnv::new().await;
        let db = env.config().db().clone();
        db.add_source(&new_source("Personal")).await.unwrap();
        assert!(db.add_source(&new_source("Personal")).await.is_err());
    }

    #[tokio::test]
    async fn test_disable_and_remove() {
        let env = TestEnv::new().await;
        let db = env.config().db().clone();
        db.add_source(&new_source("Personal")).await.unwrap();

        let disabled = db
            .set_source_active("tester", "Personal", false)
            .await
            .unwrap()
            .unwrap();
        assert!(!disabled.is_active());
        assert!(db.list_sources("tester", true).await.unwrap().is_empty());

        assert!(db.remove_source("tester", "Personal").await.unwrap());
        assert!(!db.remove_source("tester", "Personal").await.unwrap());
        assert!(db
            .set_source_active("tester", "Personal", true)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_sync_lock() {
        let env = TestEnv::new().await;
        let db = env.config().db().clone();
        let id = db.add_source(&new_source("Personal")).await.unwrap().id();
        let now = Utc::now();
        let stale_before = now - Duration::minutes(30);

        assert!(db.acquire_sync_lock(id, "a", now, stale_before).await.unwrap());
        assert!(!db.acquire_sync_lock(id, "b", now, stale_before).await.unwrap());

        // a lock taken before the staleness cutoff can be taken over
        let later = now + Duration::minutes(31);
        assert!(db
            .acquire_sync_lock(id, "b", later, later - Duration::minutes(30))
            .await
            .unwrap());

        // the original holder no longer owns it and cannot release it
        db.release_sync_lock(id, "a").await.unwrap();
        assert!(!db
            .acquire_sync_lock(id, "c", later, later - Duration::minutes(30))
            .await
            .unwrap());

        db.release_sync_lock(id, "b").await.unwrap();
        assert!(db
            .acquire_sync_lock(id, "c", later, later - Duration::minutes(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_set_last_sync() {
        let env = TestEnv::new().await;
        let db = env.config().db().clone();
        let id = db.add_source(&new_source("Personal")).await.unwrap().id();
        let at = parse_timestamp("2025-08-31T12:00:00Z").unwrap();
        db.set_last_sync(id, at).await.unwrap();
        assert_eq!(db.source(id).await.unwrap().unwrap().last_sync(), Some(at));
    }
}
