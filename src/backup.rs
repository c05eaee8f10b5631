//! Backups of the SQLite database taken before a sync writes to it.

use crate::db::Db;
use crate::{utils, Config, Result};
use anyhow::Context;
use chrono::Local;
use std::path::PathBuf;
use tracing::debug;

/// Prefix for SQLite backup files.
pub const SQLITE: &str = "lumos.sqlite";

/// Manages backup file creation and rotation.
///
/// The `Backup` struct is immutable and owns copies of the paths and settings it needs.
/// Create a new instance via `Config::backup()` or `Backup::new()`.
#[derive(Debug, Clone)]
pub struct Backup {
    backups_dir: PathBuf,
    backup_copies: u32,
    db: Db,
}

impl Backup {
    /// Creates a new `Backup` instance from a `Config`.
    pub fn new(config: &Config) -> Self {
        Self {
            backups_dir: config.backups().to_path_buf(),
            backup_copies: config.backup_copies(),
            db: config.db().clone(),
        }
    }

    /// Writes a copy of the SQLite database to the backups directory.
    ///
    /// The filename format is `lumos.sqlite.YYYY-MM-DD-NNN`.
    /// Automatically rotates old backups, keeping only `backup_copies` files.
    ///
    /// Returns the path to the created backup file.
    pub async fn copy_sqlite(&self) -> Result<PathBuf> {
        let date = today();
        let seq = self.next_sequence_number(&date).await?;
        let path = self.backups_dir.join(format!("{SQLITE}.{date}-{seq:03}"));

        self.db.backup_into(&path).await?;
        debug!("Backed up the database to {}", path.display());

        self.rotate().await?;
        Ok(path)
    }

    /// Scans the backups directory for today's backups and returns the next sequence number.
    async fn next_sequence_number(&self, date: &str) -> Result<u32> {
        let mut max_seq: u32 = 0;
        for name in self.backup_names().await? {
            if let Some(seq) = parse_sequence_number(&name, date) {
                max_seq = max_seq.max(seq);
            }
        }
        Ok(max_seq + 1)
    }

    /// Deletes the oldest backups, keeping only `backup_copies` files.
    async fn rotate(&self) -> Result<()> {
        let mut names = self.backup_names().await?;
        // the name sorts by date and then sequence number
        names.sort();

        let to_delete = names.len().saturating_sub(self.backup_copies as usize);
        for name in names.into_iter().take(to_delete) {
            utils::remove(self.backups_dir.join(name)).await?;
        }
        Ok(())
    }

    async fn backup_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = utils::read_dir(&self.backups_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_backup_file(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// Returns today's date in YYYY-MM-DD format.
fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Parses the sequence number from `lumos.sqlite.{date}-{NNN}`.
fn parse_sequence_number(filename: &str, date: &str) -> Option<u32> {
    filename
        .strip_prefix(&format!("{SQLITE}.{date}-"))?
        .parse()
        .ok()
}

fn is_backup_file(filename: &str) -> bool {
    filename
        .strip_prefix(&format!("{SQLITE}."))
        .and_then(|rest| rest.rsplit_once('-'))
        .is_some_and(|(_, seq)| !seq.is_empty() && seq.chars().all(|c| c.is_ascii_digit()))
}
