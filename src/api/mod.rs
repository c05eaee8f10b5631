//! Read-only access to Google Drive folders and the spreadsheets in them.
//!
//! The `Drive` trait is implemented by `GoogleDrive`, which talks to the Drive v3 and Sheets v4
//! REST APIs, and by `TestDrive`, which keeps spreadsheets in memory so that the whole program can
//! run without Google.

mod auth;
mod drive;
mod drive_test_client;

use crate::model::DocumentSource;
use crate::{Config, Result};
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub(crate) use auth::TokenProvider;
pub(crate) use drive::GoogleDrive;
pub(crate) use drive_test_client::TestDrive;
#[cfg(test)]
pub(crate) use drive_test_client::{sample_budget_grid, TestFolder, TestSpreadsheet};

/// The tab of a monthly budget spreadsheet that holds the expense and income rows.
pub(crate) const TRANSACTIONS: &str = "Transactions";

pub(crate) const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

// Both scopes are read-only; nothing is ever written back to Drive.
const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/spreadsheets.readonly",
];

/// Selects between the real Google APIs and the in-memory test implementation.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Google,
    Testing,
}

const TEST_MODE_VAR: &str = "LUMOS_IN_TEST_MODE";

impl Mode {
    /// `Mode::Testing` when `LUMOS_IN_TEST_MODE` is set to a non-empty value, otherwise
    /// `Mode::Google`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_VAR) {
            Ok(value) if !value.is_empty() => Mode::Testing,
            _ => Mode::Google,
        }
    }
}

/// A spreadsheet file found in a Drive folder.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) struct DriveFile {
    pub(crate) id: String,
    pub(crate) name: String,
}

impl DriveFile {
    pub(crate) fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The kinds of failure the Drive and Sheets APIs can produce.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DriveError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by Google (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("Google server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Google API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("unable to decode the response: {0}")]
    Decode(String),
}

impl DriveError {
    /// Whether the call that produced this error is worth retrying.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(
            self,
            DriveError::RateLimited { .. } | DriveError::Server { .. } | DriveError::Transport(_)
        )
    }
}

/// Read-only operations on a Drive folder of spreadsheets.
#[async_trait::async_trait]
pub(crate) trait Drive: Send {
    /// All non-trashed spreadsheets directly inside `folder_id`.
    async fn list_spreadsheets(&mut self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError>;

    /// The titles of the tabs in a spreadsheet.
    async fn sheet_names(&mut self, spreadsheet_id: &str) -> Result<Vec<String>, DriveError>;

    /// The formatted cell values of one tab, row by row. Trailing empty cells and rows may be
    /// missing.
    async fn values(
        &mut self,
        spreadsheet_id: &str,
        tab: &str,
    ) -> Result<Vec<Vec<String>>, DriveError>;
}

/// The spreadsheets in `folder_id` whose names match `pattern`.
pub(crate) async fn list_monthly_budget_files(
    drive: &mut (dyn Drive + Send),
    folder_id: &str,
    pattern: &Regex,
) -> Result<Vec<DriveFile>, DriveError> {
    let files = drive.list_spreadsheets(folder_id).await?;
    let total = files.len();
    let matching: Vec<DriveFile> = files
        .into_iter()
        .filter(|f| pattern.is_match(&f.name))
        .collect();
    debug!(
        "{} of {total} spreadsheets in folder {folder_id} match '{pattern}'",
        matching.len()
    );
    Ok(matching)
}

/// HTTP behavior of the Google client.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct HttpPolicy {
    pub(crate) timeout: Duration,
    pub(crate) max_retries: u32,
}

/// Creates the `Drive` for `source` in the given `mode`.
pub(crate) async fn drive(
    config: &Config,
    source: &DocumentSource,
    mode: Mode,
) -> Result<Box<dyn Drive + Send>> {
    match mode {
        Mode::Testing => Ok(Box::new(TestDrive::new())),
        Mode::Google => {
            let key_path = config.resolve_credentials(source)?;
            let token_provider = TokenProvider::load(&key_path)
                .await
                .with_context(|| format!("Unable to authenticate source '{}'", source.name()))?;
            let drive = GoogleDrive::new(token_provider, config.http_policy())?;
            Ok(Box::new(drive))
        }
    }
}
