use crate::Result;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Matches the file names of Google's "Monthly budget" spreadsheet template.
pub const DEFAULT_NAME_PATTERN: &str = r"(?i)^monthly budget\b";

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    GoogleDrive,
    /// Documents are added by hand; there is nothing to sync.
    DirectUpload,
}

serde_plain::derive_display_from_serialize!(SourceType);
serde_plain::derive_fromstr_from_deserialize!(SourceType);

/// Where monthly budget spreadsheets are found and how to access them.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DocumentSource {
    pub(crate) id: i64,
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) source_type: SourceType,
    /// The Google Drive folder that holds the spreadsheets.
    pub(crate) folder_id: String,
    /// The service account JSON, relative to the secrets directory unless absolute.
    pub(crate) credentials: Option<PathBuf>,
    /// Only spreadsheets whose names match this regex are imported.
    pub(crate) name_pattern: String,
    pub(crate) is_active: bool,
    pub(crate) last_sync: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
}

impl DocumentSource {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    pub fn credentials(&self) -> Option<&Path> {
        self.credentials.as_deref()
    }

    pub fn name_pattern(&self) -> &str {
        &self.name_pattern
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Compiles `name_pattern`.
    pub fn name_regex(&self) -> Result<Regex> {
        Regex::new(&self.name_pattern)
            .with_context(|| format!("Invalid file name pattern '{}'", self.name_pattern))
    }

    /// Fails unless this source can be synced from Google Drive.
    pub fn ensure_syncable(&self) -> Result<()> {
        if self.source_type != SourceType::GoogleDrive {
            bail!(
                "Source '{}' is a {} source, only google_drive sources can be synced",
                self.name,
                self.source_type
            );
        }
        if self.credentials.is_none() {
            bail!("Source '{}' has no Google Drive credentials", self.name);
        }
        if self.folder_id.is_empty() {
            bail!("Source '{}' has no Google Drive folder", self.name);
        }
        if !self.is_active {
            bail!("Source '{}' is disabled", self.name);
        }
        Ok(())
    }
}

/// The values needed to create a new `DocumentSource`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewSource {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) source_type: SourceType,
    pub(crate) folder_id: String,
    pub(crate) credentials: Option<PathBuf>,
    pub(crate) name_pattern: String,
}

impl NewSource {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        source_type: SourceType,
        folder_id: impl Into<String>,
        credentials: Option<PathBuf>,
        name_pattern: Option<String>,
    ) -> Result<Self> {
        let name_pattern = name_pattern.unwrap_or_else(|| DEFAULT_NAME_PATTERN.to_string());
        Regex::new(&name_pattern)
            .with_context(|| format!("Invalid file name pattern '{name_pattern}'"))?;
        let name = name.into();
        if name.trim().is_empty() {
            bail!("A source needs a name");
        }
        Ok(Self {
            owner: owner.into(),
            name,
            source_type,
            folder_id: folder_id.into(),
            credentials,
            name_pattern,
        })
    }
}

/// Extracts the folder ID from a Google Drive folder URL such as
/// `https://drive.google.com/drive/folders/FOLDER_ID?usp=sharing`. Anything that does not contain
/// `/folders/` is assumed to already be a folder ID.
pub fn extract_folder_id(url: &str) -> Result<String> {
    let url = url.trim();
    let id = match url.split_once("/folders/") {
        Some((_, rest)) => rest
            .split(['?', '#', '/'])
            .next()
            .unwrap_or_default(),
        None => url,
    };
    if id.is_empty() {
        bail!("Unable to find a Google Drive folder ID in '{url}'");
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_folder_id() {
        assert_eq!(
            extract_folder_id("https://drive.google.com/drive/folders/ABCDE").unwrap(),
            "ABCDE"
        );
        assert_eq!(
            extract_folder_id("https://drive.google.com/drive/u/0/folders/1xYz_9?usp=sharing")
                .unwrap(),
            "1xYz_9"
        );
        assert_eq!(extract_folder_id("1xYz_9").unwrap(), "1xYz_9");
        assert!(extract_folder_id("https://drive.google.com/drive/folders/").is_err());
        assert!(extract_folder_id("  ").is_err());
    }

    #[test]
    fn test_default_pattern() {
        let re = Regex::new(DEFAULT_NAME_PATTERN).unwrap();
        assert!(re.is_match("Monthly budget Jan 2025"));
        assert!(re.is_match("Monthly Budget Aug 2025"));
        assert!(!re.is_match("Copy of Monthly budget Jan 2025"));
        assert!(!re.is_match("Monthly budgeting notes"));
    }

    #[test]
    fn test_new_source_rejects_bad_pattern() {
        let result = NewSource::new(
            "me",
            "Main",
            SourceType::GoogleDrive,
            "F",
            None,
            Some("(".to_string()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_source_type_strings() {
        assert_eq!(SourceType::GoogleDrive.to_string(), "google_drive");
        assert_eq!(
            "direct_upload".parse::<SourceType>().unwrap(),
            SourceType::DirectUpload
        );
    }
}
