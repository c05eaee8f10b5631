//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::model::{DocumentSource, NewSource, SourceType};
use crate::{utils, Config};
use tempfile::TempDir;

/// The owner every `TestEnv` is created with.
pub const OWNER: &str = "tester";

/// Test environment that sets up a lumos home directory with Config and database.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// Creates a test environment with Config, initialized database and a fake service account
    /// key named `sa.json` in the secrets directory.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("lumos");
        let config = Config::create(&root, OWNER).await.unwrap();
        utils::write(
            config.secrets().join("sa.json"),
            r#"{"type": "service_account"}"#,
        )
        .await
        .unwrap();

        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    /// Returns a clone of the Config.
    pub fn config(&self) -> Config {
        self.config.clone()
    }

    /// Adds an active Google Drive source reading `folder_id` with the default name pattern.
    pub async fn add_source(&self, name: &str, folder_id: &str) -> DocumentSource {
        let new = NewSource::new(
            OWNER,
            name,
            SourceType::GoogleDrive,
            folder_id,
            Some("sa.json".into()),
            None,
        )
        .unwrap();
        self.config.db().add_source(&new).await.unwrap()
    }
}
