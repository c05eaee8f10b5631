//! Configuration file handling for Lumos.
//!
//! The configuration file is stored at `$LUMOS_HOME/config.json` and contains the owner name used
//! to scope documents, backup settings, the currency format of the budget sheets and HTTP settings
//! for the Google APIs.

use crate::api::HttpPolicy;
use crate::backup::Backup;
use crate::db::Db;
use crate::model::{CurrencyFormat, DocumentSource};
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "lumos";
const CONFIG_VERSION: u8 = 1;
const BACKUP_COPIES: u32 = 5;
const SYNC_LOCK_MINUTES: u32 = 30;
const HTTP_TIMEOUT_SECS: u64 = 30;
const HTTP_MAX_RETRIES: u32 = 3;
const SECRETS: &str = ".secrets";
const BACKUPS: &str = ".backups";
const CONFIG_JSON: &str = "config.json";
const LUMOS_SQLITE: &str = "lumos.sqlite";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$LUMOS_HOME` and from there it loads `$LUMOS_HOME/config.json`. It provides
/// paths to other items that are expected in a certain location within the lumos home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    backups: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the data directory, its subdirectories, an initial `config.json` and the SQLite
    /// database.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of data directory, e.g. `$HOME/lumos`
    /// - `owner` - The name documents and sources are recorded under.
    ///
    /// # Errors
    /// - Returns an error if any file operations fail or if a database already exists.
    pub async fn create(dir: impl Into<PathBuf>, owner: &str) -> Result<Self> {
        if owner.trim().is_empty() {
            bail!("The owner name cannot be empty");
        }

        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the lumos home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let backups_dir = root.join(BACKUPS);
        utils::make_dir(&backups_dir).await?;
        let secrets_dir = root.join(SECRETS);
        utils::make_dir(&secrets_dir).await?;

        let config_path = root.join(CONFIG_JSON);
        let config_file = ConfigFile {
            owner: owner.trim().to_string(),
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        let db_path = root.join(LUMOS_SQLITE);
        let db = Db::init(&db_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            backups: backups_dir,
            secrets: secrets_dir,
            config_path,
            config_file,
            db,
            sqlite_path: db_path,
        })
    }

    /// This will
    /// - validate that the `lumos_home` exists and that the config file exists
    /// - load the config file
    /// - open the database, migrating it if needed
    /// - validate that the backups and secrets directories exist
    /// - return the loaded configuration object
    pub async fn load(lumos_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = lumos_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("Lumos Home is missing, run 'lumos init' first")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let db_path = root.join(LUMOS_SQLITE);
        let db = Db::load(&db_path)
            .await
            .context("Unable to load SQLite DB")?;

        let config = Self {
            root: root.clone(),
            backups: root.join(BACKUPS),
            secrets: root.join(SECRETS),
            config_path,
            config_file,
            db,
            sqlite_path: db_path,
        };
        if !config.backups.is_dir() {
            bail!(
                "The backups directory is missing '{}'",
                config.backups.display()
            )
        }
        if !config.secrets.is_dir() {
            bail!(
                "The secrets directory is missing '{}'",
                config.secrets.display()
            )
        }
        Ok(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub fn backups(&self) -> &Path {
        &self.backups
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn backup_copies(&self) -> u32 {
        self.config_file.backup_copies
    }

    /// The name sources and documents are recorded under.
    pub fn owner(&self) -> &str {
        &self.config_file.owner
    }

    /// How amounts are written in the budget sheets.
    pub fn currency(&self) -> &CurrencyFormat {
        &self.config_file.currency
    }

    /// How long a sync lock is honored before another sync may take it over.
    pub fn sync_lock_minutes(&self) -> u32 {
        self.config_file.sync_lock_minutes
    }

    pub(crate) fn http_policy(&self) -> HttpPolicy {
        HttpPolicy {
            timeout: Duration::from_secs(self.config_file.http.timeout_secs),
            max_retries: self.config_file.http.max_retries,
        }
    }

    /// Creates a new `Backup` instance for managing backup files.
    pub fn backup(&self) -> Backup {
        Backup::new(self)
    }

    /// Copies a service account key into the secrets directory, restricts its permissions and
    /// returns its path relative to the secrets directory.
    pub async fn import_credentials(&self, key_file: &Path) -> Result<PathBuf> {
        let file_name = key_file
            .file_name()
            .with_context(|| format!("'{}' is not a file", key_file.display()))?;
        let destination = self.secrets.join(file_name);
        if destination.exists() {
            if utils::read(key_file).await? == utils::read(&destination).await? {
                return Ok(PathBuf::from(file_name));
            }
            bail!(
                "A credentials file named '{}' already exists in '{}'",
                file_name.to_string_lossy(),
                self.secrets.display()
            );
        }
        utils::copy(key_file, &destination).await?;
        utils::restrict_permissions(&destination)?;
        Ok(PathBuf::from(file_name))
    }

    /// The absolute path of the service account key of `source`.
    pub fn resolve_credentials(&self, source: &DocumentSource) -> Result<PathBuf> {
        let credentials = source
            .credentials()
            .with_context(|| format!("Source '{}' has no credentials", source.name()))?;
        let path = self.resolve_secrets_file_path(credentials);
        if !path.is_file() {
            bail!(
                "The credentials of source '{}' are missing '{}'",
                source.name(),
                path.display()
            );
        }
        Ok(path)
    }

    /// Checks if `p` is relative, and if so, resolves it against the secrets directory.
    fn resolve_secrets_file_path(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            return p.to_path_buf();
        }
        self.secrets.join(p)
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "lumos",
///   "config_version": 1,
///   "owner": "ayu",
///   "backup_copies": 5,
///   "currency": {
///     "prefix": "Rp",
///     "thousands_separator": ".",
///     "decimal_separator": ",",
///     "display_decimals": 0
///   },
///   "http": { "timeout_secs": 30, "max_retries": 3 },
///   "sync_lock_minutes": 30
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "lumos"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// The owner of the sources and documents in this home
    owner: String,

    /// Number of backup copies to keep
    #[serde(default = "default_backup_copies")]
    backup_copies: u32,

    #[serde(default)]
    currency: CurrencyFormat,

    #[serde(default)]
    http: HttpSettings,

    #[serde(default = "default_sync_lock_minutes")]
    sync_lock_minutes: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
struct HttpSettings {
    /// Per-request timeout
    timeout_secs: u64,
    /// Retries of rate-limited, 5xx and connection failures
    max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: HTTP_TIMEOUT_SECS,
            max_retries: HTTP_MAX_RETRIES,
        }
    }
}

fn default_backup_copies() -> u32 {
    BACKUP_COPIES
}

fn default_sync_lock_minutes() -> u32 {
    SYNC_LOCK_MINUTES
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            owner: String::new(),
            backup_copies: BACKUP_COPIES,
            currency: CurrencyFormat::default(),
            http: HttpSettings::default(),
            sync_lock_minutes: SYNC_LOCK_MINUTES,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile asynchronously from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path)
            .await
            .with_context(|| format!("Failed to load config file at {}", path.display()))?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            config.config_version == CONFIG_VERSION,
            "Unsupported config_version {} in {}, this version of lumos reads version {}",
            config.config_version,
            path.display(),
            CONFIG_VERSION
        );
        anyhow::ensure!(
            !config.owner.trim().is_empty(),
            "The config file at {} has no owner",
            path.display()
        );

        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewSource, SourceType};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create_and_load() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().join("lumos_home");

        let config = Config::create(&home_dir, " ayu ").await.unwrap();
        assert_eq!(config.owner(), "ayu");
        assert!(config.backups().is_dir());
        assert!(config.secrets().is_dir());
        assert!(config.sqlite_path().is_file());
        assert_eq!(config.currency(), &CurrencyFormat::rupiah());

        let loaded = Config::load(&home_dir).await.unwrap();
        assert_eq!(loaded.owner(), "ayu");
        assert_eq!(loaded.backup_copies(), BACKUP_COPIES);
        assert_eq!(loaded.sync_lock_minutes(), SYNC_LOCK_MINUTES);
        assert_eq!(
            loaded.http_policy(),
            HttpPolicy {
                timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
                max_retries: HTTP_MAX_RETRIES
            }
        );
    }

    #[tokio::test]
    async fn test_config_create_twice_fails() {
        let dir = TempDir::new().unwrap();
        Config::create(dir.path(), "ayu").await.unwrap();
        assert!(Config::create(dir.path(), "ayu").await.is_err());
    }

    #[tokio::test]
    async fn test_config_load_missing_home() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(dir.path().join("nope")).await.is_err());
    }

    #[tokio::test]
    async fn test_config_file_load_with_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "lumos",
            "config_version": 1,
            "owner": "budi"
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let config = ConfigFile::load(&config_path).await.unwrap();
        assert_eq!(config.owner, "budi");
        assert_eq!(config.backup_copies, BACKUP_COPIES);
        assert_eq!(config.currency, CurrencyFormat::rupiah());
        assert_eq!(config.http, HttpSettings::default());
    }

    #[tokio::test]
    async fn test_config_file_custom_currency() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "lumos",
            "config_version": 1,
            "owner": "sam",
            "currency": {"prefix": "$", "thousands_separator": ",", "decimal_separator": "."}
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let config = ConfigFile::load(&config_path).await.unwrap();
        assert_eq!(config.currency.prefix(), "$");
        assert_eq!(config.currency.thousands_separator(), ',');
    }

    #[tokio::test]
    async fn test_config_file_load_invalid_app_name() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{"app_name": "wrong_app", "config_version": 1, "owner": "x"}"#;
        utils::write(&config_path, json).await.unwrap();

        let result = ConfigFile::load(&config_path).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid app_name"));
    }

    #[tokio::test]
    async fn test_config_file_load_unknown_version() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{"app_name": "lumos", "config_version": 2, "owner": "x"}"#;
        utils::write(&config_path, json).await.unwrap();

        let err = ConfigFile::load(&config_path).await.unwrap_err();
        assert!(
            err.to_string().contains("Unsupported config_version 2"),
            "{err:#}"
        );
    }

    #[tokio::test]
    async fn test_config_file_save_and_load() {
        let t = TempDir::new().unwrap();
        let path = t.path().join("file.json");
        let original = ConfigFile {
            owner: "ayu".to_string(),
            backup_copies: 9,
            sync_lock_minutes: 5,
            ..ConfigFile::default()
        };
        original.save(&path).await.unwrap();
        assert_eq!(original, ConfigFile::load(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_import_and_resolve_credentials() {
        let dir = TempDir::new().unwrap();
        let config = Config::create(dir.path().join("home"), "ayu").await.unwrap();
        let key = dir.path().join("service_account.json");
        utils::write(&key, "{}").await.unwrap();

        let relative = config.import_credentials(&key).await.unwrap();
        assert_eq!(relative, PathBuf::from("service_account.json"));

        let new = NewSource::new(
            "ayu",
            "Main",
            SourceType::GoogleDrive,
            "folder",
            Some(relative),
            None,
        )
        .unwrap();
        let source = config.db().add_source(&new).await.unwrap();
        let resolved = config.resolve_credentials(&source).unwrap();
        assert_eq!(resolved, config.secrets().join("service_account.json"));
        assert!(resolved.is_file());
    }

    #[tokio::test]
    async fn test_import_credentials_twice() {
        let dir = TempDir::new().unwrap();
        let config = Config::create(dir.path().join("home"), "ayu").await.unwrap();
        let key = dir.path().join("sa.json");
        utils::write(&key, "{\"a\":1}").await.unwrap();
        config.import_credentials(&key).await.unwrap();
        // identical content is reused
        config.import_credentials(&key).await.unwrap();

        let other_dir = dir.path().join("other");
        utils::make_dir(&other_dir).await.unwrap();
        let other = other_dir.join("sa.json");
        utils::write(&other, "{\"a\":2}").await.unwrap();
        assert!(config.import_credentials(&other).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_missing_credentials() {
        let dir = TempDir::new().unwrap();
        let config = Config::create(dir.path().join("home"), "ayu").await.unwrap();
        let new = NewSource::new(
            "ayu",
            "Main",
            SourceType::GoogleDrive,
            "folder",
            Some(PathBuf::from("absent.json")),
            None,
        )
        .unwrap();
        let source = config.db().add_source(&new).await.unwrap();
        assert!(config.resolve_credentials(&source).is_err());
    }
}
