//! Configuration file handling for MoneyTalk.
//!
//! The configuration file is stored at `$MONEYTALK_HOME/config.json` and contains the API URL,
//! the user id, and the timing settings for requests and syncing.

use crate::db::Db;
use crate::outbox::Outbox;
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const APP_NAME: &str = "moneytalk";
const CONFIG_VERSION: u8 = 1;
const SECRETS: &str = ".secrets";
const TOKEN: &str = "token";
const CONFIG_JSON: &str = "config.json";
const MONEYTALK_SQLITE: &str = "moneytalk.sqlite";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MIN_SYNC_INTERVAL_SECS: u64 = 5;
pub(crate) const DEFAULT_PAGE_SIZE: u32 = 20;

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$MONEYTALK_HOME` and from there it loads `$MONEYTALK_HOME/config.json`. It also
/// opens the local database that holds the outbox.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the data directory, its subdirectories and:
    /// - Creates an initial `config.json` file using `api_url` and `user_id` along with default
    ///   settings
    /// - Moves `token_file`, if given, into its default location in the data dir
    /// - Initializes the SQLite database
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of data directory, e.g. `$HOME/moneytalk`
    /// - `api_url` - The base URL of the MoneyTalk API, e.g. `https://api.moneytalk.com/api`
    /// - `user_id` - The id of the user whose transactions are managed
    /// - `token_file` - A file holding the bearer token for the API
    ///
    /// # Errors
    /// - Returns an error if the URL is invalid or any file operations fail.
    pub async fn create(
        dir: impl Into<PathBuf>,
        api_url: &str,
        user_id: &str,
        token_file: Option<&Path>,
    ) -> Result<Self> {
        validate_api_url(api_url)?;
        if user_id.trim().is_empty() {
            bail!("The user id must not be empty");
        }

        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the moneytalk home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        // An existing home is left exactly as it is
        let config_path = root.join(CONFIG_JSON);
        let db_path = root.join(MONEYTALK_SQLITE);
        for existing in [&config_path, &db_path] {
            if existing.exists() {
                bail!(
                    "'{}' is already a moneytalk home, found '{}'",
                    root.display(),
                    existing.display()
                );
            }
        }

        let secrets_dir = root.join(SECRETS);
        utils::make_dir(&secrets_dir).await?;
        if let Some(token_file) = token_file {
            utils::rename(token_file, secrets_dir.join(TOKEN)).await?;
        }

        let config_file = ConfigFile {
            api_url: api_url.to_string(),
            user_id: user_id.trim().to_string(),
            ..Default::default()
        };
        config_file.save(&config_path).await?;

        let db = Db::init(&db_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            secrets: secrets_dir,
            config_path,
            config_file,
            db,
            sqlite_path: db_path,
        })
    }

    /// This will
    /// - validate that `moneytalk_home` exists and that the config file exists
    /// - load the config file
    /// - open the database, migrating it if needed
    /// - return the loaded configuration object
    pub async fn load(moneytalk_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = moneytalk_home.into();
        if !maybe_relative.is_dir() {
            bail!(
                "MoneyTalk home is missing '{}', run 'moneytalk init' first",
                maybe_relative.display()
            );
        }
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let db_path = root.join(MONEYTALK_SQLITE);
        let db = Db::load(&db_path)
            .await
            .context("Unable to load SQLite DB")?;

        Ok(Self {
            secrets: root.join(SECRETS),
            root,
            config_path,
            config_file,
            db,
            sqlite_path: db_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn api_url(&self) -> &str {
        &self.config_file.api_url
    }

    pub fn user_id(&self) -> &str {
        &self.config_file.user_id
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config_file.request_timeout_secs)
    }

    pub fn min_sync_interval(&self) -> Duration {
        Duration::from_secs(self.config_file.min_sync_interval_secs)
    }

    pub fn page_size(&self) -> u32 {
        self.config_file.page_size
    }

    /// The outbox stored in this home's database.
    pub fn outbox(&self) -> Outbox {
        Outbox::new(self.db.clone())
    }

    /// Returns the stored `token_path` if it is absolute, otherwise resolves the relative path.
    pub fn token_path(&self) -> PathBuf {
        let p = self.config_file.token_path();
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }

    /// Reads the bearer token. A missing token file means the API is used without one.
    pub async fn token(&self) -> Result<Option<String>> {
        let path = self.token_path();
        if !path.is_file() {
            return Ok(None);
        }
        let token = utils::read(&path).await?;
        let token = token.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }
}

fn validate_api_url(api_url: &str) -> Result<()> {
    let url = Url::parse(api_url).with_context(|| format!("Invalid API URL '{api_url}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("The API URL must use http or https, got '{api_url}'");
    }
    Ok(())
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "moneytalk",
///   "config_version": 1,
///   "api_url": "https://api.moneytalk.com/api",
///   "user_id": "1",
///   "request_timeout_secs": 10,
///   "min_sync_interval_secs": 5,
///   "page_size": 20,
///   "token_path": ".secrets/token"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "moneytalk"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// Base URL of the MoneyTalk API
    api_url: String,

    /// The user whose transactions are managed
    user_id: String,

    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,

    /// Connectivity-triggered syncs closer together than this are skipped
    #[serde(default = "default_min_sync_interval_secs")]
    min_sync_interval_secs: u64,

    /// Page size of the transaction list and of the re-fetch after a sync
    #[serde(default = "default_page_size")]
    page_size: u32,

    /// Path to the bearer token file (optional, relative to config.json or absolute)
    /// Defaults to $MONEYTALK_HOME/.secrets/token if not specified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_path: Option<PathBuf>,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_min_sync_interval_secs() -> u64 {
    DEFAULT_MIN_SYNC_INTERVAL_SECS
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            api_url: String::new(),
            user_id: String::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            min_sync_interval_secs: DEFAULT_MIN_SYNC_INTERVAL_SECS,
            page_size: DEFAULT_PAGE_SIZE,
            token_path: None,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile asynchronously from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if its values are invalid
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = utils::read(path).await?;
        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            config.config_version <= CONFIG_VERSION,
            "Config file version {} is newer than this program supports ({})",
            config.config_version,
            CONFIG_VERSION
        );
        anyhow::ensure!(config.page_size > 0, "page_size must be greater than zero");
        anyhow::ensure!(
            config.request_timeout_secs > 0,
            "request_timeout_secs must be greater than zero"
        );
        validate_api_url(&config.api_url)?;
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

    /// If the path is relative, it should be interpreted as relative to the config.json file.
    /// If None, defaults to $MONEYTALK_HOME/.secrets/token
    fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(TOKEN))
    }
}
