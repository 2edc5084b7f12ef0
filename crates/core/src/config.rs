//! Configuration management
//!
//! This module handles loading and validating the iris configuration file.
//! The configuration file is stored in TOML format at ~/.config/iris/config.toml.
//! Credentials are not part of it; they live in a separate JSON file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

const KIB: u64 = 1024;
const MIB: u64 = KIB * KIB;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version of the file
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Output settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Bulk and single transfer settings
    #[serde(default)]
    pub transfer: TransferSettings,

    /// Object store connection settings
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Index service session settings
    #[serde(default)]
    pub index: IndexSettings,
}

/// Default settings for CLI behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Output format: "human" or "json"
    #[serde(default = "default_output")]
    pub output: String,

    /// Color mode: "auto", "always", or "never"
    #[serde(default = "default_color")]
    pub color: String,

    /// Show progress bars
    #[serde(default = "default_true")]
    pub progress: bool,
}

/// Settings for uploads and downloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Maximum number of files transferred at once by bulk operations
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound on a single file transfer, in seconds
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,

    /// Files at or above this size are uploaded in parts
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,

    /// Part size for multipart uploads
    #[serde(default = "default_multipart_part_size")]
    pub multipart_part_size: u64,

    /// Compare SHA-256 digests after download
    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    /// Keys requested per listing page
    #[serde(default = "default_list_page_size")]
    pub list_page_size: i32,
}

/// Settings used when building the object store client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Signing region
    #[serde(default = "default_region")]
    pub region: String,

    /// Verify TLS certificates of the index service
    #[serde(default)]
    pub verify_tls: bool,

    /// Path-style bucket addressing
    #[serde(default = "default_true")]
    pub force_path_style: bool,

    /// Connection timeout, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Proxy for both HTTP clients, e.g. "http://proxy.example.org:3128"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

/// Settings for the index service token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Lifetime assumed when the server does not report one
    #[serde(default = "default_token_lifetime")]
    pub default_token_lifetime_secs: u64,

    /// Tokens are refreshed this long before they expire
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_output() -> String {
    "human".to_string()
}

fn default_color() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_item_timeout() -> u64 {
    3600
}

fn default_multipart_threshold() -> u64 {
    10 * MIB
}

fn default_multipart_part_size() -> u64 {
    40 * MIB
}

fn default_list_page_size() -> i32 {
    1000
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_token_lifetime() -> u64 {
    3600
}

fn default_refresh_margin() -> u64 {
    30
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            progress: true,
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            item_timeout_secs: default_item_timeout(),
            multipart_threshold: default_multipart_threshold(),
            multipart_part_size: default_multipart_part_size(),
            verify_checksums: true,
            list_page_size: default_list_page_size(),
        }
    }
}

impl TransferSettings {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    /// Concurrency clamped to at least one worker
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            verify_tls: false,
            force_path_style: true,
            connect_timeout_secs: default_connect_timeout(),
            proxy: None,
        }
    }
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Parsed proxy URL, if one is configured
    pub fn proxy_url(&self) -> Result<Option<Url>> {
        match self.proxy.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => {
                let url = Url::parse(raw)
                    .map_err(|e| Error::Config(format!("Invalid connection.proxy: {e}")))?;
                match url.scheme() {
                    "http" | "https" => Ok(Some(url)),
                    other => Err(Error::Config(format!(
                        "Unsupported proxy scheme '{other}' in connection.proxy"
                    ))),
                }
            }
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            default_token_lifetime_secs: default_token_lifetime(),
            refresh_margin_secs: default_refresh_margin(),
        }
    }
}

impl IndexSettings {
    pub fn default_token_lifetime(&self) -> Duration {
        Duration::from_secs(self.default_token_lifetime_secs)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }
}

/// Configuration manager resolves and loads the config file
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    ///
    /// `IRIS_CONFIG_DIR` overrides the platform config directory.
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os("IRIS_CONFIG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("iris"),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// A schema version newer than this build understands is an error.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&content)?;

        if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade iris.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        if config.transfer.multipart_part_size == 0 {
            return Err(Error::Config(
                "transfer.multipart_part_size must be greater than zero".into(),
            ));
        }
        config.connection.proxy_url()?;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            transfer: TransferSettings::default(),
            connection: ConnectionSettings::default(),
            index: IndexSettings::default(),
        }
    }
}
