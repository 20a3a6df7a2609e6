//! Connection profile for a remote storefront instance.
//!
//! Profiles are stored as TOML (`cartsync.toml` in the project root by
//! convention). Required fields are checked by [`Config::validate`] before
//! any network call is attempted; a missing hostname or credential is a
//! configuration error, never a mid-deploy surprise.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors from loading or validating a connection profile.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Connection profile for one remote instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Instance hostname, e.g. `dev01.example.com`.
    #[serde(default)]
    pub hostname: String,

    /// Basic-auth / Business-Manager username.
    #[serde(default)]
    pub username: String,

    /// Basic-auth / Business-Manager password.
    #[serde(default)]
    pub password: String,

    /// Code version directory the cartridges deploy into.
    #[serde(default)]
    pub code_version: String,

    /// Local project root containing the cartridges folder.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Cartridge directory names to deploy/watch. Empty means all.
    #[serde(default)]
    pub cartridges: Vec<String>,

    /// Glob patterns excluded from watching and archiving.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Import-job poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Directory for temporary archives (defaults to the system temp dir).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Per-request connect/response timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_poll_interval() -> u64 {
    3
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            code_version: String::new(),
            root: default_root(),
            cartridges: Vec::new(),
            exclude: Vec::new(),
            poll_interval: default_poll_interval(),
            temp_dir: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl Config {
    /// Loads a profile from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the profile back to disk.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks that every field a remote operation depends on is present.
    ///
    /// Called once up front so a bad profile fails before the first request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hostname.is_empty() {
            return Err(ConfigError::MissingField("hostname"));
        }
        if self.username.is_empty() {
            return Err(ConfigError::MissingField("username"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::MissingField("password"));
        }
        if self.code_version.is_empty() {
            return Err(ConfigError::MissingField("code_version"));
        }
        Ok(())
    }

    /// Base URL of the remote instance.
    pub fn base_url(&self) -> String {
        format!("https://{}", self.hostname)
    }

    /// Directory used for temporary archives.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
