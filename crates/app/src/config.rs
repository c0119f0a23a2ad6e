//! Process configuration
//!
//! Read from an optional TOML file, then overridden by environment
//! variables. The Discord token is the only required setting.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use porter_core::commands::DEFAULT_PREFIX;
use porter_net::{DEFAULT_API_BASE, DEFAULT_PORT};
use serde::Deserialize;

/// Config file looked up in the working directory when `PORTER_CONFIG` is unset
const DEFAULT_CONFIG_FILE: &str = "porter.toml";

/// Errors that can occur while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DISCORD_TOKEN environment variable is not set")]
    MissingToken,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Config file contents; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    discord_token: Option<String>,
    bridge_token: Option<String>,
    listen: Option<SocketAddr>,
    api_base: Option<String>,
    command_prefix: Option<String>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    /// Shared secret the gateway bridge must present
    pub bridge_token: String,
    pub listen: SocketAddr,
    pub api_base: String,
    pub command_prefix: String,
}

impl Config {
    /// Load from `PORTER_CONFIG` (or `porter.toml` if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var("PORTER_CONFIG") {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };
        Self::from_sources(path.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build from an optional file and an environment lookup
    pub fn from_sources(
        file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = match file {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&contents)?
            }
            None => FileConfig::default(),
        };

        let discord_token = env("DISCORD_TOKEN")
            .or(file.discord_token)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let listen = match env("PORTER_LISTEN") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "PORTER_LISTEN",
                    value,
                })?,
            None => file
                .listen
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))),
        };

        Ok(Self {
            bridge_token: env("PORTER_BRIDGE_TOKEN")
                .or(file.bridge_token)
                .unwrap_or_else(|| discord_token.clone()),
            discord_token,
            listen,
            api_base: env("PORTER_API_BASE")
                .or(file.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            command_prefix: env("PORTER_COMMAND_PREFIX")
                .or(file.command_prefix)
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        })
    }
}
