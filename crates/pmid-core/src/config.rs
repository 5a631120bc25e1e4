//! Configuration for PMID.
//!
//! Stored as TOML. Missing files fall back to defaults; `PMID_*` environment
//! variables override file values and command-line flags override both.
//!
//! - Unix: `~/.config/pmid/pmid.toml`
//! - Windows: `%APPDATA%\pmid\pmid.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pmid_crypto::KdfParams;

use crate::file_store::FileStore;
use crate::messenger::Topics;

pub const ENV_STORE_ROOT: &str = "PMID_STORE_ROOT";
pub const ENV_LOG: &str = "PMID_LOG";

const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// # Example TOML
///
/// ```toml
/// [store]
/// root = "/var/lib/pmid/identities"  # omit for the platform data dir
///
/// [kdf]
/// m_cost = 19456
/// t_cost = 2
/// p_cost = 1
///
/// [transport]
/// inbox_prefix = "pmid/inbox"
/// identity_topic = "pmid/identity"
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmidConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub kdf: KdfConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding wrapped keys (empty = platform data dir)
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Argon2id cost parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfConfig {
    /// Memory cost in KiB
    #[serde(default = "default_m_cost")]
    pub m_cost: u32,

    #[serde(default = "default_t_cost")]
    pub t_cost: u32,

    #[serde(default = "default_p_cost")]
    pub p_cost: u32,
}

fn default_m_cost() -> u32 {
    KdfParams::default().m_cost
}

fn default_t_cost() -> u32 {
    KdfParams::default().t_cost
}

fn default_p_cost() -> u32 {
    KdfParams::default().p_cost
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            m_cost: default_m_cost(),
            t_cost: default_t_cost(),
            p_cost: default_p_cost(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_inbox_prefix")]
    pub inbox_prefix: String,

    #[serde(default = "default_identity_topic")]
    pub identity_topic: String,
}

fn default_inbox_prefix() -> String {
    Topics::default().inbox_prefix
}

fn default_identity_topic() -> String {
    Topics::default().identity_topic
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            inbox_prefix: default_inbox_prefix(),
            identity_topic: default_identity_topic(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PmidConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PmidConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `custom_path`, or from the default location if it exists,
    /// or fall back to defaults.
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = custom_path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "pmid", "pmid")
            .map(|dirs| dirs.config_dir().join("pmid.toml"))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `PMID_STORE_ROOT` and `PMID_LOG` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_STORE_ROOT).filter(|v| !v.is_empty()) {
            self.store.root = Some(PathBuf::from(root));
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.logging.level = level.to_lowercase();
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, VALID_LEVELS
            )));
        }

        self.kdf_params()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.transport.inbox_prefix.is_empty() || self.transport.identity_topic.is_empty() {
            return Err(ConfigError::ValidationError(
                "transport topics must not be empty".to_string(),
            ));
        }
        if self.transport.inbox_prefix == self.transport.identity_topic {
            return Err(ConfigError::ValidationError(
                "inbox_prefix and identity_topic must differ".to_string(),
            ));
        }

        Ok(())
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams::new(self.kdf.m_cost, self.kdf.t_cost, self.kdf.p_cost)
    }

    pub fn topics(&self) -> Topics {
        Topics {
            inbox_prefix: self.transport.inbox_prefix.clone(),
            identity_topic: self.transport.identity_topic.clone(),
        }
    }

    /// Configured store root, or the platform data directory.
    pub fn store_root(&self) -> Result<PathBuf, ConfigError> {
        self.store
            .root
            .clone()
            .or_else(FileStore::default_root)
            .ok_or_else(|| {
                ConfigError::ValidationError(
                    "no store root configured and no platform data directory".to_string(),
                )
            })
    }
}
