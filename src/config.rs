//! Application configuration management.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config PATH`, or `config.toml` in the platform config
//!    directory)
//! 3. Environment variables prefixed with `MEDIADUPE_` (`__` separates
//!    nested keys)
//! 4. Command-line flags (applied by the caller)
//!
//! # Example
//!
//! ```toml
//! base_dir = "/srv/media"
//! hash_size = 8
//! match_threshold = 4
//! idle_interval_secs = 2.0
//! ```

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::duplicates::DEFAULT_MATCH_THRESHOLD;
use crate::fingerprint::{DEFAULT_CHUNK_SIZE, DEFAULT_HASH_SIZE};
use crate::sweep::SweepOptions;

/// Name of the database file created under the base directory by default.
pub const DEFAULT_DATABASE_NAME: &str = "mediadupe.db";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MEDIADUPE_";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong type.
    #[error("Invalid configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("hash_size must be a positive multiple of 4, got {0}")]
    InvalidHashSize(u32),

    #[error("match_threshold must be at least 1")]
    InvalidThreshold,

    #[error("chunk_size must be at least 1")]
    InvalidChunkSize,

    #[error("idle_interval_secs must be a positive number, got {0}")]
    InvalidIdleInterval(f64),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory that stored object paths are relative to.
    pub base_dir: PathBuf,
    /// SQLite database; `<base_dir>/mediadupe.db` when unset.
    pub database: Option<PathBuf>,
    /// Difference-hash grid size.
    pub hash_size: u32,
    /// Exclusive Hamming-distance threshold.
    pub match_threshold: u32,
    /// Pause between sweep passes, in seconds.
    pub idle_interval_secs: f64,
    /// Read chunk for content hashing, in bytes.
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            database: None,
            hash_size: DEFAULT_HASH_SIZE,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            idle_interval_secs: 2.0,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// Load and validate the layered configuration.
    ///
    /// `path` overrides the platform default file. A missing file is not an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path).extract().map_err(Box::new)?;
        config.validate()?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// The provider stack behind [`Config::load`].
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = path.map(Path::to_path_buf).or_else(Self::default_path);
        if let Some(file) = file {
            log::trace!("Config file: {}", file.display());
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// `config.toml` in the platform-specific config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "mediadupe", "mediadupe")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject values the sweep cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hash_size == 0 || self.hash_size % 4 != 0 {
            return Err(ConfigError::InvalidHashSize(self.hash_size));
        }
        if self.match_threshold == 0 {
            return Err(ConfigError::InvalidThreshold);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        if !self.idle_interval_secs.is_finite() || self.idle_interval_secs <= 0.0 {
            return Err(ConfigError::InvalidIdleInterval(self.idle_interval_secs));
        }
        Ok(())
    }

    /// The database path, defaulting to a file under `base_dir`.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.base_dir.join(DEFAULT_DATABASE_NAME))
    }

    #[must_use]
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs_f64(self.idle_interval_secs)
    }

    #[must_use]
    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions::default()
            .with_hash_size(self.hash_size)
            .with_match_threshold(self.match_threshold)
            .with_idle_interval(self.idle_interval())
            .with_chunk_size(self.chunk_size)
    }

    /// The configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
