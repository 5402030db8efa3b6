//! Configuration loading and typed config structures for the Conquest core.
//!
//! The canonical configuration lives in `conquest-config.yaml` at the
//! project root. Every field has a serde default, so a partial file (or no
//! file at all) yields the standard rules.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use conquest_types::GovernmentType;
use conquest_warfare::WarfareConfig;

/// Environment variable that overrides `infrastructure.postgres_url`.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is unusable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `conquest-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConquestConfig {
    /// Rules for every warfare manager.
    #[serde(default)]
    pub warfare: WarfareConfig,

    /// Tick driver timing.
    #[serde(default)]
    pub tick: TickConfig,

    /// Storage connection settings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Nations seeded into the demo directory.
    #[serde(default)]
    pub nations: Vec<NationSeed>,
}

impl ConquestConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `DATABASE_URL` overrides `infrastructure.postgres_url` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let mut config = Self::default();
                config
                    .infrastructure
                    .apply_database_url(std::env::var(DATABASE_URL_ENV).ok());
                Ok(config)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML and
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config
            .infrastructure
            .apply_database_url(std::env::var(DATABASE_URL_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "tick.interval_secs",
                reason: "must be at least 1".to_owned(),
            });
        }
        if let Some(seed) = self.nations.iter().find(|n| n.name.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "nations.name",
                reason: format!("empty name for nation with power {}", seed.power),
            });
        }
        Ok(())
    }
}

/// Tick driver timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TickConfig {
    /// Seconds between ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub interval_secs: u64,
}

impl TickConfig {
    /// The tick period.
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_tick_interval_secs(),
        }
    }
}

/// Storage connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// `PostgreSQL` connection string. Without one the engine keeps
    /// everything in memory.
    #[serde(default)]
    pub postgres_url: Option<String>,

    /// Maximum pooled connections.
    #[serde(default)]
    pub max_connections: Option<u32>,
}

impl InfrastructureConfig {
    /// Replace the database URL with `url` when it is set and non-empty.
    pub fn apply_database_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.postgres_url = Some(url);
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// A nation to register in the demo directory at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NationSeed {
    /// Display name.
    pub name: String,

    /// Military power.
    #[serde(default)]
    pub power: Decimal,

    /// Opening treasury balance.
    #[serde(default)]
    pub balance: Decimal,

    /// Form of government.
    #[serde(default = "default_government")]
    pub government: GovernmentType,
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_tick_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_government() -> GovernmentType {
    GovernmentType::Monarchy
}
