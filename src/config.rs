//! Keyspace configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CassaError, CassaResult};
use crate::options::{Consistency, Options};

/// Main configuration, loaded from TOML.
///
/// ```toml
/// keyspace = "app"
/// debug = true
///
/// [defaults]
/// consistency = "local_quorum"
/// ttl_secs = 86400
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Keyspace every table is created in
    pub keyspace: String,

    /// Log dispatched statements at info level
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// Keyspace-level statement defaults. Absent keys stay unset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    pub consistency: Option<Consistency>,
    pub ttl_secs: Option<u64>,
    pub limit: Option<usize>,
}

impl DefaultsConfig {
    pub fn to_options(&self) -> Options {
        Options {
            consistency: self.consistency,
            ttl: self.ttl_secs.map(Duration::from_secs),
            limit: self.limit,
            ..Options::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keyspace: "cassa".to_string(),
            debug: false,
            defaults: DefaultsConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn from_toml_str(input: &str) -> CassaResult<Self> {
        toml::from_str(input).map_err(|e| CassaError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> CassaResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// `<config dir>/cassa/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cassa").join("config.toml"))
    }
}

/// Builder for Config
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the keyspace name
    pub fn keyspace(mut self, name: impl Into<String>) -> Self {
        self.config.keyspace = name.into();
        self
    }

    /// Toggle statement logging
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.config.defaults.consistency = Some(consistency);
        self
    }

    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.config.defaults.ttl_secs = Some(secs);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.config.defaults.limit = Some(limit);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}
