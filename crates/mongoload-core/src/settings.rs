//! Process-wide settings for mongoload
//!
//! Settings are read once at startup and treated as immutable afterwards.
//! Sources, lowest to highest precedence:
//! - Hardcoded defaults
//! - Config file specified by the MONGOLOAD_CONFIG env var
//! - ./config/mongoload.{yaml,toml,json}
//! - Environment variables (MONGOLOAD__DB_NAME=orders)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

const LOCAL_CONFIG: &str = "./config/mongoload";

/// Root settings structure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    /// Connection string of the target cluster
    pub cluster_url: String,

    /// Working database every worker uses
    pub db_name: String,

    /// Number of logical collections each worker manages
    pub num_collections: usize,

    /// Number of documents sampled per collection during cache warm-up
    pub docs_to_cache: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster_url: "mongodb://localhost:27017".to_string(),
            db_name: "load_test".to_string(),
            num_collections: 1,
            docs_to_cache: 1000,
        }
    }
}

impl Settings {
    /// Load settings from defaults, config files and the environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MONGOLOAD_CONFIG").ok();
        Self::load_layered(config_path.as_deref(), LOCAL_CONFIG, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix("MONGOLOAD")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    fn load_layered(
        config_path: Option<&str>,
        local_config: &str,
        environment: Environment,
    ) -> Result<Self> {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Some(config_path) = config_path {
            builder = builder.add_source(File::with_name(config_path).required(false));
        }

        let settings: Settings = builder
            .add_source(File::with_name(local_config).required(false))
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Load settings from a specific file, falling back to defaults for missing keys.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings: Settings = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> std::result::Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError>
    {
        let defaults = Self::default();
        builder
            .set_default("cluster_url", defaults.cluster_url)?
            .set_default("db_name", defaults.db_name)?
            .set_default("num_collections", defaults.num_collections as u64)?
            .set_default("docs_to_cache", defaults.docs_to_cache as u64)
    }

    /// Validate settings values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.cluster_url.trim().is_empty() {
            return Err(ConfigError::Message("cluster_url must not be empty".to_string()));
        }

        if self.db_name.trim().is_empty() {
            return Err(ConfigError::Message("db_name must not be empty".to_string()));
        }

        if self.num_collections == 0 {
            return Err(ConfigError::Message("num_collections must be > 0".to_string()));
        }

        Ok(())
    }
}
