// src/config.rs
use serde::Deserialize;

use crate::error::Result;
use crate::middleware::profiler::{ProfilerConfig, DEFAULT_ADDRESS, DEFAULT_SERVICE};
use crate::skipper::SkipPaths;

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

/// StatsD / profiler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProfilerSettings {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_service")]
    pub service: String,
    /// Paths that are never timed, e.g. `/healthz`.
    #[serde(default)]
    pub skip_paths: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

/// Global configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub profiler: ProfilerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_port() -> u16 {
    3000
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            service: default_service(),
            skip_paths: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

/// Only the exact value `debug` turns on metric-name echoing.
pub fn is_debug_level(level: &str) -> bool {
    level == "debug"
}

impl Settings {
    /// Load config from `config/default.*`, `APP_*` variables and `LOG_LEVEL`
    pub fn from_env() -> Result<Self> {
        Self::load("config/default", std::env::var("LOG_LEVEL").ok())
    }

    /// Same as [`Settings::from_env`] with an explicit file and log level.
    pub fn load(file: &str, log_level: Option<String>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("profiler.skip_paths")
                    .try_parsing(true),
            )
            .set_override_option("logging.level", log_level)?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn is_debug(&self) -> bool {
        is_debug_level(&self.logging.level)
    }

    pub fn profiler_config(&self) -> ProfilerConfig {
        let mut config = ProfilerConfig::default()
            .address(self.profiler.address.clone())
            .service(self.profiler.service.clone())
            .debug(self.is_debug());

        if !self.profiler.skip_paths.is_empty() {
            config = config.skipper(SkipPaths::new(self.profiler.skip_paths.clone()));
        }
        config
    }
}
