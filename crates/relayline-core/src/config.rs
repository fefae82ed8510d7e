/*!
 * Configuration management for Relayline.
 *
 * This module loads the process configuration: logging, the bus connection
 * and the service options that shape how the engines behave. The response and
 * command tables themselves live in a separate JSON service definition that
 * `service.definition_file` points at.
 */
use std::path::Path;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Core configuration for Relayline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bus connection configuration
    #[serde(default)]
    pub bus: BusConfig,

    /// Service options
    #[serde(default)]
    pub service: ServiceConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// Which bus implementation to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// In-process loopback bus
    Memory,
    /// Redis publish/subscribe
    Redis,
}

/// Bus connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bus backend
    #[serde(default = "default_bus_backend")]
    pub backend: BusBackend,

    /// Broker URL (ignored by the memory backend)
    #[serde(default = "default_bus_url")]
    pub url: String,

    /// Prefix for generated client names
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Service options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Path to the JSON service definition (name, commands, responses)
    #[serde(default = "default_definition_file")]
    pub definition_file: String,

    /// Emit per-message diagnostics
    #[serde(default)]
    pub debug: bool,

    /// Honour `useHex` on definitions
    #[serde(default = "default_true")]
    pub supports_hex: bool,

    /// Include `published` and `origin` in outgoing envelopes
    #[serde(default = "default_true")]
    pub envelope_has_metadata: bool,

    /// Strip the service name prefix from incoming channel names
    #[serde(default)]
    pub channel_prefix_stripping: bool,

    /// Separator between the service name and the channel when stripping
    #[serde(default = "default_channel_prefix_separator")]
    pub channel_prefix_separator: String,
}

impl Config {
    /// Check cross-field constraints the deserializer cannot express
    pub fn validate(&self) -> Result<()> {
        if self.bus.backend == BusBackend::Redis && self.bus.url.trim().is_empty() {
            return Err(Error::config("bus.url must be set for the redis backend"));
        }
        if self.service.channel_prefix_stripping && self.service.channel_prefix_separator.is_empty()
        {
            return Err(Error::config(
                "service.channel_prefix_separator must not be empty when prefix stripping is enabled",
            ));
        }
        if self.service.definition_file.trim().is_empty() {
            return Err(Error::config("service.definition_file must be set"));
        }
        Ok(())
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: default_environment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: default_bus_backend(),
            url: default_bus_url(),
            client_id_prefix: default_client_id_prefix(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            definition_file: default_definition_file(),
            debug: false,
            supports_hex: true,
            envelope_has_metadata: true,
            channel_prefix_stripping: false,
            channel_prefix_separator: default_channel_prefix_separator(),
        }
    }
}

fn default_app_name() -> String {
    "relayline".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bus_backend() -> BusBackend {
    BusBackend::Redis
}

fn default_bus_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_client_id_prefix() -> String {
    "relayline-".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_definition_file() -> String {
    "./service.json".to_string()
}

fn default_channel_prefix_separator() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        let mut config_builder = ConfigLib::builder();

        // Start with default values
        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }
}
