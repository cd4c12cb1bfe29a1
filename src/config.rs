//! Configuration loading and types for the provisioner.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct. Every section is optional and falls back to its
//! defaults, so an empty file is a valid configuration.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::Path;

use crate::lifecycle::ProvisionDefaults;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Cloud account defaults and backend selection.
    #[serde(default)]
    pub cloud: CloudConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Cloud storage settings.
///
/// `subscription_id`, `resource_group` and `location` are used when a
/// bucket class leaves them out.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    /// Storage backend: `memory`.
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub subscription_id: String,

    #[serde(default)]
    pub resource_group: String,

    #[serde(default = "default_location")]
    pub location: String,

    /// Blob endpoint suffix, e.g. `core.windows.net`.
    #[serde(default = "default_endpoint_suffix")]
    pub endpoint_suffix: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            subscription_id: String::new(),
            resource_group: String::new(),
            location: default_location(),
            endpoint_suffix: default_endpoint_suffix(),
        }
    }
}

impl CloudConfig {
    pub fn provision_defaults(&self) -> ProvisionDefaults {
        ProvisionDefaults {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            location: self.location.clone(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9300
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_location() -> String {
    "eastus".to_string()
}

fn default_endpoint_suffix() -> String {
    "core.windows.net".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

impl Config {
    /// Reject values the rest of the program cannot act on.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cloud.backend != "memory" {
            bail!("unsupported cloud.backend {:?}", self.cloud.backend);
        }
        if self.logging.format != "text" && self.logging.format != "json" {
            bail!("unsupported logging.format {:?}", self.logging.format);
        }
        if self.cloud.endpoint_suffix.is_empty() {
            bail!("cloud.endpoint_suffix must not be empty");
        }
        Ok(())
    }
}

/// Load, parse and validate configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&contents)?
    };
    config.validate()?;
    Ok(config)
}
