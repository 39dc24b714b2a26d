//! Server configuration.
//!
//! Configuration is layered:
//! - Built-in defaults
//! - TOML configuration file (first of `ama.toml`, `/etc/ama/ama.toml`,
//!   `~/.config/ama/ama.toml`)
//! - Environment variables (`AMA_PORT`, `AMA_BROADCAST__WORKERS`, ...)

use ama_core::{BroadcasterConfig, DispatcherConfig, RegistryConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Config file locations, in priority order.
const CONFIG_PATHS: [&str; 3] = ["ama.toml", "/etc/ama/ama.toml", "~/.config/ama/ama.toml"];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Fan-out configuration.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Subscriber registry configuration.
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path prefix of the subscription endpoint; the room ID follows it.
    #[serde(default = "default_subscribe_path")]
    pub subscribe_path: String,

    /// Maximum inbound WebSocket message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Time a single delivery may take before the subscriber is evicted.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    /// Number of broadcast workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Events that may wait for a worker before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Subscriber registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Drop a room's entry as soon as its last subscriber leaves.
    #[serde(default = "default_true")]
    pub prune_empty_rooms: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_subscribe_path() -> String {
    "/subscribe".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_send_timeout() -> u64 {
    5_000
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            broadcast: BroadcastConfig::default(),
            registry: RegistrySettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            subscribe_path: default_subscribe_path(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            prune_empty_rooms: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, then apply
    /// `AMA_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// override has the wrong type.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists())
        {
            info!("Loading configuration from {}", path);
            builder = builder.add_source(
                config::File::from(Path::new(&path)).format(config::FileFormat::Toml),
            );
        }

        builder
            .add_source(
                config::Environment::with_prefix("AMA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize::<Self>()
            .context("Failed to parse configuration")
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }

    /// Route of the subscription endpoint.
    #[must_use]
    pub fn subscribe_route(&self) -> String {
        format!(
            "{}/:room_id",
            self.transport.subscribe_path.trim_end_matches('/')
        )
    }

    /// Registry settings for the core.
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            prune_empty_rooms: self.registry.prune_empty_rooms,
        }
    }

    /// Broadcaster settings for the core.
    #[must_use]
    pub fn broadcaster_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            send_timeout: Duration::from_millis(self.broadcast.send_timeout_ms),
        }
    }

    /// Dispatcher settings for the core.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            workers: self.broadcast.workers,
            queue_capacity: self.broadcast.queue_capacity,
        }
    }
}
