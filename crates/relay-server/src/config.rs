//! Server configuration.
//!
//! Configuration can be loaded from:
//! - A YAML file given with `--config`
//! - `relay.yml` in one of the default locations
//! - Environment variables (RELAY_HOST, RELAY_PORT)
//!
//! Sections that belong to individual protocol clients (`network`,
//! `identity`, `channels`, `control_chars`, `rate_limiting`) are accepted
//! and ignored.

use anyhow::{Context, Result};
use relay_adapter::OutboxConfig;
use relay_core::{Capabilities, RulesConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file locations, in search order.
const CONFIG_PATHS: [&str; 3] = [
    "relay.yml",
    "/etc/relay/relay.yml",
    "~/.config/relay/relay.yml",
];

/// Relay configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP control and ingest listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Delivery queue defaults.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Protocol instances, keyed by the name rules refer to.
    #[serde(default)]
    pub protocols: BTreeMap<String, ProtocolConfig>,

    /// `protocol-support` and `rules`.
    #[serde(flatten)]
    pub relay: RulesConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Lines buffered per destination.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Pause between lines to one destination, in milliseconds.
    #[serde(default)]
    pub line_delay_ms: u64,

    /// How long shutdown waits for queued lines, in milliseconds.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,
}

/// One protocol instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    /// Protocol type, e.g. `irc`.
    #[serde(rename = "type")]
    pub protocol_type: String,

    /// Overrides `delivery.line_delay_ms` for this protocol.
    #[serde(default)]
    pub line_delay_ms: Option<u64>,

    /// Whether the protocol can address channels.
    #[serde(default = "default_true")]
    pub channels: bool,

    /// Whether the protocol can address users.
    #[serde(default = "default_true")]
    pub users: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("RELAY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("RELAY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    256
}

fn default_drain_timeout() -> u64 {
    5_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            line_delay_ms: 0,
            drain_timeout_ms: default_drain_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl ProtocolConfig {
    /// Capabilities advertised by this protocol's adapter.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            protocol_type: self.protocol_type.clone(),
            channels: self.channels,
            users: self.users,
        }
    }
}

impl Config {
    /// Find the configuration file to use.
    ///
    /// An explicit path wins; otherwise the first default location that
    /// exists. `None` means run with defaults.
    #[must_use]
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref()));
        }

        CONFIG_PATHS
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
            .find(|p| p.exists())
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

        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration YAML.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.server.host, self.server.port
                )
            })
    }

    /// Delivery queue settings.
    #[must_use]
    pub fn outbox_config(&self) -> OutboxConfig {
        OutboxConfig {
            queue_capacity: self.delivery.queue_capacity,
            line_delay: Duration::from_millis(self.delivery.line_delay_ms),
            protocol_line_delays: self
                .protocols
                .iter()
                .filter_map(|(name, p)| {
                    p.line_delay_ms
                        .map(|ms| (name.clone(), Duration::from_millis(ms)))
                })
                .collect(),
        }
    }

    /// How long shutdown waits for queued lines.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r##"
protocol-support:
  - irc
  - mumble

protocols:
  irc-esper:
    type: irc
    line_delay_ms: 500
  irc-archives:
    type: irc
  mumble:
    type: mumble
    users: false

network:
  address: irc.esper.net
  port: 6697
  ssl: true

rate_limiting:
  enabled: true
  line_delay: 0.1

rules:
  name1:
    from:
      protocol: irc-esper
      source: "#Ultros"
      source_type: channel
    to:
      protocol: irc-archives
      target: "#Ultros"
      target_type: channel
    formatting:
      general:
        join: "* {USER} joined {CHANNEL}"
        kick: "* {USER} was kicked from {CHANNEL} by {KICKER} ({MESSAGE})"
  name0:
    from:
      protocol: mumble
      source: Root
      source_type: channel
    to:
      protocol: irc-esper
      target: "#Ultros"
      target_type: channel
    formatting:
      mumble:
        connect: "* {USER} connected"
"##;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.protocols.is_empty());
        assert!(config.relay.rules.is_empty());
        assert!(!config.metrics.enabled);
        assert_eq!(config.delivery.queue_capacity, 256);
    }

    #[test]
    fn test_config_from_yaml() {
        let config = Config::from_yaml(EXAMPLE).unwrap();

        assert_eq!(config.relay.protocol_support, vec!["irc", "mumble"]);
        assert_eq!(config.protocols.len(), 3);
        assert!(!config.protocols["mumble"].capabilities().users);

        let names: Vec<_> = config.relay.rules.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["name1", "name0"]);
    }

    #[test]
    fn test_outbox_config() {
        let config = Config::from_yaml(EXAMPLE).unwrap();
        let outbox = config.outbox_config();

        assert_eq!(outbox.line_delay_for("irc-esper"), Duration::from_millis(500));
        assert_eq!(outbox.line_delay_for("mumble"), Duration::ZERO);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::from_yaml("server:\n  host: 0.0.0.0\n  port: 9000\n").unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 9000);

        let config = Config::from_yaml("server:\n  host: not a host\n  port: 9000\n").unwrap();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_locate_explicit_path() {
        let path = Config::locate(Some(Path::new("/tmp/relay-test.yml")));
        assert_eq!(path, Some(PathBuf::from("/tmp/relay-test.yml")));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml("protocols: [").is_err());
    }
}
