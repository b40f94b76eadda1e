//! Configuration file for the LANLINK relay.

use lanlink_core::node::{DEFAULT_PORT, NodeConfig, TunnelConfig};
use lanlink_core::PeerId;
use lanlink_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Socket configuration
    #[serde(default)]
    pub node: NodeSection,
    /// Tunnel tuning
    #[serde(default)]
    pub tunnel: TunnelSection,
    /// Peers to register at startup
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Socket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Kernel receive buffer size
    #[serde(default = "default_buffer_size")]
    pub recv_buffer_size: usize,
    /// Kernel send buffer size
    #[serde(default = "default_buffer_size")]
    pub send_buffer_size: usize,
}

/// Tunnel tuning; durations in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSection {
    pub resend_interval_ms: u64,
    pub resend_request_interval_ms: u64,
    pub ping_interval_ms: u64,
    pub dead_peer_timeout_ms: u64,
    pub initial_resend_timeout_ms: u64,
    pub max_resend_timeout_ms: u64,
    pub rtt_margin_ms: u64,
    pub rtt_window: usize,
    pub max_resend_batch: usize,
    pub max_resend_requests: usize,
    pub max_resend_rate: u32,
    pub ack_halving_threshold: u32,
    pub proactive_repetition: bool,
    pub probe_floor: u32,
    pub probe_ceiling: u32,
    pub max_packet_size: u32,
    pub probe_growth: f64,
    pub probe_rounds: u32,
    pub duplicate_window: usize,
    pub duplicate_expiry_ms: u64,
    pub auto_discovery: bool,
}

/// A peer registered at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerEntry {
    /// Peer id assigned by the signalling layer
    pub id: PeerId,
    /// Reachable address
    pub address: String,
    /// Reachable port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Join this peer's game instead of plainly connecting
    #[serde(default)]
    pub coordinator: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_listen_addr() -> String {
    format!("0.0.0.0:{DEFAULT_PORT}")
}

fn default_buffer_size() -> usize {
    TransportConfig::default().recv_buffer_size
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            recv_buffer_size: default_buffer_size(),
            send_buffer_size: default_buffer_size(),
        }
    }
}

impl Default for TunnelSection {
    fn default() -> Self {
        Self::from(&TunnelConfig::default())
    }
}

impl From<&TunnelConfig> for TunnelSection {
    fn from(c: &TunnelConfig) -> Self {
        Self {
            resend_interval_ms: millis(c.resend_interval),
            resend_request_interval_ms: millis(c.resend_request_interval),
            ping_interval_ms: millis(c.ping_interval),
            dead_peer_timeout_ms: millis(c.dead_peer_timeout),
            initial_resend_timeout_ms: millis(c.initial_resend_timeout),
            max_resend_timeout_ms: millis(c.max_resend_timeout),
            rtt_margin_ms: millis(c.rtt_margin),
            rtt_window: c.rtt_window,
            max_resend_batch: c.max_resend_batch,
            max_resend_requests: c.max_resend_requests,
            max_resend_rate: c.max_resend_rate,
            ack_halving_threshold: c.ack_halving_threshold,
            proactive_repetition: c.proactive_repetition,
            probe_floor: c.probe_floor,
            probe_ceiling: c.probe_ceiling,
            max_packet_size: c.max_packet_size,
            probe_growth: c.probe_growth,
            probe_rounds: c.probe_rounds,
            duplicate_window: c.duplicate_window,
            duplicate_expiry_ms: millis(c.duplicate_expiry),
            auto_discovery: c.auto_discovery,
        }
    }
}

impl From<&TunnelSection> for TunnelConfig {
    fn from(s: &TunnelSection) -> Self {
        Self {
            resend_interval: Duration::from_millis(s.resend_interval_ms),
            resend_request_interval: Duration::from_millis(s.resend_request_interval_ms),
            ping_interval: Duration::from_millis(s.ping_interval_ms),
            dead_peer_timeout: Duration::from_millis(s.dead_peer_timeout_ms),
            initial_resend_timeout: Duration::from_millis(s.initial_resend_timeout_ms),
            max_resend_timeout: Duration::from_millis(s.max_resend_timeout_ms),
            rtt_margin: Duration::from_millis(s.rtt_margin_ms),
            rtt_window: s.rtt_window,
            max_resend_batch: s.max_resend_batch,
            max_resend_requests: s.max_resend_requests,
            max_resend_rate: s.max_resend_rate,
            ack_halving_threshold: s.ack_halving_threshold,
            proactive_repetition: s.proactive_repetition,
            probe_floor: s.probe_floor,
            probe_ceiling: s.probe_ceiling,
            max_packet_size: s.max_packet_size,
            probe_growth: s.probe_growth,
            probe_rounds: s.probe_rounds,
            duplicate_window: s.duplicate_window,
            duplicate_expiry: Duration::from_millis(s.duplicate_expiry_ms),
            auto_discovery: s.auto_discovery,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PeerEntry {
    /// Parse the configured address
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not an IP address.
    pub fn ip(&self) -> anyhow::Result<IpAddr> {
        self.address
            .parse()
            .map_err(|_| anyhow::anyhow!("Peer {} has invalid address: {}", self.id, self.address))
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Render as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Parse listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_listen_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.node.listen_addr.parse()?)
    }

    /// Build the node configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address is invalid.
    pub fn node_config(&self) -> anyhow::Result<NodeConfig> {
        Ok(NodeConfig {
            listen_addr: self.parse_listen_addr()?,
            transport: TransportConfig {
                recv_buffer_size: self.node.recv_buffer_size,
                send_buffer_size: self.node.send_buffer_size,
            },
            tunnel: TunnelConfig::from(&self.tunnel),
        })
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.node_config()?.validate()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        let mut ids = HashSet::new();
        for peer in &self.peers {
            peer.ip()?;
            if !ids.insert(peer.id) {
                anyhow::bail!("Peer {} listed more than once", peer.id);
            }
        }

        if self.peers.iter().filter(|p| p.coordinator).count() > 1 {
            anyhow::bail!("At most one peer can be the coordinator");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.parse_listen_addr().unwrap().port(), DEFAULT_PORT);
        assert_eq!(config.node_config().unwrap().tunnel, TunnelConfig::default());
    }

    #[test]
    fn test_parse_file() {
        let text = r#"
            [node]
            listen_addr = "127.0.0.1:5000"

            [tunnel]
            dead_peer_timeout_ms = 60000
            duplicate_expiry_ms = 250
            auto_discovery = false

            [[peers]]
            id = 2
            address = "192.168.1.20"
            coordinator = true

            [[peers]]
            id = 3
            address = "10.0.0.7"
            port = 6000

            [logging]
            level = "debug"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        config.validate().unwrap();

        let node = config.node_config().unwrap();
        assert_eq!(node.listen_addr.port(), 5000);
        assert_eq!(node.tunnel.dead_peer_timeout, Duration::from_secs(60));
        assert_eq!(node.tunnel.duplicate_expiry, Duration::from_millis(250));
        assert!(!node.tunnel.auto_discovery);
        assert_eq!(node.tunnel.max_resend_rate, 3);

        assert_eq!(config.peers[0].port, DEFAULT_PORT);
        assert!(config.peers[0].coordinator);
        assert_eq!(config.peers[1].ip().unwrap(), "10.0.0.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.validate().is_ok());
        assert!(config.peers.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = Config::default();
        config.peers.push(PeerEntry {
            id: 9,
            address: "127.0.0.1".to_string(),
            port: 7000,
            coordinator: false,
        });
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.peers, config.peers);
        assert_eq!(parsed.tunnel.ping_interval_ms, 2000);
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.node.listen_addr = "nowhere".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tunnel.resend_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tunnel.probe_ceiling = 4096;
        assert!(config.validate().is_err());

        let peer = |id, coordinator| PeerEntry {
            id,
            address: "127.0.0.1".to_string(),
            port: 7000,
            coordinator,
        };
        let mut config = Config::default();
        config.peers = vec![peer(1, false), peer(1, false)];
        assert!(config.validate().is_err());

        config.peers = vec![peer(1, true), peer(2, true)];
        assert!(config.validate().is_err());

        config.peers = vec![PeerEntry {
            address: "host.example".to_string(),
            ..peer(3, false)
        }];
        assert!(config.validate().is_err());
    }
}
