//! Node configuration

use crate::action::BUFFERED_HEADER_SIZE;
use crate::node::error::{NodeError, Result};
use crate::stats::ResendPolicy;
use lanlink_transport::{MAX_DATAGRAM_SIZE, TransportConfig};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::time::Duration;

/// Default relay port
pub const DEFAULT_PORT: u16 = 47624;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Local UDP address
    pub listen_addr: SocketAddr,

    /// Socket configuration
    pub transport: TransportConfig,

    /// Tunnel timers and tuning
    pub tunnel: TunnelConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            transport: TransportConfig::default(),
            tunnel: TunnelConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Check the configuration for values the tunnel cannot run with
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidConfig`] naming the first bad field
    pub fn validate(&self) -> Result<()> {
        self.tunnel.validate()
    }
}

/// Tunnel timers and tuning constants.
///
/// The defaults match the deployed relays; changing them changes how a node
/// behaves towards peers running the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelConfig {
    /// Resend sweep period
    pub resend_interval: Duration,

    /// Period after which resend requests are allowed again
    pub resend_request_interval: Duration,

    /// Liveness ping period
    pub ping_interval: Duration,

    /// Silence after which a peer is torn down
    pub dead_peer_timeout: Duration,

    /// Resend timeout before any RTT sample
    pub initial_resend_timeout: Duration,

    /// Upper bound of the resend timeout
    pub max_resend_timeout: Duration,

    /// Margin added to the scaled RTT
    pub rtt_margin: Duration,

    /// RTT samples kept per peer
    pub rtt_window: usize,

    /// Retransmissions per peer per sweep
    pub max_resend_batch: usize,

    /// Resend requests per gap
    pub max_resend_requests: usize,

    /// Upper bound of the adaptive resend rate
    pub max_resend_rate: u32,

    /// Ack count above which send/ack counters are halved
    pub ack_halving_threshold: u32,

    /// Repeat best-effort payloads by the resend rate
    pub proactive_repetition: bool,

    /// Fragment size used until discovery confirms more
    pub probe_floor: u32,

    /// Largest size probed
    pub probe_ceiling: u32,

    /// Largest probe this node acknowledges
    pub max_packet_size: u32,

    /// Geometric step between probe sizes
    pub probe_growth: f64,

    /// Discovery rounds per peer
    pub probe_rounds: u32,

    /// Best-effort payload digests remembered
    pub duplicate_window: usize,

    /// How long a best-effort digest suppresses identical payloads
    pub duplicate_expiry: Duration,

    /// Probe packet sizes on connect and on ping ticks
    pub auto_discovery: bool,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_millis(100),
            resend_request_interval: Duration::from_millis(500),
            ping_interval: Duration::from_secs(2),
            dead_peer_timeout: Duration::from_secs(180), // 3 minutes
            initial_resend_timeout: Duration::from_secs(1),
            max_resend_timeout: Duration::from_secs(2),
            rtt_margin: Duration::from_millis(30),
            rtt_window: 16,
            max_resend_batch: 16,
            max_resend_requests: 8,
            max_resend_rate: 3,
            ack_halving_threshold: 32,
            proactive_repetition: true,
            probe_floor: 512,
            probe_ceiling: 1400,
            max_packet_size: 1400,
            probe_growth: 1.2,
            probe_rounds: 3,
            duplicate_window: 256,
            duplicate_expiry: Duration::from_secs(1),
            auto_discovery: true,
        }
    }
}

impl TunnelConfig {
    /// Resend statistics tuning derived from this configuration
    #[must_use]
    pub fn resend_policy(&self) -> ResendPolicy {
        ResendPolicy {
            max_resend_rate: self.max_resend_rate,
            ack_halving_threshold: self.ack_halving_threshold,
            rtt_window: self.rtt_window,
            initial_resend_timeout: self.initial_resend_timeout,
            max_resend_timeout: self.max_resend_timeout,
            rtt_margin: self.rtt_margin,
        }
    }

    /// Check the configuration for values the tunnel cannot run with
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidConfig`] naming the first bad field
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: &'static str) -> Result<()> {
            Err(NodeError::InvalidConfig(Cow::Borrowed(msg)))
        }

        if self.resend_interval.is_zero()
            || self.resend_request_interval.is_zero()
            || self.ping_interval.is_zero()
        {
            return invalid("timer intervals must be non-zero");
        }
        if self.max_resend_timeout < self.initial_resend_timeout {
            return invalid("max_resend_timeout must not be below initial_resend_timeout");
        }
        if self.probe_floor == 0 {
            return invalid("probe_floor must be non-zero");
        }
        if self.probe_ceiling < self.probe_floor {
            return invalid("probe_ceiling must not be below probe_floor");
        }
        // a probe of size S is S + BUFFERED_HEADER_SIZE bytes on the wire
        let largest = self.probe_ceiling.max(self.max_packet_size) as usize;
        if largest + BUFFERED_HEADER_SIZE > MAX_DATAGRAM_SIZE {
            return invalid("probe_ceiling and max_packet_size must fit the receive buffer");
        }
        if !(self.probe_growth > 1.0) {
            return invalid("probe_growth must be greater than 1");
        }
        if self.max_resend_rate == 0 {
            return invalid("max_resend_rate must be at least 1");
        }
        if self.rtt_window == 0 || self.duplicate_window == 0 {
            return invalid("rtt_window and duplicate_window must be non-zero");
        }
        if self.max_resend_batch == 0 {
            return invalid("max_resend_batch must be non-zero");
        }
        if self.duplicate_expiry.is_zero() {
            return invalid("duplicate_expiry must be non-zero");
        }
        Ok(())
    }
}
