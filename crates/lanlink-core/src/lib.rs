//! # LANLINK Core
//!
//! Reliable-delivery tunnel between pairs of LANLINK relays.
//!
//! This crate provides:
//! - Datagram header and action codes
//! - Per-peer sequenced send and receive buffers
//! - Duplicate suppression for best-effort traffic
//! - Adaptive resend rate and RTT-derived resend timeouts
//! - Packet-size discovery doubling as a liveness ping
//! - [`Tunnel`], a sans-IO state machine tying the above together
//! - [`Node`](node::Node), the tokio driver that owns a UDP socket and a tunnel
//!
//! ## Datagram layout
//!
//! ```text
//! lightweight (action < 0x10)   ┌────────┬────────────────────┐
//!                               │ action │ opaque bytes       │
//!                               └────────┴────────────────────┘
//! buffered (action >= 0x10)     ┌────────┬──────────┬─────────┐
//!                               │ action │ seq (LE) │ bytes   │
//!                               │ 1 byte │ 4 bytes  │         │
//!                               └────────┴──────────┴─────────┘
//! ```
//!
//! Payload bytes are opaque here; game semantics live in `lanlink-codec`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod buffer;
pub mod dedup;
pub mod error;
pub mod handler;
pub mod node;
pub mod peer;
pub mod probe;
pub mod routing;
pub mod stats;
pub mod tunnel;

pub use action::{Action, Datagram};
pub use buffer::{DataBuffer, Payload};
pub use dedup::DuplicateFilter;
pub use error::PacketError;
pub use handler::{ChannelHandler, Delivery, TransportHandler};
pub use node::{Node, NodeConfig, NodeError, TunnelConfig};
pub use probe::PacketSizeDiscovery;
pub use routing::{PeerTable, Route};
pub use stats::ResendStats;
pub use tunnel::{PeerInfo, Transmit, Tunnel};

/// Peer identifier assigned by the signalling layer
pub type PeerId = u32;
