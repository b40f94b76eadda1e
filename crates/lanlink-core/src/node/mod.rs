//! Node driver for the LANLINK tunnel
//!
//! [`Node`] owns a UDP socket and a [`Tunnel`](crate::Tunnel) and drives it
//! from a single tokio task: received datagrams, the resend sweep, the
//! resend-request re-enable timer, the ping timer and API commands all feed
//! the tunnel, and every datagram the tunnel queues is sent after each event.
//! The task owns the tunnel outright; API calls reach it over a channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Node API                      │
//! │  connect / join / forward / queries           │
//! ├──────────────────────────────────────────────┤
//! │  event loop: recv │ timers │ command channel  │
//! ├──────────────────────────────────────────────┤
//! │          Tunnel (sans-IO state)              │
//! ├──────────────────────────────────────────────┤
//! │          UdpTransport (tokio)                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lanlink_core::{Action, Node, NodeConfig};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = Node::new(NodeConfig::default())?;
//!     node.set_handler(|action: Action, peer: u32, data: &[u8]| {
//!         println!("{:?} from {}: {} bytes", action, peer, data.len());
//!     })
//!     .await?;
//!     node.start().await?;
//!
//!     node.join_game(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)), 47624, 2).await?;
//!     node.forward_data(2, Action::TcpData, b"hello").await?;
//!
//!     node.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
mod event_loop;
#[allow(clippy::module_inception)]
pub mod node;

pub use config::{DEFAULT_PORT, NodeConfig, TunnelConfig};
pub use error::NodeError;
pub use node::Node;
