//! # LANLINK Transport
//!
//! Datagram transport for the LANLINK relay.
//!
//! This crate provides:
//! - The [`Transport`] trait the node driver is written against
//! - [`UdpTransport`], a tokio UDP endpoint bound through `socket2`
//! - Non-blocking `try_*` calls so a caller can drain every pending datagram
//!   before yielding back to its event loop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod transport;
pub mod udp;

pub use transport::{Transport, TransportError, TransportResult, TransportStats};
pub use udp::UdpTransport;

/// Largest datagram the relay ever reads or writes
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Socket configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Kernel receive buffer size
    pub recv_buffer_size: usize,
    /// Kernel send buffer size
    pub send_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 256 * 1024,
            send_buffer_size: 256 * 1024,
        }
    }
}
