//! Transport trait abstraction.
//!
//! The node driver owns exactly one [`Transport`]. It awaits readiness with
//! [`Transport::recv_from`], then drains the socket with
//! [`Transport::try_recv_from`] and flushes its transmit queue with
//! [`Transport::try_send_to`], so no await point separates two datagrams of
//! the same burst.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport is closed
    #[error("Transport is closed")]
    Closed,

    /// Address binding failed
    #[error("Failed to bind to address: {0}")]
    BindFailed(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Async datagram transport.
///
/// # Examples
///
/// ```no_run
/// use lanlink_transport::{Transport, UdpTransport, TransportConfig};
/// use std::net::SocketAddr;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let addr: SocketAddr = "127.0.0.1:47624".parse()?;
/// let transport = UdpTransport::bind(addr, &TransportConfig::default()).await?;
///
/// transport.send_to(&[0x01, 0xAA], "127.0.0.1:47625".parse()?).await?;
///
/// let mut buf = vec![0u8; 2048];
/// let (size, from) = transport.recv_from(&mut buf).await?;
/// println!("Received {} bytes from {}", size, from);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a datagram, waiting for socket capacity.
    ///
    /// # Errors
    /// Returns `TransportError` if the send fails or the transport is closed
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize>;

    /// Wait for the next datagram.
    ///
    /// # Errors
    /// Returns `TransportError` if the receive fails or the transport is closed
    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)>;

    /// Send without waiting. `Ok(None)` means the socket would block and
    /// the datagram was not sent.
    ///
    /// # Errors
    /// Returns `TransportError` on any other failure
    fn try_send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<Option<usize>>;

    /// Receive without waiting. `Ok(None)` means nothing is pending.
    ///
    /// # Errors
    /// Returns `TransportError` on any other failure
    fn try_recv_from(&self, buf: &mut [u8]) -> TransportResult<Option<(usize, SocketAddr)>>;

    /// Local address this transport is bound to.
    ///
    /// # Errors
    /// Returns `TransportError` if the address cannot be determined
    fn local_addr(&self) -> TransportResult<SocketAddr>;

    /// Close the transport. Later operations return [`TransportError::Closed`].
    ///
    /// # Errors
    /// Returns `TransportError` if closing fails
    async fn close(&self) -> TransportResult<()>;

    /// Check if the transport is closed.
    fn is_closed(&self) -> bool;

    /// Snapshot of the transport counters.
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total datagrams sent
    pub packets_sent: u64,
    /// Total datagrams received
    pub packets_received: u64,
    /// Send errors
    pub send_errors: u64,
    /// Receive errors
    pub recv_errors: u64,
    /// Datagrams dropped because the socket would block
    pub send_would_block: u64,
}

impl TransportStats {
    /// Create new empty statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful send
    pub fn record_send(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.packets_sent += 1;
    }

    /// Record a successful receive
    pub fn record_recv(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.packets_received += 1;
    }

    /// Record a send error
    pub fn record_send_error(&mut self) {
        self.send_errors += 1;
    }

    /// Record a receive error
    pub fn record_recv_error(&mut self) {
        self.recv_errors += 1;
    }
}
