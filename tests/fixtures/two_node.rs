//! Two-node test fixture for integration testing
//!
//! Starts two real [`Node`]s on loopback with ephemeral ports and connects
//! them to each other. Deliveries of each node arrive on a channel.
//!
//! # Example
//!
//! ```no_run
//! use lanlink_core::Action;
//! use lanlink_integration_tests::fixtures::TwoNodeFixture;
//!
//! #[tokio::test]
//! async fn test_basic_exchange() {
//!     let mut fixture = TwoNodeFixture::new().await.unwrap();
//!     fixture.connect().await.unwrap();
//!
//!     fixture.first.forward_data(2, Action::TcpData, b"hi").await.unwrap();
//!     let delivery = fixture.next_second_delivery().await.unwrap();
//!
//!     fixture.cleanup().await.unwrap();
//! }
//! ```

use lanlink_core::{ChannelHandler, Delivery, Node, NodeConfig, NodeError, PeerId, TunnelConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Id under which the second node knows the first
pub const FIRST_ID: PeerId = 1;

/// Id under which the first node knows the second
pub const SECOND_ID: PeerId = 2;

/// How long to wait for a delivery
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Loopback config with an ephemeral port
pub fn loopback_config(tunnel: TunnelConfig) -> NodeConfig {
    NodeConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        tunnel,
        ..NodeConfig::default()
    }
}

/// Two started nodes and their delivery channels
pub struct TwoNodeFixture {
    pub first: Node,
    pub second: Node,
    pub first_addr: SocketAddr,
    pub second_addr: SocketAddr,
    first_rx: UnboundedReceiver<Delivery>,
    second_rx: UnboundedReceiver<Delivery>,
}

impl TwoNodeFixture {
    /// Start two nodes with the default tunnel configuration
    ///
    /// # Errors
    ///
    /// Returns `NodeError::TransportInit` if a socket cannot be bound.
    pub async fn new() -> Result<Self, NodeError> {
        Self::new_with_config(TunnelConfig::default(), TunnelConfig::default()).await
    }

    /// Start two nodes with custom tunnel configurations
    ///
    /// # Errors
    ///
    /// Returns `NodeError::TransportInit` if a socket cannot be bound, or
    /// `NodeError::InvalidConfig` for an unusable configuration.
    pub async fn new_with_config(
        first: TunnelConfig,
        second: TunnelConfig,
    ) -> Result<Self, NodeError> {
        let first = Node::new(loopback_config(first))?;
        let second = Node::new(loopback_config(second))?;

        let (handler, first_rx) = ChannelHandler::new();
        first.set_handler(handler).await?;
        let (handler, second_rx) = ChannelHandler::new();
        second.set_handler(handler).await?;

        first.start().await?;
        second.start().await?;

        Ok(Self {
            first_addr: first.local_addr().await?,
            second_addr: second.local_addr().await?,
            first,
            second,
            first_rx,
            second_rx,
        })
    }

    /// Register the nodes with each other; the first joins the second's game
    ///
    /// # Errors
    ///
    /// Returns an error if either node has stopped.
    pub async fn connect(&mut self) -> Result<(), NodeError> {
        self.second
            .connect_to_peer(self.first_addr.ip(), self.first_addr.port(), FIRST_ID)
            .await?;
        self.first
            .join_game(self.second_addr.ip(), self.second_addr.port(), SECOND_ID)
            .await
    }

    /// Next payload delivered to the first node
    pub async fn next_first_delivery(&mut self) -> Option<Delivery> {
        tokio::time::timeout(DELIVERY_TIMEOUT, self.first_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next payload delivered to the second node
    pub async fn next_second_delivery(&mut self) -> Option<Delivery> {
        tokio::time::timeout(DELIVERY_TIMEOUT, self.second_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Stop both nodes
    ///
    /// # Errors
    ///
    /// Returns an error if a node was not running.
    pub async fn cleanup(self) -> Result<(), NodeError> {
        self.first.stop().await?;
        self.second.stop().await
    }
}
