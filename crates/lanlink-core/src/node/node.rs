//! Node implementation

use crate::PeerId;
use crate::action::Action;
use crate::handler::TransportHandler;
use crate::node::config::NodeConfig;
use crate::node::error::{NodeError, Result};
use crate::node::event_loop::{Command, run_event_loop};
use crate::tunnel::{PeerInfo, Tunnel};
use lanlink_transport::{Transport, UdpTransport};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Handles to a running event loop
pub(crate) struct EventLoopHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Tunnel>,
    transport: Arc<UdpTransport>,
}

/// Node inner state
pub(crate) struct NodeInner {
    /// Node configuration
    pub(crate) config: NodeConfig,
    /// Node running state
    pub(crate) running: AtomicBool,
    /// Tunnel while the node is stopped; the event loop owns it otherwise
    pub(crate) parked: Mutex<Option<Tunnel>>,
    /// Running event loop
    pub(crate) event_loop: Mutex<Option<EventLoopHandle>>,
}

/// LANLINK relay node
///
/// Cheap to clone; clones drive the same tunnel. Every call is forwarded to
/// the event loop task, which owns the tunnel exclusively.
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Arc<NodeInner>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Constructors
// ═══════════════════════════════════════════════════════════════════════════

impl Node {
    /// Create a stopped node
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidConfig`] if the configuration is unusable
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let tunnel = Tunnel::new(config.tunnel.clone(), config.listen_addr.port());

        let inner = NodeInner {
            config,
            running: AtomicBool::new(false),
            parked: Mutex::new(Some(tunnel)),
            event_loop: Mutex::new(None),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Node configuration
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Register the receiver of delivered payloads
    ///
    /// Works on a stopped node too; the handler survives restarts.
    ///
    /// # Errors
    /// Returns [`NodeError::Channel`] if the event loop is gone
    pub async fn set_handler<H: TransportHandler + 'static>(&self, handler: H) -> Result<()> {
        {
            let mut parked = self.inner.parked.lock().await;
            if let Some(tunnel) = parked.as_mut() {
                tunnel.set_handler(handler);
                return Ok(());
            }
        }
        let handler: Box<dyn TransportHandler> = Box::new(handler);
        self.call(move |tunnel, _| tunnel.set_boxed_handler(handler))
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Lifecycle Methods
// ═══════════════════════════════════════════════════════════════════════════

impl Node {
    /// Bind the socket and spawn the event loop
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidState`] if already running, or
    /// [`NodeError::TransportInit`] if the socket cannot be bound
    pub async fn start(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NodeError::invalid_state("Node already running"));
        }

        tracing::info!("Starting node on {}", self.inner.config.listen_addr);

        let transport =
            match UdpTransport::bind(self.inner.config.listen_addr, &self.inner.config.transport)
                .await
            {
                Ok(transport) => Arc::new(transport),
                Err(e) => {
                    self.inner.running.store(false, Ordering::SeqCst);
                    return Err(e.into());
                }
            };

        let Some(tunnel) = self.inner.parked.lock().await.take() else {
            self.inner.running.store(false, Ordering::SeqCst);
            return Err(NodeError::invalid_state("Tunnel unavailable"));
        };

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_event_loop(
            tunnel,
            Arc::clone(&transport),
            commands_rx,
            shutdown_rx,
        ));
        *self.inner.event_loop.lock().await = Some(EventLoopHandle {
            commands,
            shutdown,
            task,
            transport: Arc::clone(&transport),
        });

        tracing::info!("Node started on {}", transport.local_addr()?);
        Ok(())
    }

    /// Stop the event loop and close the socket
    ///
    /// Peer state is kept; a restarted node resumes with the same tunnel.
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidState`] if not running, or
    /// [`NodeError::TaskJoin`] if the event loop panicked
    pub async fn stop(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NodeError::invalid_state("Node not running"));
        }

        let Some(handle) = self.inner.event_loop.lock().await.take() else {
            return Err(NodeError::invalid_state("Event loop not started"));
        };
        let _ = handle.shutdown.send(());
        let tunnel = handle
            .task
            .await
            .map_err(|e| NodeError::TaskJoin(e.to_string().into()))?;
        *self.inner.parked.lock().await = Some(tunnel);

        if let Err(e) = handle.transport.close().await {
            tracing::warn!("Error closing transport: {}", e);
        }

        tracing::info!("Node stopped");
        Ok(())
    }

    /// Check if node is running
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Bound socket address
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidState`] if the node is not running
    pub async fn local_addr(&self) -> Result<SocketAddr> {
        let guard = self.inner.event_loop.lock().await;
        match guard.as_ref() {
            Some(handle) => Ok(handle.transport.local_addr()?),
            None => Err(NodeError::invalid_state("Node not running")),
        }
    }

    /// Run `f` on the tunnel inside the event loop and return its result.
    ///
    /// Datagrams queued by `f` are sent before the loop waits again.
    async fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Tunnel, Instant) -> R + Send + 'static,
    {
        let commands = match self.inner.event_loop.lock().await.as_ref() {
            Some(handle) => handle.commands.clone(),
            None => return Err(NodeError::invalid_state("Node not running")),
        };

        let (reply, response) = oneshot::channel();
        let command: Command = Box::new(move |tunnel: &mut Tunnel, now: Instant| {
            let _ = reply.send(f(tunnel, now));
        });
        commands
            .send(command)
            .map_err(|_| NodeError::channel("Event loop stopped"))?;
        response
            .await
            .map_err(|_| NodeError::channel("Event loop dropped reply"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Peer Methods
// ═══════════════════════════════════════════════════════════════════════════

impl Node {
    /// Register a peer and greet it
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidState`] if the node is not running
    pub async fn connect_to_peer(&self, address: IpAddr, port: u16, peer_id: PeerId) -> Result<()> {
        self.call(move |tunnel, now| tunnel.connect_to_peer(address, port, peer_id, now))
            .await
    }

    /// Register the coordinating peer and greet it
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidState`] if the node is not running
    pub async fn join_game(&self, address: IpAddr, port: u16, peer_id: PeerId) -> Result<()> {
        self.call(move |tunnel, now| tunnel.join_game(address, port, peer_id, now))
            .await
    }

    /// Drop a peer and all its state
    ///
    /// # Errors
    /// Returns [`NodeError::PeerNotFound`] if the peer was not connected
    pub async fn disconnect_from_peer(&self, peer_id: PeerId) -> Result<()> {
        if self
            .call(move |tunnel, _| tunnel.disconnect_from_peer(peer_id))
            .await?
        {
            Ok(())
        } else {
            Err(NodeError::PeerNotFound(peer_id))
        }
    }

    /// Send a payload to a peer
    ///
    /// Forwarding to a peer that is not connected, for instance one torn
    /// down as dead, is logged and otherwise ignored.
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidState`] if the node is not running
    pub async fn forward_data(&self, peer_id: PeerId, action: Action, data: &[u8]) -> Result<()> {
        let data = data.to_vec();
        self.call(move |tunnel, now| tunnel.forward_data(peer_id, action, &data, now))
            .await
    }

    /// Ping every peer now instead of waiting for the ping timer
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidState`] if the node is not running
    pub async fn send_ping_to_peers(&self) -> Result<()> {
        self.call(|tunnel, now| tunnel.send_ping_to_peers(now)).await
    }

    /// Last RTT in milliseconds of every peer that has one
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidState`] if the node is not running
    pub async fn get_ping_to_peers(&self) -> Result<HashMap<PeerId, u64>> {
        self.call(|tunnel, _| tunnel.get_ping_to_peers()).await
    }

    /// Confirmed packet size of a peer
    ///
    /// # Errors
    /// Returns [`NodeError::PeerNotFound`] for an unknown peer
    pub async fn max_packet_size_for_peer(&self, peer_id: PeerId) -> Result<u32> {
        self.call(move |tunnel, _| tunnel.max_packet_size_for_peer(peer_id))
            .await?
            .ok_or(NodeError::PeerNotFound(peer_id))
    }

    /// Coordinating peer, if joined
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidState`] if the node is not running
    pub async fn coordinator(&self) -> Result<Option<PeerId>> {
        self.call(|tunnel, _| tunnel.coordinator()).await
    }

    /// Connected peer ids
    ///
    /// # Errors
    /// Returns [`NodeError::InvalidState`] if the node is not running
    pub async fn peer_ids(&self) -> Result<Vec<PeerId>> {
        self.call(|tunnel, _| tunnel.peer_ids()).await
    }

    /// Snapshot of one peer link
    ///
    /// # Errors
    /// Returns [`NodeError::PeerNotFound`] for an unknown peer
    pub async fn peer_info(&self, peer_id: PeerId) -> Result<PeerInfo> {
        self.call(move |tunnel, _| tunnel.peer_info(peer_id))
            .await?
            .ok_or(NodeError::PeerNotFound(peer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ChannelHandler;
    use crate::node::TunnelConfig;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn loopback_config() -> NodeConfig {
        NodeConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            tunnel: TunnelConfig {
                auto_discovery: false,
                ..TunnelConfig::default()
            },
            ..NodeConfig::default()
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = loopback_config();
        config.tunnel.max_resend_rate = 0;
        assert!(matches!(Node::new(config), Err(NodeError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_stop() {
        let node = Node::new(loopback_config()).unwrap();
        assert!(!node.is_running());
        assert!(node.local_addr().await.is_err());

        node.start().await.unwrap();
        assert!(node.is_running());
        assert_ne!(node.local_addr().await.unwrap().port(), 0);
        assert!(matches!(
            node.start().await,
            Err(NodeError::InvalidState(_))
        ));

        node.stop().await.unwrap();
        assert!(!node.is_running());
        assert!(matches!(node.stop().await, Err(NodeError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_calls_require_running() {
        let node = Node::new(loopback_config()).unwrap();
        let result = node
            .connect_to_peer(IpAddr::V4(Ipv4Addr::LOCALHOST), 9, 1)
            .await;
        assert!(matches!(result, Err(NodeError::InvalidState(_))));
        assert!(node.peer_ids().await.is_err());
    }

    #[tokio::test]
    async fn test_peers_survive_restart() {
        let node = Node::new(loopback_config()).unwrap();
        node.start().await.unwrap();
        node.connect_to_peer(IpAddr::V4(Ipv4Addr::LOCALHOST), 9, 1)
            .await
            .unwrap();
        node.stop().await.unwrap();

        node.start().await.unwrap();
        assert_eq!(node.peer_ids().await.unwrap(), vec![1]);
        node.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let node = Node::new(loopback_config()).unwrap();
        node.start().await.unwrap();

        // forwarding to an unknown peer is a logged no-op
        node.forward_data(4, Action::TcpData, b"x").await.unwrap();
        assert!(matches!(
            node.disconnect_from_peer(4).await,
            Err(NodeError::PeerNotFound(4))
        ));
        assert!(node.max_packet_size_for_peer(4).await.is_err());
        assert!(node.peer_info(4).await.is_err());
        node.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_loopback_exchange() {
        let a = Node::new(loopback_config()).unwrap();
        let b = Node::new(loopback_config()).unwrap();
        let (handler, mut rx) = ChannelHandler::new();
        b.set_handler(handler).await.unwrap();
        a.start().await.unwrap();
        b.start().await.unwrap();

        let a_addr = a.local_addr().await.unwrap();
        let b_addr = b.local_addr().await.unwrap();
        b.connect_to_peer(a_addr.ip(), a_addr.port(), 1).await.unwrap();
        a.join_game(b_addr.ip(), b_addr.port(), 2).await.unwrap();
        assert_eq!(a.coordinator().await.unwrap(), Some(2));

        let payload = vec![0x5A; 1500];
        a.forward_data(2, Action::TcpData, &payload).await.unwrap();

        let mut got = Vec::new();
        while got.len() < 2 {
            let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            got.push(delivery);
        }
        assert_eq!(got[0].action, Action::Hello);
        assert_eq!(got[1].action, Action::TcpData);
        assert_eq!(got[1].peer_id, 1);
        assert_eq!(got[1].data, payload);

        a.stop().await.unwrap();
        b.stop().await.unwrap();
    }
}
