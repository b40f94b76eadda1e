//! Sans-IO tunnel state machine.
//!
//! [`Tunnel`] holds every peer link of a node and implements sequencing,
//! fragmentation, acknowledgement, resend, duplicate suppression and
//! packet-size discovery without touching a socket or a clock. The driver:
//!
//! 1. feeds received datagrams to [`Tunnel::handle_datagram`] and calls
//!    [`Tunnel::finish_receive`] once the socket is drained,
//! 2. calls the timer hooks on their intervals,
//! 3. sends whatever [`Tunnel::drain_transmits`] yields.
//!
//! Every time-dependent call takes `now`, so tests can drive the tunnel with
//! a simulated clock.
//!
//! ```text
//!  forward_data ──▶ fragment ──▶ send buffer ──▶ outbox ──▶ driver
//!                                    ▲  ack / resend
//!  driver ──▶ handle_datagram ───────┤
//!                                    └──▶ recv buffer ──▶ reassembly ──▶ handler
//! ```

mod receive;
mod timers;

use crate::PeerId;
use crate::action::{Action, Datagram};
use crate::dedup::DuplicateFilter;
use crate::handler::TransportHandler;
use crate::node::TunnelConfig;
use crate::peer::Peer;
use crate::routing::PeerTable;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace, warn};

/// A datagram the driver must send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    /// Remote address
    pub destination: SocketAddr,
    /// Full datagram including header
    pub contents: Vec<u8>,
}

/// Snapshot of one peer link
#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    /// Peer id
    pub peer_id: PeerId,
    /// Remote address
    pub addr: SocketAddr,
    /// Confirmed packet size
    pub max_packet_size: u32,
    /// Current adaptive resend rate
    pub resend_rate: u32,
    /// Current resend timeout
    pub resend_timeout: Duration,
    /// Last RTT sample
    pub rtt: Option<Duration>,
    /// Sent fragments awaiting acknowledgement
    pub unacked: usize,
    /// Received fragments held for in-order release
    pub held: usize,
}

/// Queue of outgoing datagrams
#[derive(Debug, Default)]
struct Outbox {
    queue: VecDeque<Transmit>,
}

impl Outbox {
    fn push(&mut self, destination: SocketAddr, contents: Vec<u8>) {
        self.queue.push_back(Transmit {
            destination,
            contents,
        });
    }
}

/// Link state of every peer of one node
pub struct Tunnel {
    config: TunnelConfig,
    local_port: u16,
    routes: PeerTable,
    peers: HashMap<PeerId, Peer>,
    coordinator: Option<PeerId>,
    handler: Option<Box<dyn TransportHandler>>,
    duplicates: DuplicateFilter,
    outbox: Outbox,
    gap_checks: Vec<PeerId>,
    next_link_token: u32,
}

impl Tunnel {
    /// Create a tunnel whose traffic leaves from `local_port`
    #[must_use]
    pub fn new(config: TunnelConfig, local_port: u16) -> Self {
        let duplicates = DuplicateFilter::new(config.duplicate_window, config.duplicate_expiry);
        Self {
            config,
            local_port,
            routes: PeerTable::new(),
            peers: HashMap::new(),
            coordinator: None,
            handler: None,
            duplicates,
            outbox: Outbox::default(),
            gap_checks: Vec::new(),
            next_link_token: initial_link_token(local_port),
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Register the receiver of delivered payloads, replacing any previous one
    pub fn set_handler<H: TransportHandler + 'static>(&mut self, handler: H) {
        self.handler = Some(Box::new(handler));
    }

    /// Register an already boxed handler
    pub fn set_boxed_handler(&mut self, handler: Box<dyn TransportHandler>) {
        self.handler = Some(handler);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Peer lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Register `peer_id` at `address:port` and greet it.
    ///
    /// An existing link for the same id is torn down first. A `HELLO` is
    /// queued immediately, followed by a discovery round when enabled. The
    /// `HELLO` body is a token unique to this registration; a peer that sees
    /// a new token at sequence 0 restarts its side of the link.
    pub fn connect_to_peer(&mut self, address: IpAddr, port: u16, peer_id: PeerId, now: Instant) {
        let addr = SocketAddr::new(address, port);
        if self.teardown(peer_id) {
            debug!("Re-registering peer {}, previous link discarded", peer_id);
        }

        self.routes.insert(peer_id, self.local_port, addr);
        self.peers
            .insert(peer_id, Peer::new(peer_id, addr, &self.config));
        info!("Connected to peer {} at {}", peer_id, addr);

        let token = self.next_link_token;
        self.next_link_token = token.wrapping_add(1);
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            let body = token.to_le_bytes().to_vec();
            let seq = peer.send_buffer.push_back(Action::Hello, body.clone(), now);
            self.outbox
                .push(peer.addr, Datagram::encode(Action::Hello, seq, &body));
            peer.stats.record_send();
        }
        if self.config.auto_discovery {
            self.start_discovery_round(peer_id, now);
        }
    }

    /// Connect to the peer hosting the game and mark it as coordinator
    pub fn join_game(&mut self, address: IpAddr, port: u16, peer_id: PeerId, now: Instant) {
        self.connect_to_peer(address, port, peer_id, now);
        self.coordinator = Some(peer_id);
        info!("Joined game coordinated by peer {}", peer_id);
    }

    /// Drop every trace of `peer_id`. Returns false if it was not connected.
    pub fn disconnect_from_peer(&mut self, peer_id: PeerId) -> bool {
        let existed = self.teardown(peer_id);
        if existed {
            info!("Disconnected from peer {}", peer_id);
        } else {
            debug!("Disconnect for unknown peer {}", peer_id);
        }
        existed
    }

    fn teardown(&mut self, peer_id: PeerId) -> bool {
        self.routes.remove(peer_id);
        if self.coordinator == Some(peer_id) {
            self.coordinator = None;
        }
        self.peers.remove(&peer_id).is_some()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sending
    // ═══════════════════════════════════════════════════════════════════════

    /// Send `data` to `peer_id`; delivery class follows from `action`.
    ///
    /// Reliable actions are fragmented, sequenced and kept until acknowledged.
    /// Best-effort actions are sent immediately, repeated by the peer's resend
    /// rate when proactive repetition is on. Control actions and unknown
    /// peers are logged and ignored.
    pub fn forward_data(&mut self, peer_id: PeerId, action: Action, data: &[u8], now: Instant) {
        if !action.is_reliable() && !action.is_best_effort() {
            warn!(
                "Refusing to forward control action {:?} to peer {}",
                action, peer_id
            );
            return;
        }
        let Some(peer) = self.peers.get_mut(&peer_id) else {
            warn!("forward_data to unknown peer {}, dropping {} bytes", peer_id, data.len());
            return;
        };

        if action.is_reliable() {
            send_fragments(peer, &mut self.outbox, action, data, now);
            return;
        }

        let copies = if self.config.proactive_repetition {
            peer.stats.resend_rate()
        } else {
            1
        };
        let datagram = Datagram::encode(action, 0, data);
        for _ in 1..copies {
            self.outbox.push(peer.addr, datagram.clone());
        }
        self.outbox.push(peer.addr, datagram);
        trace!(
            "Sent {:?} ({} bytes) to peer {} x{}",
            action,
            data.len(),
            peer_id,
            copies
        );
    }

    /// Next queued datagram
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.outbox.queue.pop_front()
    }

    /// Take every queued datagram
    pub fn drain_transmits(&mut self) -> impl Iterator<Item = Transmit> + '_ {
        self.outbox.queue.drain(..)
    }

    /// Whether datagrams are waiting to be sent
    #[must_use]
    pub fn has_transmits(&self) -> bool {
        !self.outbox.queue.is_empty()
    }

    fn dispatch(&mut self, action: Action, peer_id: PeerId, data: &[u8]) {
        match self.handler.as_mut() {
            Some(handler) => handler.on_payload(action, peer_id, data),
            None => debug!(
                "No handler registered, dropping {:?} from peer {}",
                action, peer_id
            ),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Confirmed packet size of `peer_id`
    #[must_use]
    pub fn max_packet_size_for_peer(&self, peer_id: PeerId) -> Option<u32> {
        self.peers.get(&peer_id).map(|p| p.discovery.confirmed())
    }

    /// Last RTT in milliseconds of every peer that has one
    #[must_use]
    pub fn get_ping_to_peers(&self) -> HashMap<PeerId, u64> {
        self.peers
            .iter()
            .filter_map(|(id, peer)| {
                peer.stats
                    .last_rtt()
                    .map(|rtt| (*id, rtt.as_millis() as u64))
            })
            .collect()
    }

    /// Peer designated by [`join_game`](Self::join_game)
    #[must_use]
    pub fn coordinator(&self) -> Option<PeerId> {
        self.coordinator
    }

    /// Connected peer ids in ascending order
    #[must_use]
    pub fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.routes.peer_ids().collect();
        ids.sort_unstable();
        ids
    }

    /// Whether `peer_id` is connected
    #[must_use]
    pub fn has_peer(&self, peer_id: PeerId) -> bool {
        self.peers.contains_key(&peer_id)
    }

    /// Snapshot of one peer link
    #[must_use]
    pub fn peer_info(&self, peer_id: PeerId) -> Option<PeerInfo> {
        self.peers.get(&peer_id).map(|peer| PeerInfo {
            peer_id,
            addr: peer.addr,
            max_packet_size: peer.discovery.confirmed(),
            resend_rate: peer.stats.resend_rate(),
            resend_timeout: peer.stats.resend_timeout(),
            rtt: peer.stats.last_rtt(),
            unacked: peer.send_buffer.len(),
            held: peer.recv_buffer.len(),
        })
    }
}

/// Starting point for the link tokens a tunnel hands out
fn initial_link_token(local_port: u16) -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&local_port.to_le_bytes());
    let digest = hasher.finalize();
    let mut token = [0u8; 4];
    token.copy_from_slice(&digest.as_bytes()[..4]);
    u32::from_le_bytes(token)
}

/// Split a reliable payload into fragments, buffer and queue each one
fn send_fragments(peer: &mut Peer, outbox: &mut Outbox, action: Action, data: &[u8], now: Instant) {
    let size = peer.fragment_size();
    let count = data.len().div_ceil(size).max(1);

    for index in 0..count {
        let start = index * size;
        let chunk = &data[start..(start + size).min(data.len())];
        let fragment_action = if index + 1 == count {
            action
        } else {
            Action::More
        };

        let seq = peer
            .send_buffer
            .push_back(fragment_action, chunk.to_vec(), now);
        outbox.push(peer.addr, Datagram::encode(fragment_action, seq, chunk));
        peer.stats.record_send();
    }

    trace!(
        "Queued {:?} ({} bytes, {} fragments) to peer {}",
        action,
        data.len(),
        count,
        peer.id
    );
}

/// Send a buffered fragment again. Returns false if it is no longer held.
fn retransmit(peer: &mut Peer, outbox: &mut Outbox, seq: u32, now: Instant) -> bool {
    let Some(payload) = peer.send_buffer.get(seq) else {
        return false;
    };
    outbox.push(
        peer.addr,
        Datagram::encode(payload.action, seq, &payload.data),
    );
    peer.send_buffer.mark_sent(seq, now);
    peer.stats.record_send();
    true
}
