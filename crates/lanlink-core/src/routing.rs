//! Peer routing table.
//!
//! Maps peer ids to the address they are reached at, and incoming source
//! addresses back to peer ids. This table is the only place a datagram's
//! sender is resolved; nothing is inferred from socket state.
//!
//! ```text
//!   outgoing: PeerId ──▶ Route { local_port, addr }
//!   incoming: SocketAddr ──▶ PeerId
//! ```

use crate::PeerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Where a peer is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Local UDP port traffic to this peer leaves from
    pub local_port: u16,
    /// Remote address of the peer's relay
    pub addr: SocketAddr,
}

/// Bidirectional peer id ↔ address table
#[derive(Debug, Default)]
pub struct PeerTable {
    routes: HashMap<PeerId, Route>,
    by_addr: HashMap<SocketAddr, PeerId>,
}

impl PeerTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the route of `peer_id`.
    ///
    /// Returns the previous route. If `addr` was routed to another peer, that
    /// peer loses its reverse mapping and no longer receives datagrams.
    pub fn insert(&mut self, peer_id: PeerId, local_port: u16, addr: SocketAddr) -> Option<Route> {
        let previous = self.remove(peer_id);

        if let Some(other) = self.by_addr.insert(addr, peer_id) {
            warn!(
                "Address {} moved from peer {} to peer {}",
                addr, other, peer_id
            );
        }
        self.routes.insert(peer_id, Route { local_port, addr });
        debug!("Adding route: peer {} -> {} (port {})", peer_id, addr, local_port);
        previous
    }

    /// Remove the route of `peer_id`
    pub fn remove(&mut self, peer_id: PeerId) -> Option<Route> {
        let route = self.routes.remove(&peer_id)?;
        if self.by_addr.get(&route.addr) == Some(&peer_id) {
            self.by_addr.remove(&route.addr);
        }
        debug!("Removed route: peer {} -> {}", peer_id, route.addr);
        Some(route)
    }

    /// Route of `peer_id`
    #[must_use]
    pub fn lookup(&self, peer_id: PeerId) -> Option<&Route> {
        self.routes.get(&peer_id)
    }

    /// Peer sending from `addr`
    #[must_use]
    pub fn peer_for(&self, addr: &SocketAddr) -> Option<PeerId> {
        self.by_addr.get(addr).copied()
    }

    /// Routed peer ids, in no particular order
    pub fn peer_ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.routes.keys().copied()
    }

    /// Number of routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Remove every route
    pub fn clear(&mut self) {
        self.routes.clear();
        self.by_addr.clear();
    }
}
