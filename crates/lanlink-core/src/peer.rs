//! Per-peer link state.

use crate::PeerId;
use crate::buffer::DataBuffer;
use crate::node::TunnelConfig;
use crate::probe::PacketSizeDiscovery;
use crate::stats::ResendStats;
use std::net::SocketAddr;

/// Everything the tunnel knows about one peer.
///
/// Dropping a `Peer` discards its buffers, statistics and any partially
/// reassembled payload at once.
#[derive(Debug)]
pub struct Peer {
    /// Peer id
    pub id: PeerId,
    /// Remote address
    pub addr: SocketAddr,
    /// Sent payloads awaiting acknowledgement
    pub send_buffer: DataBuffer,
    /// Received payloads awaiting in-order release
    pub recv_buffer: DataBuffer,
    /// Resend accounting and liveness
    pub stats: ResendStats,
    /// Packet-size discovery
    pub discovery: PacketSizeDiscovery,
    /// Fragments of the payload being reassembled
    pub reassembly: Vec<u8>,
    /// Whether a gap may trigger resend requests right now
    pub resend_requests_enabled: bool,
    /// Link token of the peer's last accepted `HELLO`
    pub remote_link: Option<u32>,
}

impl Peer {
    /// Fresh link state for `id` at `addr`
    #[must_use]
    pub fn new(id: PeerId, addr: SocketAddr, config: &TunnelConfig) -> Self {
        Self {
            id,
            addr,
            send_buffer: DataBuffer::new(),
            recv_buffer: DataBuffer::new(),
            stats: ResendStats::new(config.resend_policy()),
            discovery: PacketSizeDiscovery::new(
                config.probe_floor,
                config.probe_ceiling,
                config.probe_growth,
                config.probe_rounds,
            ),
            reassembly: Vec::new(),
            resend_requests_enabled: true,
            remote_link: None,
        }
    }

    /// Start both sequence spaces over after the peer re-registered us.
    ///
    /// Unacknowledged and partially received payloads belong to the old
    /// link and are discarded. Returns how many sent fragments were dropped.
    pub fn restart_link(&mut self, remote_link: Option<u32>) -> usize {
        let discarded = self.send_buffer.len();
        self.send_buffer = DataBuffer::new();
        self.recv_buffer = DataBuffer::new();
        self.reassembly.clear();
        self.resend_requests_enabled = true;
        self.remote_link = remote_link;
        self.stats.restart_sequences();
        discarded
    }

    /// Payload bytes per fragment
    #[must_use]
    pub fn fragment_size(&self) -> usize {
        self.discovery.confirmed().max(1) as usize
    }
}
