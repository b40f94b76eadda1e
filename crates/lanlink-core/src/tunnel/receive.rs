//! Inbound datagram handling.

use super::{Tunnel, retransmit};
use crate::PeerId;
use crate::action::{Action, Datagram};
use crate::dedup::payload_key;
use crate::probe::{decode_probe, decode_probe_ack, encode_probe_ack};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

impl Tunnel {
    /// Process one datagram received from `from`.
    ///
    /// Datagrams from unregistered addresses and malformed datagrams are
    /// logged and dropped. Call [`finish_receive`](Self::finish_receive)
    /// after a burst of datagrams to issue resend requests for any gaps.
    pub fn handle_datagram(&mut self, from: SocketAddr, data: &[u8], now: Instant) {
        let Some(peer_id) = self.routes.peer_for(&from) else {
            warn!("Dropping {} bytes from unregistered address {}", data.len(), from);
            return;
        };
        let datagram = match Datagram::parse(data) {
            Ok(datagram) => datagram,
            Err(e) => {
                warn!("Dropping malformed datagram from peer {}: {}", peer_id, e);
                return;
            }
        };

        match datagram.action {
            Action::UdpData | Action::Enum => {
                self.receive_best_effort(peer_id, datagram.action, datagram.body, now)
            }
            Action::TcpAck | Action::TcpResend | Action::PacksizeTest | Action::PacksizeAck => {
                self.receive_control(peer_id, &datagram, now)
            }
            _ => self.receive_buffered(peer_id, &datagram),
        }
    }

    fn receive_best_effort(&mut self, peer_id: PeerId, action: Action, body: &[u8], now: Instant) {
        if self
            .duplicates
            .check_and_insert(payload_key(peer_id, action, body), now)
        {
            self.dispatch(action, peer_id, body);
        } else {
            trace!("Suppressed duplicate {:?} from peer {}", action, peer_id);
        }
    }

    fn receive_control(&mut self, peer_id: PeerId, datagram: &Datagram<'_>, now: Instant) {
        let Some(peer) = self.peers.get_mut(&peer_id) else {
            return;
        };
        let seq = datagram.seq;

        match datagram.action {
            Action::TcpAck => {
                if !peer.send_buffer.ack(seq) {
                    trace!("Ack for seq {} from peer {} already settled", seq, peer_id);
                }
                peer.stats.record_ack();
                peer.stats.mark_alive(now);
            }
            Action::TcpResend => {
                if retransmit(peer, &mut self.outbox, seq, now) {
                    trace!("Resent seq {} to peer {} on request", seq, peer_id);
                } else {
                    debug!("Resend request for seq {} from peer {} no longer held", seq, peer_id);
                }
            }
            Action::PacksizeTest => match decode_probe(datagram.body) {
                Ok(size) if size <= self.config.max_packet_size => {
                    self.outbox.push(
                        peer.addr,
                        Datagram::encode(Action::PacksizeAck, 0, &encode_probe_ack(size)),
                    );
                }
                Ok(size) => debug!(
                    "Ignoring probe of {} bytes from peer {} (limit {})",
                    size, peer_id, self.config.max_packet_size
                ),
                Err(e) => warn!("Invalid probe from peer {}: {}", peer_id, e),
            },
            Action::PacksizeAck => match decode_probe_ack(datagram.body) {
                Ok(size) => {
                    let ack = peer.discovery.on_ack(size, now);
                    if let Some(rtt) = ack.rtt {
                        peer.stats.add_rtt_sample(rtt);
                    }
                    peer.stats.mark_alive(now);
                    if ack.raised {
                        info!("Peer {} packet size raised to {}", peer_id, size);
                    }
                }
                Err(e) => warn!("Invalid probe ack from peer {}: {}", peer_id, e),
            },
            other => debug!("Unexpected control action {:?} from peer {}", other, peer_id),
        }
    }

    fn receive_buffered(&mut self, peer_id: PeerId, datagram: &Datagram<'_>) {
        let Some(peer) = self.peers.get_mut(&peer_id) else {
            return;
        };

        if datagram.action == Action::Hello && datagram.seq == 0 {
            let token = link_token(datagram.body);
            if !peer.recv_buffer.has_released() {
                peer.remote_link = token;
            } else if token.is_some() && token != peer.remote_link {
                let discarded = peer.restart_link(token);
                info!(
                    "Peer {} re-registered this node, link restarted ({} unacked fragments discarded)",
                    peer_id, discarded
                );
            }
        }

        if !peer
            .recv_buffer
            .insert(datagram.seq, datagram.action, datagram.body.to_vec())
        {
            trace!("Duplicate seq {} from peer {}", datagram.seq, peer_id);
        }
        // Always ack: the previous ack may have been lost
        self.outbox.push(
            peer.addr,
            Datagram::encode(Action::TcpAck, datagram.seq, &[]),
        );

        let mut completed = Vec::new();
        while let Some(payload) = peer.recv_buffer.pop() {
            if payload.action == Action::Hello {
                // the body is the sender's link token, not payload
                completed.push((Action::Hello, Vec::new()));
                continue;
            }
            peer.reassembly.extend_from_slice(&payload.data);
            if payload.action != Action::More {
                completed.push((payload.action, std::mem::take(&mut peer.reassembly)));
            }
        }

        if !self.gap_checks.contains(&peer_id) {
            self.gap_checks.push(peer_id);
        }
        for (action, data) in completed {
            self.dispatch(action, peer_id, &data);
        }
    }

    /// Request resends for gaps left by the datagrams just processed.
    ///
    /// At most one batch of requests goes out per peer until
    /// [`on_resend_request_timer`](Self::on_resend_request_timer) re-enables
    /// them.
    pub fn finish_receive(&mut self) {
        for peer_id in std::mem::take(&mut self.gap_checks) {
            let Some(peer) = self.peers.get_mut(&peer_id) else {
                continue;
            };
            if !peer.resend_requests_enabled {
                continue;
            }
            let mut last = None;
            for seq in peer
                .recv_buffer
                .missing()
                .take(self.config.max_resend_requests)
            {
                self.outbox
                    .push(peer.addr, Datagram::encode(Action::TcpResend, seq, &[]));
                last = Some(seq);
            }
            if let Some(last) = last {
                debug!(
                    "Requested resend of seq {}..={} from peer {}",
                    peer.recv_buffer.next_expected_pop_seq(),
                    last,
                    peer_id
                );
                peer.stats.note_resend_request(last);
                peer.resend_requests_enabled = false;
            }
        }
    }
}

/// Link token carried in a `HELLO` body, if any
fn link_token(body: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = body.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}
