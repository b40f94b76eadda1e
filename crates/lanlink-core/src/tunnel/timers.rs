//! Periodic work: resend sweep, resend-request re-enable, pings and
//! discovery rounds.

use super::{Tunnel, retransmit};
use crate::PeerId;
use crate::action::{Action, Datagram};
use crate::probe::{PING_SIZE, encode_probe};
use std::time::Instant;
use tracing::{debug, info};

impl Tunnel {
    /// Retransmit unacknowledged fragments older than each peer's timeout.
    ///
    /// At most `max_resend_batch` fragments per peer are sent per call,
    /// oldest sequence first.
    pub fn on_resend_timer(&mut self, now: Instant) {
        let batch = self.config.max_resend_batch;

        for peer in self.peers.values_mut() {
            let timeout = peer.stats.resend_timeout();
            let due: Vec<u32> = peer
                .send_buffer
                .iter()
                .filter(|(_, payload)| {
                    payload
                        .sent_at
                        .is_none_or(|at| now.saturating_duration_since(at) >= timeout)
                })
                .map(|(seq, _)| seq)
                .take(batch)
                .collect();

            for seq in due {
                if peer.stats.note_timeout(seq) {
                    info!(
                        "Seq {} to peer {} unacknowledged after {:?}, resending",
                        seq, peer.id, timeout
                    );
                }
                retransmit(peer, &mut self.outbox, seq, now);
            }
        }
    }

    /// Allow every peer to send resend requests again
    pub fn on_resend_request_timer(&mut self) {
        for peer in self.peers.values_mut() {
            peer.resend_requests_enabled = true;
        }
    }

    /// Tear down silent peers, ping the rest and continue discovery
    pub fn on_ping_timer(&mut self, now: Instant) {
        let timeout = self.config.dead_peer_timeout;
        let dead: Vec<PeerId> = self
            .peers
            .values()
            .filter(|peer| peer.stats.is_dead(now, timeout))
            .map(|peer| peer.id)
            .collect();
        for peer_id in dead {
            info!("Peer {} silent for over {:?}, disconnecting", peer_id, timeout);
            self.teardown(peer_id);
        }

        self.send_ping_to_peers(now);

        if self.config.auto_discovery {
            let ids: Vec<PeerId> = self.peers.keys().copied().collect();
            for peer_id in ids {
                self.start_discovery_round(peer_id, now);
            }
        }
    }

    /// Send a ping probe to every peer
    pub fn send_ping_to_peers(&mut self, now: Instant) {
        let ping = Datagram::encode(Action::PacksizeTest, 0, &encode_probe(PING_SIZE));
        for peer in self.peers.values_mut() {
            self.outbox.push(peer.addr, ping.clone());
            peer.discovery.mark_sent(PING_SIZE, now);
            peer.stats.mark_probe_sent(now);
        }
    }

    /// Probe every size above the peer's confirmed size, if rounds remain
    pub(super) fn start_discovery_round(&mut self, peer_id: PeerId, now: Instant) {
        let Some(peer) = self.peers.get_mut(&peer_id) else {
            return;
        };
        let sizes = peer.discovery.next_round();
        if sizes.is_empty() {
            return;
        }

        debug!(
            "Discovery round {} to peer {}: {:?}",
            peer.discovery.rounds_sent(),
            peer_id,
            sizes
        );
        for size in sizes {
            self.outbox.push(
                peer.addr,
                Datagram::encode(Action::PacksizeTest, 0, &encode_probe(size)),
            );
            peer.discovery.mark_sent(size, now);
            peer.stats.mark_probe_sent(now);
        }
    }
}
