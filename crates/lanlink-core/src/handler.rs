//! Delivery of received payloads to the bridge.
//!
//! The tunnel calls exactly one [`TransportHandler`] for every reliable
//! payload it reassembles and every best-effort payload that passes the
//! duplicate filter. Closures implement the trait directly; the
//! [`ChannelHandler`] forwards deliveries to an async consumer.

use crate::PeerId;
use crate::action::Action;
use tokio::sync::mpsc;
use tracing::trace;

/// Receiver of delivered payloads
pub trait TransportHandler: Send {
    /// Called once per delivered payload
    fn on_payload(&mut self, action: Action, peer_id: PeerId, data: &[u8]);
}

impl<F> TransportHandler for F
where
    F: FnMut(Action, PeerId, &[u8]) + Send,
{
    fn on_payload(&mut self, action: Action, peer_id: PeerId, data: &[u8]) {
        self(action, peer_id, data);
    }
}

/// An owned delivered payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Terminal action of the payload
    pub action: Action,
    /// Sending peer
    pub peer_id: PeerId,
    /// Reassembled bytes
    pub data: Vec<u8>,
}

/// Handler that forwards deliveries over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelHandler {
    /// Create the handler and the receiving end of its channel
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TransportHandler for ChannelHandler {
    fn on_payload(&mut self, action: Action, peer_id: PeerId, data: &[u8]) {
        let delivery = Delivery {
            action,
            peer_id,
            data: data.to_vec(),
        };
        if self.tx.send(delivery).is_err() {
            trace!("Delivery receiver dropped, discarding payload from peer {}", peer_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_handler() {
        let mut seen = Vec::new();
        {
            let mut handler = |action: Action, peer_id: PeerId, data: &[u8]| {
                seen.push((action, peer_id, data.to_vec()));
            };
            handler.on_payload(Action::TcpData, 4, b"abc");
        }
        assert_eq!(seen, vec![(Action::TcpData, 4, b"abc".to_vec())]);
    }

    #[test]
    fn test_channel_handler() {
        let (mut handler, mut rx) = ChannelHandler::new();
        handler.on_payload(Action::UdpData, 2, &[1, 2, 3]);

        let delivery = rx.try_recv().unwrap();
        assert_eq!(
            delivery,
            Delivery {
                action: Action::UdpData,
                peer_id: 2,
                data: vec![1, 2, 3],
            }
        );
    }

    #[test]
    fn test_channel_handler_receiver_dropped() {
        let (mut handler, rx) = ChannelHandler::new();
        drop(rx);
        handler.on_payload(Action::UdpData, 2, &[1]);
    }
}
