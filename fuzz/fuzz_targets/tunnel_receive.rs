//! Fuzz target for the tunnel receive path
//!
//! Feeds a sequence of arbitrary datagrams from a connected peer and checks
//! that the tunnel neither panics nor stops answering.

#![no_main]

use arbitrary::Arbitrary;
use lanlink_core::{Tunnel, TunnelConfig};
use libfuzzer_sys::fuzz_target;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Arbitrary)]
struct Input {
    datagrams: Vec<Vec<u8>>,
    ticks: u8,
}

fuzz_target!(|input: Input| {
    let peer = SocketAddr::from(([10, 0, 0, 2], 47624));
    let mut tunnel = Tunnel::new(TunnelConfig::default(), 47624);
    let mut now = Instant::now();
    tunnel.connect_to_peer(peer.ip(), peer.port(), 2, now);

    for datagram in &input.datagrams {
        tunnel.handle_datagram(peer, datagram, now);
    }
    tunnel.finish_receive();

    for _ in 0..input.ticks {
        now += Duration::from_millis(100);
        tunnel.on_resend_timer(now);
        tunnel.on_resend_request_timer();
    }
    tunnel.on_ping_timer(now);
    let _ = tunnel.drain_transmits().count();
});
