//! Fuzz target for datagram and probe header parsing

#![no_main]

use lanlink_core::Datagram;
use lanlink_core::probe::{decode_probe, decode_probe_ack};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(datagram) = Datagram::parse(data) {
        let encoded = Datagram::encode(datagram.action, datagram.seq, datagram.body);
        assert_eq!(encoded, data);
    }

    let _ = decode_probe(data);
    let _ = decode_probe_ack(data);
});
