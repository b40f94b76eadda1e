//! Fuzz target for smart framing and the packet pipeline
//!
//! Malformed subpacket runs must surface as errors, never panics.

#![no_main]

use lanlink_codec::{HEADER_SIZE, decode_packet, encode_packets, unsmartpak};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_packet(data);

    let Ok(uniform) = unsmartpak(data) else {
        return;
    };

    // a valid uniform record survives re-encoding under any budget
    let budget = 64 + usize::from(data.first().copied().unwrap_or(0)) * 4;
    if let Ok(records) = encode_packets(&uniform, budget) {
        let mut rebuilt = uniform[..HEADER_SIZE].to_vec();
        for record in &records {
            let decoded = decode_packet(record).expect("re-encoded record must decode");
            rebuilt.extend_from_slice(&decoded[HEADER_SIZE..]);
        }
        assert_eq!(&rebuilt[HEADER_SIZE..], &uniform[HEADER_SIZE..]);
    }
});
