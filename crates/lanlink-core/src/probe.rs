//! Packet-size discovery.
//!
//! A probe of size `S` is a `PACKSIZE_TEST` datagram whose body is
//! `{ size: u32 LE, crc32: u32 LE, fill: [u8; S - 4] }`, so it occupies as
//! many bytes on the wire as a buffered fragment carrying `S` payload bytes.
//! The receiver answers a valid probe no larger than its own limit with
//! `PACKSIZE_ACK { size: u32 LE }`. A probe of [`PING_SIZE`] carries no fill
//! and serves as the periodic ping.

use crate::error::PacketError;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Smallest probe; used as the liveness ping
pub const PING_SIZE: u32 = 4;

/// Bytes before the fill (size + crc)
const PROBE_PREFIX: usize = 8;

/// Bytes of a probe ack body
pub const PROBE_ACK_SIZE: usize = 4;

fn probe_fill(size: u32) -> Vec<u8> {
    (0..size.saturating_sub(PING_SIZE))
        .map(|i| i.wrapping_mul(31).wrapping_add(size) as u8)
        .collect()
}

/// Build the body of a probe of `size` (at least [`PING_SIZE`])
#[must_use]
pub fn encode_probe(size: u32) -> Vec<u8> {
    let size = size.max(PING_SIZE);
    let fill = probe_fill(size);
    let mut body = Vec::with_capacity(PROBE_PREFIX + fill.len());
    body.extend_from_slice(&size.to_le_bytes());
    body.extend_from_slice(&crc32fast::hash(&fill).to_le_bytes());
    body.extend_from_slice(&fill);
    body
}

/// Validate a probe body and return its size
///
/// # Errors
/// Returns [`PacketError`] for a truncated body, a size field that
/// disagrees with the body length, or a CRC mismatch.
pub fn decode_probe(body: &[u8]) -> Result<u32, PacketError> {
    if body.len() < PROBE_PREFIX {
        return Err(PacketError::TooShort {
            expected: PROBE_PREFIX,
            actual: body.len(),
        });
    }

    let size = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    let carried = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
    let fill = &body[PROBE_PREFIX..];

    if size < PING_SIZE || fill.len() != (size - PING_SIZE) as usize {
        return Err(PacketError::ProbeSizeMismatch {
            declared: size,
            actual: body.len() - PING_SIZE as usize,
        });
    }

    let computed = crc32fast::hash(fill);
    if computed != carried {
        return Err(PacketError::ProbeChecksum { carried, computed });
    }
    Ok(size)
}

/// Build the body of a probe ack
#[must_use]
pub fn encode_probe_ack(size: u32) -> [u8; PROBE_ACK_SIZE] {
    size.to_le_bytes()
}

/// Read the size from a probe ack body
///
/// # Errors
/// Returns [`PacketError::TooShort`] for fewer than four bytes
pub fn decode_probe_ack(body: &[u8]) -> Result<u32, PacketError> {
    match body.get(..PROBE_ACK_SIZE) {
        Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(PacketError::TooShort {
            expected: PROBE_ACK_SIZE,
            actual: body.len(),
        }),
    }
}

/// Probe sizes from `floor` growing by `growth` up to `ceiling`.
///
/// Strictly increasing and always ends with `ceiling`.
#[must_use]
pub fn probe_schedule(floor: u32, ceiling: u32, growth: f64) -> Vec<u32> {
    let mut sizes = Vec::new();
    let mut size = floor;
    while size < ceiling {
        sizes.push(size);
        let grown = (f64::from(size) * growth) as u32;
        size = grown.max(size + 1);
    }
    sizes.push(ceiling);
    sizes
}

/// Outcome of a probe ack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeAck {
    /// Round trip of the acknowledged probe, if it was outstanding
    pub rtt: Option<Duration>,
    /// Whether the confirmed size increased
    pub raised: bool,
}

/// Per-peer discovery state
#[derive(Debug, Clone)]
pub struct PacketSizeDiscovery {
    schedule: Vec<u32>,
    confirmed: u32,
    rounds_sent: u32,
    max_rounds: u32,
    outstanding: HashMap<u32, Instant>,
}

impl PacketSizeDiscovery {
    /// Start at `floor`, probing up to `ceiling`, at most `max_rounds` times
    #[must_use]
    pub fn new(floor: u32, ceiling: u32, growth: f64, max_rounds: u32) -> Self {
        Self {
            schedule: probe_schedule(floor, ceiling, growth),
            confirmed: floor,
            rounds_sent: 0,
            max_rounds,
            outstanding: HashMap::new(),
        }
    }

    /// Largest size confirmed by the peer (the floor until then)
    #[must_use]
    pub fn confirmed(&self) -> u32 {
        self.confirmed
    }

    /// Number of discovery rounds sent so far
    #[must_use]
    pub fn rounds_sent(&self) -> u32 {
        self.rounds_sent
    }

    /// Whether another round would probe anything
    #[must_use]
    pub fn has_remaining_sizes(&self) -> bool {
        self.rounds_sent < self.max_rounds && self.schedule.iter().any(|&s| s > self.confirmed)
    }

    /// Sizes to probe in the next round, or nothing once rounds run out
    pub fn next_round(&mut self) -> Vec<u32> {
        if !self.has_remaining_sizes() {
            return Vec::new();
        }
        self.rounds_sent += 1;
        self.schedule
            .iter()
            .copied()
            .filter(|&s| s > self.confirmed)
            .collect()
    }

    /// Remember when a probe of `size` left
    pub fn mark_sent(&mut self, size: u32, now: Instant) {
        self.outstanding.insert(size, now);
    }

    /// Apply an ack for `size`. The confirmed size only ever grows.
    pub fn on_ack(&mut self, size: u32, now: Instant) -> ProbeAck {
        let rtt = self
            .outstanding
            .remove(&size)
            .map(|sent| now.saturating_duration_since(sent));
        let raised = size > self.confirmed;
        if raised {
            self.confirmed = size;
        }
        ProbeAck { rtt, raised }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_roundtrip() {
        for size in [PING_SIZE, 5, 512, 1400] {
            let body = encode_probe(size);
            assert_eq!(body.len(), size as usize + 4);
            assert_eq!(decode_probe(&body), Ok(size));
        }
    }

    #[test]
    fn test_ping_body() {
        let body = encode_probe(PING_SIZE);
        assert_eq!(body.len(), 8);
        assert_eq!(&body[..4], &[4, 0, 0, 0]);
        assert_eq!(&body[4..], &crc32fast::hash(&[]).to_le_bytes());
    }

    #[test]
    fn test_fill_pattern() {
        let body = encode_probe(10);
        assert_eq!(&body[8..], &[10, 41, 72, 103, 134, 165]);
    }

    #[test]
    fn test_probe_corrupt() {
        let mut body = encode_probe(600);
        body[100] ^= 0xFF;
        assert!(matches!(
            decode_probe(&body),
            Err(PacketError::ProbeChecksum { .. })
        ));
    }

    #[test]
    fn test_probe_truncated() {
        let body = encode_probe(600);
        assert!(matches!(
            decode_probe(&body[..300]),
            Err(PacketError::ProbeSizeMismatch { declared: 600, .. })
        ));
        assert!(matches!(
            decode_probe(&body[..5]),
            Err(PacketError::TooShort { .. })
        ));
    }

    #[test]
    fn test_probe_ack() {
        assert_eq!(decode_probe_ack(&encode_probe_ack(1234)), Ok(1234));
        assert!(decode_probe_ack(&[1, 2]).is_err());
    }

    #[test]
    fn test_schedule() {
        assert_eq!(
            probe_schedule(512, 1400, 1.2),
            vec![512, 614, 736, 883, 1059, 1270, 1400]
        );
        assert_eq!(probe_schedule(1400, 1400, 1.2), vec![1400]);
        assert_eq!(probe_schedule(10, 13, 1.0), vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_confirmed_never_lowers() {
        let mut discovery = PacketSizeDiscovery::new(512, 1400, 1.2, 3);
        let now = Instant::now();
        assert_eq!(discovery.confirmed(), 512);

        assert!(discovery.on_ack(883, now).raised);
        assert!(!discovery.on_ack(614, now).raised);
        assert_eq!(discovery.confirmed(), 883);
    }

    #[test]
    fn test_rounds_bounded() {
        let mut discovery = PacketSizeDiscovery::new(512, 1400, 1.2, 2);
        assert_eq!(discovery.next_round(), vec![614, 736, 883, 1059, 1270, 1400]);

        let now = Instant::now();
        discovery.on_ack(1059, now);
        assert_eq!(discovery.next_round(), vec![1270, 1400]);
        assert!(!discovery.has_remaining_sizes());
        assert!(discovery.next_round().is_empty());
        assert_eq!(discovery.rounds_sent(), 2);
    }

    #[test]
    fn test_no_rounds_at_ceiling() {
        let mut discovery = PacketSizeDiscovery::new(512, 1400, 1.2, 3);
        discovery.on_ack(1400, Instant::now());
        assert!(!discovery.has_remaining_sizes());
        assert!(discovery.next_round().is_empty());
    }

    #[test]
    fn test_ack_rtt() {
        let mut discovery = PacketSizeDiscovery::new(512, 1400, 1.2, 3);
        let start = Instant::now();
        discovery.mark_sent(PING_SIZE, start);
        let ack = discovery.on_ack(PING_SIZE, start + Duration::from_millis(40));
        assert_eq!(ack.rtt, Some(Duration::from_millis(40)));
        assert!(!ack.raised);

        // a second ack for the same probe carries no sample
        let ack = discovery.on_ack(PING_SIZE, start + Duration::from_millis(50));
        assert_eq!(ack.rtt, None);
    }
}
