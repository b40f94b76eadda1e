//! Smart tick framing.
//!
//! Consecutive [`UNIT_STATE`] subpackets carry tick counters that increase by
//! one. The compact form drops those counters:
//!
//! | Marker | Bytes | Meaning |
//! |---|---|---|
//! | [`TICK_START`] | `fe <u32 tick>` | next unit state has this tick |
//! | [`TICK_CONTINUE`] | `fd <u16 len> <payload>` | unit state, tick = previous + 1 |
//! | [`TICK_SHORTHAND`] | `ff` | idle unit state `2c 0b 00 <tick> ff ff 01 00` |
//!
//! [`unsmartpak`] restores the uniform sequence, [`smartpak`] elides it and
//! [`resmartpak`] additionally keeps every compressed output under a size
//! budget by bisecting the subpacket run.

use crate::compress::compress;
use crate::error::CodecError;
use crate::subpacket::{
    ELIDED_TICK_LEN, MIN_UNIT_STATE_LEN, Subpackets, TICK_CONTINUE, TICK_SHORTHAND, TICK_START,
    UNIT_STATE,
};
use crate::{CODE_UNCOMPRESSED, HEADER_SIZE};
use tracing::trace;

/// Trailing bytes of the idle unit state covered by [`TICK_SHORTHAND`]
const SHORTHAND_TAIL: [u8; 4] = [0xff, 0xff, 0x01, 0x00];

/// Length of the idle unit state covered by [`TICK_SHORTHAND`]
const SHORTHAND_LEN: usize = 11;

/// Expand smart framing in a decompressed record.
///
/// The header is copied unchanged. [`TICK_START`] markers are consumed,
/// continuation and shorthand markers become full unit states with their
/// ticks reconstructed, every other subpacket is copied verbatim. A
/// continuation seen before any start marker counts from tick 0.
///
/// # Errors
/// Returns [`CodecError::TooShort`] for a buffer without a full header and
/// the iterator's error for an unknown or truncated subpacket.
pub fn unsmartpak(packet: &[u8]) -> Result<Vec<u8>, CodecError> {
    if packet.len() < HEADER_SIZE {
        return Err(CodecError::TooShort {
            expected: HEADER_SIZE,
            actual: packet.len(),
        });
    }

    let mut out = Vec::with_capacity(packet.len() * 2);
    out.extend_from_slice(&packet[..HEADER_SIZE]);

    let mut tick: u32 = 0;
    for sub in Subpackets::new(&packet[HEADER_SIZE..]) {
        let sub = sub?;
        match sub[0] {
            TICK_START => {
                tick = u32::from_le_bytes([sub[1], sub[2], sub[3], sub[4]]);
            }
            TICK_SHORTHAND => {
                out.extend_from_slice(&[UNIT_STATE, SHORTHAND_LEN as u8, 0x00]);
                out.extend_from_slice(&tick.to_le_bytes());
                out.extend_from_slice(&SHORTHAND_TAIL);
                tick = tick.wrapping_add(1);
            }
            TICK_CONTINUE => {
                out.push(UNIT_STATE);
                out.extend_from_slice(&sub[1..3]);
                out.extend_from_slice(&tick.to_le_bytes());
                out.extend_from_slice(&sub[3..]);
                tick = tick.wrapping_add(1);
            }
            _ => out.extend_from_slice(sub),
        }
    }

    Ok(out)
}

/// Elide tick counters from a run of uniform subpackets.
///
/// Returns the compact body (no header). A [`TICK_START`] marker is emitted
/// before the first unit state and whenever a tick is not the previous + 1.
#[must_use]
pub fn smartpak(subpackets: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(subpackets.iter().map(|s| s.len()).sum());
    let mut expected: Option<u32> = None;

    for sub in subpackets {
        if sub.first() != Some(&UNIT_STATE) || sub.len() < MIN_UNIT_STATE_LEN {
            out.extend_from_slice(sub);
            continue;
        }

        let tick = u32::from_le_bytes([sub[3], sub[4], sub[5], sub[6]]);
        if expected != Some(tick) {
            out.push(TICK_START);
            out.extend_from_slice(&tick.to_le_bytes());
        }

        if sub.len() == SHORTHAND_LEN && sub[7..] == SHORTHAND_TAIL {
            out.push(TICK_SHORTHAND);
        } else {
            out.push(TICK_CONTINUE);
            out.extend_from_slice(&sub[1..3]);
            out.extend_from_slice(&sub[3 + ELIDED_TICK_LEN..]);
        }
        expected = Some(tick.wrapping_add(1));
    }

    out
}

/// Re-frame a uniform record into compressed records no larger than `max_size`.
///
/// The subpacket run is smart-framed and compressed as a whole; whenever the
/// result exceeds `max_size` the run is split at its midpoint and each half
/// is encoded independently, recursively. A single subpacket that still does
/// not fit is emitted on its own. A body without subpackets produces no
/// records. Outputs are not encrypted and their checksum bytes are zeroed.
///
/// # Errors
/// Returns [`CodecError::TooShort`] without a full header, or the parse error
/// of the first malformed subpacket.
pub fn resmartpak(packet: &[u8], max_size: usize) -> Result<Vec<Vec<u8>>, CodecError> {
    if packet.len() < HEADER_SIZE {
        return Err(CodecError::TooShort {
            expected: HEADER_SIZE,
            actual: packet.len(),
        });
    }

    let header = &packet[..HEADER_SIZE];
    let subpackets = Subpackets::new(&packet[HEADER_SIZE..]).collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    if !subpackets.is_empty() {
        pack_run(header, &subpackets, max_size, &mut out);
    }
    Ok(out)
}

fn pack_run(header: &[u8], run: &[&[u8]], max_size: usize, out: &mut Vec<Vec<u8>>) {
    let mut record = Vec::with_capacity(HEADER_SIZE + run.iter().map(|s| s.len()).sum::<usize>());
    record.extend_from_slice(header);
    record[0] = CODE_UNCOMPRESSED;
    record[1..HEADER_SIZE].fill(0);
    record.extend_from_slice(&smartpak(run));

    let encoded = compress(&record);
    if encoded.len() <= max_size || run.len() <= 1 {
        out.push(encoded);
        return;
    }

    let mid = run.len() / 2;
    trace!(
        "Record of {} bytes over budget {}, splitting run of {} at {}",
        encoded.len(),
        max_size,
        run.len(),
        mid
    );
    pack_run(header, &run[..mid], max_size, out);
    pack_run(header, &run[mid..], max_size, out);
}
