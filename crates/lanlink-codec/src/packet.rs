//! Whole-packet pipeline.
//!
//! Receive: decrypt, verify checksum, decompress, expand smart framing.
//! Send: re-frame and compress under a size budget, then encrypt each record.

use crate::cipher::{decrypt, encrypt};
use crate::compress::decompress;
use crate::error::CodecError;
use crate::smartpak::{resmartpak, unsmartpak};
use crate::HEADER_SIZE;
use tracing::trace;

/// Decode one encrypted record into its uniform subpacket form.
///
/// The returned buffer starts with a stored header (code
/// [`CODE_UNCOMPRESSED`](crate::CODE_UNCOMPRESSED)) followed by fully
/// expanded subpackets.
///
/// # Errors
/// Fails on a short buffer, a checksum mismatch, a broken compressed stream
/// or a malformed subpacket. Callers drop the packet.
pub fn decode_packet(raw: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut buf = raw.to_vec();
    decrypt(&mut buf, 0)?.verify()?;
    let expanded = decompress(&buf, HEADER_SIZE).into_result()?;
    trace!("Decoded record: {} -> {} bytes", raw.len(), expanded.len());
    unsmartpak(&expanded)
}

/// Encode a uniform record into encrypted records of at most `max_size` bytes.
///
/// A single subpacket too large for the budget yields one oversized record.
///
/// # Errors
/// Fails on a short buffer or a malformed subpacket.
pub fn encode_packets(uniform: &[u8], max_size: usize) -> Result<Vec<Vec<u8>>, CodecError> {
    let mut records = resmartpak(uniform, max_size)?;
    for record in &mut records {
        encrypt(record);
    }
    Ok(records)
}
