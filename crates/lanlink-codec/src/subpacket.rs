//! Subpacket length table and body iteration.
//!
//! A record body is a back-to-back sequence of subpackets. Each starts with a
//! code byte; its length comes either from a fixed table or, for
//! [`UNIT_STATE`] and [`TICK_CONTINUE`], from an embedded 16-bit little-endian
//! length field. A length of 0 means the code is unknown and the rest of the
//! body cannot be parsed.

use crate::error::CodecError;

/// Unit state subpacket carrying an explicit tick counter at bytes 3..7
pub const UNIT_STATE: u8 = 0x2c;

/// Smart framing: start-of-run marker with an explicit u32 tick
pub const TICK_START: u8 = 0xfe;

/// Smart framing: unit state with its tick elided
pub const TICK_CONTINUE: u8 = 0xfd;

/// Smart framing: shorthand for the 11-byte idle unit state
pub const TICK_SHORTHAND: u8 = 0xff;

/// Smallest valid unit state (code, length, tick)
pub const MIN_UNIT_STATE_LEN: usize = 7;

/// Bytes dropped from a unit state by [`TICK_CONTINUE`] elision
pub const ELIDED_TICK_LEN: usize = 4;

/// Expected length of the subpacket at the start of `bytes`.
///
/// Returns 0 for unknown codes, for empty input, and for embedded lengths
/// that cannot be read or are too small to be valid.
#[must_use]
pub fn expected_size(bytes: &[u8]) -> usize {
    let Some(&code) = bytes.first() else {
        return 0;
    };

    match code {
        UNIT_STATE => match embedded_len(bytes) {
            Some(len) if len >= MIN_UNIT_STATE_LEN => len,
            _ => 0,
        },
        TICK_CONTINUE => match embedded_len(bytes) {
            Some(len) if len >= MIN_UNIT_STATE_LEN => len - ELIDED_TICK_LEN,
            _ => 0,
        },
        _ => fixed_size(code),
    }
}

fn embedded_len(bytes: &[u8]) -> Option<usize> {
    bytes
        .get(1..3)
        .map(|b| usize::from(u16::from_le_bytes([b[0], b[1]])))
}

/// Fixed-size entries of the length table
const fn fixed_size(code: u8) -> usize {
    match code {
        0x02 => 13,
        0x03 => 7,
        0x05 => 65,
        0x06 => 1,
        0x07 => 1,
        0x08 => 1,
        0x09 => 23,
        0x0a => 7,
        0x0b => 9,
        0x0c => 11,
        0x0d => 36,
        0x0e => 14,
        0x0f => 6,
        0x10 => 22,
        0x11 => 4,
        0x12 => 5,
        0x14 => 24,
        0x15 => 1,
        0x16 => 17,
        0x17 => 2,
        0x18 => 2,
        0x19 => 3,
        0x1a => 14,
        0x1b => 6,
        0x1e => 2,
        0x1f => 5,
        0x20 => 192,
        0x21 => 10,
        0x22 => 6,
        0x23 => 14,
        0x26 => 41,
        0x28 => 58,
        0x29 => 3,
        0x2a => 2,
        0xf9 => 73,
        TICK_START => 5,
        TICK_SHORTHAND => 1,
        _ => 0,
    }
}

/// Iterator over the subpackets of a record body.
///
/// Yields each subpacket slice in order. On an unknown code or a truncated
/// subpacket it yields one error and then stops, so a malformed body never
/// desynchronises the caller.
#[derive(Debug, Clone)]
pub struct Subpackets<'a> {
    body: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Subpackets<'a> {
    /// Iterate over `body` (the bytes after the record header)
    #[must_use]
    pub fn new(body: &'a [u8]) -> Self {
        Self {
            body,
            offset: 0,
            failed: false,
        }
    }

    /// Offset of the next unread byte
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for Subpackets<'a> {
    type Item = Result<&'a [u8], CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.body.len() {
            return None;
        }

        let rest = &self.body[self.offset..];
        let code = rest[0];
        let expected = expected_size(rest);

        if expected == 0 {
            self.failed = true;
            return Some(Err(CodecError::UnknownSubpacket {
                code,
                offset: self.offset,
            }));
        }
        if rest.len() < expected {
            self.failed = true;
            return Some(Err(CodecError::TruncatedSubpacket {
                code,
                expected,
                actual: rest.len(),
            }));
        }

        self.offset += expected;
        Some(Ok(&rest[..expected]))
    }
}
