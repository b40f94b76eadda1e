//! Error types for the LANLINK codec.

use thiserror::Error;

/// Codec errors
///
/// None of these are fatal: callers log them and drop the offending packet
/// or subpacket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Buffer too short to carry the structure being read
    #[error("buffer too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Stored checksum does not match the recomputed one
    #[error("checksum mismatch: stored 0x{extracted:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch {
        /// Checksum carried in the header
        extracted: u16,
        /// Checksum computed while decrypting
        computed: u16,
    },

    /// Subpacket code not present in the length table
    #[error("unknown subpacket code 0x{code:02X} at offset {offset}")]
    UnknownSubpacket {
        /// Leading byte
        code: u8,
        /// Offset within the body
        offset: usize,
    },

    /// Subpacket shorter than its table or embedded length
    #[error("truncated subpacket 0x{code:02X}: expected {expected} bytes, {actual} available")]
    TruncatedSubpacket {
        /// Leading byte
        code: u8,
        /// Expected subpacket length
        expected: usize,
        /// Bytes left in the body
        actual: usize,
    },

    /// Compressed token stream ended early or referenced data before its start
    #[error("incomplete compressed stream: {produced} bytes recovered")]
    IncompleteStream {
        /// Number of body bytes recovered before the stream broke off
        produced: usize,
    },
}
