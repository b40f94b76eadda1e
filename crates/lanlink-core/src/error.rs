//! Error types for the LANLINK tunnel wire format.

use thiserror::Error;

/// Datagram and probe parsing errors
///
/// A datagram failing to parse is logged and dropped; it never affects the
/// state of its sender.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Datagram or body too short for the structure being read
    #[error("datagram too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Action byte not assigned
    #[error("unknown action: 0x{0:02X}")]
    UnknownAction(u8),

    /// Probe declares a size that does not match its body
    #[error("probe size mismatch: declared {declared}, body carries {actual}")]
    ProbeSizeMismatch {
        /// Size field of the probe
        declared: u32,
        /// Size implied by the body length
        actual: usize,
    },

    /// Probe fill does not match its CRC-32
    #[error("probe checksum mismatch: carried 0x{carried:08X}, computed 0x{computed:08X}")]
    ProbeChecksum {
        /// CRC carried in the probe
        carried: u32,
        /// CRC computed over the fill
        computed: u32,
    },
}
