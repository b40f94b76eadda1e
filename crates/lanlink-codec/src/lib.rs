//! # LANLINK Codec
//!
//! Byte-exact codec for the game packets carried by the LANLINK tunnel.
//!
//! This crate provides:
//! - Packet whitening cipher with an additive 16-bit checksum
//! - LZ-style compressor and decompressor (bitmask + back-reference tokens)
//! - "Smart" tick framing that elides monotonically increasing counters
//! - The fixed subpacket length table
//! - A packet pipeline composing all of the above
//!
//! ## Packet layout
//!
//! ```text
//! ┌────────┬──────────────┬──────────────────────────────────────┐
//! │ code   │ checksum     │ body                                 │
//! │ 1 byte │ 2 bytes (LE) │ subpackets (0x03) or tokens (0x04)   │
//! └────────┴──────────────┴──────────────────────────────────────┘
//! ```
//!
//! Every function here is pure: no I/O, no shared state. The transport treats
//! payload bytes as opaque and only the bridge feeds them through this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cipher;
pub mod compress;
pub mod error;
pub mod packet;
pub mod smartpak;
pub mod subpacket;

pub use cipher::{Checksums, decrypt, encrypt};
pub use compress::{Decompressed, compress, decompress};
pub use error::CodecError;
pub use packet::{decode_packet, encode_packets};
pub use smartpak::{resmartpak, smartpak, unsmartpak};
pub use subpacket::{Subpackets, expected_size};

/// Size of the record header (`code` + `checksum`)
pub const HEADER_SIZE: usize = 3;

/// Header code of a stored (uncompressed) record
pub const CODE_UNCOMPRESSED: u8 = 0x03;

/// Header code of a compressed record
pub const CODE_COMPRESSED: u8 = 0x04;
