//! Action codes and the datagram header.
//!
//! The action byte selects both the header shape and the delivery class.
//! Codes below [`BUFFERED_ACTION_BASE`] carry no sequence number; codes at or
//! above it are followed by a little-endian `u32` sequence.

use crate::error::PacketError;

/// First action code that carries a sequence number
pub const BUFFERED_ACTION_BASE: u8 = 0x10;

/// Header size of lightweight datagrams (action only)
pub const LIGHT_HEADER_SIZE: usize = 1;

/// Header size of buffered datagrams (action + sequence)
pub const BUFFERED_HEADER_SIZE: usize = 5;

/// Datagram action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    /// Best-effort game datagram
    UdpData = 0x01,
    /// Best-effort session enumeration
    Enum = 0x02,
    /// Packet-size probe (or ping at minimal size)
    PacksizeTest = 0x03,
    /// Packet-size probe acknowledgement
    PacksizeAck = 0x04,
    /// Acknowledges the sequence in its header
    TcpAck = 0x10,
    /// Requests retransmission of the sequence in its header
    TcpResend = 0x11,
    /// Link greeting sent on connect
    Hello = 0x12,
    /// Stream opened
    TcpOpen = 0x13,
    /// Stream closed
    TcpClose = 0x14,
    /// Stream data
    TcpData = 0x15,
    /// Datagram upgraded to reliable delivery
    UdpProtected = 0x16,
    /// Non-terminal fragment of a larger payload
    More = 0x17,
}

impl Action {
    /// Raw code
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the header carries a sequence number
    #[must_use]
    pub fn is_buffered(self) -> bool {
        self.as_u8() >= BUFFERED_ACTION_BASE
    }

    /// Payload actions delivered in order, exactly once
    #[must_use]
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Self::Hello | Self::TcpOpen | Self::TcpClose | Self::TcpData | Self::UdpProtected
        )
    }

    /// Payload actions delivered at most once, unordered
    #[must_use]
    pub fn is_best_effort(self) -> bool {
        matches!(self, Self::UdpData | Self::Enum)
    }

    /// Header size for this action
    #[must_use]
    pub fn header_size(self) -> usize {
        if self.is_buffered() {
            BUFFERED_HEADER_SIZE
        } else {
            LIGHT_HEADER_SIZE
        }
    }
}

impl TryFrom<u8> for Action {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::UdpData),
            0x02 => Ok(Self::Enum),
            0x03 => Ok(Self::PacksizeTest),
            0x04 => Ok(Self::PacksizeAck),
            0x10 => Ok(Self::TcpAck),
            0x11 => Ok(Self::TcpResend),
            0x12 => Ok(Self::Hello),
            0x13 => Ok(Self::TcpOpen),
            0x14 => Ok(Self::TcpClose),
            0x15 => Ok(Self::TcpData),
            0x16 => Ok(Self::UdpProtected),
            0x17 => Ok(Self::More),
            _ => Err(PacketError::UnknownAction(value)),
        }
    }
}

/// Zero-copy view of a received datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram<'a> {
    /// Action from the header
    pub action: Action,
    /// Sequence number (0 for lightweight datagrams)
    pub seq: u32,
    /// Bytes after the header
    pub body: &'a [u8],
}

impl<'a> Datagram<'a> {
    /// Parse a datagram header.
    ///
    /// # Errors
    /// Returns [`PacketError::TooShort`] for an empty datagram or a buffered
    /// one without a full sequence field, and [`PacketError::UnknownAction`]
    /// for unassigned codes.
    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        let Some(&code) = data.first() else {
            return Err(PacketError::TooShort {
                expected: LIGHT_HEADER_SIZE,
                actual: 0,
            });
        };
        let action = Action::try_from(code)?;

        if !action.is_buffered() {
            return Ok(Self {
                action,
                seq: 0,
                body: &data[LIGHT_HEADER_SIZE..],
            });
        }

        if data.len() < BUFFERED_HEADER_SIZE {
            return Err(PacketError::TooShort {
                expected: BUFFERED_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let seq = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
        Ok(Self {
            action,
            seq,
            body: &data[BUFFERED_HEADER_SIZE..],
        })
    }

    /// Encode a datagram. `seq` is ignored for lightweight actions.
    #[must_use]
    pub fn encode(action: Action, seq: u32, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(action.header_size() + body.len());
        out.push(action.as_u8());
        if action.is_buffered() {
            out.extend_from_slice(&seq.to_le_bytes());
        }
        out.extend_from_slice(body);
        out
    }
}
