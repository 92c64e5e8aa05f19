//! Packet flag byte, priority levels, and transport tags.

use bitflags::bitflags;

use crate::errors::ProtocolError;

bitflags! {
    /// Per-packet processing flags carried in the wire header.
    ///
    /// `ENCRYPTED` and `COMPRESSED` may be combined: compression precedes
    /// encryption outbound, decryption precedes decompression inbound.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u8 {
        /// Payload bytes are ciphertext
        const ENCRYPTED = 1 << 0;
        /// Payload bytes are compressed
        const COMPRESSED = 1 << 1;
        /// Payload carries a detached signature
        const SIGNED = 1 << 2;
        /// Peer must acknowledge receipt
        const ACKNOWLEDGED = 1 << 3;
        /// Packet answers an earlier request
        const IS_RESPONSE = 1 << 4;
        /// Payload is one fragment of a larger message
        const FRAGMENTED = 1 << 5;
        /// Reserved for future assignment
        const RESERVED_6 = 1 << 6;
        /// Reserved for future assignment
        const RESERVED_7 = 1 << 7;
    }
}

impl PacketFlags {
    /// Raw flag byte as written to the wire.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        self.bits()
    }

    /// Parse a flag byte. Unknown bits are retained, never rejected.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self::from_bits_retain(byte)
    }
}

/// Dispatch priority of a packet.
///
/// One priority per channel lane; `Realtime` preempts everything else.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    /// Background traffic, first to be shed under load
    Low = 0,
    /// Default lane for ordinary requests
    #[default]
    Normal = 1,
    /// Latency-sensitive requests
    High = 2,
    /// Control traffic that must not queue behind bulk data
    Critical = 3,
    /// Dispatched before anything else that is waiting
    Realtime = 4,
}

impl Priority {
    /// Number of priority lanes.
    pub const LANES: usize = 5;

    /// All priorities, highest first (dequeue scan order).
    pub const DESCENDING: [Self; Self::LANES] =
        [Self::Realtime, Self::Critical, Self::High, Self::Normal, Self::Low];

    /// Lane index for this priority (0 = `Low`).
    #[must_use]
    pub fn lane(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Priority {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Normal),
            2 => Ok(Self::High),
            3 => Ok(Self::Critical),
            4 => Ok(Self::Realtime),
            other => Err(ProtocolError::InvalidPriority(other)),
        }
    }
}

/// Transport the packet arrived on (or is destined for).
///
/// The dispatcher uses this to pick transport-appropriate outbound
/// transforms; it never selects a socket.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportTag {
    /// Not associated with a transport (internal or test traffic)
    #[default]
    None = 0,
    /// Stream transport
    Tcp = 1,
    /// Datagram transport
    Udp = 2,
}

impl TryFrom<u8> for TransportTag {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Tcp),
            2 => Ok(Self::Udp),
            other => Err(ProtocolError::InvalidTransport(other)),
        }
    }
}
