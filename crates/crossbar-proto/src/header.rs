//! Wire header implementation with zero-copy parsing.
//!
//! The `WireHeader` is a fixed 24-byte structure serialized as raw binary
//! (little endian). Keeping it castable straight out of the receive buffer
//! means the dispatcher can classify a packet (magic, opcode, priority)
//! without deserializing anything.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Fixed 24-byte wire header (little-endian byte order).
///
/// Layout on the wire:
///
/// ```text
/// length:u16 | magic:u32 | opcode:u16 | flags:u8 | priority:u8 |
/// transport:u8 | id:u8 | timestamp:u64 | checksum:u32
/// ```
///
/// Multi-byte fields are stored as raw byte arrays to avoid alignment
/// issues; accessors convert at the boundary. All 24-byte patterns are valid
/// bit patterns, so casting untrusted network bytes cannot produce undefined
/// behavior — semantic validation (length bounds, known priority bytes)
/// happens separately in [`WireHeader::from_bytes`] and the codec.
///
/// `length` counts the header itself plus the payload, so a bare header has
/// `length == 24` and the largest frame is 65535 bytes. The `checksum` is
/// CRC-32 over the payload bytes only, never the header.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct WireHeader {
    length: [u8; 2],
    magic: [u8; 4],
    pub(crate) opcode: [u8; 2],
    flags: u8,
    priority: u8,
    transport: u8,
    id: u8,
    timestamp: [u8; 8],
    pub(crate) checksum: [u8; 4],
}

impl WireHeader {
    /// Size of the serialized header (24 bytes).
    pub const SIZE: usize = 24;

    /// Largest total frame (header + payload) the length field can carry.
    pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

    /// Largest payload a frame can carry.
    pub const MAX_PAYLOAD_SIZE: usize = Self::MAX_FRAME_SIZE - Self::SIZE;

    /// Build a header from packet fields.
    ///
    /// `payload_len` must not exceed [`Self::MAX_PAYLOAD_SIZE`]; callers
    /// validate before reaching this point.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        magic: u32,
        opcode: u16,
        flags: u8,
        priority: u8,
        transport: u8,
        id: u8,
        timestamp: u64,
        checksum: u32,
        payload_len: usize,
    ) -> Self {
        debug_assert!(payload_len <= Self::MAX_PAYLOAD_SIZE);
        Self {
            length: ((Self::SIZE + payload_len) as u16).to_le_bytes(),
            magic: magic.to_le_bytes(),
            opcode: opcode.to_le_bytes(),
            flags,
            priority,
            transport,
            id,
            timestamp: timestamp.to_le_bytes(),
            checksum: checksum.to_le_bytes(),
        }
    }

    /// Parse a header from network bytes (zero-copy, safe).
    ///
    /// Validates cheapest-first: buffer size, then the length field. Magic
    /// and opcode are *classification* inputs for the dispatcher, so unknown
    /// values pass here and are rejected at lookup time instead.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Truncated`] if fewer than 24 bytes are available
    /// - [`ProtocolError::InvalidLength`] if the length field claims less
    ///   than a bare header
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::Truncated { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        let length = u16::from_le_bytes(header.length);
        if (length as usize) < Self::SIZE {
            return Err(ProtocolError::InvalidLength { length });
        }

        Ok(header)
    }

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Total frame length (header + payload).
    #[must_use]
    pub fn length(&self) -> u16 {
        u16::from_le_bytes(self.length)
    }

    /// Payload length implied by the length field.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        (self.length() as usize).saturating_sub(Self::SIZE)
    }

    /// Packet type identifier.
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_le_bytes(self.magic)
    }

    /// Handler selector within the packet type.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_le_bytes(self.opcode)
    }

    /// Raw flag byte.
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Raw priority byte (validated by the codec).
    #[must_use]
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Raw transport tag byte (validated by the codec).
    #[must_use]
    pub fn transport(&self) -> u8 {
        self.transport
    }

    /// Packet id, derived from the timestamp at creation.
    #[must_use]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Creation time, Unix milliseconds.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        u64::from_le_bytes(self.timestamp)
    }

    /// CRC-32 over the payload bytes.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        u32::from_le_bytes(self.checksum)
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for WireHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireHeader")
            .field("length", &self.length())
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("flags", &format!("{:#04x}", self.flags))
            .field("priority", &self.priority)
            .field("transport", &self.transport)
            .field("id", &self.id)
            .field("timestamp", &self.timestamp())
            .field("checksum", &format!("{:#010x}", self.checksum()))
            .finish()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for WireHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for WireHeader {}
