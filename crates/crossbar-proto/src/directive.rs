//! Directive payload.
//!
//! Directives are out-of-band instructions from the server to a peer's
//! session layer: back off, resume, rotate keys, drain for shutdown. They
//! never reach user handlers; the session layer consumes them directly.
//!
//! Fixed 10-byte little-endian layout:
//!
//! ```text
//! verb:u8 | flags:u8 | argument:u32 | deadline_ms:u32
//! ```

use crate::{
    errors::{ProtocolError, Result},
    flags::Priority,
    magic,
    packet::Packet,
};

/// What the peer's session layer should do.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveVerb {
    /// Reduce send rate; `argument` = suggested packets per second
    SlowDown = 0x01,
    /// Previous `SlowDown` is lifted
    Resume = 0x02,
    /// Re-run key agreement within `deadline_ms`
    RotateKey = 0x03,
    /// Finish in-flight requests and disconnect within `deadline_ms`
    Drain = 0x04,
}

impl TryFrom<u8> for DirectiveVerb {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::SlowDown),
            0x02 => Ok(Self::Resume),
            0x03 => Ok(Self::RotateKey),
            0x04 => Ok(Self::Drain),
            other => Err(ProtocolError::InvalidControlType(other)),
        }
    }
}

/// Decoded directive payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectivePayload {
    /// Instruction for the session layer
    pub verb: DirectiveVerb,
    /// Verb-specific flag bits
    pub flags: u8,
    /// Verb-specific argument
    pub argument: u32,
    /// Compliance deadline in milliseconds, 0 = immediately
    pub deadline_ms: u32,
}

impl DirectivePayload {
    /// Serialized payload size.
    pub const SIZE: usize = 10;

    /// Directive with no argument or deadline.
    #[must_use]
    pub fn new(verb: DirectiveVerb) -> Self {
        Self { verb, flags: 0, argument: 0, deadline_ms: 0 }
    }

    /// Ask the peer to cap its send rate.
    #[must_use]
    pub fn slow_down(packets_per_second: u32) -> Self {
        Self { verb: DirectiveVerb::SlowDown, flags: 0, argument: packets_per_second, deadline_ms: 0 }
    }

    /// Ask the peer to drain and disconnect.
    #[must_use]
    pub fn drain(deadline_ms: u32) -> Self {
        Self { verb: DirectiveVerb::Drain, flags: 0, argument: 0, deadline_ms }
    }

    /// Serialize to the fixed payload bytes.
    #[must_use]
    pub fn encode_payload(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.verb as u8;
        buf[1] = self.flags;
        buf[2..6].copy_from_slice(&self.argument.to_le_bytes());
        buf[6..10].copy_from_slice(&self.deadline_ms.to_le_bytes());
        buf
    }

    /// Parse a directive payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] on short input;
    /// [`ProtocolError::InvalidControlType`] on an unknown verb.
    pub fn decode_payload(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ProtocolError::Truncated { expected: Self::SIZE, actual: data.len() });
        }

        Ok(Self {
            verb: DirectiveVerb::try_from(data[0])?,
            flags: data[1],
            argument: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
            deadline_ms: u32::from_le_bytes([data[6], data[7], data[8], data[9]]),
        })
    }

    /// Wrap into a ready-to-send packet (magic `DIRECTIVE`, critical
    /// priority — directives must not queue behind bulk traffic).
    pub fn into_packet(self) -> Result<Packet> {
        Ok(Packet::new(magic::builtin::DIRECTIVE, self.verb as u16, &self.encode_payload()[..])?
            .with_priority(Priority::Critical))
    }

    /// Extract a directive from a `DIRECTIVE` packet.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        debug_assert_eq!(packet.magic(), magic::builtin::DIRECTIVE);
        Self::decode_payload(packet.payload())
    }
}
