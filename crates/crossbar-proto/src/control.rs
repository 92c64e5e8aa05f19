//! Dispatcher control packets.
//!
//! Control packets are the dispatcher's way of signalling protocol-level
//! failures (and a few housekeeping verbs) to the peer without leaking
//! language-level errors across the wire. They are emitted only by the
//! dispatcher — user handlers return ordinary replies.
//!
//! The payload is a fixed 20-byte little-endian record:
//!
//! ```text
//! control_type:u8 | reason:u16 | advice:u8 | sequence_id:u32 |
//! flags:u16 | arg0:u16 | arg1:u32 | arg2:u32
//! ```

use std::net::SocketAddrV4;

use crate::{
    errors::{ProtocolError, Result},
    flags::Priority,
    magic,
    packet::Packet,
};

/// Control verb.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    /// A request could not be dispatched; `reason` says why
    Fail = 0x01,
    /// Positive acknowledgement of `sequence_id`
    Ack = 0x02,
    /// Liveness probe
    Ping = 0x03,
    /// Liveness response
    Pong = 0x04,
    /// Peer should reconnect to the endpoint in `arg0`/`arg1`
    Redirect = 0x05,
    /// Server is going away; peer should not reconnect
    Shutdown = 0x06,
}

impl TryFrom<u8> for ControlType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Fail),
            0x02 => Ok(Self::Ack),
            0x03 => Ok(Self::Ping),
            0x04 => Ok(Self::Pong),
            0x05 => Ok(Self::Redirect),
            0x06 => Ok(Self::Shutdown),
            other => Err(ProtocolError::InvalidControlType(other)),
        }
    }
}

/// Why a FAIL control packet was emitted.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReason {
    /// No failure (non-FAIL verbs)
    None = 0x0000,
    /// Packet magic is not registered
    UnsupportedPacket = 0x0001,
    /// No handler bound to the opcode
    NoHandler = 0x0002,
    /// Uncaught failure inside the dispatcher or a handler
    InternalError = 0x0003,
    /// Decrypt/decompress pipeline rejected the payload
    TransformFailed = 0x0004,
    /// Packet type has no crypto capability registered
    CryptoUnsupported = 0x0005,
    /// Packet type has no compression capability registered
    CompressionUnsupported = 0x0006,
    /// Connection's permission level is insufficient
    PermissionDenied = 0x0007,
    /// Sliding-window rate limit exceeded
    RateLimited = 0x0008,
    /// Handler exceeded its configured timeout
    Timeout = 0x0009,
}

impl TryFrom<u16> for ControlReason {
    type Error = ProtocolError;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(Self::None),
            0x0001 => Ok(Self::UnsupportedPacket),
            0x0002 => Ok(Self::NoHandler),
            0x0003 => Ok(Self::InternalError),
            0x0004 => Ok(Self::TransformFailed),
            0x0005 => Ok(Self::CryptoUnsupported),
            0x0006 => Ok(Self::CompressionUnsupported),
            0x0007 => Ok(Self::PermissionDenied),
            0x0008 => Ok(Self::RateLimited),
            0x0009 => Ok(Self::Timeout),
            other => Err(ProtocolError::InvalidControlReason(other)),
        }
    }
}

/// What the peer should do about a failure.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAdvice {
    /// Nothing; the failure is informational
    None = 0x00,
    /// Transient; retrying the same request may succeed
    Retry = 0x01,
    /// Transient but rate-related; retry after backing off
    Backoff = 0x02,
    /// Permanent for this connection; disconnect and renegotiate
    Disconnect = 0x03,
}

impl TryFrom<u8> for ControlAdvice {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::Retry),
            0x02 => Ok(Self::Backoff),
            0x03 => Ok(Self::Disconnect),
            other => Err(ProtocolError::InvalidControlAdvice(other)),
        }
    }
}

/// Decoded control payload.
///
/// `arg0`..`arg2` are verb-specific. For `Redirect` the new endpoint rides
/// in `arg0` (port) and `arg1` (IPv4 address octets, big-endian as
/// `u32::from(Ipv4Addr)` produces); `arg2` is reserved zero. Other verbs
/// leave unused args zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPacket {
    /// Control verb
    pub control_type: ControlType,
    /// Failure classification (FAIL only, `None` otherwise)
    pub reason: ControlReason,
    /// Suggested peer reaction
    pub advice: ControlAdvice,
    /// Echo of the triggering request's sequence id, 0 when unknown
    pub sequence_id: u32,
    /// Verb-specific flag bits
    pub flags: u16,
    /// Verb-specific argument
    pub arg0: u16,
    /// Verb-specific argument
    pub arg1: u32,
    /// Verb-specific argument
    pub arg2: u32,
}

impl ControlPacket {
    /// Serialized payload size.
    pub const SIZE: usize = 20;

    /// FAIL with a reason and advice, echoing the request's sequence id.
    #[must_use]
    pub fn fail(reason: ControlReason, advice: ControlAdvice, sequence_id: u32) -> Self {
        Self {
            control_type: ControlType::Fail,
            reason,
            advice,
            sequence_id,
            flags: 0,
            arg0: 0,
            arg1: 0,
            arg2: 0,
        }
    }

    /// Positive acknowledgement of `sequence_id`.
    #[must_use]
    pub fn ack(sequence_id: u32) -> Self {
        Self {
            control_type: ControlType::Ack,
            reason: ControlReason::None,
            advice: ControlAdvice::None,
            sequence_id,
            flags: 0,
            arg0: 0,
            arg1: 0,
            arg2: 0,
        }
    }

    /// Tell the peer to reconnect elsewhere.
    #[must_use]
    pub fn redirect(target: SocketAddrV4) -> Self {
        Self {
            control_type: ControlType::Redirect,
            reason: ControlReason::None,
            advice: ControlAdvice::Disconnect,
            sequence_id: 0,
            flags: 0,
            arg0: target.port(),
            arg1: u32::from(*target.ip()),
            arg2: 0,
        }
    }

    /// Redirect target, when this is a `Redirect` verb.
    #[must_use]
    pub fn redirect_target(&self) -> Option<SocketAddrV4> {
        (self.control_type == ControlType::Redirect)
            .then(|| SocketAddrV4::new(self.arg1.into(), self.arg0))
    }

    /// Serialize to the fixed 20-byte payload.
    #[must_use]
    pub fn encode_payload(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.control_type as u8;
        buf[1..3].copy_from_slice(&(self.reason as u16).to_le_bytes());
        buf[3] = self.advice as u8;
        buf[4..8].copy_from_slice(&self.sequence_id.to_le_bytes());
        buf[8..10].copy_from_slice(&self.flags.to_le_bytes());
        buf[10..12].copy_from_slice(&self.arg0.to_le_bytes());
        buf[12..16].copy_from_slice(&self.arg1.to_le_bytes());
        buf[16..20].copy_from_slice(&self.arg2.to_le_bytes());
        buf
    }

    /// Parse the fixed control payload.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Truncated`] on short input
    /// - `InvalidControlType` / `InvalidControlReason` /
    ///   `InvalidControlAdvice` for unknown discriminants
    pub fn decode_payload(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ProtocolError::Truncated { expected: Self::SIZE, actual: data.len() });
        }

        Ok(Self {
            control_type: ControlType::try_from(data[0])?,
            reason: ControlReason::try_from(u16::from_le_bytes([data[1], data[2]]))?,
            advice: ControlAdvice::try_from(data[3])?,
            sequence_id: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            flags: u16::from_le_bytes([data[8], data[9]]),
            arg0: u16::from_le_bytes([data[10], data[11]]),
            arg1: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            arg2: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
        })
    }

    /// Wrap into a ready-to-send packet (magic `CONTROL`, high priority).
    pub fn into_packet(self) -> Result<Packet> {
        Ok(Packet::new(magic::builtin::CONTROL, self.control_type as u16, &self.encode_payload()[..])?
            .with_priority(Priority::High))
    }

    /// Extract a control payload from a `CONTROL` packet.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        Self::decode_payload(packet.payload())
    }
}
