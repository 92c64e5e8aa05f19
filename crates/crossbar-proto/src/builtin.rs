//! Constructors for the built-in packet types.
//!
//! The return-projection layer uses the binary and text tiers to carry
//! handler results; handshake and time-sync are protocol housekeeping.
//! Tier selection picks the smallest capacity that fits, and payloads
//! larger than the biggest tier are rejected rather than silently promoted.

use crate::{
    errors::{ProtocolError, Result},
    flags::{PacketFlags, Priority},
    magic,
    packet::{Packet, now_ms},
};

/// Binary packet on the smallest tier that fits `data`.
///
/// `opcode` and `priority` are echoed from the request so the peer can
/// correlate; the `IS_RESPONSE` flag is set.
///
/// # Errors
///
/// [`ProtocolError::PayloadTooLarge`] if `data` exceeds the 1024-byte tier.
pub fn binary_reply(opcode: u16, priority: Priority, data: &[u8]) -> Result<Packet> {
    let (tier_magic, capacity) = magic::binary_tier(data.len())
        .ok_or(ProtocolError::PayloadTooLarge { size: data.len(), max: 1024 })?;
    debug_assert!(data.len() <= capacity);

    Ok(Packet::new(tier_magic, opcode, data)?
        .with_priority(priority)
        .with_flags(PacketFlags::IS_RESPONSE))
}

/// UTF-8 text packet on the smallest tier that fits `text`.
///
/// # Errors
///
/// [`ProtocolError::PayloadTooLarge`] if the UTF-8 bytes exceed the
/// 1024-byte tier.
pub fn text_reply(opcode: u16, priority: Priority, text: &str) -> Result<Packet> {
    let bytes = text.as_bytes();
    let (tier_magic, _) = magic::text_tier(bytes.len())
        .ok_or(ProtocolError::PayloadTooLarge { size: bytes.len(), max: 1024 })?;

    Ok(Packet::new(tier_magic, opcode, bytes)?
        .with_priority(priority)
        .with_flags(PacketFlags::IS_RESPONSE))
}

/// Text of a text-tier packet.
///
/// # Errors
///
/// [`ProtocolError::InvalidUtf8`] if the payload is not valid UTF-8.
pub fn text_of(packet: &Packet) -> Result<&str> {
    std::str::from_utf8(packet.payload()).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Handshake packet carrying an opaque negotiation payload.
pub fn handshake(payload: &[u8]) -> Result<Packet> {
    Ok(Packet::new(magic::builtin::HANDSHAKE, 0, payload)?.with_priority(Priority::Critical))
}

/// Clock probe carrying the sender's current Unix-millisecond time.
pub fn time_sync() -> Result<Packet> {
    let now = now_ms();
    Ok(Packet::new(magic::builtin::TIME_SYNC, 0, &now.to_le_bytes()[..])?
        .with_priority(Priority::High))
}

/// Sender clock reading from a time-sync payload.
pub fn time_sync_instant(packet: &Packet) -> Result<u64> {
    let payload = packet.payload();
    let bytes: [u8; 8] = payload
        .try_into()
        .map_err(|_| ProtocolError::Truncated { expected: 8, actual: payload.len() })?;
    Ok(u64::from_le_bytes(bytes))
}
