//! Handshake payload.
//!
//! The first packet on a connection. Carries the peer's protocol version,
//! the cipher algorithm it wants, and a random session nonce the transport
//! layer folds into key agreement. Key exchange itself happens outside the
//! dispatch core; this payload only negotiates *which* algorithm the
//! connection will report to the wrap/unwrap middlewares.
//!
//! Fixed 22-byte little-endian layout:
//!
//! ```text
//! version:u8 | algorithm:u8 | flags:u16 | session_nonce:[u8;16] | reserved:u16
//! ```

use crate::{
    errors::{ProtocolError, Result},
    magic,
    packet::Packet,
};

/// Protocol version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 1;

/// Decoded handshake payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePayload {
    /// Peer's protocol version
    pub version: u8,
    /// Cipher algorithm id the peer proposes (see the crypto crate)
    pub algorithm: u8,
    /// Negotiation flag bits, currently unassigned
    pub flags: u16,
    /// Random nonce contributed to key agreement
    pub session_nonce: [u8; 16],
}

impl HandshakePayload {
    /// Serialized payload size.
    pub const SIZE: usize = 22;

    /// Handshake proposing `algorithm` with the given nonce.
    #[must_use]
    pub fn new(algorithm: u8, session_nonce: [u8; 16]) -> Self {
        Self { version: PROTOCOL_VERSION, algorithm, flags: 0, session_nonce }
    }

    /// Serialize to the fixed payload bytes.
    #[must_use]
    pub fn encode_payload(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.version;
        buf[1] = self.algorithm;
        buf[2..4].copy_from_slice(&self.flags.to_le_bytes());
        buf[4..20].copy_from_slice(&self.session_nonce);
        // buf[20..22] reserved, zero
        buf
    }

    /// Parse a handshake payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] on short input. Versions are *not*
    /// rejected here: the session layer decides whether to answer an older
    /// peer or disconnect it.
    pub fn decode_payload(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ProtocolError::Truncated { expected: Self::SIZE, actual: data.len() });
        }

        let mut session_nonce = [0u8; 16];
        session_nonce.copy_from_slice(&data[4..20]);

        Ok(Self {
            version: data[0],
            algorithm: data[1],
            flags: u16::from_le_bytes([data[2], data[3]]),
            session_nonce,
        })
    }

    /// Wrap into a ready-to-send packet (magic `HANDSHAKE`, critical
    /// priority).
    pub fn into_packet(self) -> Result<Packet> {
        crate::builtin::handshake(&self.encode_payload())
    }

    /// Extract a handshake from a `HANDSHAKE` packet.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        debug_assert_eq!(packet.magic(), magic::builtin::HANDSHAKE);
        Self::decode_payload(packet.payload())
    }
}

#[cfg(test)]
mod tests {
    use crate::flags::Priority;

    use super::*;

    #[test]
    fn handshake_round_trips() {
        let hello = HandshakePayload::new(1, [0xAB; 16]);
        let decoded = HandshakePayload::decode_payload(&hello.encode_payload()).unwrap();
        assert_eq!(decoded, hello);
        assert_eq!(decoded.version, PROTOCOL_VERSION);
    }

    #[test]
    fn layout_is_pinned() {
        let hello = HandshakePayload {
            version: 0x01,
            algorithm: 0x02,
            flags: 0x0403,
            session_nonce: [0x11; 16],
        };
        let bytes = hello.encode_payload();

        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[1], 0x02);
        assert_eq!(&bytes[2..4], &[0x03, 0x04]);
        assert_eq!(&bytes[4..20], &[0x11; 16]);
        assert_eq!(&bytes[20..22], &[0, 0]);
    }

    #[test]
    fn short_payload_is_truncated() {
        let result = HandshakePayload::decode_payload(&[0u8; 10]);
        assert_eq!(result, Err(ProtocolError::Truncated { expected: 22, actual: 10 }));
    }

    #[test]
    fn unknown_versions_parse() {
        let mut bytes = HandshakePayload::new(1, [0; 16]).encode_payload();
        bytes[0] = 99;
        let decoded = HandshakePayload::decode_payload(&bytes).unwrap();
        assert_eq!(decoded.version, 99);
    }

    #[test]
    fn packet_rides_handshake_magic_at_critical_priority() {
        let packet = HandshakePayload::new(2, [0x42; 16]).into_packet().unwrap();
        assert_eq!(packet.magic(), magic::builtin::HANDSHAKE);
        assert_eq!(packet.priority(), Priority::Critical);

        let restored = HandshakePayload::from_packet(&packet).unwrap();
        assert_eq!(restored.algorithm, 2);
        assert_eq!(restored.session_nonce, [0x42; 16]);
    }
}
