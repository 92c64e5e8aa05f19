//! Pipeline-managed payload transforms.
//!
//! These are the generic transforms the wrap/unwrap middlewares apply for
//! packet types that opted into pipeline management: LZ4 for compression,
//! the connection's negotiated cipher for encryption. Packet-managed types
//! bypass this module and run their own registered transform closures.
//!
//! Every transform returns a re-framed packet: payload replaced, checksum
//! recomputed, the relevant flag toggled. The input packet is never
//! mutated.

use crossbar_crypto::{Algorithm, CipherSuite, EncryptionKey, open, seal};
use crossbar_proto::{ControlReason, Packet, PacketFlags, WireHeader};

use crate::error::{DispatchError, Result};

/// AEAD associated data: binds ciphertext to the packet's type and opcode
/// so a ciphertext cannot be replayed under a different route.
fn associated_data(packet: &Packet) -> [u8; 6] {
    let mut aad = [0u8; 6];
    aad[..4].copy_from_slice(&packet.magic().to_le_bytes());
    aad[4..].copy_from_slice(&packet.opcode().to_le_bytes());
    aad
}

/// Compress the payload with LZ4 and set the `COMPRESSED` flag.
pub fn compress(packet: &Packet) -> Result<Packet> {
    let compressed = lz4_flex::compress_prepend_size(packet.payload());

    let mut out = packet.clone();
    out.update_payload(compressed)?;
    out.update_flags(packet.flags() | PacketFlags::COMPRESSED);
    Ok(out)
}

/// Undo [`compress`], clearing the `COMPRESSED` flag.
pub fn decompress(packet: &Packet) -> Result<Packet> {
    let payload = packet.payload();

    // The LZ4 size prefix is attacker-controlled; bound it before the
    // decompressor allocates
    if payload.len() >= 4 {
        let claimed =
            u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
        if claimed > WireHeader::MAX_PAYLOAD_SIZE {
            return Err(DispatchError::TransformFailed(format!(
                "decompressed size {claimed} exceeds frame limit"
            )));
        }
    }

    let raw = lz4_flex::decompress_size_prepended(payload)
        .map_err(|e| DispatchError::TransformFailed(format!("lz4: {e}")))?;

    let mut out = packet.clone();
    out.update_payload(raw)?;
    out.update_flags(packet.flags() - PacketFlags::COMPRESSED);
    Ok(out)
}

/// Encrypt the payload with the connection's negotiated cipher and set the
/// `ENCRYPTED` flag. The resulting checksum covers the ciphertext envelope.
pub fn encrypt(
    packet: &Packet,
    suite: &CipherSuite,
    key: &EncryptionKey,
    algorithm: Algorithm,
) -> Result<Packet> {
    let cipher = suite
        .get(algorithm)
        .map_err(|_| DispatchError::UnsupportedOperation { code: ControlReason::CryptoUnsupported })?;

    let envelope = seal(cipher.as_ref(), key, &associated_data(packet), packet.payload())?;

    let mut out = packet.clone();
    out.update_payload(envelope)?;
    out.update_flags(packet.flags() | PacketFlags::ENCRYPTED);
    Ok(out)
}

/// Undo [`encrypt`], clearing the `ENCRYPTED` flag.
///
/// An AEAD tag failure surfaces as [`DispatchError::Crypto`]; the unwrap
/// middleware maps it to a `TRANSFORM_FAILED` control packet.
pub fn decrypt(
    packet: &Packet,
    suite: &CipherSuite,
    key: &EncryptionKey,
    algorithm: Algorithm,
) -> Result<Packet> {
    let cipher = suite
        .get(algorithm)
        .map_err(|_| DispatchError::UnsupportedOperation { code: ControlReason::CryptoUnsupported })?;

    let plaintext = open(cipher.as_ref(), key, &associated_data(packet), packet.payload())?;

    let mut out = packet.clone();
    out.update_payload(plaintext)?;
    out.update_flags(packet.flags() - PacketFlags::ENCRYPTED);
    Ok(out)
}
