//! Framed packet encoding and decoding.
//!
//! The wire format is the 24-byte [`WireHeader`] followed by the payload,
//! with the leading `length` field counting both. Decode validates
//! structural framing before any payload copy; CRC validation is optional
//! on the hot path (the dispatcher re-checksums after every payload
//! transform anyway) and mandatory in this crate's tests.
//!
//! The stream adapter reads the 2-byte length prefix first — never more —
//! then exactly the remainder, so it works on any `AsyncRead` without
//! buffering assumptions.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    errors::{ProtocolError, Result},
    header::WireHeader,
    packet::Packet,
    payload::PayloadBuf,
};

/// Size of the fixed wire header.
pub const HEADER_SIZE: usize = WireHeader::SIZE;

/// Bytes the encoded packet occupies.
#[must_use]
pub fn encoded_len(packet: &Packet) -> usize {
    HEADER_SIZE + packet.payload().len()
}

/// Encode a packet into a growable buffer.
///
/// Appends `[header (24 bytes)] + [payload]`. The caller may pass a rented
/// pooled buffer; this function never holds onto it.
pub fn encode(packet: &Packet, dst: &mut impl BufMut) {
    dst.put_slice(&packet.header().to_bytes());
    dst.put_slice(packet.payload());
}

/// Encode a packet into a fixed destination slice.
///
/// Writes header then payload and returns the number of bytes written.
/// Nothing is written on failure. This is the allocation-free fast path:
/// rent a buffer, encode, hand the slice to the transport.
///
/// # Errors
///
/// [`ProtocolError::BufferTooSmall`] if `dst` cannot hold the frame.
pub fn encode_into(packet: &Packet, dst: &mut [u8]) -> Result<usize> {
    let needed = encoded_len(packet);
    if dst.len() < needed {
        return Err(ProtocolError::BufferTooSmall { needed, available: dst.len() });
    }

    dst[..HEADER_SIZE].copy_from_slice(&packet.header().to_bytes());
    dst[HEADER_SIZE..needed].copy_from_slice(packet.payload());
    Ok(needed)
}

/// Decode one packet from a byte buffer.
///
/// Requires `HEADER_SIZE <= length <= data.len()`; trailing bytes beyond
/// `length` are ignored (the stream adapter never produces any, but a
/// datagram may carry padding). The payload is copied out into the packet's
/// tiered storage, so the input buffer can be reused immediately.
///
/// # Errors
///
/// - [`ProtocolError::Truncated`] if the buffer is shorter than a header or
///   than the length field claims
/// - [`ProtocolError::InvalidLength`] if the length field is less than a
///   bare header
/// - [`ProtocolError::InvalidChecksum`] only when `validate_crc` is set and
///   the payload does not hash to the header's claim
/// - [`ProtocolError::InvalidPriority`] / [`ProtocolError::InvalidTransport`]
///   for unknown classification bytes
pub fn decode(data: &[u8], validate_crc: bool) -> Result<Packet> {
    let header = WireHeader::from_bytes(data)?;

    let total = header.length() as usize;
    if data.len() < total {
        return Err(ProtocolError::Truncated { expected: total, actual: data.len() });
    }

    let payload = PayloadBuf::copy_from_slice(&data[HEADER_SIZE..total]);

    if validate_crc {
        let actual = crc32fast::hash(payload.as_slice());
        if actual != header.checksum() {
            return Err(ProtocolError::InvalidChecksum {
                expected: header.checksum(),
                actual,
            });
        }
    }

    Packet::from_wire(header, payload)
}

/// Read one length-prefixed packet from a stream.
///
/// Reads exactly 2 bytes for the length, validates it, then reads exactly
/// the remaining `length - 2` bytes. CRC is not validated here; call
/// [`Packet::is_valid`] if the transport is untrusted.
///
/// Cancellation safety: dropping the future mid-read loses the partially
/// read frame, as with any length-prefixed protocol; callers that cancel
/// must also drop the connection.
pub async fn read_packet<S>(stream: &mut S) -> Result<Packet>
where
    S: AsyncRead + Unpin,
{
    let mut length_prefix = [0u8; 2];
    stream.read_exact(&mut length_prefix).await?;

    let length = u16::from_le_bytes(length_prefix) as usize;
    if length < HEADER_SIZE {
        return Err(ProtocolError::InvalidLength { length: length as u16 });
    }

    let mut frame = vec![0u8; length];
    frame[..2].copy_from_slice(&length_prefix);
    stream.read_exact(&mut frame[2..]).await?;

    decode(&frame, false)
}

/// Write one packet to a stream as a single write.
///
/// Renders into `scratch` (cleared first; rent it from a pool on the hot
/// path) and issues one `write_all`. The scratch buffer must not be
/// retained by the caller beyond this call's borrow.
pub async fn write_packet<S>(stream: &mut S, packet: &Packet, scratch: &mut BytesMut) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    scratch.clear();
    encode(packet, scratch);
    stream.write_all(scratch).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::flags::{PacketFlags, Priority, TransportTag};

    fn sample_packet(payload: &[u8]) -> Packet {
        Packet::new(0x0100_0001, 0x1000, payload)
            .unwrap()
            .with_priority(Priority::High)
            .with_transport(TransportTag::Tcp)
            .with_flags(PacketFlags::ACKNOWLEDGED)
    }

    impl Arbitrary for Packet {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (
                any::<u32>(),
                any::<u16>(),
                any::<u8>(),
                0u8..5,
                0u8..3,
                prop::collection::vec(any::<u8>(), 0..2048),
            )
                .prop_map(|(magic, opcode, flags, priority, transport, payload)| {
                    Packet::new(magic, opcode, payload)
                        .expect("payload under frame limit")
                        .with_flags(PacketFlags::from_byte(flags))
                        .with_priority(Priority::try_from(priority).expect("valid priority"))
                        .with_transport(TransportTag::try_from(transport).expect("valid transport"))
                })
                .boxed()
        }
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(packet in any::<Packet>()) {
            let mut wire = BytesMut::new();
            encode(&packet, &mut wire);

            let parsed = decode(&wire, true).expect("round trip should decode");
            prop_assert_eq!(&parsed, &packet);
            prop_assert_eq!(parsed.magic(), packet.magic());
            prop_assert_eq!(parsed.transport(), packet.transport());
            prop_assert_eq!(parsed.timestamp(), packet.timestamp());
            prop_assert_eq!(parsed.id(), packet.id());
        }

        #[test]
        fn short_buffers_fail_truncated(data in prop::collection::vec(any::<u8>(), 0..HEADER_SIZE)) {
            let result = decode(&data, false);
            let is_truncated = matches!(result, Err(ProtocolError::Truncated { .. }));
            prop_assert!(is_truncated);
        }
    }

    #[test]
    fn encode_into_reports_exact_need() {
        let packet = sample_packet(b"payload");
        let needed = encoded_len(&packet);

        let mut too_small = vec![0u8; needed - 1];
        let err = encode_into(&packet, &mut too_small).unwrap_err();
        assert_eq!(err, ProtocolError::BufferTooSmall { needed, available: needed - 1 });

        let mut exact = vec![0u8; needed];
        assert_eq!(encode_into(&packet, &mut exact).unwrap(), needed);
        assert_eq!(decode(&exact, true).unwrap(), packet);
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let packet = sample_packet(b"datagram");
        let mut wire = BytesMut::new();
        encode(&packet, &mut wire);
        wire.extend_from_slice(&[0xEE; 16]); // datagram padding

        let parsed = decode(&wire, true).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let packet = sample_packet(&[7u8; 100]);
        let mut wire = BytesMut::new();
        encode(&packet, &mut wire);

        let result = decode(&wire[..wire.len() - 1], false);
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn corrupted_payload_fails_crc_only_when_asked() {
        let packet = sample_packet(b"checksummed");
        let mut wire = BytesMut::new();
        encode(&packet, &mut wire);

        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        assert!(decode(&wire, false).is_ok());
        assert!(matches!(decode(&wire, true), Err(ProtocolError::InvalidChecksum { .. })));
    }

    #[tokio::test]
    async fn stream_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let sent = sample_packet(&[0x42; 700]);
        let mut scratch = BytesMut::new();
        write_packet(&mut client, &sent, &mut scratch).await.unwrap();

        let received = read_packet(&mut server).await.unwrap();
        assert_eq!(received, sent);
        assert!(received.is_valid());
    }

    #[tokio::test]
    async fn stream_read_rejects_bad_length_prefix() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::io::AsyncWriteExt::write_all(&mut client, &5u16.to_le_bytes()).await.unwrap();

        let result = read_packet(&mut server).await;
        assert_eq!(result.unwrap_err(), ProtocolError::InvalidLength { length: 5 });
    }

    #[tokio::test]
    async fn stream_read_surfaces_eof_as_io() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let result = read_packet(&mut server).await;
        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }
}
