//! Property tests for the public wire codec surface.
//!
//! Complements the unit tests with adversarial framing checks: arbitrary
//! packets must survive encode/decode unchanged, and no byte mutation of a
//! valid frame may decode with a passing checksum while changing the
//! payload.

use bytes::BytesMut;
use crossbar_proto::{
    Packet, PacketFlags, Priority, ProtocolError, TransportTag, codec,
};
use proptest::prelude::*;

fn arbitrary_packet() -> impl Strategy<Value = Packet> {
    (
        prop_oneof![Just(0x0100_0001u32), Just(0x0100_0002), any::<u32>()],
        any::<u16>(),
        any::<u8>(),
        0u8..5,
        0u8..3,
        prop::collection::vec(any::<u8>(), 0..4096),
    )
        .prop_map(|(magic, opcode, flags, priority, transport, payload)| {
            Packet::new(magic, opcode, payload)
                .expect("payload under frame limit")
                .with_flags(PacketFlags::from_byte(flags))
                .with_priority(Priority::try_from(priority).expect("valid priority"))
                .with_transport(TransportTag::try_from(transport).expect("valid transport"))
        })
}

proptest! {
    #[test]
    fn encode_decode_identity(packet in arbitrary_packet()) {
        let mut wire = BytesMut::new();
        codec::encode(&packet, &mut wire);

        prop_assert_eq!(wire.len(), codec::encoded_len(&packet));

        let decoded = codec::decode(&wire, true).expect("round trip");
        prop_assert_eq!(&decoded, &packet);
        prop_assert_eq!(decoded.magic(), packet.magic());
        prop_assert_eq!(decoded.id(), packet.id());
        prop_assert_eq!(decoded.timestamp(), packet.timestamp());
        prop_assert!(decoded.is_valid());
    }

    #[test]
    fn every_header_prefix_fails_truncated(
        packet in arbitrary_packet(),
        cut in 0usize..codec::HEADER_SIZE,
    ) {
        let mut wire = BytesMut::new();
        codec::encode(&packet, &mut wire);

        let result = codec::decode(&wire[..cut], false);
        let is_truncated = matches!(result, Err(ProtocolError::Truncated { .. }));
        prop_assert!(is_truncated);
    }

    #[test]
    fn payload_bit_flips_fail_crc(
        packet in arbitrary_packet(),
        flip_bit in 0usize..64,
    ) {
        // Only meaningful when there is a payload byte to corrupt
        prop_assume!(!packet.payload().is_empty());

        let mut wire = BytesMut::new();
        codec::encode(&packet, &mut wire);

        let payload_len = packet.payload().len();
        let byte_index = codec::HEADER_SIZE + (flip_bit / 8) % payload_len;
        wire[byte_index] ^= 1 << (flip_bit % 8);

        let result = codec::decode(&wire, true);
        let is_invalid_checksum = matches!(result, Err(ProtocolError::InvalidChecksum { .. }));
        prop_assert!(is_invalid_checksum);
    }

    #[test]
    fn decode_never_panics_on_noise(noise in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode(&noise, true);
    }
}
