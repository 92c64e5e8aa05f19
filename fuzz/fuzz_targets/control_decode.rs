//! Fuzz target for the control payload parser.
//!
//! Control packets are fixed-shape; the parser must reject every malformed
//! discriminant without panicking, and every successful parse must
//! re-encode to the same 20 bytes.

#![no_main]

use crossbar_proto::ControlPacket;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(control) = ControlPacket::decode_payload(data) {
        let encoded = control.encode_payload();
        assert_eq!(&encoded[..], &data[..ControlPacket::SIZE]);
    }
});
