//! Fuzz target for the wire codec.
//!
//! Feeds arbitrary byte sequences to the packet decoder to find:
//! - Parser crashes or panics
//! - Integer overflows in length arithmetic
//! - Buffer over-reads on truncated frames
//! - Length fields that bypass validation
//!
//! The decoder must NEVER panic; invalid input returns an error.

#![no_main]

use crossbar_proto::codec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Both CRC modes must reject garbage gracefully
    let _ = codec::decode(data, false);
    let _ = codec::decode(data, true);
});
