//! Fuzz target for the pipeline decompression guard.
//!
//! The LZ4 size prefix is attacker-controlled; decompression must fail
//! cleanly (never panic, never allocate past the frame limit) on
//! arbitrary compressed payloads.

#![no_main]

use crossbar_dispatch::decompress;
use crossbar_proto::Packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(packet) = Packet::new(0x0100_0001, 0x1, data) else {
        return;
    };
    let _ = decompress(&packet);
});
