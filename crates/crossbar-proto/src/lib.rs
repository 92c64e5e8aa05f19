//! Crossbar wire protocol: framed packet codec and packet model.
//!
//! This crate defines the unit everything else in Crossbar moves around: a
//! 24-byte little-endian [`WireHeader`], the typed [`Packet`] built on it,
//! and the codec that frames packets over byte streams and datagrams. The
//! dispatcher, transformer registry, and middlewares all operate on these
//! types; nothing here touches sockets or knows about handlers.
//!
//! # Wire format
//!
//! ```text
//! length:u16 | magic:u32 | opcode:u16 | flags:u8 | priority:u8 |
//! transport:u8 | id:u8 | timestamp:u64 | checksum:u32 | payload...
//! ```
//!
//! `length` counts header plus payload (max 65535); `checksum` is CRC-32
//! over the payload only. The `magic` partitions packet *types* (built-ins
//! live in `0xA000..=0xAFFF`, applications at `0x0100_0000` and above), the
//! `opcode` selects a handler within the type.

#![forbid(unsafe_code)]

pub mod builtin;
pub mod codec;
pub mod control;
pub mod directive;
pub mod errors;
mod flags;
pub mod handshake;
mod header;
pub mod magic;
mod packet;
mod payload;

pub use control::{ControlAdvice, ControlPacket, ControlReason, ControlType};
pub use directive::{DirectivePayload, DirectiveVerb};
pub use errors::ProtocolError;
pub use handshake::{HandshakePayload, PROTOCOL_VERSION};
pub use flags::{PacketFlags, Priority, TransportTag};
pub use header::WireHeader;
pub use packet::Packet;
pub use payload::PayloadBuf;
