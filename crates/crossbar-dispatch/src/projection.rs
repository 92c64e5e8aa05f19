//! Return projection.
//!
//! Handlers return whatever shape is natural — nothing, raw bytes, text, a
//! hand-built packet, or a `Result` of any of those — and the catalog's
//! trampoline projects that value into at most one reply packet here.
//! Byte and text returns ride the built-in tier types, echoing the
//! request's opcode and priority with the `IS_RESPONSE` flag set; the
//! handler's buffer is copied, never retained or mutated.

use bytes::Bytes;
use crossbar_proto::{Packet, Priority, builtin};

use crate::error::{DispatchError, Result};

/// Request fields a projection echoes into the reply.
#[derive(Debug, Clone, Copy)]
pub struct ReplyContext {
    /// Opcode of the request being answered
    pub opcode: u16,
    /// Priority of the request being answered
    pub priority: Priority,
}

/// Erased projection result.
#[derive(Debug)]
pub enum Reply {
    /// Handler produced no reply
    None,
    /// One packet to send back
    Packet(Packet),
}

/// Handler return shapes the catalog accepts.
///
/// Implemented for the closed set of permitted shapes; any other return
/// type fails to satisfy the catalog's bounds at compile time — the Rust
/// rendition of "rejected at catalog-build time".
pub trait IntoReply: Send + 'static {
    /// Project this value into a reply for the given request.
    fn into_reply(self, request: &ReplyContext) -> Result<Reply>;
}

impl IntoReply for () {
    fn into_reply(self, _request: &ReplyContext) -> Result<Reply> {
        Ok(Reply::None)
    }
}

impl IntoReply for Reply {
    fn into_reply(self, _request: &ReplyContext) -> Result<Reply> {
        Ok(self)
    }
}

impl IntoReply for Packet {
    fn into_reply(self, _request: &ReplyContext) -> Result<Reply> {
        // Sent as-is: the handler owns flags and framing
        Ok(Reply::Packet(self))
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self, request: &ReplyContext) -> Result<Reply> {
        Ok(Reply::Packet(builtin::binary_reply(request.opcode, request.priority, &self)?))
    }
}

impl IntoReply for Bytes {
    fn into_reply(self, request: &ReplyContext) -> Result<Reply> {
        Ok(Reply::Packet(builtin::binary_reply(request.opcode, request.priority, &self)?))
    }
}

impl IntoReply for &'static [u8] {
    fn into_reply(self, request: &ReplyContext) -> Result<Reply> {
        Ok(Reply::Packet(builtin::binary_reply(request.opcode, request.priority, self)?))
    }
}

impl IntoReply for String {
    fn into_reply(self, request: &ReplyContext) -> Result<Reply> {
        Ok(Reply::Packet(builtin::text_reply(request.opcode, request.priority, &self)?))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self, request: &ReplyContext) -> Result<Reply> {
        Ok(Reply::Packet(builtin::text_reply(request.opcode, request.priority, self)?))
    }
}

impl<T> IntoReply for Option<T>
where
    T: IntoReply,
{
    fn into_reply(self, request: &ReplyContext) -> Result<Reply> {
        match self {
            Some(value) => value.into_reply(request),
            None => Ok(Reply::None),
        }
    }
}

impl<T, E> IntoReply for std::result::Result<T, E>
where
    T: IntoReply,
    E: std::fmt::Display + Send + 'static,
{
    fn into_reply(self, request: &ReplyContext) -> Result<Reply> {
        match self {
            Ok(value) => value.into_reply(request),
            Err(error) => Err(DispatchError::Handler(error.to_string())),
        }
    }
}
