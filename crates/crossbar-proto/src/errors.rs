//! Error types for wire encoding and decoding.
//!
//! Strongly-typed errors for the codec layer. Classification failures
//! (truncation, bad lengths, checksum mismatches) are kept distinct so the
//! dispatcher can map each one onto the right control packet instead of
//! collapsing everything into an opaque I/O error.

use std::io;

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer ended before the structure it claimed to contain
    #[error("truncated input: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required to finish decoding
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Header length field is inconsistent with the wire format
    #[error("invalid length field: {length}")]
    InvalidLength {
        /// The rejected length value
        length: u16,
    },

    /// Payload checksum does not match the header claim
    #[error("checksum mismatch: header says {expected:#010x}, payload hashes to {actual:#010x}")]
    InvalidChecksum {
        /// Checksum recorded in the header
        expected: u32,
        /// Checksum computed over the payload
        actual: u32,
    },

    /// Destination buffer cannot hold the encoded packet
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes the encoded packet occupies
        needed: usize,
        /// Bytes the caller provided
        available: usize,
    },

    /// Payload exceeds what the length field can frame
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Rejected payload size
        size: usize,
        /// Largest payload the frame admits
        max: usize,
    },

    /// Unknown priority byte on the wire
    #[error("invalid priority byte: {0:#04x}")]
    InvalidPriority(u8),

    /// Unknown transport tag byte on the wire
    #[error("invalid transport byte: {0:#04x}")]
    InvalidTransport(u8),

    /// Unknown control packet type byte
    #[error("invalid control type: {0:#04x}")]
    InvalidControlType(u8),

    /// Unknown control reason code
    #[error("invalid control reason: {0:#06x}")]
    InvalidControlReason(u16),

    /// Unknown control advice byte
    #[error("invalid control advice: {0:#04x}")]
    InvalidControlAdvice(u8),

    /// Text payload is not valid UTF-8
    #[error("text payload is not valid UTF-8")]
    InvalidUtf8,

    /// Underlying stream failure in the async adapter
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
