//! Error types for the dispatch core.
//!
//! Three families share one enum: classification failures (unknown magic or
//! opcode), policy failures (permission, rate, timeout), and transform
//! failures (crypto, compression). `Canceled` is deliberately *not* an
//! error in spirit — it is quiet control flow during shutdown — but riding
//! the same enum keeps middleware signatures honest.
//!
//! The dispatcher's top-level catch maps any of these onto a FAIL control
//! packet via [`DispatchError::control_reason`] and
//! [`DispatchError::advice`]; no error escapes a worker loop.

use std::time::Duration;

use crossbar_crypto::CryptoError;
use crossbar_proto::{ControlAdvice, ControlReason, ProtocolError};
use thiserror::Error;

use crate::connection::PermissionLevel;

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors that can occur while dispatching a packet.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Packet magic has no registered transformer entry
    #[error("unsupported packet type: magic {magic:#010x}")]
    UnsupportedPacket {
        /// The unknown magic value
        magic: u32,
    },

    /// Opcode has no handler in the catalog
    #[error("no handler for opcode {opcode:#06x}")]
    NoHandler {
        /// The unhandled opcode
        opcode: u16,
    },

    /// Connection's permission level is below the handler's requirement
    #[error("permission denied: handler requires {required:?}, connection has {actual:?}")]
    PermissionDenied {
        /// Level the handler demands
        required: PermissionLevel,
        /// Level the connection holds
        actual: PermissionLevel,
    },

    /// Sliding-window rate limit exceeded
    #[error("rate limited")]
    RateLimited,

    /// Handler exceeded its configured timeout
    #[error("handler timed out after {limit:?}")]
    Timeout {
        /// The configured limit that fired
        limit: Duration,
    },

    /// Decrypt/decompress rejected the payload
    #[error("transform failed: {0}")]
    TransformFailed(String),

    /// Packet type lacks a capability the operation needs
    #[error("unsupported operation: {code:?}")]
    UnsupportedOperation {
        /// `CryptoUnsupported` or `CompressionUnsupported`
        code: ControlReason,
    },

    /// Wire-level failure while re-framing a payload
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Cipher failure (bad key material, failed authentication)
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Handler body reported a failure
    #[error("handler error: {0}")]
    Handler(String),

    /// Connection is gone; sends cannot complete
    #[error("connection {id} is disposed")]
    ConnectionClosed {
        /// Connection identifier
        id: u64,
    },

    /// Worker or context cancellation; quiet control flow, never reported
    #[error("operation canceled")]
    Canceled,

    /// Anything uncaught inside the dispatcher itself
    #[error("internal dispatcher error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts and rate limits are transient; classification and
    /// capability failures repeat deterministically until configuration
    /// changes.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::RateLimited
                | Self::Handler(_)
                | Self::Internal(_)
                | Self::ConnectionClosed { .. }
        )
    }

    /// FAIL control-packet reason for this error.
    #[must_use]
    pub fn control_reason(&self) -> ControlReason {
        match self {
            Self::UnsupportedPacket { .. } => ControlReason::UnsupportedPacket,
            Self::NoHandler { .. } => ControlReason::NoHandler,
            Self::PermissionDenied { .. } => ControlReason::PermissionDenied,
            Self::RateLimited => ControlReason::RateLimited,
            Self::Timeout { .. } => ControlReason::Timeout,
            Self::TransformFailed(_) | Self::Crypto(_) | Self::Protocol(_) => {
                ControlReason::TransformFailed
            },
            Self::UnsupportedOperation { code } => *code,
            Self::Handler(_)
            | Self::ConnectionClosed { .. }
            | Self::Canceled
            | Self::Internal(_) => ControlReason::InternalError,
        }
    }

    /// Suggested peer reaction for the FAIL control packet.
    #[must_use]
    pub fn advice(&self) -> ControlAdvice {
        match self {
            Self::RateLimited => ControlAdvice::Backoff,
            Self::Timeout { .. } | Self::Handler(_) | Self::Internal(_) => ControlAdvice::Retry,
            _ => ControlAdvice::None,
        }
    }
}
