//! Error types for cipher operations.

use thiserror::Error;

/// Result alias for cipher operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur while encrypting or decrypting.
///
/// `AuthFailed` deliberately carries no detail: distinguishing "bad tag"
/// from "bad padding" or "bad length after the tag check" hands an oracle
/// to an attacker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Authentication tag did not verify; ciphertext or tag was tampered
    #[error("authentication failed")]
    AuthFailed,

    /// Key is the wrong size for the algorithm
    #[error("invalid key length: algorithm takes {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Key size the algorithm requires
        expected: usize,
        /// Key size supplied
        actual: usize,
    },

    /// Nonce is the wrong size for the algorithm
    #[error("invalid nonce length: algorithm takes {expected} bytes, got {actual}")]
    InvalidNonceLength {
        /// Nonce size the algorithm requires
        expected: usize,
        /// Nonce size supplied
        actual: usize,
    },

    /// Sealed envelope is shorter than nonce + tag
    #[error("ciphertext too short: need at least {expected} bytes, got {actual}")]
    CiphertextTooShort {
        /// Minimum envelope size
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// No cipher registered for the requested algorithm id
    #[error("unsupported algorithm id: {0:#04x}")]
    UnsupportedAlgorithm(u8),

    /// Algorithm already registered in the suite
    #[error("algorithm registered twice: {0:?}")]
    DuplicateAlgorithm(crate::Algorithm),

    /// Operating system randomness was unavailable
    #[error("random source failure: {0}")]
    RandomSource(String),
}
