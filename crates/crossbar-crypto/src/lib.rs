//! Crossbar symmetric cipher toolbox.
//!
//! The dispatch core consumes encryption through one capability,
//! [`SymmetricCipher`], selected at runtime by [`Algorithm`] id — each
//! connection negotiates an algorithm and a key, and the wrap/unwrap
//! middlewares drive whatever cipher the suite resolves. Two
//! implementations ship here: ChaCha20-Poly1305 (AEAD, the default) and
//! XTEA-CTR (legacy, unauthenticated).
//!
//! # Envelope layout
//!
//! [`seal`] and [`open`] move self-contained envelopes:
//! `nonce || ciphertext || tag` for AEADs, `nonce || ciphertext` for
//! ciphers without a tag. A missing tag is never authentication success;
//! only [`CryptoError::AuthFailed`]-free AEAD opens are authenticated.
//!
//! # Security
//!
//! - Tag verification happens in constant time inside the AEAD crate.
//! - Nonces are generated from operating-system randomness per seal; keys
//!   are wrapped in [`EncryptionKey`] and zeroed on drop.
//! - Key generation, exchange, and rotation live outside this crate.

#![forbid(unsafe_code)]

mod chacha;
mod cipher;
mod errors;
mod key;
mod suite;
mod xtea;

pub use chacha::ChaCha20Poly1305Cipher;
pub use cipher::{Algorithm, SymmetricCipher, open, seal};
pub use errors::CryptoError;
pub use key::EncryptionKey;
pub use suite::CipherSuite;
pub use xtea::XteaCtrCipher;
