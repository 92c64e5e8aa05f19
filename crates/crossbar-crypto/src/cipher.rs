//! The symmetric cipher capability.
//!
//! The dispatcher selects ciphers at runtime by [`Algorithm`] id (each
//! connection advertises one), so the capability is a trait object rather
//! than a generic parameter. Implementations are interchangeable: the
//! dispatch core never names a concrete cipher.
//!
//! For AEAD algorithms the sealed envelope layout is
//! `nonce || ciphertext || tag`. Non-AEAD algorithms produce
//! `nonce || ciphertext` with `tag_len() == 0`; their output carries **no
//! integrity claim**, and callers must never treat the absence of a tag as
//! authentication success — integrity state stays with the packet flags.

use crate::{
    errors::{CryptoError, Result},
    key::EncryptionKey,
};

/// Cipher algorithm identifiers, stable on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// ChaCha20-Poly1305 AEAD (RFC 8439)
    ChaCha20Poly1305 = 1,
    /// XTEA in counter mode, unauthenticated
    Xtea = 2,
}

impl Algorithm {
    /// Wire id of this algorithm.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Algorithm {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::ChaCha20Poly1305),
            2 => Ok(Self::Xtea),
            other => Err(CryptoError::UnsupportedAlgorithm(other)),
        }
    }
}

/// A symmetric cipher the dispatch core can drive by algorithm id.
///
/// `encrypt` returns `ciphertext || tag` (tag empty for non-AEAD);
/// `decrypt` takes the same and returns the plaintext, failing with
/// [`CryptoError::AuthFailed`] when an authentication tag does not verify.
/// Implementations must verify tags in constant time.
pub trait SymmetricCipher: Send + Sync {
    /// Identifier this cipher registers under.
    fn algorithm(&self) -> Algorithm;

    /// Cipher provides authenticated encryption.
    fn is_aead(&self) -> bool;

    /// Required key size in bytes.
    fn key_len(&self) -> usize;

    /// Required nonce size in bytes.
    fn nonce_len(&self) -> usize;

    /// Authentication tag size in bytes (0 for non-AEAD).
    fn tag_len(&self) -> usize;

    /// Encrypt `plaintext`, binding `aad` when the cipher is an AEAD.
    fn encrypt(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext` (which includes the tag for AEADs).
    fn decrypt(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Encrypt into a self-contained envelope: `nonce || ciphertext || tag`.
///
/// Generates a fresh random nonce from the operating system per call.
pub fn seal(
    cipher: &dyn SymmetricCipher,
    key: &EncryptionKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let mut nonce = vec![0u8; cipher.nonce_len()];
    getrandom::fill(&mut nonce).map_err(|e| CryptoError::RandomSource(e.to_string()))?;

    let ciphertext = cipher.encrypt(key.as_bytes(), &nonce, aad, plaintext)?;

    let mut envelope = Vec::with_capacity(nonce.len() + ciphertext.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt an envelope produced by [`seal`].
pub fn open(
    cipher: &dyn SymmetricCipher,
    key: &EncryptionKey,
    aad: &[u8],
    envelope: &[u8],
) -> Result<Vec<u8>> {
    let min = cipher.nonce_len() + cipher.tag_len();
    if envelope.len() < min {
        return Err(CryptoError::CiphertextTooShort { expected: min, actual: envelope.len() });
    }

    let (nonce, ciphertext) = envelope.split_at(cipher.nonce_len());
    cipher.decrypt(key.as_bytes(), nonce, aad, ciphertext)
}

/// Check the key length against a cipher's requirement.
pub(crate) fn check_key_len(expected: usize, key: &[u8]) -> Result<()> {
    if key.len() != expected {
        return Err(CryptoError::InvalidKeyLength { expected, actual: key.len() });
    }
    Ok(())
}

/// Check the nonce length against a cipher's requirement.
pub(crate) fn check_nonce_len(expected: usize, nonce: &[u8]) -> Result<()> {
    if nonce.len() != expected {
        return Err(CryptoError::InvalidNonceLength { expected, actual: nonce.len() });
    }
    Ok(())
}
