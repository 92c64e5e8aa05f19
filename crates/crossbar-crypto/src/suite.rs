//! Cipher suite registry.
//!
//! Built once at startup, read-only afterwards. The dispatcher resolves a
//! connection's negotiated [`Algorithm`] to a cipher here; an id with no
//! registered cipher is a policy failure, not a panic.

use std::{collections::HashMap, sync::Arc};

use crate::{
    chacha::ChaCha20Poly1305Cipher,
    cipher::{Algorithm, SymmetricCipher},
    errors::{CryptoError, Result},
    xtea::XteaCtrCipher,
};

/// Immutable algorithm-to-cipher map.
#[derive(Clone)]
pub struct CipherSuite {
    ciphers: HashMap<Algorithm, Arc<dyn SymmetricCipher>>,
}

impl CipherSuite {
    /// Empty suite; register ciphers with [`Self::with_cipher`].
    #[must_use]
    pub fn empty() -> Self {
        Self { ciphers: HashMap::new() }
    }

    /// Suite with every built-in cipher registered.
    #[must_use]
    pub fn standard() -> Self {
        let mut ciphers: HashMap<Algorithm, Arc<dyn SymmetricCipher>> = HashMap::new();
        ciphers.insert(Algorithm::ChaCha20Poly1305, Arc::new(ChaCha20Poly1305Cipher));
        ciphers.insert(Algorithm::Xtea, Arc::new(XteaCtrCipher));
        Self { ciphers }
    }

    /// Add a cipher. Registering the same algorithm twice is an error.
    pub fn with_cipher(mut self, cipher: Arc<dyn SymmetricCipher>) -> Result<Self> {
        let algorithm = cipher.algorithm();
        if self.ciphers.contains_key(&algorithm) {
            return Err(CryptoError::DuplicateAlgorithm(algorithm));
        }
        self.ciphers.insert(algorithm, cipher);
        Ok(self)
    }

    /// Resolve an algorithm to its cipher.
    pub fn get(&self, algorithm: Algorithm) -> Result<&Arc<dyn SymmetricCipher>> {
        self.ciphers
            .get(&algorithm)
            .ok_or(CryptoError::UnsupportedAlgorithm(algorithm.to_u8()))
    }

    /// Algorithm has a registered cipher.
    #[must_use]
    pub fn supports(&self, algorithm: Algorithm) -> bool {
        self.ciphers.contains_key(&algorithm)
    }
}

impl std::fmt::Debug for CipherSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherSuite").field("algorithms", &self.ciphers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_suite_covers_builtin_algorithms() {
        let suite = CipherSuite::standard();
        assert!(suite.supports(Algorithm::ChaCha20Poly1305));
        assert!(suite.supports(Algorithm::Xtea));
        assert!(suite.get(Algorithm::ChaCha20Poly1305).unwrap().is_aead());
        assert!(!suite.get(Algorithm::Xtea).unwrap().is_aead());
    }

    #[test]
    fn empty_suite_rejects_lookups() {
        let suite = CipherSuite::empty();
        assert_eq!(
            suite.get(Algorithm::Xtea).map(|_| ()),
            Err(CryptoError::UnsupportedAlgorithm(Algorithm::Xtea.to_u8()))
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let suite = CipherSuite::empty().with_cipher(Arc::new(XteaCtrCipher)).unwrap();
        let result = suite.with_cipher(Arc::new(XteaCtrCipher));
        assert!(matches!(result, Err(CryptoError::DuplicateAlgorithm(Algorithm::Xtea))));
    }
}
