//! Key material handling.

use zeroize::Zeroizing;

/// Symmetric key bytes, zeroed on drop.
///
/// The key never appears in `Debug` output; only its length does. Cloning
/// is allowed (connections hand a copy to the wrap/unwrap middlewares) and
/// each clone zeroes independently.
#[derive(Clone)]
pub struct EncryptionKey(Zeroizing<Vec<u8>>);

impl EncryptionKey {
    /// Take ownership of raw key bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Copy key bytes out of a slice.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Key is empty (no material).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey({} bytes, redacted)", self.0.len())
    }
}

impl From<&[u8]> for EncryptionKey {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}

impl<const N: usize> From<[u8; N]> for EncryptionKey {
    fn from(bytes: [u8; N]) -> Self {
        Self::new(bytes.to_vec())
    }
}
