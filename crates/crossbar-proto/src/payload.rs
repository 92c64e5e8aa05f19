//! Tiered payload storage.
//!
//! Packet payloads are overwhelmingly small (opcode arguments, short
//! acknowledgements), so payloads up to [`PayloadBuf::INLINE_CAP`] bytes are
//! stored inline in the packet itself and never touch the allocator. Larger
//! payloads live in a refcounted [`Bytes`] buffer, which makes cloning a
//! packet cheap and lets decoded payloads share the receive buffer's
//! allocation instead of tracking a separate ownership bit.

use std::hash::{Hash, Hasher};

use bytes::Bytes;

/// Owned payload bytes with a small-payload inline tier.
#[derive(Clone)]
pub enum PayloadBuf {
    /// Payloads up to `INLINE_CAP` bytes, stored in place
    Inline {
        /// Number of meaningful bytes in `bytes`
        len: u8,
        /// Backing storage; only `bytes[..len]` is payload
        bytes: [u8; PayloadBuf::INLINE_CAP],
    },
    /// Larger payloads in a refcounted heap buffer
    Shared(Bytes),
}

impl PayloadBuf {
    /// Largest payload stored inline.
    pub const INLINE_CAP: usize = 128;

    /// Empty payload.
    #[must_use]
    pub fn empty() -> Self {
        Self::Inline { len: 0, bytes: [0; Self::INLINE_CAP] }
    }

    /// Copy `data`, choosing the tier by length.
    #[must_use]
    pub fn copy_from_slice(data: &[u8]) -> Self {
        if data.len() <= Self::INLINE_CAP {
            let mut bytes = [0u8; Self::INLINE_CAP];
            bytes[..data.len()].copy_from_slice(data);
            Self::Inline { len: data.len() as u8, bytes }
        } else {
            Self::Shared(Bytes::copy_from_slice(data))
        }
    }

    /// Payload bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Inline { len, bytes } => &bytes[..*len as usize],
            Self::Shared(bytes) => bytes,
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Inline { len, .. } => *len as usize,
            Self::Shared(bytes) => bytes.len(),
        }
    }

    /// Payload is zero bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refcounted view of the payload. Inline payloads are copied out.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Inline { .. } => Bytes::copy_from_slice(self.as_slice()),
            Self::Shared(bytes) => bytes.clone(),
        }
    }
}

impl Default for PayloadBuf {
    fn default() -> Self {
        Self::empty()
    }
}

/// Adopts the buffer without copying, regardless of size. Small buffers are
/// not demoted to the inline tier so the refcount sharing survives.
impl From<Bytes> for PayloadBuf {
    fn from(bytes: Bytes) -> Self {
        Self::Shared(bytes)
    }
}

impl From<Vec<u8>> for PayloadBuf {
    fn from(bytes: Vec<u8>) -> Self {
        Self::copy_from_slice(&bytes)
    }
}

impl From<&[u8]> for PayloadBuf {
    fn from(data: &[u8]) -> Self {
        Self::copy_from_slice(data)
    }
}

impl AsRef<[u8]> for PayloadBuf {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

// Equality and hashing compare payload bytes, not storage tier.
impl PartialEq for PayloadBuf {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for PayloadBuf {}

impl Hash for PayloadBuf {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl std::fmt::Debug for PayloadBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tier = match self {
            Self::Inline { .. } => "inline",
            Self::Shared(_) => "shared",
        };
        write!(f, "PayloadBuf({tier}, {} bytes)", self.len())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn small_payloads_stay_inline() {
        let buf = PayloadBuf::copy_from_slice(&[1, 2, 3]);
        assert!(matches!(buf, PayloadBuf::Inline { len: 3, .. }));
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn boundary_payload_stays_inline() {
        let data = vec![0xAB; PayloadBuf::INLINE_CAP];
        let buf = PayloadBuf::copy_from_slice(&data);
        assert!(matches!(buf, PayloadBuf::Inline { .. }));
        assert_eq!(buf.len(), PayloadBuf::INLINE_CAP);
    }

    #[test]
    fn large_payloads_go_to_heap() {
        let data = vec![0xCD; PayloadBuf::INLINE_CAP + 1];
        let buf = PayloadBuf::copy_from_slice(&data);
        assert!(matches!(buf, PayloadBuf::Shared(_)));
        assert_eq!(buf.as_slice(), &data[..]);
    }

    #[test]
    fn equality_ignores_tier() {
        let data = vec![7u8; 16];
        let inline = PayloadBuf::copy_from_slice(&data);
        let shared = PayloadBuf::from(Bytes::from(data));
        assert_eq!(inline, shared);
    }

    proptest! {
        #[test]
        fn copy_round_trips(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let buf = PayloadBuf::copy_from_slice(&data);
            prop_assert_eq!(buf.as_slice(), &data[..]);
            prop_assert_eq!(buf.len(), data.len());
            let bytes = buf.to_bytes();
            prop_assert_eq!(bytes.as_ref(), &data[..]);
        }
    }
}
