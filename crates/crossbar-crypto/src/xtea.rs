//! XTEA in counter mode.
//!
//! Legacy peers negotiate XTEA when an AEAD is unavailable. The 64-bit
//! block function (Needham/Wheeler, 32 cycles) generates a keystream from
//! an 8-byte nonce and a block counter; encryption is an XOR, so encrypt
//! and decrypt are the same operation and ciphertext length equals
//! plaintext length.
//!
//! There is **no authentication tag**. `tag_len() == 0`, `is_aead()` is
//! false, and a successful decrypt says nothing about integrity — the
//! packet checksum and flags carry what little integrity state exists.

use crate::{
    cipher::{Algorithm, SymmetricCipher, check_key_len, check_nonce_len},
    errors::Result,
};

/// 128-bit key size.
const KEY_LEN: usize = 16;
/// 64-bit nonce size (block counter occupies the rest of the block).
const NONCE_LEN: usize = 8;
/// Feistel cycles (64 rounds).
const CYCLES: u32 = 32;
const DELTA: u32 = 0x9E37_79B9;

/// XTEA-CTR, unauthenticated.
#[derive(Debug, Default, Clone, Copy)]
pub struct XteaCtrCipher;

impl XteaCtrCipher {
    fn keystream_xor(key: &[u8], nonce: &[u8], data: &[u8]) -> Vec<u8> {
        let key = schedule(key);
        let iv = u64::from_le_bytes([
            nonce[0], nonce[1], nonce[2], nonce[3], nonce[4], nonce[5], nonce[6], nonce[7],
        ]);

        let mut out = Vec::with_capacity(data.len());
        for (block_index, chunk) in data.chunks(8).enumerate() {
            let counter_block = iv.wrapping_add(block_index as u64).to_le_bytes();
            let keystream = encrypt_block(&key, counter_block);
            for (i, byte) in chunk.iter().enumerate() {
                out.push(byte ^ keystream[i]);
            }
        }
        out
    }
}

impl SymmetricCipher for XteaCtrCipher {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Xtea
    }

    fn is_aead(&self) -> bool {
        false
    }

    fn key_len(&self) -> usize {
        KEY_LEN
    }

    fn nonce_len(&self) -> usize {
        NONCE_LEN
    }

    fn tag_len(&self) -> usize {
        0
    }

    fn encrypt(&self, key: &[u8], nonce: &[u8], _aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        check_key_len(KEY_LEN, key)?;
        check_nonce_len(NONCE_LEN, nonce)?;
        Ok(Self::keystream_xor(key, nonce, plaintext))
    }

    fn decrypt(&self, key: &[u8], nonce: &[u8], _aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        check_key_len(KEY_LEN, key)?;
        check_nonce_len(NONCE_LEN, nonce)?;
        Ok(Self::keystream_xor(key, nonce, ciphertext))
    }
}

fn schedule(key: &[u8]) -> [u32; 4] {
    debug_assert_eq!(key.len(), KEY_LEN);
    [
        u32::from_le_bytes([key[0], key[1], key[2], key[3]]),
        u32::from_le_bytes([key[4], key[5], key[6], key[7]]),
        u32::from_le_bytes([key[8], key[9], key[10], key[11]]),
        u32::from_le_bytes([key[12], key[13], key[14], key[15]]),
    ]
}

fn encrypt_block(key: &[u32; 4], block: [u8; 8]) -> [u8; 8] {
    let mut v0 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
    let mut v1 = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    let mut sum: u32 = 0;

    for _ in 0..CYCLES {
        v0 = v0.wrapping_add(
            (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1)) ^ sum.wrapping_add(key[(sum & 3) as usize]),
        );
        sum = sum.wrapping_add(DELTA);
        v1 = v1.wrapping_add(
            (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                ^ sum.wrapping_add(key[((sum >> 11) & 3) as usize]),
        );
    }

    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&v0.to_le_bytes());
    out[4..].copy_from_slice(&v1.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        cipher::{open, seal},
        key::EncryptionKey,
    };

    #[test]
    fn ciphertext_length_equals_plaintext_length() {
        let cipher = XteaCtrCipher;
        let key = [3u8; KEY_LEN];
        let nonce = [5u8; NONCE_LEN];

        for len in [0usize, 1, 7, 8, 9, 100] {
            let plaintext = vec![0xABu8; len];
            let ciphertext = cipher.encrypt(&key, &nonce, b"", &plaintext).unwrap();
            assert_eq!(ciphertext.len(), len);
        }
    }

    #[test]
    fn decrypt_inverts_encrypt() {
        let cipher = XteaCtrCipher;
        let key = [3u8; KEY_LEN];
        let nonce = [5u8; NONCE_LEN];

        let plaintext = b"not a multiple of eight bytes";
        let ciphertext = cipher.encrypt(&key, &nonce, b"", plaintext).unwrap();
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let decrypted = cipher.decrypt(&key, &nonce, b"", &ciphertext).unwrap();
        assert_eq!(&decrypted[..], &plaintext[..]);
    }

    #[test]
    fn different_nonces_give_different_keystreams() {
        let cipher = XteaCtrCipher;
        let key = [3u8; KEY_LEN];

        let a = cipher.encrypt(&key, &[0u8; NONCE_LEN], b"", &[0u8; 32]).unwrap();
        let b = cipher.encrypt(&key, &[1u8; NONCE_LEN], b"", &[0u8; 32]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn block_function_diffuses() {
        // A one-bit input difference must change the whole block
        let key = schedule(&[0u8; KEY_LEN]);
        let a = encrypt_block(&key, [0; 8]);
        let mut input = [0u8; 8];
        input[0] = 1;
        let b = encrypt_block(&key, input);

        assert_ne!(a, b);
        let differing = a.iter().zip(&b).filter(|(x, y)| x != y).count();
        assert!(differing >= 6, "weak diffusion: only {differing} bytes differ");
    }

    #[test]
    fn sealed_envelope_has_no_tag() {
        let cipher = XteaCtrCipher;
        let key = EncryptionKey::from([9u8; KEY_LEN]);

        let envelope = seal(&cipher, &key, b"", b"payload").unwrap();
        assert_eq!(envelope.len(), NONCE_LEN + b"payload".len());

        let plaintext = open(&cipher, &key, b"", &envelope).unwrap();
        assert_eq!(plaintext, b"payload");
    }

    proptest! {
        #[test]
        fn roundtrip_arbitrary_payloads(
            plaintext in prop::collection::vec(any::<u8>(), 0..1024),
            key in prop::array::uniform16(any::<u8>()),
            nonce in prop::array::uniform8(any::<u8>()),
        ) {
            let cipher = XteaCtrCipher;
            let ciphertext = cipher.encrypt(&key, &nonce, b"", &plaintext).unwrap();
            let decrypted = cipher.decrypt(&key, &nonce, b"", &ciphertext).unwrap();
            prop_assert_eq!(decrypted, plaintext);
        }
    }
}
