//! ChaCha20-Poly1305 AEAD implementation.
//!
//! Thin adapter over the `chacha20poly1305` crate. Tag verification is
//! constant-time inside the AEAD implementation; a failed tag surfaces as
//! [`CryptoError::AuthFailed`] with no further detail.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{
    cipher::{Algorithm, SymmetricCipher, check_key_len, check_nonce_len},
    errors::{CryptoError, Result},
};

/// 256-bit key size.
const KEY_LEN: usize = 32;
/// 96-bit nonce size (RFC 8439).
const NONCE_LEN: usize = 12;
/// Poly1305 tag size.
const TAG_LEN: usize = 16;

/// ChaCha20-Poly1305 with a 96-bit nonce.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChaCha20Poly1305Cipher;

impl SymmetricCipher for ChaCha20Poly1305Cipher {
    fn algorithm(&self) -> Algorithm {
        Algorithm::ChaCha20Poly1305
    }

    fn is_aead(&self) -> bool {
        true
    }

    fn key_len(&self) -> usize {
        KEY_LEN
    }

    fn nonce_len(&self) -> usize {
        NONCE_LEN
    }

    fn tag_len(&self) -> usize {
        TAG_LEN
    }

    fn encrypt(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        check_key_len(KEY_LEN, key)?;
        check_nonce_len(NONCE_LEN, nonce)?;

        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| CryptoError::InvalidKeyLength { expected: KEY_LEN, actual: key.len() })?;

        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::AuthFailed)
    }

    fn decrypt(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        check_key_len(KEY_LEN, key)?;
        check_nonce_len(NONCE_LEN, nonce)?;

        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::CiphertextTooShort {
                expected: TAG_LEN,
                actual: ciphertext.len(),
            });
        }

        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| CryptoError::InvalidKeyLength { expected: KEY_LEN, actual: key.len() })?;

        cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| CryptoError::AuthFailed)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        cipher::{open, seal},
        key::EncryptionKey,
    };

    fn test_key() -> EncryptionKey {
        EncryptionKey::from([0x42u8; KEY_LEN])
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = ChaCha20Poly1305Cipher;
        let key = [7u8; KEY_LEN];
        let nonce = [9u8; NONCE_LEN];

        let ciphertext = cipher.encrypt(&key, &nonce, b"header", b"payload").unwrap();
        assert_eq!(ciphertext.len(), b"payload".len() + TAG_LEN);

        let plaintext = cipher.decrypt(&key, &nonce, b"header", &ciphertext).unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn rfc8439_known_answer() {
        let cipher = ChaCha20Poly1305Cipher;
        let key =
            hex::decode("808182838485868788898a8b8c8d8e8f909192939495969798999a9b9c9d9e9f")
                .unwrap();
        let nonce = hex::decode("070000004041424344454647").unwrap();
        let aad = hex::decode("50515253c0c1c2c3c4c5c6c7").unwrap();
        let plaintext = b"Ladies and Gentlemen of the class of '99: If you could offer you \
                          only one tip for the future, sunscreen would be it.";

        let ciphertext = cipher.encrypt(&key, &nonce, &aad, plaintext).unwrap();

        let expected = hex::decode(concat!(
            "d31a8d34648e60db7b86afbc53ef7ec2a4aded51296e08fea9e2b5a736ee62d6",
            "3dbea45e8ca9671282fafb69da92728b1a71de0a9e060b2905d6a5b67ecd3b36",
            "92ddbd7f2d778b8c9803aee328091b58fab324e4fad675945585808b4831d7bc",
            "3ff4def08e4b7a9de576d26586cec64b6116",
            "1ae10b594f09e26a7e902ecbd0600691", // tag
        ))
        .unwrap();
        assert_eq!(ciphertext, expected);

        let decrypted = cipher.decrypt(&key, &nonce, &aad, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_aad_fails_auth() {
        let cipher = ChaCha20Poly1305Cipher;
        let key = [7u8; KEY_LEN];
        let nonce = [9u8; NONCE_LEN];

        let ciphertext = cipher.encrypt(&key, &nonce, b"aad-a", b"payload").unwrap();
        let result = cipher.decrypt(&key, &nonce, b"aad-b", &ciphertext);
        assert_eq!(result, Err(CryptoError::AuthFailed));
    }

    #[test]
    fn bad_key_length_is_rejected() {
        let cipher = ChaCha20Poly1305Cipher;
        let result = cipher.encrypt(&[0u8; 16], &[0u8; NONCE_LEN], b"", b"pt");
        assert_eq!(result, Err(CryptoError::InvalidKeyLength { expected: 32, actual: 16 }));
    }

    #[test]
    fn sealed_envelope_round_trips() {
        let cipher = ChaCha20Poly1305Cipher;
        let key = test_key();

        let envelope = seal(&cipher, &key, b"", b"the payload").unwrap();
        assert_eq!(envelope.len(), NONCE_LEN + b"the payload".len() + TAG_LEN);

        let plaintext = open(&cipher, &key, b"", &envelope).unwrap();
        assert_eq!(plaintext, b"the payload");
    }

    #[test]
    fn short_envelope_is_rejected_before_decrypting() {
        let cipher = ChaCha20Poly1305Cipher;
        let result = open(&cipher, &test_key(), b"", &[0u8; NONCE_LEN + TAG_LEN - 1]);
        assert_eq!(
            result,
            Err(CryptoError::CiphertextTooShort {
                expected: NONCE_LEN + TAG_LEN,
                actual: NONCE_LEN + TAG_LEN - 1
            })
        );
    }

    proptest! {
        #[test]
        fn any_single_bit_flip_fails_auth(
            plaintext in prop::collection::vec(any::<u8>(), 1..256),
            flip in any::<prop::sample::Index>(),
        ) {
            let cipher = ChaCha20Poly1305Cipher;
            let key = test_key();

            let mut envelope = seal(&cipher, &key, b"", &plaintext).unwrap();

            // Flip one bit anywhere past the nonce: ciphertext or tag
            let start = NONCE_LEN * 8;
            let bit = start + flip.index((envelope.len() - NONCE_LEN) * 8);
            envelope[bit / 8] ^= 1 << (bit % 8);

            prop_assert_eq!(open(&cipher, &key, b"", &envelope), Err(CryptoError::AuthFailed));
        }

        #[test]
        fn roundtrip_arbitrary_payloads(plaintext in prop::collection::vec(any::<u8>(), 0..1024)) {
            let cipher = ChaCha20Poly1305Cipher;
            let key = test_key();

            let envelope = seal(&cipher, &key, b"aad", &plaintext).unwrap();
            let decrypted = open(&cipher, &key, b"aad", &envelope).unwrap();
            prop_assert_eq!(decrypted, plaintext);
        }
    }
}
