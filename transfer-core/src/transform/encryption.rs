// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # AES-256-GCM Cipher
//!
//! Per-chunk AEAD encryption. The 96-bit IV is a counter construction: a
//! 32-bit per-session nonce (fixed for the life of one transfer) followed
//! by the 64-bit big-endian `chunk_index`. As long as a session nonce is
//! never reused across transfers under the same key and indices stay
//! unique within a transfer (`TransferCoordinator` guarantees both), the
//! same key never encrypts two chunks under the same IV.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use zeroize::Zeroizing;

use transfer_domain::{Cipher, TransferError};

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Holds a 256-bit key, zeroized on drop.
pub struct AesGcmCipher {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl AesGcmCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key: Zeroizing::new(key) }
    }

    pub fn from_slice(key: &[u8]) -> Result<Self, TransferError> {
        let array: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| TransferError::KeyDerivationFailure(format!("expected {KEY_LEN}-byte key, got {}", key.len())))?;
        Ok(Self::new(array))
    }

    /// Builds the counter-construction IV for one chunk of one session:
    /// `session_nonce(4B) || chunk_index(8B, big-endian)`.
    pub fn iv_for_chunk(session_nonce: [u8; 4], chunk_index: u64) -> [u8; IV_LEN] {
        let mut iv = [0u8; IV_LEN];
        iv[..4].copy_from_slice(&session_nonce);
        iv[4..].copy_from_slice(&chunk_index.to_be_bytes());
        iv
    }

    /// Generates a fresh random session nonce, one per transfer.
    pub fn random_session_nonce() -> [u8; 4] {
        let mut nonce = [0u8; 4];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut nonce);
        nonce
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8], aad: &[u8], iv: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TransferError> {
        if iv.len() != IV_LEN {
            return Err(TransferError::EncryptionFailure(format!(
                "AES-GCM requires a {IV_LEN}-byte iv, got {}",
                iv.len()
            )));
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()));
        let nonce = Nonce::from_slice(iv);

        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(nonce, aad, &mut buffer)
            .map_err(|e| TransferError::EncryptionFailure(e.to_string()))?;

        Ok((buffer, tag.to_vec()))
    }

    fn decrypt(&self, ciphertext: &[u8], tag: &[u8], aad: &[u8], iv: &[u8]) -> Result<Vec<u8>, TransferError> {
        if iv.len() != IV_LEN {
            return Err(TransferError::DecryptionFailure(format!(
                "AES-GCM requires a {IV_LEN}-byte iv, got {}",
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(TransferError::DecryptionFailure(format!(
                "AES-GCM requires a {TAG_LEN}-byte tag, got {}",
                tag.len()
            )));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()));
        let nonce = Nonce::from_slice(iv);
        let tag = GenericArray::from_slice(tag);

        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(nonce, aad, &mut buffer, tag)
            .map_err(|_| TransferError::DecryptionFailure("AEAD tag verification failed".into()))?;

        Ok(buffer)
    }

    fn iv_len(&self) -> usize {
        IV_LEN
    }

    fn tag_len(&self) -> usize {
        TAG_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AesGcmCipher {
        AesGcmCipher::new([7u8; KEY_LEN])
    }

    #[test]
    fn round_trips_plaintext() {
        let cipher = cipher();
        let iv = AesGcmCipher::iv_for_chunk([1, 2, 3, 4], 3);
        let aad = b"transfer-id-and-chunk-index";
        let (ciphertext, tag) = cipher.encrypt(b"hello chunk", aad, &iv).unwrap();
        let plaintext = cipher.decrypt(&ciphertext, &tag, aad, &iv).unwrap();
        assert_eq!(plaintext, b"hello chunk");
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let cipher = cipher();
        let iv = AesGcmCipher::iv_for_chunk([1, 2, 3, 4], 0);
        let (mut ciphertext, tag) = cipher.encrypt(b"payload", b"", &iv).unwrap();
        ciphertext[0] ^= 0xFF;
        let err = cipher.decrypt(&ciphertext, &tag, b"", &iv).unwrap_err();
        assert!(matches!(err, TransferError::DecryptionFailure(_)));
    }

    #[test]
    fn mismatched_aad_fails_decryption() {
        let cipher = cipher();
        let iv = AesGcmCipher::iv_for_chunk([1, 2, 3, 4], 0);
        let (ciphertext, tag) = cipher.encrypt(b"payload", b"aad-a", &iv).unwrap();
        let err = cipher.decrypt(&ciphertext, &tag, b"aad-b", &iv).unwrap_err();
        assert!(matches!(err, TransferError::DecryptionFailure(_)));
    }

    #[test]
    fn distinct_chunk_indices_yield_distinct_ivs() {
        let iv0 = AesGcmCipher::iv_for_chunk([1, 2, 3, 4], 0);
        let iv1 = AesGcmCipher::iv_for_chunk([1, 2, 3, 4], 1);
        assert_ne!(iv0, iv1);
    }

    #[test]
    fn distinct_session_nonces_yield_distinct_ivs_for_same_index() {
        let iv0 = AesGcmCipher::iv_for_chunk([1, 2, 3, 4], 5);
        let iv1 = AesGcmCipher::iv_for_chunk([5, 6, 7, 8], 5);
        assert_ne!(iv0, iv1);
    }

    #[test]
    fn rejects_wrong_length_key() {
        let err = AesGcmCipher::from_slice(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, TransferError::KeyDerivationFailure(_)));
    }
}
