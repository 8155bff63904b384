//! Authenticated Encryption with Associated Data
//!
//! AES-256-GCM with explicit 12-byte nonces. Nonce management is the
//! caller's concern: protocol messages use one-shot keys with a random
//! nonce, file chunks use a counter nonce under a never-reused subkey, the
//! vault stores a fresh random IV per entry. Associated data is mandatory
//! for protocol frames.
//!
//! The ciphertext carries the 16-byte GCM tag appended.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::{error::CryptoError, rng};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Seal `plaintext` under `key` with the given nonce and associated data.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Aead)?;
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Aead)
}

/// Open `ciphertext` (ct || tag). Fails with `Aead` on tag mismatch.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Aead)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::Aead)?;
    Ok(Zeroizing::new(plaintext))
}

/// A fresh random 12-byte nonce for callers that store the nonce alongside
/// the ciphertext (vault entries, protocol envelopes).
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    rng::random_array()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [3u8; 32];
        let nonce = [5u8; 12];
        let ct = seal(&key, &nonce, b"aad", b"hello tallow").unwrap();
        assert_eq!(ct.len(), 12 + TAG_LEN);
        let pt = open(&key, &nonce, b"aad", &ct).unwrap();
        assert_eq!(&pt[..], b"hello tallow");
    }

    #[test]
    fn single_bit_flip_in_ciphertext_fails() {
        let key = [3u8; 32];
        let nonce = [5u8; 12];
        let mut ct = seal(&key, &nonce, b"aad", b"payload").unwrap();
        ct[0] ^= 0x01;
        assert!(matches!(open(&key, &nonce, b"aad", &ct), Err(CryptoError::Aead)));
    }

    #[test]
    fn aad_mismatch_fails() {
        let key = [3u8; 32];
        let nonce = [5u8; 12];
        let ct = seal(&key, &nonce, b"aad", b"payload").unwrap();
        assert!(matches!(open(&key, &nonce, b"bad", &ct), Err(CryptoError::Aead)));
    }

    #[test]
    fn nonce_mismatch_fails() {
        let key = [3u8; 32];
        let ct = seal(&key, &[5u8; 12], b"aad", b"payload").unwrap();
        assert!(matches!(open(&key, &[6u8; 12], b"aad", &ct), Err(CryptoError::Aead)));
    }
}
