//! Hash utilities
//!
//! BLAKE3 is the workhorse for hashing, keyed MACs, and context-string key
//! derivation. SHA-256 is kept for fingerprints and the HKDF/PBKDF2 suite
//! in `kdf`.

use sha2::{Digest, Sha256};

/// BLAKE3 hash of arbitrary bytes.
pub fn hash(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

/// Keyed BLAKE3 — used for MACs where a key context differentiates domains.
pub fn mac(key: &[u8; 32], data: &[u8]) -> [u8; 32] {
    blake3::keyed_hash(key, data).into()
}

/// BLAKE3 derive-key: a 32-byte key bound to a context string.
pub fn derive_key(context: &str, ikm: &[u8]) -> [u8; 32] {
    blake3::derive_key(context, ikm)
}

/// SHA-256, kept for fingerprints and interop with the HKDF suite.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Human-readable key fingerprint: first 16 bytes of SHA-256 over the
/// public key bytes, uppercase hex in groups of four.
///
/// Example: "A1B2 C3D4 E5F6 7890 ABCD EF01 2345 6789"
pub fn fingerprint(pubkey: &[u8]) -> String {
    let digest = sha256(pubkey);
    let hex = hex::encode_upper(&digest[..16]);
    hex.as_bytes()
        .chunks(4)
        .map(|c| std::str::from_utf8(c).expect("hex is ascii"))
        .collect::<Vec<_>>()
        .join(" ")
}
