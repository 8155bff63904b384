//! Key derivation
//!
//! HKDF-SHA256 carries the whole protocol key schedule; PBKDF2-SHA256 is
//! the password path (vault unlock, password-mode file encryption). The
//! ratchet schedule lives here so every derivation label is in one place.
//!
//! Labels (fixed per deployment, versioned):
//!   tallow-root-key-v1       initial root key from the hybrid KEM secret
//!   tallow-send-chain-v1     initial sending chain (initiator side)
//!   tallow-receive-chain-v1  initial receiving chain (initiator side)
//!   tallow-root-v1           root update on a DH ratchet step
//!   tallow-message-key-v1    chain key -> message key
//!   tallow-chain-ratchet-v1  chain key -> next chain key
//!   tallow-file-v1           per-file subkey from a master key

use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Enforced floor for PBKDF2-SHA256 iteration counts.
pub const PBKDF2_MIN_ITERATIONS: u32 = 600_000;

/// HKDF-SHA256 extract-then-expand into `output.len()` bytes.
///
/// `salt` of `None` uses the all-zero salt per RFC 5869.
pub fn hkdf_extract_expand(
    salt: Option<&[u8]>,
    ikm: &[u8],
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// PBKDF2-SHA256. Iteration counts below [`PBKDF2_MIN_ITERATIONS`] are
/// rejected with `KdfParams` before any work is done.
pub fn pbkdf2_derive(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output: &mut [u8],
) -> Result<(), CryptoError> {
    if iterations < PBKDF2_MIN_ITERATIONS {
        return Err(CryptoError::KdfParams(format!(
            "PBKDF2 iteration count {iterations} below the {PBKDF2_MIN_ITERATIONS} floor"
        )));
    }
    pbkdf2_hmac::<Sha256>(password, salt, iterations, output);
    Ok(())
}

// ── Ratchet key schedule ─────────────────────────────────────────────────────

/// Initial root key from the hybrid KEM shared secret.
pub fn initial_root(shared_secret: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let mut rk = [0u8; 32];
    hkdf_extract_expand(Some(&[0u8; 32]), shared_secret, b"tallow-root-key-v1", &mut rk)?;
    Ok(rk)
}

/// Initial chain keys derived from the root key.
///
/// Returns (send chain, receive chain) as seen from the INITIATOR; the
/// responder swaps them.
pub fn initial_chains(root_key: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let hk = Hkdf::<Sha256>::from_prk(root_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let mut ck_send = [0u8; 32];
    let mut ck_recv = [0u8; 32];
    hk.expand(b"tallow-send-chain-v1", &mut ck_send)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    hk.expand(b"tallow-receive-chain-v1", &mut ck_recv)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok((ck_send, ck_recv))
}

/// Root update on a DH ratchet step: mix a fresh KEM shared secret into the
/// root key. Returns (new root key, new chain key).
pub fn ratchet_root(
    root_key: &[u8; 32],
    kem_secret: &[u8; 32],
) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let mut okm = [0u8; 64];
    hkdf_extract_expand(Some(root_key), kem_secret, b"tallow-root-v1", &mut okm)?;
    let mut new_root = [0u8; 32];
    let mut chain = [0u8; 32];
    new_root.copy_from_slice(&okm[..32]);
    chain.copy_from_slice(&okm[32..]);
    okm.zeroize();
    Ok((new_root, chain))
}

/// Symmetric chain ratchet: chain key -> (next chain key, message key).
pub fn chain_step(chain_key: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let hk = Hkdf::<Sha256>::from_prk(chain_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let mut mk = [0u8; 32];
    let mut next_ck = [0u8; 32];
    hk.expand(b"tallow-message-key-v1", &mut mk)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    hk.expand(b"tallow-chain-ratchet-v1", &mut next_ck)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok((next_ck, mk))
}

/// Per-file subkey: HKDF(salt = per-file random salt, ikm = master key).
///
/// Chunk nonces are deterministic by index, so a file key MUST NOT be
/// reused across files; the random salt guarantees that.
pub fn file_subkey(master_key: &[u8; 32], file_salt: &[u8; 16]) -> Result<[u8; 32], CryptoError> {
    let mut key = [0u8; 32];
    hkdf_extract_expand(Some(file_salt), master_key, b"tallow-file-v1", &mut key)?;
    Ok(key)
}
