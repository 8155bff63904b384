//! Hybrid KEM — ML-KEM-768 ‖ X25519
//!
//! One encapsulation runs both primitives independently and folds the two
//! 32-byte secrets into a single shared secret:
//!
//!   shared = HKDF-SHA256(salt = 0x00×32, ikm = ss_pq ‖ ss_dh,
//!                        info = "tallow-hybrid-v1", 32)
//!
//! The combiner is fixed to HKDF-SHA256 for this deployment. An attacker
//! must break BOTH ML-KEM-768 and X25519 to recover the output.
//!
//! ML-KEM rejects malformed ciphertexts implicitly: decapsulation of a
//! wrong ciphertext yields a pseudorandom secret, never an error. Callers
//! authenticate the result through its subsequent use in the ratchet.

use pqcrypto_mlkem::mlkem768;
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::{error::CryptoError, kdf, mem, sign::b64_bytes};

pub const MLKEM768_PUBLIC_LEN: usize = 1184;
pub const MLKEM768_SECRET_LEN: usize = 2400;
pub const MLKEM768_CIPHERTEXT_LEN: usize = 1088;
pub const X25519_LEN: usize = 32;

/// Full hybrid public key: ML-KEM pub ‖ X25519 pub.
pub const HYBRID_PUBLIC_LEN: usize = MLKEM768_PUBLIC_LEN + X25519_LEN;
/// Full hybrid ciphertext: ML-KEM ciphertext ‖ X25519 ephemeral pub.
pub const HYBRID_CIPHERTEXT_LEN: usize = MLKEM768_CIPHERTEXT_LEN + X25519_LEN;

// ── Public key ───────────────────────────────────────────────────────────────

/// Freely shareable half of a hybrid keypair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridKemPublicKey {
    #[serde(with = "b64_bytes")]
    mlkem: Vec<u8>,
    x25519: [u8; X25519_LEN],
}

impl HybridKemPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != HYBRID_PUBLIC_LEN {
            return Err(CryptoError::Kem(format!(
                "hybrid public key must be {HYBRID_PUBLIC_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let (mlkem, x) = bytes.split_at(MLKEM768_PUBLIC_LEN);
        Ok(Self {
            mlkem: mlkem.to_vec(),
            x25519: x.try_into().expect("split leaves 32 bytes"),
        })
    }

    /// Canonical encoding: ML-KEM pub ‖ X25519 pub (1216 bytes).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HYBRID_PUBLIC_LEN);
        out.extend_from_slice(&self.mlkem);
        out.extend_from_slice(&self.x25519);
        out
    }

    /// BLAKE3 hash of the canonical encoding; used to index skipped-key
    /// chains and as a compact key fingerprint.
    pub fn hash(&self) -> [u8; 32] {
        crate::hash::hash(&self.to_bytes())
    }
}

// ── Ciphertext ───────────────────────────────────────────────────────────────

/// Output of one encapsulation; consumed exactly once by decapsulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridKemCiphertext {
    #[serde(with = "b64_bytes")]
    mlkem_ct: Vec<u8>,
    x25519_ephemeral: [u8; X25519_LEN],
}

impl HybridKemCiphertext {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != HYBRID_CIPHERTEXT_LEN {
            return Err(CryptoError::Kem(format!(
                "hybrid ciphertext must be {HYBRID_CIPHERTEXT_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let (ct, e) = bytes.split_at(MLKEM768_CIPHERTEXT_LEN);
        Ok(Self {
            mlkem_ct: ct.to_vec(),
            x25519_ephemeral: e.try_into().expect("split leaves 32 bytes"),
        })
    }

    /// Canonical encoding: ML-KEM ciphertext ‖ ephemeral X25519 pub (1120 bytes).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HYBRID_CIPHERTEXT_LEN);
        out.extend_from_slice(&self.mlkem_ct);
        out.extend_from_slice(&self.x25519_ephemeral);
        out
    }
}

// ── Keypair ──────────────────────────────────────────────────────────────────

/// Both halves of a hybrid keypair. Secret parts are wiped on drop and
/// never leave this struct.
#[derive(Serialize, Deserialize)]
pub struct HybridKemKeyPair {
    pub public: HybridKemPublicKey,
    #[serde(with = "b64_bytes")]
    mlkem_secret: Vec<u8>,
    x25519_secret: [u8; X25519_LEN],
}

impl HybridKemKeyPair {
    pub(crate) fn wipe_secrets(&mut self) {
        mem::wipe(&mut self.mlkem_secret);
        mem::wipe(&mut self.x25519_secret);
    }
}

impl Drop for HybridKemKeyPair {
    fn drop(&mut self) {
        self.mlkem_secret.zeroize();
        self.x25519_secret.zeroize();
    }
}

/// Generate a fresh hybrid keypair: independent ML-KEM-768 and X25519 keygen.
pub fn generate() -> Result<HybridKemKeyPair, CryptoError> {
    let (pk, sk) = mlkem768::keypair();
    let x_secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let x_public = X25519Public::from(&x_secret);
    Ok(HybridKemKeyPair {
        public: HybridKemPublicKey {
            mlkem: pk.as_bytes().to_vec(),
            x25519: *x_public.as_bytes(),
        },
        mlkem_secret: sk.as_bytes().to_vec(),
        x25519_secret: x_secret.to_bytes(),
    })
}

/// Encapsulate against a peer's public key.
///
/// Returns the hybrid ciphertext and the combined 32-byte shared secret.
/// Both component secrets, the ephemeral X25519 secret, and the
/// concatenation buffer are wiped before returning. The pqcrypto wrapper
/// types cannot be wiped in place, so their bytes are copied out and the
/// copies zeroized.
pub fn encapsulate(
    peer: &HybridKemPublicKey,
) -> Result<(HybridKemCiphertext, [u8; 32]), CryptoError> {
    let pk = mlkem768::PublicKey::from_bytes(&peer.mlkem)
        .map_err(|e| CryptoError::Kem(e.to_string()))?;
    let (ss_pq, ct_pq) = mlkem768::encapsulate(&pk);
    let mut ss_pq_bytes = [0u8; 32];
    ss_pq_bytes.copy_from_slice(ss_pq.as_bytes());
    drop(ss_pq);

    let mut ephemeral = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_pub = X25519Public::from(&ephemeral);
    let ss_dh = ephemeral.diffie_hellman(&X25519Public::from(peer.x25519));
    let mut ss_dh_bytes = [0u8; 32];
    ss_dh_bytes.copy_from_slice(ss_dh.as_bytes());
    drop(ss_dh);
    ephemeral.zeroize();

    let shared = combine(&ss_pq_bytes, &ss_dh_bytes);
    ss_pq_bytes.zeroize();
    ss_dh_bytes.zeroize();

    Ok((
        HybridKemCiphertext {
            mlkem_ct: ct_pq.as_bytes().to_vec(),
            x25519_ephemeral: *ephemeral_pub.as_bytes(),
        },
        shared?,
    ))
}

/// Decapsulate a hybrid ciphertext with our keypair.
///
/// Intermediate secrets are wiped exactly as in [`encapsulate`].
pub fn decapsulate(
    own: &HybridKemKeyPair,
    ciphertext: &HybridKemCiphertext,
) -> Result<[u8; 32], CryptoError> {
    let sk = mlkem768::SecretKey::from_bytes(&own.mlkem_secret)
        .map_err(|e| CryptoError::Kem(e.to_string()))?;
    let ct = mlkem768::Ciphertext::from_bytes(&ciphertext.mlkem_ct)
        .map_err(|e| CryptoError::Kem(e.to_string()))?;
    let ss_pq = mlkem768::decapsulate(&ct, &sk);
    let mut ss_pq_bytes = [0u8; 32];
    ss_pq_bytes.copy_from_slice(ss_pq.as_bytes());
    drop(ss_pq);

    let mut x_secret = StaticSecret::from(own.x25519_secret);
    let ss_dh = x_secret.diffie_hellman(&X25519Public::from(ciphertext.x25519_ephemeral));
    let mut ss_dh_bytes = [0u8; 32];
    ss_dh_bytes.copy_from_slice(ss_dh.as_bytes());
    drop(ss_dh);
    x_secret.zeroize();

    let shared = combine(&ss_pq_bytes, &ss_dh_bytes);
    ss_pq_bytes.zeroize();
    ss_dh_bytes.zeroize();
    shared
}

/// `HKDF(salt = 0, ikm = ss_pq ‖ ss_dh, info = "tallow-hybrid-v1")`.
fn combine(ss_pq: &[u8; 32], ss_dh: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let mut ikm = [0u8; 64];
    ikm[..32].copy_from_slice(ss_pq);
    ikm[32..].copy_from_slice(ss_dh);
    let mut shared = [0u8; 32];
    let result = kdf::hkdf_extract_expand(
        Some(&[0u8; 32]),
        &ikm,
        b"tallow-hybrid-v1",
        &mut shared,
    );
    ikm.zeroize();
    result?;
    Ok(shared)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encapsulate_decapsulate_agree() {
        let bob = generate().unwrap();
        let (ct, alice_secret) = encapsulate(&bob.public).unwrap();
        let bob_secret = decapsulate(&bob, &ct).unwrap();
        assert_eq!(alice_secret, bob_secret);
    }

    #[test]
    fn distinct_encapsulations_give_distinct_secrets() {
        let bob = generate().unwrap();
        let (_, s1) = encapsulate(&bob.public).unwrap();
        let (_, s2) = encapsulate(&bob.public).unwrap();
        assert_ne!(s1, s2);
    }

    #[test]
    fn tampered_ciphertext_diverges() {
        let bob = generate().unwrap();
        let (ct, alice_secret) = encapsulate(&bob.public).unwrap();
        let mut bytes = ct.to_bytes();
        bytes[0] ^= 0x01;
        let tampered = HybridKemCiphertext::from_bytes(&bytes).unwrap();
        // ML-KEM implicit rejection: decapsulation succeeds but the secret
        // no longer matches.
        let bob_secret = decapsulate(&bob, &tampered).unwrap();
        assert_ne!(alice_secret, bob_secret);
    }

    #[test]
    fn rejects_malformed_lengths() {
        assert!(HybridKemPublicKey::from_bytes(&[0u8; 100]).is_err());
        assert!(HybridKemCiphertext::from_bytes(&[0u8; HYBRID_CIPHERTEXT_LEN - 1]).is_err());
    }

    #[test]
    fn public_key_roundtrips_through_bytes() {
        let kp = generate().unwrap();
        let bytes = kp.public.to_bytes();
        assert_eq!(bytes.len(), HYBRID_PUBLIC_LEN);
        let back = HybridKemPublicKey::from_bytes(&bytes).unwrap();
        assert_eq!(back, kp.public);
        assert_eq!(back.hash(), kp.public.hash());
    }
}
