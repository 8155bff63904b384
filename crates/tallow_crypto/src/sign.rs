//! Signature authority
//!
//! Binds identities to keys across four algorithms, dispatched by a tagged
//! discriminant with a single `match` per call:
//!
//! - `Ed25519`     — realtime signing (small, fast)
//! - `MlDsa65`     — long-term post-quantum signing (FIPS 204)
//! - `SlhDsa128s`  — emergency backup signing (FIPS 205, hash-based)
//! - `Hybrid`      — Ed25519 ‖ ML-DSA-65; BOTH components must verify
//!
//! The hybrid signature is the fixed 64-byte Ed25519 signature followed by
//! the ML-DSA-65 signature. Hybrid verification evaluates both components
//! before combining the results, so a failure does not reveal via timing
//! which algorithm rejected.
//!
//! The algorithm-selection policy (realtime = Ed25519, long-term identity =
//! Hybrid, emergency = SLH-DSA) is advisory; the authority signs with
//! whatever it was generated as.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use pqcrypto_mldsa::mldsa65;
use pqcrypto_sphincsplus::sphincssha2128ssimple as slhdsa;
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as _, SecretKey as _,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{error::CryptoError, hash};

pub const ED25519_PUBLIC_LEN: usize = 32;
pub const ED25519_SECRET_LEN: usize = 32;
pub const ED25519_SIG_LEN: usize = 64;
pub const MLDSA65_PUBLIC_LEN: usize = 1952;
pub const MLDSA65_SECRET_LEN: usize = 4032;
pub const MLDSA65_SIG_LEN: usize = 3309;
pub const SLHDSA128S_PUBLIC_LEN: usize = 32;
pub const SLHDSA128S_SECRET_LEN: usize = 64;
pub const SLHDSA128S_SIG_LEN: usize = 7856;

/// Which signature algorithm a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigAlgorithm {
    Ed25519,
    MlDsa65,
    SlhDsa128s,
    Hybrid,
}

impl SigAlgorithm {
    pub fn public_key_len(self) -> usize {
        match self {
            Self::Ed25519 => ED25519_PUBLIC_LEN,
            Self::MlDsa65 => MLDSA65_PUBLIC_LEN,
            Self::SlhDsa128s => SLHDSA128S_PUBLIC_LEN,
            Self::Hybrid => ED25519_PUBLIC_LEN + MLDSA65_PUBLIC_LEN,
        }
    }

    pub fn signature_len(self) -> usize {
        match self {
            Self::Ed25519 => ED25519_SIG_LEN,
            Self::MlDsa65 => MLDSA65_SIG_LEN,
            Self::SlhDsa128s => SLHDSA128S_SIG_LEN,
            Self::Hybrid => ED25519_SIG_LEN + MLDSA65_SIG_LEN,
        }
    }
}

// ── Public key bytes ─────────────────────────────────────────────────────────

/// Raw public key bytes tagged with their algorithm, base64url on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyBytes {
    pub algorithm: SigAlgorithm,
    #[serde(with = "crate::sign::b64_bytes")]
    pub bytes: Vec<u8>,
}

impl PublicKeyBytes {
    pub fn new(algorithm: SigAlgorithm, bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != algorithm.public_key_len() {
            return Err(CryptoError::InvalidKey(format!(
                "{algorithm:?} public key must be {} bytes, got {}",
                algorithm.public_key_len(),
                bytes.len()
            )));
        }
        Ok(Self { algorithm, bytes })
    }

    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.bytes)
    }

    /// Display fingerprint for manual verification.
    pub fn fingerprint(&self) -> String {
        hash::fingerprint(&self.bytes)
    }
}

pub(crate) mod b64_bytes {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD.decode(&s).map_err(serde::de::Error::custom)
    }
}

// ── Keypair ──────────────────────────────────────────────────────────────────

/// A signing keypair. The secret half is wiped on drop.
pub struct SignatureKeyPair {
    pub public: PublicKeyBytes,
    secret: Zeroizing<Vec<u8>>,
}

impl SignatureKeyPair {
    /// Generate a fresh keypair for the given algorithm.
    pub fn generate(algorithm: SigAlgorithm) -> Result<Self, CryptoError> {
        let (public, secret) = match algorithm {
            SigAlgorithm::Ed25519 => {
                let signing = SigningKey::generate(&mut OsRng);
                (
                    signing.verifying_key().to_bytes().to_vec(),
                    signing.to_bytes().to_vec(),
                )
            }
            SigAlgorithm::MlDsa65 => {
                let (pk, sk) = mldsa65::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            SigAlgorithm::SlhDsa128s => {
                let (pk, sk) = slhdsa::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            SigAlgorithm::Hybrid => {
                let signing = SigningKey::generate(&mut OsRng);
                let (pk, sk) = mldsa65::keypair();
                let mut public = signing.verifying_key().to_bytes().to_vec();
                public.extend_from_slice(pk.as_bytes());
                let mut secret = signing.to_bytes().to_vec();
                secret.extend_from_slice(sk.as_bytes());
                (public, secret)
            }
        };
        Ok(Self {
            public: PublicKeyBytes::new(algorithm, public)?,
            secret: Zeroizing::new(secret),
        })
    }

    /// Reconstruct a persisted keypair from its raw halves.
    pub fn from_parts(
        algorithm: SigAlgorithm,
        public: Vec<u8>,
        secret: &[u8],
    ) -> Result<Self, CryptoError> {
        let expected_secret = match algorithm {
            SigAlgorithm::Ed25519 => ED25519_SECRET_LEN,
            SigAlgorithm::MlDsa65 => MLDSA65_SECRET_LEN,
            SigAlgorithm::SlhDsa128s => SLHDSA128S_SECRET_LEN,
            SigAlgorithm::Hybrid => ED25519_SECRET_LEN + MLDSA65_SECRET_LEN,
        };
        if secret.len() != expected_secret {
            return Err(CryptoError::InvalidKey(format!(
                "{algorithm:?} secret key must be {expected_secret} bytes, got {}",
                secret.len()
            )));
        }
        Ok(Self {
            public: PublicKeyBytes::new(algorithm, public)?,
            secret: Zeroizing::new(secret.to_vec()),
        })
    }

    pub fn algorithm(&self) -> SigAlgorithm {
        self.public.algorithm
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }

    /// Sign a message. Hybrid output is `ed25519_sig ‖ ml_dsa_sig`.
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self.public.algorithm {
            SigAlgorithm::Ed25519 => {
                let arr: [u8; ED25519_SECRET_LEN] =
                    self.secret.as_slice().try_into().map_err(|_| {
                        CryptoError::InvalidKey("Ed25519 secret must be 32 bytes".into())
                    })?;
                Ok(SigningKey::from_bytes(&arr).sign(msg).to_bytes().to_vec())
            }
            SigAlgorithm::MlDsa65 => {
                let sk = mldsa65::SecretKey::from_bytes(&self.secret)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
                Ok(mldsa65::detached_sign(msg, &sk).as_bytes().to_vec())
            }
            SigAlgorithm::SlhDsa128s => {
                let sk = slhdsa::SecretKey::from_bytes(&self.secret)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
                Ok(slhdsa::detached_sign(msg, &sk).as_bytes().to_vec())
            }
            SigAlgorithm::Hybrid => {
                if self.secret.len() != ED25519_SECRET_LEN + MLDSA65_SECRET_LEN {
                    return Err(CryptoError::InvalidKey("bad hybrid secret length".into()));
                }
                let (ed_secret, dsa_secret) = self.secret.split_at(ED25519_SECRET_LEN);
                let arr: [u8; ED25519_SECRET_LEN] = ed_secret.try_into().expect("split at 32");
                let mut sig = SigningKey::from_bytes(&arr).sign(msg).to_bytes().to_vec();
                let sk = mldsa65::SecretKey::from_bytes(dsa_secret)
                    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
                sig.extend_from_slice(mldsa65::detached_sign(msg, &sk).as_bytes());
                Ok(sig)
            }
        }
    }
}

// ── Verification ─────────────────────────────────────────────────────────────

fn ed25519_verifies(public: &[u8], msg: &[u8], sig: &[u8]) -> bool {
    let Ok(pk_arr) = <[u8; ED25519_PUBLIC_LEN]>::try_from(public) else {
        return false;
    };
    let Ok(vk) = VerifyingKey::from_bytes(&pk_arr) else {
        return false;
    };
    let Ok(sig_arr) = <[u8; ED25519_SIG_LEN]>::try_from(sig) else {
        return false;
    };
    vk.verify(msg, &Signature::from_bytes(&sig_arr)).is_ok()
}

fn mldsa65_verifies(public: &[u8], msg: &[u8], sig: &[u8]) -> bool {
    let Ok(pk) = mldsa65::PublicKey::from_bytes(public) else {
        return false;
    };
    let Ok(detached) = mldsa65::DetachedSignature::from_bytes(sig) else {
        return false;
    };
    mldsa65::verify_detached_signature(&detached, msg, &pk).is_ok()
}

fn slhdsa_verifies(public: &[u8], msg: &[u8], sig: &[u8]) -> bool {
    let Ok(pk) = slhdsa::PublicKey::from_bytes(public) else {
        return false;
    };
    let Ok(detached) = slhdsa::DetachedSignature::from_bytes(sig) else {
        return false;
    };
    slhdsa::verify_detached_signature(&detached, msg, &pk).is_ok()
}

/// Verify a signature made by any key of the given algorithm.
///
/// The hybrid path parses the fixed 64-byte Ed25519 prefix, evaluates both
/// components unconditionally, and only then combines the results.
pub fn verify(
    algorithm: SigAlgorithm,
    public: &[u8],
    msg: &[u8],
    sig: &[u8],
) -> Result<(), CryptoError> {
    if public.len() != algorithm.public_key_len() {
        return Err(CryptoError::InvalidKey(format!(
            "{algorithm:?} public key must be {} bytes, got {}",
            algorithm.public_key_len(),
            public.len()
        )));
    }
    let ok = match algorithm {
        SigAlgorithm::Ed25519 => ed25519_verifies(public, msg, sig),
        SigAlgorithm::MlDsa65 => mldsa65_verifies(public, msg, sig),
        SigAlgorithm::SlhDsa128s => slhdsa_verifies(public, msg, sig),
        SigAlgorithm::Hybrid => {
            let (ed_pub, dsa_pub) = public.split_at(ED25519_PUBLIC_LEN);
            let ed_sig = sig.get(..ED25519_SIG_LEN).unwrap_or(&[]);
            let dsa_sig = sig.get(ED25519_SIG_LEN..).unwrap_or(&[]);
            let ed_ok = ed25519_verifies(ed_pub, msg, ed_sig);
            let dsa_ok = mldsa65_verifies(dsa_pub, msg, dsa_sig);
            ed_ok & dsa_ok
        }
    };
    if ok {
        Ok(())
    } else {
        Err(CryptoError::Signature)
    }
}

/// Verify against a tagged public key.
pub fn verify_with(public: &PublicKeyBytes, msg: &[u8], sig: &[u8]) -> Result<(), CryptoError> {
    verify(public.algorithm, &public.bytes, msg, sig)
}
