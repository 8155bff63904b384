//! Prekeys — pre-published hybrid KEM keys, signed by an identity key.
//!
//! A peer that wants to be reachable publishes a `PreKeyBundle`: its
//! identity public key, a signed prekey (rotated weekly), and optionally a
//! batch of one-time prekeys each consumed by a single session.
//!
//! Non-negotiable: the prekey signature is verified BEFORE any key
//! material is mixed. Unsigned or expired prekeys never reach the KEM.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::CryptoError,
    kem::{self, HybridKemCiphertext, HybridKemKeyPair, HybridKemPublicKey},
    sign::{b64_bytes, PublicKeyBytes, SignatureKeyPair},
};

/// Signed prekeys older than this are rejected.
pub const SIGNED_PREKEY_MAX_AGE_DAYS: i64 = 7;

/// Published prekey: a hybrid KEM public key with an identity signature
/// over its canonical encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPreKey {
    pub public: HybridKemPublicKey,
    pub created_at: DateTime<Utc>,
    #[serde(with = "b64_bytes")]
    pub signature: Vec<u8>,
}

/// A signed prekey together with its secret half, kept locally.
pub struct SignedPreKeyPair {
    pub keypair: HybridKemKeyPair,
    pub signed: SignedPreKey,
}

/// One-time prekey: same shape as a signed prekey plus an opaque id so the
/// publisher can delete the consumed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimePreKey {
    pub id: u32,
    pub public: HybridKemPublicKey,
    pub created_at: DateTime<Utc>,
    #[serde(with = "b64_bytes")]
    pub signature: Vec<u8>,
}

/// A one-time prekey with its secret half.
pub struct OneTimePreKeyPair {
    pub id: u32,
    pub keypair: HybridKemKeyPair,
}

/// Everything an initiator needs to open a session with a peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreKeyBundle {
    pub identity: PublicKeyBytes,
    pub signed_prekey: SignedPreKey,
    pub one_time_prekey: Option<OneTimePreKey>,
}

/// Generate a fresh signed prekey under the given identity.
pub fn generate_signed_prekey(
    identity: &SignatureKeyPair,
) -> Result<SignedPreKeyPair, CryptoError> {
    let keypair = kem::generate()?;
    let signature = identity.sign(&keypair.public.to_bytes())?;
    let signed = SignedPreKey {
        public: keypair.public.clone(),
        created_at: Utc::now(),
        signature,
    };
    Ok(SignedPreKeyPair { keypair, signed })
}

/// Generate a batch of one-time prekeys with sequential ids.
pub fn generate_one_time_prekeys(
    identity: &SignatureKeyPair,
    start_id: u32,
    count: usize,
) -> Result<(Vec<OneTimePreKey>, Vec<OneTimePreKeyPair>), CryptoError> {
    let mut published = Vec::with_capacity(count);
    let mut secrets = Vec::with_capacity(count);
    for i in 0..count {
        let id = start_id + i as u32;
        let keypair = kem::generate()?;
        let signature = identity.sign(&keypair.public.to_bytes())?;
        published.push(OneTimePreKey {
            id,
            public: keypair.public.clone(),
            created_at: Utc::now(),
            signature,
        });
        secrets.push(OneTimePreKeyPair { id, keypair });
    }
    Ok((published, secrets))
}

/// Verify a prekey signature and age against the owning identity.
pub fn verify_signed_prekey(
    identity: &PublicKeyBytes,
    prekey: &SignedPreKey,
) -> Result<(), CryptoError> {
    crate::sign::verify_with(identity, &prekey.public.to_bytes(), &prekey.signature)?;
    if Utc::now() - prekey.created_at > Duration::days(SIGNED_PREKEY_MAX_AGE_DAYS) {
        return Err(CryptoError::Protocol(format!(
            "signed prekey expired (older than {SIGNED_PREKEY_MAX_AGE_DAYS} days)"
        )));
    }
    Ok(())
}

impl PreKeyBundle {
    /// Verify every signature in the bundle. One-time prekeys carry no
    /// expiry; they are deleted by the publisher once consumed.
    pub fn verify(&self) -> Result<(), CryptoError> {
        verify_signed_prekey(&self.identity, &self.signed_prekey)?;
        if let Some(opk) = &self.one_time_prekey {
            crate::sign::verify_with(&self.identity, &opk.public.to_bytes(), &opk.signature)?;
        }
        Ok(())
    }

    /// Initiator bootstrap: verify the bundle, then encapsulate against the
    /// one-time prekey when present, the signed prekey otherwise.
    ///
    /// Returns the ciphertext to transmit and the initial shared secret
    /// that seeds the ratchet.
    pub fn initiate(&self) -> Result<(HybridKemCiphertext, [u8; 32]), CryptoError> {
        self.verify()?;
        let target = self
            .one_time_prekey
            .as_ref()
            .map(|opk| &opk.public)
            .unwrap_or(&self.signed_prekey.public);
        kem::encapsulate(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::SigAlgorithm;

    #[test]
    fn signed_prekey_roundtrip() {
        let identity = SignatureKeyPair::generate(SigAlgorithm::Ed25519).unwrap();
        let spk = generate_signed_prekey(&identity).unwrap();
        verify_signed_prekey(&identity.public, &spk.signed).unwrap();
    }

    #[test]
    fn rejects_prekey_signed_by_wrong_identity() {
        let identity = SignatureKeyPair::generate(SigAlgorithm::Ed25519).unwrap();
        let evil = SignatureKeyPair::generate(SigAlgorithm::Ed25519).unwrap();
        let spk = generate_signed_prekey(&identity).unwrap();
        assert!(matches!(
            verify_signed_prekey(&evil.public, &spk.signed),
            Err(CryptoError::Signature)
        ));
    }

    #[test]
    fn rejects_unsigned_prekey() {
        let identity = SignatureKeyPair::generate(SigAlgorithm::Ed25519).unwrap();
        let mut spk = generate_signed_prekey(&identity).unwrap();
        spk.signed.signature.clear();
        assert!(verify_signed_prekey(&identity.public, &spk.signed).is_err());
    }

    #[test]
    fn rejects_expired_prekey() {
        let identity = SignatureKeyPair::generate(SigAlgorithm::Ed25519).unwrap();
        let mut spk = generate_signed_prekey(&identity).unwrap();
        spk.signed.created_at = Utc::now() - Duration::days(SIGNED_PREKEY_MAX_AGE_DAYS + 1);
        assert!(matches!(
            verify_signed_prekey(&identity.public, &spk.signed),
            Err(CryptoError::Protocol(_))
        ));
    }

    #[test]
    fn bundle_initiate_agrees_with_responder() {
        let identity = SignatureKeyPair::generate(SigAlgorithm::Hybrid).unwrap();
        let spk = generate_signed_prekey(&identity).unwrap();
        let bundle = PreKeyBundle {
            identity: identity.public.clone(),
            signed_prekey: spk.signed.clone(),
            one_time_prekey: None,
        };
        let (ct, initiator_secret) = bundle.initiate().unwrap();
        let responder_secret = kem::decapsulate(&spk.keypair, &ct).unwrap();
        assert_eq!(initiator_secret, responder_secret);
    }

    #[test]
    fn bundle_prefers_one_time_prekey() {
        let identity = SignatureKeyPair::generate(SigAlgorithm::Ed25519).unwrap();
        let spk = generate_signed_prekey(&identity).unwrap();
        let (published, mut secrets) = generate_one_time_prekeys(&identity, 100, 1).unwrap();
        let bundle = PreKeyBundle {
            identity: identity.public.clone(),
            signed_prekey: spk.signed.clone(),
            one_time_prekey: Some(published[0].clone()),
        };
        let (ct, initiator_secret) = bundle.initiate().unwrap();
        let opk = secrets.remove(0);
        let responder_secret = kem::decapsulate(&opk.keypair, &ct).unwrap();
        assert_eq!(initiator_secret, responder_secret);
    }
}
