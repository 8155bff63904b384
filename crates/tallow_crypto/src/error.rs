use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("KEM operation failed: {0}")]
    Kem(String),

    #[error("AEAD authentication failed (tag mismatch — possible tampering)")]
    Aead,

    #[error("signature verification failed")]
    Signature,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("message counter {0} already consumed and no stored key remains")]
    Replay(u32),

    #[error("skipped-key limit exceeded: jump of {requested} past the {max} bound")]
    TooManySkipped { requested: u32, max: u32 },

    #[error("session is closed")]
    Closed,

    #[error("KDF parameters rejected: {0}")]
    KdfParams(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}
