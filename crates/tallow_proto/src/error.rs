use thiserror::Error;

use tallow_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame truncated: needed {needed} bytes, had {have}")]
    Truncated { needed: usize, have: usize },

    #[error("bad magic, expected {expected}")]
    BadMagic { expected: &'static str },

    #[error("unsupported format version {0}")]
    Version(u8),

    #[error("unsupported algorithm tag {0:#04x}")]
    Algorithm(u8),

    #[error("nonce does not match chunk index {0}")]
    NonceMismatch(u32),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
