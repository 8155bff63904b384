use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("vault is locked — unlock with password first")]
    VaultLocked,

    #[error("crypto error: {0}")]
    Crypto(#[from] tallow_crypto::CryptoError),

    #[error("record error: {0}")]
    Record(#[from] tallow_proto::WireError),

    #[error("entry id {0:?} is reserved")]
    ReservedId(String),

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("migration error: {0}")]
    Migration(String),
}
