//! tallow_store — password-unlocked encrypted local vault for Tallow
//!
//! # Encryption strategy
//! SQLite does NOT natively encrypt. Entries are sealed application-side:
//! each row is a binary record whose payload is AES-256-GCM ciphertext
//! under a PBKDF2-derived master key, with the entry id as AAD and a fresh
//! IV per write. Metadata and timestamps stay plaintext so listing works
//! while locked.
//!
//! The master key lives in memory only while unlocked; `lock()` (manual or
//! via the inactivity auto-lock) zeroizes it deterministically.

pub mod db;
pub mod error;
pub mod vault;

pub use db::{EntryInfo, VaultConfig, VaultStore, RESERVED_SALT_ID};
pub use error::StoreError;
pub use vault::{Vault, DEFAULT_LOCK_TIMEOUT};
