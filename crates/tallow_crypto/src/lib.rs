//! tallow_crypto — hybrid post-quantum cryptographic core for Tallow
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop and after single use.
//! - Message keys are one-shot: derived once, sealed/opened once, wiped.
//!
//! # Module layout
//! - `rng`      — CSPRNG helpers (fresh bytes, salts)
//! - `mem`      — secure-erasure wipe + constant-time comparison
//! - `hash`     — BLAKE3 / SHA-256 utilities, key fingerprints
//! - `kdf`      — HKDF-SHA256, PBKDF2-SHA256, ratchet key schedule
//! - `aead`     — AES-256-GCM seal/open with explicit nonces
//! - `sign`     — signature authority (Ed25519 / ML-DSA-65 / SLH-DSA / hybrid)
//! - `prekey`   — signed + one-time prekeys over hybrid KEM public keys
//! - `kem`      — hybrid ML-KEM-768 + X25519 encapsulation
//! - `ratchet`  — Double Ratchet with KEM-based DH ratchet steps
//! - `error`    — unified error type

pub mod aead;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod kem;
pub mod mem;
pub mod prekey;
pub mod ratchet;
pub mod rng;
pub mod sign;

pub use error::CryptoError;
