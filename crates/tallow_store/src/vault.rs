//! Vault: in-memory master key unlocked by user password.
//!
//! The vault holds the 32-byte entry-encryption key in memory. When the
//! user locks the store (or the inactivity auto-lock fires) the key is
//! zeroized. The key is derived with PBKDF2-SHA256 at 600 000 iterations;
//! the salt is persisted by the store, never secret.
//!
//! Auto-lock is checked lazily on access and is idempotent: firing it on
//! an already-locked vault is a no-op. Every successful key access resets
//! the inactivity timer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use zeroize::ZeroizeOnDrop;

use tallow_crypto::kdf;

use crate::error::StoreError;

/// Inactivity window before the vault locks itself.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(ZeroizeOnDrop)]
struct VaultInner {
    key: [u8; 32],
    #[zeroize(skip)]
    last_activity: Instant,
    #[zeroize(skip)]
    lock_timeout: Duration,
}

/// Thread-safe vault key handle. Cheap to clone.
#[derive(Clone)]
pub struct Vault {
    inner: Arc<RwLock<Option<VaultInner>>>,
    lock_timeout: Duration,
}

impl Vault {
    pub fn new(lock_timeout: Duration) -> Self {
        Self { inner: Arc::new(RwLock::new(None)), lock_timeout }
    }

    /// Derive the master key from `password` and `salt` and unlock.
    pub async fn unlock(&self, password: &[u8], salt: &[u8]) -> Result<(), StoreError> {
        let mut key = [0u8; 32];
        kdf::pbkdf2_derive(password, salt, kdf::PBKDF2_MIN_ITERATIONS, &mut key)?;
        self.unlock_with_key(key).await
    }

    /// Unlock with an already-derived key (takes ownership; the vault wipes
    /// it on lock).
    pub async fn unlock_with_key(&self, key: [u8; 32]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        *guard = Some(VaultInner {
            key,
            last_activity: Instant::now(),
            lock_timeout: self.lock_timeout,
        });
        Ok(())
    }

    /// Lock the vault, zeroizing the key. A no-op when already locked.
    pub async fn lock(&self) {
        let mut guard = self.inner.write().await;
        if guard.take().is_some() {
            tracing::debug!("vault locked");
        }
    }

    /// Locked state, applying the lazy auto-lock check.
    pub async fn is_locked(&self) -> bool {
        let expired = {
            let guard = self.inner.read().await;
            match guard.as_ref() {
                None => return true,
                Some(inner) => {
                    !inner.lock_timeout.is_zero()
                        && inner.last_activity.elapsed() > inner.lock_timeout
                }
            }
        };
        if expired {
            tracing::debug!("auto-lock expired; locking vault");
            self.lock().await;
        }
        expired
    }

    /// Run `f` with the master key. Fails with `VaultLocked` when locked or
    /// expired; a successful access resets the inactivity timer.
    pub async fn with_key<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&[u8; 32]) -> Result<R, StoreError>,
    {
        if self.is_locked().await {
            return Err(StoreError::VaultLocked);
        }
        let mut guard = self.inner.write().await;
        match guard.as_mut() {
            Some(inner) => {
                inner.last_activity = Instant::now();
                f(&inner.key)
            }
            None => Err(StoreError::VaultLocked),
        }
    }

    /// Time remaining until auto-lock; `None` when locked.
    pub async fn time_until_lock(&self) -> Option<Duration> {
        let guard = self.inner.read().await;
        guard.as_ref().map(|inner| {
            if inner.lock_timeout.is_zero() {
                return Duration::MAX;
            }
            inner.lock_timeout.saturating_sub(inner.last_activity.elapsed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unlock_lock_cycle() {
        let vault = Vault::new(DEFAULT_LOCK_TIMEOUT);
        assert!(vault.is_locked().await);

        vault.unlock(b"password", b"0123456789abcdef").await.unwrap();
        assert!(!vault.is_locked().await);
        let key = vault.with_key(|k| Ok(*k)).await.unwrap();
        assert_ne!(key, [0u8; 32]);

        vault.lock().await;
        assert!(vault.is_locked().await);
        assert!(matches!(
            vault.with_key(|_| Ok(())).await,
            Err(StoreError::VaultLocked)
        ));
    }

    #[tokio::test]
    async fn lock_is_idempotent() {
        let vault = Vault::new(DEFAULT_LOCK_TIMEOUT);
        vault.lock().await;
        vault.lock().await;
        assert!(vault.is_locked().await);
    }

    #[tokio::test]
    async fn same_password_same_key() {
        let a = Vault::new(DEFAULT_LOCK_TIMEOUT);
        let b = Vault::new(DEFAULT_LOCK_TIMEOUT);
        a.unlock(b"pw", b"salt-salt-salt-1").await.unwrap();
        b.unlock(b"pw", b"salt-salt-salt-1").await.unwrap();
        let ka = a.with_key(|k| Ok(*k)).await.unwrap();
        let kb = b.with_key(|k| Ok(*k)).await.unwrap();
        assert_eq!(ka, kb);
    }

    #[tokio::test]
    async fn auto_lock_fires_after_inactivity() {
        let vault = Vault::new(Duration::from_millis(10));
        vault.unlock_with_key([7u8; 32]).await.unwrap();
        assert!(!vault.is_locked().await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(vault.is_locked().await);
    }
}
