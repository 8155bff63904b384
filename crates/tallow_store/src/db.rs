//! SQLite-backed vault store.
//!
//! SQLite does not natively encrypt; entries are sealed application-side.
//! Each row holds one binary [`VaultRecord`]: the payload is AES-256-GCM
//! ciphertext under the vault master key with the entry id as AAD and a
//! fresh 12-byte IV per write. Metadata and timestamps stay plaintext so
//! listing never needs the key.
//!
//! Writes go through an upsert inside SQLite's transactional machinery, so
//! a failing store leaves the previous record intact.
//!
//! WAL journal mode and foreign-key enforcement are configured at
//! connection time, not inside a migration — SQLite forbids changing
//! `journal_mode` inside a transaction and sqlx wraps every migration in
//! one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
    Row, SqlitePool,
};
use zeroize::Zeroizing;

use chrono::Utc;
use tallow_crypto::{aead, rng};
use tallow_proto::record::{decode_record, encode_record, EntryMetadata, VaultRecord};

use crate::{
    error::StoreError,
    vault::{Vault, DEFAULT_LOCK_TIMEOUT},
};

/// Reserved entry id persisting the KDF salt, plaintext.
pub const RESERVED_SALT_ID: &str = "__vault_salt__";

/// Store configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub db_path: PathBuf,
    pub lock_timeout: Duration,
}

impl VaultConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into(), lock_timeout: DEFAULT_LOCK_TIMEOUT }
    }
}

/// Listing projection: everything except the payload.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EntryInfo {
    pub id: String,
    pub metadata: EntryMetadata,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// Central store handle. Cheap to clone.
#[derive(Clone)]
pub struct VaultStore {
    pool: SqlitePool,
    vault: Vault,
}

impl VaultStore {
    /// Open (or create) the vault database and unlock it with `password`.
    ///
    /// On first open a fresh KDF salt is generated and persisted under
    /// [`RESERVED_SALT_ID`]; later opens reuse it. The password is NOT
    /// verified here — a wrong password surfaces as `Aead` on the first
    /// `retrieve`.
    pub async fn open(config: &VaultConfig, password: &str) -> Result<Self, StoreError> {
        let pool = connect(&config.db_path).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        let vault = Vault::new(config.lock_timeout);
        let store = Self { pool, vault };

        let salt = match store.fetch_record(RESERVED_SALT_ID).await? {
            Some(record) => record.ciphertext,
            None => {
                let salt = rng::generate_salt().to_vec();
                let now = now_ms();
                let record = VaultRecord {
                    id: RESERVED_SALT_ID.into(),
                    iv: [0u8; aead::NONCE_LEN],
                    ciphertext: salt.clone(),
                    metadata: "{}".into(),
                    created_at_ms: now,
                    updated_at_ms: now,
                };
                store.write_record(&record).await?;
                salt
            }
        };
        store.vault.unlock(password.as_bytes(), &salt).await?;
        tracing::debug!(path = %config.db_path.display(), "vault store opened");
        Ok(store)
    }

    /// Encrypt and persist an entry. Overwriting keeps the original
    /// creation timestamp.
    pub async fn store(
        &self,
        id: &str,
        plaintext: &[u8],
        metadata: &EntryMetadata,
    ) -> Result<(), StoreError> {
        self.check_id(id)?;
        let iv = aead::generate_nonce();
        let id_aad = id.as_bytes().to_vec();
        let plaintext = plaintext.to_vec();
        let ciphertext = self
            .vault
            .with_key(move |key| {
                aead::seal(key, &iv, &id_aad, &plaintext).map_err(StoreError::Crypto)
            })
            .await?;

        let now = now_ms();
        let created_at_ms = match self.fetch_record(id).await? {
            Some(existing) => existing.created_at_ms,
            None => now,
        };
        let record = VaultRecord {
            id: id.into(),
            iv,
            ciphertext,
            metadata: serde_json::to_string(metadata)?,
            created_at_ms,
            updated_at_ms: now,
        };
        self.write_record(&record).await
    }

    /// Decrypt an entry. `None` when absent; `Aead` on tag mismatch
    /// (corruption or wrong master key).
    pub async fn retrieve(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StoreError> {
        self.check_id(id)?;
        let Some(record) = self.fetch_record(id).await? else {
            return Ok(None);
        };
        let id_aad = id.as_bytes().to_vec();
        let plaintext = self
            .vault
            .with_key(move |key| {
                aead::open(key, &record.iv, &id_aad, &record.ciphertext)
                    .map_err(StoreError::Crypto)
            })
            .await?;
        Ok(Some(plaintext))
    }

    /// Remove an entry. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.check_id(id)?;
        let result = sqlx::query("DELETE FROM vault_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List ids and metadata without touching the master key.
    pub async fn list(&self) -> Result<Vec<EntryInfo>, StoreError> {
        let rows = sqlx::query("SELECT record FROM vault_entries WHERE id <> ? ORDER BY id")
            .bind(RESERVED_SALT_ID)
            .fetch_all(&self.pool)
            .await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let record = decode_record(&row.try_get::<Vec<u8>, _>("record")?)?;
            let metadata = serde_json::from_str(&record.metadata).unwrap_or_default();
            entries.push(EntryInfo {
                id: record.id,
                metadata,
                created_at_ms: record.created_at_ms,
                updated_at_ms: record.updated_at_ms,
            });
        }
        Ok(entries)
    }

    /// Delete every entry except the persisted KDF salt.
    pub async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM vault_entries WHERE id <> ?")
            .bind(RESERVED_SALT_ID)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Lock the vault; entries stay on disk, the key is wiped.
    pub async fn lock(&self) {
        self.vault.lock().await;
    }

    pub async fn is_locked(&self) -> bool {
        self.vault.is_locked().await
    }

    /// The underlying key handle, for hosts that manage locking directly.
    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    // ── Internal ─────────────────────────────────────────────────────────

    fn check_id(&self, id: &str) -> Result<(), StoreError> {
        if id == RESERVED_SALT_ID {
            return Err(StoreError::ReservedId(id.into()));
        }
        Ok(())
    }

    async fn fetch_record(&self, id: &str) -> Result<Option<VaultRecord>, StoreError> {
        let row = sqlx::query("SELECT record FROM vault_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => Ok(Some(decode_record(&row.try_get::<Vec<u8>, _>("record")?)?)),
        }
    }

    async fn write_record(&self, record: &VaultRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO vault_entries (id, record) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET record = excluded.record",
        )
        .bind(&record.id)
        .bind(encode_record(record))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn connect(db_path: &Path) -> Result<SqlitePool, StoreError> {
    let opts = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);
    Ok(SqlitePool::connect_with(opts).await?)
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}
