//! Vault entry binary record.
//!
//! The encrypted vault persists entries through whatever storage engine
//! the host provides; this is the engine-agnostic record each entry
//! serialises to.
//!
//! Layout (integers big-endian):
//!   id_len       2B
//!   id           ..  UTF-8
//!   iv           12B
//!   ct_len       4B
//!   ct           ..  ciphertext ‖ GCM tag (the salt record stores its
//!                    payload here unencrypted)
//!   meta_len     4B
//!   metadata     ..  UTF-8 JSON, opaque to the codec
//!   created_at   8B  milliseconds since epoch
//!   updated_at   8B  milliseconds since epoch

use serde::{Deserialize, Serialize};

use tallow_crypto::aead;

use crate::{error::WireError, header::take};

/// One persisted vault entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRecord {
    pub id: String,
    pub iv: [u8; aead::NONCE_LEN],
    pub ciphertext: Vec<u8>,
    /// Opaque JSON blob; see [`EntryMetadata`] for the conventional shape.
    pub metadata: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// Conventional metadata shape stored alongside an entry, never encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub fn encode_record(record: &VaultRecord) -> Vec<u8> {
    let id = record.id.as_bytes();
    let meta = record.metadata.as_bytes();
    let mut out =
        Vec::with_capacity(2 + id.len() + 12 + 4 + record.ciphertext.len() + 4 + meta.len() + 16);
    out.extend_from_slice(&(id.len() as u16).to_be_bytes());
    out.extend_from_slice(id);
    out.extend_from_slice(&record.iv);
    out.extend_from_slice(&(record.ciphertext.len() as u32).to_be_bytes());
    out.extend_from_slice(&record.ciphertext);
    out.extend_from_slice(&(meta.len() as u32).to_be_bytes());
    out.extend_from_slice(meta);
    out.extend_from_slice(&record.created_at_ms.to_be_bytes());
    out.extend_from_slice(&record.updated_at_ms.to_be_bytes());
    out
}

pub fn decode_record(input: &[u8]) -> Result<VaultRecord, WireError> {
    let mut at = 0usize;
    let id_len = u16::from_be_bytes(take(input, &mut at, 2)?.try_into().expect("2 bytes")) as usize;
    let id = String::from_utf8(take(input, &mut at, id_len)?.to_vec())
        .map_err(|_| WireError::Malformed("entry id is not valid UTF-8".into()))?;
    let iv: [u8; aead::NONCE_LEN] =
        take(input, &mut at, aead::NONCE_LEN)?.try_into().expect("12 bytes");
    let ct_len = u32::from_be_bytes(take(input, &mut at, 4)?.try_into().expect("4 bytes")) as usize;
    let ciphertext = take(input, &mut at, ct_len)?.to_vec();
    let meta_len = u32::from_be_bytes(take(input, &mut at, 4)?.try_into().expect("4 bytes")) as usize;
    let metadata = String::from_utf8(take(input, &mut at, meta_len)?.to_vec())
        .map_err(|_| WireError::Malformed("entry metadata is not valid UTF-8".into()))?;
    let created_at_ms = u64::from_be_bytes(take(input, &mut at, 8)?.try_into().expect("8 bytes"));
    let updated_at_ms = u64::from_be_bytes(take(input, &mut at, 8)?.try_into().expect("8 bytes"));
    if at != input.len() {
        return Err(WireError::Malformed("trailing bytes after the record".into()));
    }
    Ok(VaultRecord { id, iv, ciphertext, metadata, created_at_ms, updated_at_ms })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let record = VaultRecord {
            id: "session/alice".into(),
            iv: [4u8; 12],
            ciphertext: vec![0xEE; 80],
            metadata: serde_json::to_string(&EntryMetadata {
                label: "demo".into(),
                kind: "raw".into(),
                tags: vec!["t".into()],
            })
            .unwrap(),
            created_at_ms: 1_700_000_000_000,
            updated_at_ms: 1_700_000_000_500,
        };
        let bytes = encode_record(&record);
        assert_eq!(decode_record(&bytes).unwrap(), record);
    }

    #[test]
    fn metadata_roundtrips_through_json() {
        let meta = EntryMetadata { label: "demo".into(), kind: "raw".into(), tags: vec!["t".into()] };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"type\":\"raw\""));
        assert_eq!(serde_json::from_str::<EntryMetadata>(&json).unwrap(), meta);
    }

    #[test]
    fn rejects_truncated_record() {
        let record = VaultRecord {
            id: "x".into(),
            iv: [0u8; 12],
            ciphertext: vec![1, 2, 3],
            metadata: "{}".into(),
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        let bytes = encode_record(&record);
        assert!(decode_record(&bytes[..bytes.len() - 1]).is_err());
    }
}
