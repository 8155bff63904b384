//! File manifest — the "TFE1" frame.
//!
//! Plaintext, but integrity-protected: its load-bearing fields (version,
//! algorithm, salt, chunk index) are bound into every chunk's AAD, so a
//! doctored manifest makes every chunk fail authentication.
//!
//! Layout (integers big-endian):
//!   magic            4B  "TFE1"
//!   version          1B  0x01
//!   algo             1B  0x01 = AES-256-GCM
//!   file_salt        16B
//!   chunk_size       4B
//!   original_size    8B
//!   chunk_count      4B
//!   created_at_ms    8B
//!   enc_filename_len 4B
//!   enc_filename     ..  a chunk frame with the reserved filename index
//!   kdf              1B  0x00 = external key, 0x01 = PBKDF2-SHA256
//!   [kdf_salt        32B, present iff kdf = 0x01]
//!   [kdf_iterations  4B,  present iff kdf = 0x01]

use crate::{
    chunk::{decode_chunk, encode_chunk, ChunkFrame},
    error::WireError,
    header::take,
};

pub const MANIFEST_MAGIC: &[u8; 4] = b"TFE1";
pub const FILE_FORMAT_VERSION: u8 = 0x01;
pub const ALGO_AES_256_GCM: u8 = 0x01;
pub const KDF_NONE: u8 = 0x00;
pub const KDF_PBKDF2_SHA256: u8 = 0x01;

/// Password-mode KDF parameters recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordKdf {
    pub salt: [u8; 32],
    pub iterations: u32,
}

/// Everything needed to decrypt a chunked file, besides the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifest {
    pub version: u8,
    pub algorithm: u8,
    pub file_salt: [u8; 16],
    pub chunk_size: u32,
    pub original_size: u64,
    pub chunk_count: u32,
    pub created_at_ms: u64,
    pub encrypted_filename: ChunkFrame,
    pub kdf: Option<PasswordKdf>,
}

pub fn encode_manifest(manifest: &FileManifest) -> Vec<u8> {
    let filename_frame = encode_chunk(&manifest.encrypted_filename);
    let mut out = Vec::with_capacity(50 + filename_frame.len() + 37);
    out.extend_from_slice(MANIFEST_MAGIC);
    out.push(manifest.version);
    out.push(manifest.algorithm);
    out.extend_from_slice(&manifest.file_salt);
    out.extend_from_slice(&manifest.chunk_size.to_be_bytes());
    out.extend_from_slice(&manifest.original_size.to_be_bytes());
    out.extend_from_slice(&manifest.chunk_count.to_be_bytes());
    out.extend_from_slice(&manifest.created_at_ms.to_be_bytes());
    out.extend_from_slice(&(filename_frame.len() as u32).to_be_bytes());
    out.extend_from_slice(&filename_frame);
    match &manifest.kdf {
        None => out.push(KDF_NONE),
        Some(kdf) => {
            out.push(KDF_PBKDF2_SHA256);
            out.extend_from_slice(&kdf.salt);
            out.extend_from_slice(&kdf.iterations.to_be_bytes());
        }
    }
    out
}

pub fn decode_manifest(input: &[u8]) -> Result<(FileManifest, usize), WireError> {
    let mut at = 0usize;

    if take(input, &mut at, 4)? != MANIFEST_MAGIC {
        return Err(WireError::BadMagic { expected: "TFE1" });
    }
    let version = take(input, &mut at, 1)?[0];
    if version != FILE_FORMAT_VERSION {
        return Err(WireError::Version(version));
    }
    let algorithm = take(input, &mut at, 1)?[0];
    if algorithm != ALGO_AES_256_GCM {
        return Err(WireError::Algorithm(algorithm));
    }
    let file_salt: [u8; 16] = take(input, &mut at, 16)?.try_into().expect("16 bytes");
    let chunk_size = u32::from_be_bytes(take(input, &mut at, 4)?.try_into().expect("4 bytes"));
    let original_size = u64::from_be_bytes(take(input, &mut at, 8)?.try_into().expect("8 bytes"));
    let chunk_count = u32::from_be_bytes(take(input, &mut at, 4)?.try_into().expect("4 bytes"));
    let created_at_ms = u64::from_be_bytes(take(input, &mut at, 8)?.try_into().expect("8 bytes"));

    let filename_len =
        u32::from_be_bytes(take(input, &mut at, 4)?.try_into().expect("4 bytes")) as usize;
    let filename_bytes = take(input, &mut at, filename_len)?;
    let (encrypted_filename, consumed) = decode_chunk(filename_bytes)?;
    if consumed != filename_len {
        return Err(WireError::Malformed(
            "trailing bytes after the filename frame".into(),
        ));
    }

    let kdf_tag = take(input, &mut at, 1)?[0];
    let kdf = match kdf_tag {
        KDF_NONE => None,
        KDF_PBKDF2_SHA256 => {
            let salt: [u8; 32] = take(input, &mut at, 32)?.try_into().expect("32 bytes");
            let iterations =
                u32::from_be_bytes(take(input, &mut at, 4)?.try_into().expect("4 bytes"));
            Some(PasswordKdf { salt, iterations })
        }
        other => return Err(WireError::Algorithm(other)),
    };

    Ok((
        FileManifest {
            version,
            algorithm,
            file_salt,
            chunk_size,
            original_size,
            chunk_count,
            created_at_ms,
            encrypted_filename,
            kdf,
        },
        at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_aad, chunk_nonce, AAD_DOMAIN_FILENAME, FILENAME_CHUNK_INDEX};

    fn sample(kdf: Option<PasswordKdf>) -> FileManifest {
        FileManifest {
            version: FILE_FORMAT_VERSION,
            algorithm: ALGO_AES_256_GCM,
            file_salt: [3u8; 16],
            chunk_size: 1024 * 1024,
            original_size: 123_456,
            chunk_count: 1,
            created_at_ms: 1_700_000_000_000,
            encrypted_filename: ChunkFrame {
                index: FILENAME_CHUNK_INDEX,
                nonce: chunk_nonce(FILENAME_CHUNK_INDEX),
                aad: chunk_aad(1, 1, AAD_DOMAIN_FILENAME, &[3u8; 16], FILENAME_CHUNK_INDEX),
                ciphertext: vec![0xCD; 40],
            },
            kdf,
        }
    }

    #[test]
    fn roundtrip_external_key() {
        let manifest = sample(None);
        let bytes = encode_manifest(&manifest);
        let (decoded, consumed) = decode_manifest(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn roundtrip_password_kdf() {
        let manifest = sample(Some(PasswordKdf { salt: [9u8; 32], iterations: 600_000 }));
        let bytes = encode_manifest(&manifest);
        let (decoded, _) = decode_manifest(&bytes).unwrap();
        assert_eq!(decoded.kdf, manifest.kdf);
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let mut bytes = encode_manifest(&sample(None));
        bytes[5] = 0x99;
        assert!(matches!(decode_manifest(&bytes), Err(WireError::Algorithm(0x99))));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode_manifest(&sample(None));
        bytes[3] = b'9';
        assert!(matches!(decode_manifest(&bytes), Err(WireError::BadMagic { .. })));
    }
}
