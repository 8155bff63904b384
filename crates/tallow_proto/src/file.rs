//! Chunked AEAD file encryption.
//!
//! A file is split into fixed-size chunks, each sealed with AES-256-GCM
//! under a per-file subkey with a deterministic, index-derived nonce. The
//! filename travels as one extra chunk under the reserved index. The
//! manifest records the geometry; its fields are bound into every chunk's
//! AAD.
//!
//! Key hygiene: the per-file subkey is derived from the caller's master
//! key and a fresh 16-byte salt, and wiped when the operation finishes,
//! successfully or not. The master key stays the caller's responsibility.
//!
//! Decryption is all-or-nothing: one failing chunk aborts the whole
//! operation and no plaintext reaches the output.

use std::io::{Read, Write};

use chrono::Utc;

use tallow_crypto::{aead, kdf, mem, rng, CryptoError};

use crate::{
    chunk::{
        chunk_aad, chunk_nonce, decode_chunk, encode_chunk, ChunkFrame, AAD_DOMAIN_DATA,
        AAD_DOMAIN_FILENAME, FILENAME_CHUNK_INDEX,
    },
    error::WireError,
    manifest::{FileManifest, PasswordKdf, ALGO_AES_256_GCM, FILE_FORMAT_VERSION, KDF_PBKDF2_SHA256},
};

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: u32 = 1024 * 1024;

/// Tunable knobs for encryption. The chunk size is fixed per file and
/// recorded in the manifest.
#[derive(Debug, Clone, Copy)]
pub struct FileEncryptionOptions {
    pub chunk_size: u32,
}

impl Default for FileEncryptionOptions {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

/// Encrypt `reader` into a stream of chunk frames written to `out`.
///
/// Returns the manifest describing the stream. The filename is sealed as
/// the reserved-index chunk inside the manifest itself.
pub fn encrypt_file<R: Read, W: Write>(
    reader: &mut R,
    out: &mut W,
    filename: &str,
    master_key: &[u8; 32],
    options: &FileEncryptionOptions,
) -> Result<FileManifest, WireError> {
    if options.chunk_size == 0 {
        return Err(WireError::Malformed("chunk size must be non-zero".into()));
    }
    let file_salt = rng::random_array::<16>();
    let mut file_key = kdf::file_subkey(master_key, &file_salt)?;
    let result = encrypt_inner(reader, out, filename, &file_key, &file_salt, options);
    mem::wipe(&mut file_key);
    result
}

fn encrypt_inner<R: Read, W: Write>(
    reader: &mut R,
    out: &mut W,
    filename: &str,
    file_key: &[u8; 32],
    file_salt: &[u8; 16],
    options: &FileEncryptionOptions,
) -> Result<FileManifest, WireError> {
    let mut buf = vec![0u8; options.chunk_size as usize];
    let mut index: u32 = 0;
    let mut original_size: u64 = 0;

    loop {
        let n = read_full(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        if index == FILENAME_CHUNK_INDEX {
            return Err(WireError::Malformed("file exceeds the chunk index space".into()));
        }
        let aad = chunk_aad(FILE_FORMAT_VERSION, ALGO_AES_256_GCM, AAD_DOMAIN_DATA, file_salt, index);
        let nonce = chunk_nonce(index);
        let ciphertext = aead::seal(file_key, &nonce, &aad, &buf[..n])?;
        out.write_all(&encode_chunk(&ChunkFrame { index, nonce, aad, ciphertext }))?;
        original_size += n as u64;
        index += 1;
        if n < buf.len() {
            break;
        }
    }

    let fn_aad = chunk_aad(
        FILE_FORMAT_VERSION,
        ALGO_AES_256_GCM,
        AAD_DOMAIN_FILENAME,
        file_salt,
        FILENAME_CHUNK_INDEX,
    );
    let fn_nonce = chunk_nonce(FILENAME_CHUNK_INDEX);
    let fn_ct = aead::seal(file_key, &fn_nonce, &fn_aad, filename.as_bytes())?;

    Ok(FileManifest {
        version: FILE_FORMAT_VERSION,
        algorithm: ALGO_AES_256_GCM,
        file_salt: *file_salt,
        chunk_size: options.chunk_size,
        original_size,
        chunk_count: index,
        created_at_ms: Utc::now().timestamp_millis() as u64,
        encrypted_filename: ChunkFrame {
            index: FILENAME_CHUNK_INDEX,
            nonce: fn_nonce,
            aad: fn_aad,
            ciphertext: fn_ct,
        },
        kdf: None,
    })
}

/// Decrypt a stream of chunk frames back into the original plaintext.
///
/// Returns the recovered filename. Nothing is written to `out` unless the
/// whole file authenticates.
pub fn decrypt_file<R: Read, W: Write>(
    manifest: &FileManifest,
    frames: &mut R,
    out: &mut W,
    master_key: &[u8; 32],
) -> Result<String, WireError> {
    if manifest.version != FILE_FORMAT_VERSION {
        return Err(WireError::Version(manifest.version));
    }
    if manifest.algorithm != ALGO_AES_256_GCM {
        return Err(WireError::Algorithm(manifest.algorithm));
    }
    let mut file_key = kdf::file_subkey(master_key, &manifest.file_salt)?;
    let result = decrypt_inner(manifest, frames, out, &file_key);
    mem::wipe(&mut file_key);
    result
}

fn decrypt_inner<R: Read, W: Write>(
    manifest: &FileManifest,
    frames: &mut R,
    out: &mut W,
    file_key: &[u8; 32],
) -> Result<String, WireError> {
    // Filename first: a wrong key fails here before any chunk work.
    let fn_aad = chunk_aad(
        manifest.version,
        manifest.algorithm,
        AAD_DOMAIN_FILENAME,
        &manifest.file_salt,
        FILENAME_CHUNK_INDEX,
    );
    let fn_nonce = chunk_nonce(FILENAME_CHUNK_INDEX);
    let name_plain = aead::open(file_key, &fn_nonce, &fn_aad, &manifest.encrypted_filename.ciphertext)?;
    let filename = String::from_utf8(name_plain.to_vec())
        .map_err(|_| WireError::Malformed("filename is not valid UTF-8".into()))?;

    let mut encoded = Vec::new();
    frames.read_to_end(&mut encoded)?;

    // Authenticate and decrypt every chunk before delivering anything.
    let mut plaintext: Vec<u8> = Vec::with_capacity(manifest.original_size as usize);
    let mut at = 0usize;
    for expected_index in 0..manifest.chunk_count {
        let (frame, consumed) = decode_chunk(&encoded[at..])?;
        at += consumed;
        if frame.index != expected_index {
            return Err(WireError::Malformed(format!(
                "chunk {} out of sequence, expected {expected_index}",
                frame.index
            )));
        }
        let aad = chunk_aad(
            manifest.version,
            manifest.algorithm,
            AAD_DOMAIN_DATA,
            &manifest.file_salt,
            frame.index,
        );
        let chunk_plain = aead::open(file_key, &frame.nonce, &aad, &frame.ciphertext)?;
        plaintext.extend_from_slice(&chunk_plain);
    }
    if at != encoded.len() {
        return Err(WireError::Malformed("trailing bytes after the final chunk".into()));
    }
    if plaintext.len() as u64 != manifest.original_size {
        return Err(WireError::Malformed(format!(
            "plaintext size {} does not match the manifest ({})",
            plaintext.len(),
            manifest.original_size
        )));
    }

    out.write_all(&plaintext)?;
    mem::wipe(&mut plaintext);
    Ok(filename)
}

/// Password mode: derive the master key with PBKDF2-SHA256 and record the
/// parameters in the manifest.
pub fn encrypt_file_with_password<R: Read, W: Write>(
    reader: &mut R,
    out: &mut W,
    filename: &str,
    password: &str,
    options: &FileEncryptionOptions,
) -> Result<FileManifest, WireError> {
    let salt = rng::random_array::<32>();
    let iterations = kdf::PBKDF2_MIN_ITERATIONS;
    let mut master = [0u8; 32];
    kdf::pbkdf2_derive(password.as_bytes(), &salt, iterations, &mut master)?;
    let result = encrypt_file(reader, out, filename, &master, options);
    mem::wipe(&mut master);
    let mut manifest = result?;
    manifest.kdf = Some(PasswordKdf { salt, iterations });
    Ok(manifest)
}

/// Password-mode decryption. Fails with `KdfParams` when the manifest has
/// no KDF parameters or records an iteration count below the floor.
pub fn decrypt_file_with_password<R: Read, W: Write>(
    manifest: &FileManifest,
    frames: &mut R,
    out: &mut W,
    password: &str,
) -> Result<String, WireError> {
    let params = manifest.kdf.as_ref().ok_or_else(|| {
        WireError::Crypto(CryptoError::KdfParams(format!(
            "manifest carries no password KDF block (tag {KDF_PBKDF2_SHA256:#04x})"
        )))
    })?;
    let mut master = [0u8; 32];
    kdf::pbkdf2_derive(password.as_bytes(), &params.salt, params.iterations, &mut master)?;
    let result = decrypt_file(manifest, frames, out, &master);
    mem::wipe(&mut master);
    result
}

/// Read until the buffer is full or the reader is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, WireError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
