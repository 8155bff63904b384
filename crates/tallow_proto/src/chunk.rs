//! Encrypted chunk frames.
//!
//! Layout (integers big-endian):
//!   chunk_index  4B  (0xFFFFFFFF = filename header)
//!   nonce        12B (derived; MUST equal the index-derived nonce)
//!   aad_len      2B
//!   aad          ..  version ‖ algo ‖ domain ‖ file_salt ‖ chunk_index
//!   ct_len       4B
//!   ct           ..  ciphertext ‖ 16-byte GCM tag
//!
//! The nonce is a pure function of the chunk index, which is why a chunk
//! key is never reused across files (see the per-file subkey derivation).

use tallow_crypto::aead;

use crate::{error::WireError, header::take};

/// Reserved index for the encrypted filename header.
pub const FILENAME_CHUNK_INDEX: u32 = 0xFFFF_FFFF;

/// AAD domain byte for file data chunks.
pub const AAD_DOMAIN_DATA: u8 = 0x00;
/// AAD domain byte for the filename header chunk.
pub const AAD_DOMAIN_FILENAME: u8 = 0x01;

/// One sealed chunk as it travels on the wire or sits on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    pub index: u32,
    pub nonce: [u8; aead::NONCE_LEN],
    pub aad: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Deterministic chunk nonce: 4 zero bytes ‖ 8-byte big-endian index.
pub fn chunk_nonce(index: u32) -> [u8; aead::NONCE_LEN] {
    let mut nonce = [0u8; aead::NONCE_LEN];
    nonce[4..].copy_from_slice(&u64::from(index).to_be_bytes());
    nonce
}

/// Chunk AAD: version ‖ algorithm ‖ domain ‖ file salt ‖ index (BE).
pub fn chunk_aad(version: u8, algorithm: u8, domain: u8, file_salt: &[u8; 16], index: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(3 + 16 + 4);
    aad.push(version);
    aad.push(algorithm);
    aad.push(domain);
    aad.extend_from_slice(file_salt);
    aad.extend_from_slice(&index.to_be_bytes());
    aad
}

pub fn encode_chunk(frame: &ChunkFrame) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 12 + 2 + frame.aad.len() + 4 + frame.ciphertext.len());
    out.extend_from_slice(&frame.index.to_be_bytes());
    out.extend_from_slice(&frame.nonce);
    out.extend_from_slice(&(frame.aad.len() as u16).to_be_bytes());
    out.extend_from_slice(&frame.aad);
    out.extend_from_slice(&(frame.ciphertext.len() as u32).to_be_bytes());
    out.extend_from_slice(&frame.ciphertext);
    out
}

/// Decode a chunk frame from the front of `input`; returns the frame and
/// the bytes consumed. Rejects frames whose nonce does not match their
/// index.
pub fn decode_chunk(input: &[u8]) -> Result<(ChunkFrame, usize), WireError> {
    let mut at = 0usize;
    let index = u32::from_be_bytes(take(input, &mut at, 4)?.try_into().expect("4 bytes"));
    let nonce: [u8; aead::NONCE_LEN] =
        take(input, &mut at, aead::NONCE_LEN)?.try_into().expect("12 bytes");
    if nonce != chunk_nonce(index) {
        return Err(WireError::NonceMismatch(index));
    }
    let aad_len = u16::from_be_bytes(take(input, &mut at, 2)?.try_into().expect("2 bytes")) as usize;
    let aad = take(input, &mut at, aad_len)?.to_vec();
    let ct_len = u32::from_be_bytes(take(input, &mut at, 4)?.try_into().expect("4 bytes")) as usize;
    if ct_len < aead::TAG_LEN {
        return Err(WireError::Malformed(format!(
            "ct_len {ct_len} shorter than the GCM tag"
        )));
    }
    let ciphertext = take(input, &mut at, ct_len)?.to_vec();
    Ok((ChunkFrame { index, nonce, aad, ciphertext }, at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_layout() {
        assert_eq!(chunk_nonce(0), [0u8; 12]);
        assert_eq!(chunk_nonce(5), [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5]);
        assert_eq!(
            chunk_nonce(FILENAME_CHUNK_INDEX),
            [0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn frame_roundtrip() {
        let frame = ChunkFrame {
            index: 42,
            nonce: chunk_nonce(42),
            aad: chunk_aad(1, 1, AAD_DOMAIN_DATA, &[7u8; 16], 42),
            ciphertext: vec![0xAB; 48],
        };
        let bytes = encode_chunk(&frame);
        let (decoded, consumed) = decode_chunk(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn rejects_nonce_index_mismatch() {
        let mut frame = ChunkFrame {
            index: 1,
            nonce: chunk_nonce(1),
            aad: vec![],
            ciphertext: vec![0; 16],
        };
        frame.nonce = chunk_nonce(2);
        let bytes = encode_chunk(&frame);
        assert!(matches!(decode_chunk(&bytes), Err(WireError::NonceMismatch(1))));
    }

    #[test]
    fn rejects_truncated_frame() {
        let frame = ChunkFrame {
            index: 0,
            nonce: chunk_nonce(0),
            aad: vec![1, 2, 3],
            ciphertext: vec![0; 32],
        };
        let bytes = encode_chunk(&frame);
        assert!(matches!(
            decode_chunk(&bytes[..bytes.len() - 4]),
            Err(WireError::Truncated { .. })
        ));
    }
}
