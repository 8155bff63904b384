//! Protocol message header — the "TLW1" frame.
//!
//! Appears in front of every protocol message and is fed to the AEAD as
//! associated data, so any bit flip in it fails authentication.
//!
//! Layout (all integers big-endian):
//!   magic        4B  "TLW1"
//!   version      1B  0x01
//!   flags        1B  bit0 = carries a hybrid KEM ciphertext
//!   pn           4B  previous sending chain length
//!   n            4B  message number in the current chain
//!   dh_pub_len   2B  always 1216 (full hybrid public key)
//!   dh_pub       ..  ML-KEM-768 pub ‖ X25519 pub
//!   [ct_len      2B  always 1120, present iff flags bit0]
//!   [ct          ..  ML-KEM ciphertext ‖ X25519 ephemeral pub]
//!
//! The carry policy is fixed: the full public key is sent on every
//! message. A fingerprint shortening exists in the format for receivers
//! that cache keys; this implementation neither emits nor accepts it,
//! which keeps the policy deterministic.

use tallow_crypto::kem::{
    HybridKemCiphertext, HybridKemPublicKey, HYBRID_CIPHERTEXT_LEN, HYBRID_PUBLIC_LEN,
};
use tallow_crypto::ratchet::RatchetHeader;

use crate::error::WireError;

pub const HEADER_MAGIC: &[u8; 4] = b"TLW1";
pub const PROTOCOL_VERSION: u8 = 0x01;
pub const FLAG_KEM_CIPHERTEXT: u8 = 0b0000_0001;

/// Encode a ratchet header into its canonical wire form.
pub fn encode(header: &RatchetHeader) -> Vec<u8> {
    let pub_bytes = header.dh_pub.to_bytes();
    let mut out = Vec::with_capacity(16 + pub_bytes.len() + HYBRID_CIPHERTEXT_LEN + 2);
    out.extend_from_slice(HEADER_MAGIC);
    out.push(PROTOCOL_VERSION);
    out.push(if header.kem_ciphertext.is_some() {
        FLAG_KEM_CIPHERTEXT
    } else {
        0
    });
    out.extend_from_slice(&header.pn.to_be_bytes());
    out.extend_from_slice(&header.n.to_be_bytes());
    out.extend_from_slice(&(pub_bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(&pub_bytes);
    if let Some(ct) = &header.kem_ciphertext {
        let ct_bytes = ct.to_bytes();
        out.extend_from_slice(&(ct_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&ct_bytes);
    }
    out
}

/// Decode a header from the front of `input`.
///
/// Returns the header and the number of bytes consumed.
pub fn decode(input: &[u8]) -> Result<(RatchetHeader, usize), WireError> {
    let mut at = 0usize;

    let magic = take(input, &mut at, 4)?;
    if magic != HEADER_MAGIC {
        return Err(WireError::BadMagic { expected: "TLW1" });
    }
    let version = take(input, &mut at, 1)?[0];
    if version != PROTOCOL_VERSION {
        return Err(WireError::Version(version));
    }
    let flags = take(input, &mut at, 1)?[0];

    let pn = u32::from_be_bytes(take(input, &mut at, 4)?.try_into().expect("4 bytes"));
    let n = u32::from_be_bytes(take(input, &mut at, 4)?.try_into().expect("4 bytes"));

    let pub_len = u16::from_be_bytes(take(input, &mut at, 2)?.try_into().expect("2 bytes")) as usize;
    if pub_len != HYBRID_PUBLIC_LEN {
        return Err(WireError::Malformed(format!(
            "dh_pub_len {pub_len}, expected the full {HYBRID_PUBLIC_LEN}-byte key"
        )));
    }
    let dh_pub = HybridKemPublicKey::from_bytes(take(input, &mut at, pub_len)?)?;

    let kem_ciphertext = if flags & FLAG_KEM_CIPHERTEXT != 0 {
        let ct_len =
            u16::from_be_bytes(take(input, &mut at, 2)?.try_into().expect("2 bytes")) as usize;
        if ct_len != HYBRID_CIPHERTEXT_LEN {
            return Err(WireError::Malformed(format!(
                "ct_len {ct_len}, expected {HYBRID_CIPHERTEXT_LEN}"
            )));
        }
        Some(HybridKemCiphertext::from_bytes(take(input, &mut at, ct_len)?)?)
    } else {
        None
    };

    Ok((RatchetHeader { dh_pub, pn, n, kem_ciphertext }, at))
}

pub(crate) fn take<'a>(input: &'a [u8], at: &mut usize, len: usize) -> Result<&'a [u8], WireError> {
    let end = at.checked_add(len).ok_or(WireError::Truncated {
        needed: usize::MAX,
        have: input.len(),
    })?;
    if end > input.len() {
        return Err(WireError::Truncated { needed: end, have: input.len() });
    }
    let slice = &input[*at..end];
    *at = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallow_crypto::kem;

    fn sample_header(with_ct: bool) -> RatchetHeader {
        let kp = kem::generate().unwrap();
        let kem_ciphertext = with_ct.then(|| kem::encapsulate(&kp.public).unwrap().0);
        RatchetHeader { dh_pub: kp.public.clone(), pn: 7, n: 3, kem_ciphertext }
    }

    #[test]
    fn roundtrip_without_ciphertext() {
        let header = sample_header(false);
        let bytes = encode(&header);
        let (decoded, consumed) = decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.dh_pub, header.dh_pub);
        assert_eq!(decoded.pn, 7);
        assert_eq!(decoded.n, 3);
        assert!(decoded.kem_ciphertext.is_none());
    }

    #[test]
    fn roundtrip_with_ciphertext() {
        let header = sample_header(true);
        let bytes = encode(&header);
        assert_eq!(bytes[5] & FLAG_KEM_CIPHERTEXT, FLAG_KEM_CIPHERTEXT);
        let (decoded, consumed) = decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.kem_ciphertext, header.kem_ciphertext);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode(&sample_header(false));
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(WireError::BadMagic { .. })));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = encode(&sample_header(false));
        bytes[4] = 0x7F;
        assert!(matches!(decode(&bytes), Err(WireError::Version(0x7F))));
    }

    #[test]
    fn rejects_truncation() {
        let bytes = encode(&sample_header(false));
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(WireError::Truncated { .. })
        ));
    }
}
