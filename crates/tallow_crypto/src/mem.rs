//! Secure-erasure and constant-time memory helpers.

use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Overwrite a buffer with random bytes, then 0xFF, then zeros.
///
/// The final pass uses `zeroize`, which guarantees the writes are not
/// optimised away.
pub fn wipe(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
    buf.fill(0xFF);
    buf.zeroize();
}

/// Constant-time equality over byte slices of possibly different lengths.
///
/// Both inputs are walked to the longer length (missing bytes read as zero)
/// and the length XOR is folded into the difference accumulator, so neither
/// the position of the first differing byte nor a length mismatch changes
/// the branch behaviour.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    let n = a.len().max(b.len());
    let mut diff = (a.len() ^ b.len()) as u64;
    for i in 0..n {
        let x = *a.get(i).unwrap_or(&0);
        let y = *b.get(i).unwrap_or(&0);
        diff |= u64::from(x ^ y);
    }
    diff.ct_eq(&0).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wipe_leaves_zeros() {
        let mut buf = [0xABu8; 64];
        wipe(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn wipe_is_idempotent_on_zeroed_buffer() {
        let mut buf = [0u8; 16];
        wipe(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn ct_eq_matches_plain_equality() {
        assert!(ct_eq(b"same bytes", b"same bytes"));
        assert!(!ct_eq(b"same bytes", b"same bytez"));
        assert!(!ct_eq(b"short", b"longer input"));
        assert!(ct_eq(b"", b""));
        assert!(!ct_eq(b"", b"\0"));
    }
}
