//! CSPRNG helpers — all randomness in the core flows through the
//! platform CSPRNG via `rand::rngs::OsRng`.

use rand::{rngs::OsRng, RngCore};

/// `n` fresh random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// A fresh random fixed-size array.
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Generate a fresh 16-byte salt (stored alongside the data it salts; not secret).
pub fn generate_salt() -> [u8; 16] {
    random_array()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_bytes_are_fresh() {
        let a = random_bytes(32);
        let b = random_bytes(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b, "two draws must not collide");
    }
}
