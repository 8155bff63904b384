//! Protocol message envelope — one-call seal/open over a ratchet session.
//!
//! Wire layout: encoded header ‖ nonce (12B) ‖ ciphertext+tag.
//!
//! The encoded header is the AEAD associated data, so counters and carried
//! key material are authenticated. Message keys come out of the ratchet,
//! seal or open exactly one message, and are wiped on drop.

use zeroize::Zeroizing;

use tallow_crypto::{aead, ratchet::RatchetSession};

use crate::{error::WireError, header};

/// Encrypt one message for the session's peer.
pub fn seal_message(
    session: &mut RatchetSession,
    plaintext: &[u8],
) -> Result<Vec<u8>, WireError> {
    let (hdr, mk) = session.next_send_key()?;
    let mut out = header::encode(&hdr);
    let nonce = aead::generate_nonce();
    let ciphertext = aead::seal(&mk, &nonce, &out, plaintext)?;
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt one received message.
pub fn open_message(
    session: &mut RatchetSession,
    frame: &[u8],
) -> Result<Zeroizing<Vec<u8>>, WireError> {
    let (hdr, consumed) = header::decode(frame)?;
    let rest = &frame[consumed..];
    if rest.len() < aead::NONCE_LEN + aead::TAG_LEN {
        return Err(WireError::Truncated {
            needed: consumed + aead::NONCE_LEN + aead::TAG_LEN,
            have: frame.len(),
        });
    }
    let nonce: [u8; aead::NONCE_LEN] = rest[..aead::NONCE_LEN].try_into().expect("12 bytes");
    let mk = session.receive_key(&hdr)?;
    let plaintext = aead::open(&mk, &nonce, &frame[..consumed], &rest[aead::NONCE_LEN..])?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallow_crypto::ratchet::{RatchetSession, Role};

    fn pair() -> (RatchetSession, RatchetSession) {
        let shared = [9u8; 32];
        (
            RatchetSession::initialize(&shared, Role::Initiator).unwrap(),
            RatchetSession::initialize(&shared, Role::Responder).unwrap(),
        )
    }

    #[test]
    fn seal_open_both_directions() {
        let (mut alice, mut bob) = pair();

        let frame = seal_message(&mut alice, b"hello").unwrap();
        assert_eq!(&open_message(&mut bob, &frame).unwrap()[..], b"hello");

        let reply = seal_message(&mut bob, b"world").unwrap();
        assert_eq!(&open_message(&mut alice, &reply).unwrap()[..], b"world");
    }

    #[test]
    fn header_tampering_fails_authentication() {
        let (mut alice, mut bob) = pair();
        let mut frame = seal_message(&mut alice, b"payload").unwrap();
        // Flip a counter bit inside the authenticated header.
        frame[8] ^= 0x01;
        assert!(open_message(&mut bob, &frame).is_err());
    }

    #[test]
    fn ciphertext_tampering_fails_authentication() {
        let (mut alice, mut bob) = pair();
        let mut frame = seal_message(&mut alice, b"payload").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(matches!(
            open_message(&mut bob, &frame),
            Err(WireError::Crypto(tallow_crypto::CryptoError::Aead))
        ));
    }

    #[test]
    fn long_conversation_with_rotations() {
        let (mut alice, mut bob) = pair();
        for round in 0..5u8 {
            let msg = vec![round; 100];
            let frame = seal_message(&mut alice, &msg).unwrap();
            assert_eq!(&open_message(&mut bob, &frame).unwrap()[..], &msg[..]);
            let frame = seal_message(&mut bob, &msg).unwrap();
            assert_eq!(&open_message(&mut alice, &frame).unwrap()[..], &msg[..]);
        }
    }
}
