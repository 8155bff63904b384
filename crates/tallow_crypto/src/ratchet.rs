//! Double Ratchet with hybrid-KEM ratchet steps.
//!
//! References:
//!   - Signal Double Ratchet spec: <https://signal.org/docs/specifications/doubleratchet/>
//!
//! State separation (non-negotiable):
//!   RK  — root key (updated on every KEM ratchet step)
//!   CKs — sending chain key (updated per message)
//!   CKr — receiving chain key (updated per message)
//!   MK  — message key (derived from CK, used once, then DELETED)
//!
//! Classic Diffie-Hellman ratcheting does not translate directly to a KEM:
//! a public key alone yields no shared secret, so every ratchet step needs
//! a ciphertext transported to the other side. The step is therefore
//! SPLIT:
//!
//!   - Receiving a header whose public key differs from the cached peer key
//!     and which carries a ciphertext mixes `decapsulate(ct)` into the root
//!     key and starts a new receiving chain immediately.
//!   - The matching send-side update is DEFERRED to our next outbound
//!     message: we rotate our own keypair, encapsulate once against the new
//!     peer key, mix the secret into the root key, and carry exactly one
//!     fresh ciphertext in that header.
//!
//! Until the first key exchange both parties run on the symmetric chains
//! derived from the initial hybrid-KEM shared secret, so either side may
//! send first.
//!
//! Forward secrecy: old chain and message keys are wiped as they retire.
//! Post-compromise security: each completed KEM step restores secrecy.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::{
    error::CryptoError,
    kdf,
    kem::{self, HybridKemCiphertext, HybridKemKeyPair, HybridKemPublicKey},
};

/// Maximum skipped message keys banked per session, and the largest single
/// counter jump tolerated in one receive.
pub const MAX_SKIP: u32 = 1000;

/// Chain index for keys banked before the peer's first public key is known.
const UNKNOWN_CHAIN: [u8; 32] = [0u8; 32];

/// A one-shot 32-byte message key, wiped when dropped.
pub type MessageKey = Zeroizing<[u8; 32]>;

/// Which side of the initial key agreement this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Initiator,
    Responder,
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    AwaitingPeerKey,
    Active,
    Closed,
}

// ── Ratchet header ───────────────────────────────────────────────────────────

/// Sent alongside every ciphertext so the recipient can advance its
/// ratchet. Authenticated as AEAD associated data, never encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatchetHeader {
    /// Sender's current hybrid KEM public key.
    pub dh_pub: HybridKemPublicKey,
    /// Number of messages in the sender's previous sending chain.
    pub pn: u32,
    /// Message number in the current sending chain.
    pub n: u32,
    /// Fresh hybrid ciphertext, present exactly when this message completes
    /// a deferred send-side ratchet step.
    pub kem_ciphertext: Option<HybridKemCiphertext>,
}

// ── Skipped keys ─────────────────────────────────────────────────────────────

/// (chain, message number) -> banked message key, wiped on drop.
#[derive(Serialize, Deserialize)]
struct SkippedKey {
    chain: [u8; 32],
    n: u32,
    mk: [u8; 32],
}

impl Drop for SkippedKey {
    fn drop(&mut self) {
        self.mk.zeroize();
    }
}

// ── Session state ────────────────────────────────────────────────────────────

/// Complete Double Ratchet session state. Exclusively owned; every
/// operation takes `&mut self`.
#[derive(Serialize, Deserialize)]
pub struct RatchetSession {
    state: SessionState,
    role: Role,

    root_key: [u8; 32],
    send_ck: [u8; 32],
    recv_ck: [u8; 32],

    /// Send counter in the current sending chain.
    send_n: u32,
    /// Receive counter in the current receiving chain.
    recv_n: u32,
    /// Length of the previous sending chain.
    prev_send_n: u32,

    /// Our current hybrid KEM keypair; rotated on each send-side step.
    dh_self: HybridKemKeyPair,
    /// Peer's current hybrid KEM public key, unknown until first receipt.
    dh_peer: Option<HybridKemPublicKey>,

    /// A received key change obliges us to complete the ratchet step on the
    /// next outbound message.
    pending_send_step: bool,

    /// Banked out-of-order message keys, FIFO-bounded by [`MAX_SKIP`].
    skipped: VecDeque<SkippedKey>,
}

impl Drop for RatchetSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl RatchetSession {
    /// Initialise a session from the hybrid-KEM shared secret.
    ///
    /// Both sides derive the same pair of symmetric chains; the initiator
    /// sends on the first and receives on the second, the responder the
    /// other way round.
    pub fn initialize(shared_secret: &[u8; 32], role: Role) -> Result<Self, CryptoError> {
        let root_key = kdf::initial_root(shared_secret)?;
        let (ck_a, ck_b) = kdf::initial_chains(&root_key)?;
        let (send_ck, recv_ck) = match role {
            Role::Initiator => (ck_a, ck_b),
            Role::Responder => (ck_b, ck_a),
        };
        Ok(Self {
            state: match role {
                Role::Initiator => SessionState::AwaitingPeerKey,
                Role::Responder => SessionState::Active,
            },
            role,
            root_key,
            send_ck,
            recv_ck,
            send_n: 0,
            recv_n: 0,
            prev_send_n: 0,
            dh_self: kem::generate()?,
            dh_peer: None,
            pending_send_step: false,
            skipped: VecDeque::new(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Our current ratchet public key.
    pub fn own_public_key(&self) -> &HybridKemPublicKey {
        &self.dh_self.public
    }

    /// Number of banked skipped keys.
    pub fn skipped_len(&self) -> usize {
        self.skipped.len()
    }

    // ── Sending ──────────────────────────────────────────────────────────

    /// Derive the key for the next outbound message.
    ///
    /// Completes a pending ratchet step first: rotates our keypair,
    /// encapsulates once against the peer key, and mixes the fresh secret
    /// into the root key. The returned key seals exactly one message and
    /// is wiped on drop.
    pub fn next_send_key(&mut self) -> Result<(RatchetHeader, MessageKey), CryptoError> {
        self.check_open()?;

        let mut fresh_ct = None;
        if self.pending_send_step {
            let peer = self
                .dh_peer
                .clone()
                .ok_or_else(|| CryptoError::Protocol("ratchet step pending with no peer key".into()))?;
            let (ct, mut shared) = kem::encapsulate(&peer)?;
            let mut retired = std::mem::replace(&mut self.dh_self, kem::generate()?);
            retired.wipe_secrets();
            let (root, ck_s) = kdf::ratchet_root(&self.root_key, &shared)?;
            shared.zeroize();
            self.root_key = root;
            self.send_ck = ck_s;
            self.prev_send_n = self.send_n;
            self.send_n = 0;
            self.pending_send_step = false;
            fresh_ct = Some(ct);
        }

        let (next_ck, mk) = kdf::chain_step(&self.send_ck)?;
        self.send_ck = next_ck;
        let header = RatchetHeader {
            dh_pub: self.dh_self.public.clone(),
            pn: self.prev_send_n,
            n: self.send_n,
            kem_ciphertext: fresh_ct,
        };
        self.send_n = self
            .send_n
            .checked_add(1)
            .ok_or_else(|| CryptoError::Protocol("send counter overflow".into()))?;
        self.state = SessionState::Active;
        Ok((header, Zeroizing::new(mk)))
    }

    // ── Receiving ────────────────────────────────────────────────────────

    /// Derive the key for a received message.
    ///
    /// Handles, in order: previously banked skipped keys, a peer key change
    /// (KEM ratchet step), and counter jumps within the current chain.
    /// Every failure path is validated before any state is mutated.
    pub fn receive_key(&mut self, header: &RatchetHeader) -> Result<MessageKey, CryptoError> {
        self.check_open()?;

        let header_chain = header.dh_pub.hash();
        if let Some(mk) = self.take_skipped(&header_chain, header.n) {
            self.state = SessionState::Active;
            return Ok(mk);
        }

        let is_new_key = self.dh_peer.as_ref().map(|p| *p != header.dh_pub).unwrap_or(true);
        if is_new_key {
            match &header.kem_ciphertext {
                Some(ct) => self.ratchet_step(header, ct)?,
                None if self.dh_peer.is_none() => {
                    // First contact: adopt the key. The initial symmetric
                    // chain keeps running; mixing starts with the first
                    // ciphertext-bearing exchange. Validate the counter
                    // before adopting anything.
                    if header.n < self.recv_n {
                        return Err(CryptoError::Replay(header.n));
                    }
                    if header.n - self.recv_n > MAX_SKIP {
                        return Err(CryptoError::TooManySkipped {
                            requested: header.n - self.recv_n,
                            max: MAX_SKIP,
                        });
                    }
                    self.dh_peer = Some(header.dh_pub.clone());
                    self.pending_send_step = true;
                }
                None => {
                    // Straggler from the chain that ran before first
                    // contact? Its keys were banked under the sentinel.
                    if let Some(mk) = self.take_skipped(&UNKNOWN_CHAIN, header.n) {
                        self.state = SessionState::Active;
                        return Ok(mk);
                    }
                    return Err(CryptoError::Protocol(
                        "peer key changed without a KEM ciphertext".into(),
                    ));
                }
            }
        }

        if header.n < self.recv_n {
            return Err(CryptoError::Replay(header.n));
        }
        let run = header.n - self.recv_n;
        if run > MAX_SKIP {
            return Err(CryptoError::TooManySkipped { requested: run, max: MAX_SKIP });
        }
        self.skip_current_chain(header.n)?;

        let (next_ck, mk) = kdf::chain_step(&self.recv_ck)?;
        self.recv_ck = next_ck;
        self.recv_n = self
            .recv_n
            .checked_add(1)
            .ok_or_else(|| CryptoError::Protocol("receive counter overflow".into()))?;
        self.state = SessionState::Active;
        Ok(Zeroizing::new(mk))
    }

    /// Schedule a rotation of our own keypair. The rotation itself happens
    /// on the next outbound message, which will carry the fresh ciphertext.
    pub fn rotate_own_keys(&mut self) -> Result<(), CryptoError> {
        self.check_open()?;
        if self.dh_peer.is_none() {
            return Err(CryptoError::Protocol(
                "cannot rotate keys before the peer key is known".into(),
            ));
        }
        self.pending_send_step = true;
        Ok(())
    }

    /// Tear the session down: wipe every key, drop banked keys, move to
    /// `Closed`. All subsequent operations fail with `Closed`.
    pub fn destroy(&mut self) {
        self.root_key.zeroize();
        self.send_ck.zeroize();
        self.recv_ck.zeroize();
        self.dh_self.wipe_secrets();
        self.dh_peer = None;
        self.skipped.clear();
        self.send_n = 0;
        self.recv_n = 0;
        self.prev_send_n = 0;
        self.pending_send_step = false;
        self.state = SessionState::Closed;
    }

    // ── Internal ─────────────────────────────────────────────────────────

    fn check_open(&self) -> Result<(), CryptoError> {
        match self.state {
            SessionState::Closed => Err(CryptoError::Closed),
            SessionState::Uninitialized => {
                Err(CryptoError::Protocol("session not initialised".into()))
            }
            _ => Ok(()),
        }
    }

    /// Receive-side KEM ratchet step. Bounds are validated and the
    /// decapsulation performed before any state changes.
    fn ratchet_step(
        &mut self,
        header: &RatchetHeader,
        ct: &HybridKemCiphertext,
    ) -> Result<(), CryptoError> {
        if header.pn < self.recv_n {
            return Err(CryptoError::Protocol(
                "previous chain length contradicts consumed messages".into(),
            ));
        }
        let old_run = header.pn - self.recv_n;
        if old_run > MAX_SKIP {
            return Err(CryptoError::TooManySkipped { requested: old_run, max: MAX_SKIP });
        }
        if header.n > MAX_SKIP {
            return Err(CryptoError::TooManySkipped { requested: header.n, max: MAX_SKIP });
        }

        let mut shared = kem::decapsulate(&self.dh_self, ct)?;

        // Bank the remainder of the retiring receiving chain.
        self.skip_current_chain(header.pn)?;

        let (root, ck_r) = kdf::ratchet_root(&self.root_key, &shared)?;
        shared.zeroize();
        self.root_key = root;
        self.recv_ck = ck_r;
        self.recv_n = 0;
        self.dh_peer = Some(header.dh_pub.clone());
        self.pending_send_step = true;
        Ok(())
    }

    /// Bank message keys for `recv_n..until` of the current receiving
    /// chain, then enforce the FIFO bound.
    fn skip_current_chain(&mut self, until: u32) -> Result<(), CryptoError> {
        if until <= self.recv_n {
            return Ok(());
        }
        let chain = self
            .dh_peer
            .as_ref()
            .map(|p| p.hash())
            .unwrap_or(UNKNOWN_CHAIN);
        while self.recv_n < until {
            let (next_ck, mk) = kdf::chain_step(&self.recv_ck)?;
            self.recv_ck = next_ck;
            self.skipped.push_back(SkippedKey { chain, n: self.recv_n, mk });
            self.recv_n += 1;
        }
        while self.skipped.len() > MAX_SKIP as usize {
            // Oldest first; SkippedKey::drop wipes the key.
            self.skipped.pop_front();
        }
        Ok(())
    }

    /// Remove and return a banked key, if present. The first receive of a
    /// previously skipped counter consumes it.
    fn take_skipped(&mut self, chain: &[u8; 32], n: u32) -> Option<MessageKey> {
        let idx = self
            .skipped
            .iter()
            .position(|s| s.chain == *chain && s.n == n)?;
        let entry = self.skipped.remove(idx)?;
        let mk = Zeroizing::new(entry.mk);
        Some(mk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (RatchetSession, RatchetSession) {
        let shared = [42u8; 32];
        let alice = RatchetSession::initialize(&shared, Role::Initiator).unwrap();
        let bob = RatchetSession::initialize(&shared, Role::Responder).unwrap();
        (alice, bob)
    }

    #[test]
    fn ping_pong() {
        let (mut alice, mut bob) = pair();

        let (h1, mk_a) = alice.next_send_key().unwrap();
        let mk_b = bob.receive_key(&h1).unwrap();
        assert_eq!(*mk_a, *mk_b, "hello: keys must match");

        let (h2, mk_b2) = bob.next_send_key().unwrap();
        assert!(h2.kem_ciphertext.is_some(), "bob's reply completes a ratchet step");
        let mk_a2 = alice.receive_key(&h2).unwrap();
        assert_eq!(*mk_b2, *mk_a2, "world: keys must match");

        assert_eq!(alice.state(), SessionState::Active);
        assert_eq!(bob.state(), SessionState::Active);
    }

    #[test]
    fn out_of_order_reverse_delivery() {
        let (mut alice, mut bob) = pair();

        let batch: Vec<_> = (0..10).map(|_| alice.next_send_key().unwrap()).collect();

        for (header, mk_sent) in batch.iter().rev() {
            let mk_recv = bob.receive_key(header).unwrap();
            assert_eq!(**mk_sent, *mk_recv);
        }
        assert_eq!(bob.skipped_len(), 0, "all banked keys must be consumed");
    }

    #[test]
    fn dh_rotation_on_reply() {
        let (mut alice, mut bob) = pair();

        let mut headers = Vec::new();
        for _ in 0..3 {
            let (h, mk) = alice.next_send_key().unwrap();
            let mk_b = bob.receive_key(&h).unwrap();
            assert_eq!(*mk, *mk_b);
            headers.push(h);
        }
        assert!(headers.iter().all(|h| h.kem_ciphertext.is_none()));

        let (hb, mk_b) = bob.next_send_key().unwrap();
        assert!(hb.kem_ciphertext.is_some());
        let mk_a = alice.receive_key(&hb).unwrap();
        assert_eq!(*mk_b, *mk_a);

        // Alice's next send completes her side of the step: new keypair,
        // fresh ciphertext, previous chain length 3, counter reset.
        let old_pub = headers[0].dh_pub.clone();
        let (h4, mk4) = alice.next_send_key().unwrap();
        assert!(h4.kem_ciphertext.is_some());
        assert_ne!(h4.dh_pub, old_pub);
        assert_eq!(h4.pn, 3);
        assert_eq!(h4.n, 0);
        let mk4_b = bob.receive_key(&h4).unwrap();
        assert_eq!(*mk4, *mk4_b);

        // Two more from Alice ride the new chain without a ciphertext.
        for expect_n in 1..3 {
            let (h, mk) = alice.next_send_key().unwrap();
            assert!(h.kem_ciphertext.is_none());
            assert_eq!(h.n, expect_n);
            let mk_b = bob.receive_key(&h).unwrap();
            assert_eq!(*mk, *mk_b);
        }
    }

    #[test]
    fn replay_is_rejected_without_state_change() {
        let (mut alice, mut bob) = pair();

        let mut headers = Vec::new();
        for _ in 0..3 {
            let (h, _) = alice.next_send_key().unwrap();
            bob.receive_key(&h).unwrap();
            headers.push(h);
        }

        let err = bob.receive_key(&headers[1]).unwrap_err();
        assert!(matches!(err, CryptoError::Replay(1)));

        // Bob keeps working after the rejected replay.
        let (h, mk) = alice.next_send_key().unwrap();
        let mk_b = bob.receive_key(&h).unwrap();
        assert_eq!(*mk, *mk_b);
    }

    #[test]
    fn skipped_key_bound_is_enforced() {
        let (mut alice, mut bob) = pair();

        let (first, mk_first) = alice.next_send_key().unwrap();
        for _ in 0..MAX_SKIP {
            alice.next_send_key().unwrap();
        }
        // Counter 1001 would require banking 1001 keys.
        let (too_far, _) = alice.next_send_key().unwrap();
        assert_eq!(too_far.n, MAX_SKIP + 1);
        let err = bob.receive_key(&too_far).unwrap_err();
        assert!(matches!(err, CryptoError::TooManySkipped { .. }));

        // The failed receive did not advance the chain.
        let mk_b = bob.receive_key(&first).unwrap();
        assert_eq!(*mk_first, *mk_b);
    }

    #[test]
    fn interleaved_chains_after_rotation() {
        let (mut alice, mut bob) = pair();

        // Alice sends 2, Bob only sees the first.
        let (h0, _) = alice.next_send_key().unwrap();
        let (h1, mk1) = alice.next_send_key().unwrap();
        bob.receive_key(&h0).unwrap();

        // Bob replies (ratchet step), Alice receives, answers on the new chain.
        let (hb, _) = bob.next_send_key().unwrap();
        alice.receive_key(&hb).unwrap();
        let (h_new, mk_new) = alice.next_send_key().unwrap();

        // New chain first, then the straggler from the old chain.
        let got_new = bob.receive_key(&h_new).unwrap();
        assert_eq!(*mk_new, *got_new);
        let got_old = bob.receive_key(&h1).unwrap();
        assert_eq!(*mk1, *got_old);
        assert_eq!(bob.skipped_len(), 0);
    }

    #[test]
    fn closed_session_refuses_everything() {
        let (mut alice, _) = pair();
        let (header, _) = alice.next_send_key().unwrap();
        alice.destroy();
        assert_eq!(alice.state(), SessionState::Closed);
        assert!(matches!(alice.next_send_key(), Err(CryptoError::Closed)));
        assert!(matches!(alice.receive_key(&header), Err(CryptoError::Closed)));
        assert!(matches!(alice.rotate_own_keys(), Err(CryptoError::Closed)));
    }

    #[test]
    fn rotate_own_keys_requires_peer() {
        let (mut alice, mut bob) = pair();
        assert!(alice.rotate_own_keys().is_err());

        let (h, _) = alice.next_send_key().unwrap();
        bob.receive_key(&h).unwrap();
        // Bob knows Alice's key now and may schedule a rotation.
        bob.rotate_own_keys().unwrap();
        let (hb, mk) = bob.next_send_key().unwrap();
        assert!(hb.kem_ciphertext.is_some());
        let mk_a = alice.receive_key(&hb).unwrap();
        assert_eq!(*mk, *mk_a);
    }

    #[test]
    fn forward_secrecy_across_steps() {
        let (mut alice, mut bob) = pair();

        // Round trip with a full ratchet in each direction.
        let (h, _) = alice.next_send_key().unwrap();
        bob.receive_key(&h).unwrap();
        let (hb, _) = bob.next_send_key().unwrap();
        alice.receive_key(&hb).unwrap();
        let (h2, mk2) = alice.next_send_key().unwrap();
        let mk2_b = bob.receive_key(&h2).unwrap();
        assert_eq!(*mk2, *mk2_b);

        // Keys from different chains never coincide.
        let (h3, mk3) = alice.next_send_key().unwrap();
        assert_ne!(*mk2, *mk3);
        let mk3_b = bob.receive_key(&h3).unwrap();
        assert_eq!(*mk3, *mk3_b);
    }
}
