//! Canonical signing payloads for signed envelopes.
//!
//! Each envelope kind signs a SHA-256 digest of a tagged transcript under its
//! own domain separator, so a signature over one kind can never be replayed
//! as another.

use pmid_proto::{ChatMessage, Handshake, KeyRotation};

use crate::keys::{Keypair, PublicKey, SIGNATURE_LEN};
use crate::transcript::Transcript;

/// digest = H("pmid_chat_sig_v1" || sender || content || timestamp || nonce)
pub fn chat_signing_bytes_v1(msg: &ChatMessage) -> [u8; 32] {
    let mut t = Transcript::new("pmid_chat_sig_v1");
    t.append_str(1, &msg.sender_user_id);
    t.append_bytes(2, &msg.encrypted_content);
    t.append_u64(3, msg.timestamp);
    t.append_bytes(4, &msg.nonce);
    t.finalize()
}

pub fn handshake_signing_bytes_v1(hs: &Handshake) -> [u8; 32] {
    let mut t = Transcript::new("pmid_handshake_sig_v1");
    t.append_str(1, &hs.user_id);
    t.append_bytes(2, &hs.public_key);
    t.append_str(3, hs.wallet_type.as_str());
    t.append_u64(4, hs.timestamp);
    t.finalize()
}

/// Both rotation signatures cover the same digest; timestamp is excluded.
pub fn rotation_signing_bytes_v1(rot: &KeyRotation) -> [u8; 32] {
    let mut t = Transcript::new("pmid_rotation_sig_v1");
    t.append_str(1, &rot.user_id);
    t.append_bytes(2, &rot.old_public_key);
    t.append_bytes(3, &rot.new_public_key);
    t.append_u32(4, rot.sequence_number);
    t.append_str(5, &rot.nonce);
    t.finalize()
}

/// Fill in `msg.signature` with the sender's key.
pub fn sign_chat_v1(sender: &Keypair, msg: &mut ChatMessage) {
    let digest = chat_signing_bytes_v1(msg);
    msg.signature = sender.sign(&digest).to_vec();
}

pub fn verify_chat_v1(msg: &ChatMessage, sender_key: &PublicKey) -> bool {
    sender_key.verify(&chat_signing_bytes_v1(msg), &msg.signature)
}

/// Set `hs.public_key` to the signer's key and sign the handshake.
pub fn sign_handshake_v1(identity: &Keypair, hs: &mut Handshake) {
    hs.public_key = identity.public_key().to_vec();
    let digest = handshake_signing_bytes_v1(hs);
    hs.signature = identity.sign(&digest).to_vec();
}

/// Verify a handshake against the key it claims.
///
/// Returns the parsed key on success; a malformed key or a bad signature
/// yields `None`.
pub fn verify_handshake_v1(hs: &Handshake) -> Option<PublicKey> {
    let key = PublicKey::from_bytes(&hs.public_key).ok()?;
    key.verify(&handshake_signing_bytes_v1(hs), &hs.signature)
        .then_some(key)
}

/// Signature of the old key over a rotation. The new-key signature comes
/// from the wallet.
pub fn sign_rotation_old_v1(old: &Keypair, rot: &KeyRotation) -> [u8; SIGNATURE_LEN] {
    old.sign(&rotation_signing_bytes_v1(rot))
}

/// Outcome of checking both rotation signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSignatures {
    pub old_valid: bool,
    pub new_valid: bool,
}

impl RotationSignatures {
    pub fn both_valid(&self) -> bool {
        self.old_valid && self.new_valid
    }
}

/// Check `signature_old` under `old_public_key` and `signature_new` under
/// `new_public_key`. A key that does not parse counts as a failed signature.
pub fn verify_rotation_v1(rot: &KeyRotation) -> RotationSignatures {
    let digest = rotation_signing_bytes_v1(rot);
    let check = |key: &[u8], sig: &[u8]| {
        PublicKey::from_bytes(key)
            .map(|pk| pk.verify(&digest, sig))
            .unwrap_or(false)
    };
    RotationSignatures {
        old_valid: check(&rot.old_public_key, &rot.signature_old),
        new_valid: check(&rot.new_public_key, &rot.signature_new),
    }
}
