//! Peer key directory.
//!
//! A peer's view of which public key addresses each user. Keys enter the
//! directory on first handshake; after that the only way to change a user's
//! key is an accepted rotation.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::{info, warn};

use pmid_crypto::{payloads::verify_handshake_v1, utils::constant_time_compare, verify_rotation_v1, PublicKey};
use pmid_proto::{Handshake, KeyRotation, WalletType};

use crate::errors::{MessengerError, RotationError};
use crate::temp_identity::short_fingerprint;

/// The key currently used to address a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerKey {
    pub public_key: PublicKey,
    pub wallet_type: WalletType,
}

#[derive(Debug, Default)]
struct RotationLedger {
    last_sequence: u32,
    seen_nonces: HashSet<String>,
}

#[derive(Debug, Default)]
struct DirectoryInner {
    keys: HashMap<String, PeerKey>,
    ledgers: HashMap<String, RotationLedger>,
}

#[derive(Debug, Default)]
pub struct PeerDirectory {
    inner: RwLock<DirectoryInner>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current_key(&self, user_id: &str) -> Option<PublicKey> {
        self.peer(user_id).await.map(|p| p.public_key)
    }

    pub async fn peer(&self, user_id: &str) -> Option<PeerKey> {
        self.inner.read().await.keys.get(user_id).copied()
    }

    /// Last accepted rotation sequence for a user (0 if none).
    pub async fn last_sequence(&self, user_id: &str) -> u32 {
        self.inner
            .read()
            .await
            .ledgers
            .get(user_id)
            .map(|l| l.last_sequence)
            .unwrap_or(0)
    }

    /// Record the key from a verified handshake.
    ///
    /// A user seen for the first time is trusted on first use. A handshake
    /// for a known user must carry the recorded key; anything else is a
    /// [`MessengerError::KeyConflict`].
    pub async fn accept_handshake(&self, hs: &Handshake) -> Result<PublicKey, MessengerError> {
        let key = verify_handshake_v1(hs).ok_or_else(|| {
            warn!(user_id = %hs.user_id, "handshake signature invalid");
            MessengerError::SignatureInvalid {
                kind: "handshake",
                user_id: hs.user_id.clone(),
            }
        })?;

        let mut inner = self.inner.write().await;
        match inner.keys.get(&hs.user_id) {
            Some(existing) if existing.public_key == key => Ok(key),
            Some(_) => {
                warn!(user_id = %hs.user_id, "handshake key differs from recorded key");
                Err(MessengerError::KeyConflict(hs.user_id.clone()))
            }
            None => {
                inner.keys.insert(
                    hs.user_id.clone(),
                    PeerKey {
                        public_key: key,
                        wallet_type: hs.wallet_type,
                    },
                );
                info!(
                    user_id = %hs.user_id,
                    wallet_type = %hs.wallet_type,
                    fingerprint = %short_fingerprint(&key),
                    "recorded peer key"
                );
                Ok(key)
            }
        }
    }

    /// Verify a rotation announcement and, if it passes, make the new key
    /// current for the user.
    ///
    /// Checks run in order: sequence strictly greater than the last accepted
    /// one, nonce not seen before, old key equal to `expected_old`, both
    /// signatures valid. Any failure leaves the directory untouched.
    pub async fn accept_rotation(
        &self,
        rot: &KeyRotation,
        expected_old: &PublicKey,
    ) -> Result<PublicKey, RotationError> {
        let mut inner = self.inner.write().await;
        let user_id = rot.user_id.as_str();

        let (last_accepted, replayed) = match inner.ledgers.get(user_id) {
            Some(ledger) => (ledger.last_sequence, ledger.seen_nonces.contains(&rot.nonce)),
            None => (0, false),
        };

        if rot.sequence_number <= last_accepted {
            warn!(user_id, sequence = rot.sequence_number, last_accepted, "rejected stale rotation");
            return Err(RotationError::StaleRotation {
                user_id: user_id.to_string(),
                sequence: rot.sequence_number,
                last_accepted,
            });
        }
        if replayed {
            warn!(user_id, nonce = %rot.nonce, "rejected replayed rotation");
            return Err(RotationError::ReplayedRotation {
                user_id: user_id.to_string(),
                nonce: rot.nonce.clone(),
            });
        }
        if !constant_time_compare(&rot.old_public_key, &expected_old.to_bytes()) {
            warn!(user_id, "rotation old key does not match the recorded key");
            return Err(RotationError::InvalidRotationSignature("old key mismatch"));
        }

        let sigs = verify_rotation_v1(rot);
        if !sigs.old_valid {
            warn!(user_id, "rotation old-key signature invalid");
            return Err(RotationError::InvalidRotationSignature("old key signature"));
        }
        if !sigs.new_valid {
            warn!(user_id, "rotation new-key signature invalid");
            return Err(RotationError::InvalidRotationSignature("new key signature"));
        }
        let new_key = PublicKey::from_bytes(&rot.new_public_key)
            .map_err(|_| RotationError::InvalidRotationSignature("new key malformed"))?;

        let ledger = inner.ledgers.entry(user_id.to_string()).or_default();
        ledger.last_sequence = rot.sequence_number;
        ledger.seen_nonces.insert(rot.nonce.clone());
        inner.keys.insert(
            user_id.to_string(),
            PeerKey {
                public_key: new_key,
                wallet_type: WalletType::Real,
            },
        );

        info!(
            user_id,
            sequence = rot.sequence_number,
            fingerprint = %short_fingerprint(&new_key),
            "accepted key rotation"
        );
        Ok(new_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmid_crypto::{payloads::rotation_signing_bytes_v1, sign_handshake_v1, Keypair};

    fn rotation(user: &str, old: &Keypair, new: &Keypair, seq: u32, nonce: &str) -> KeyRotation {
        let mut rot = KeyRotation {
            user_id: user.into(),
            old_public_key: old.public_key().to_vec(),
            new_public_key: new.public_key().to_vec(),
            signature_old: Vec::new(),
            signature_new: Vec::new(),
            sequence_number: seq,
            nonce: nonce.into(),
            timestamp: 1_700_000_000,
        };
        let digest = rotation_signing_bytes_v1(&rot);
        rot.signature_old = old.sign(&digest).to_vec();
        rot.signature_new = new.sign(&digest).to_vec();
        rot
    }

    fn handshake(user: &str, kp: &Keypair) -> Handshake {
        let mut hs = Handshake {
            user_id: user.into(),
            public_key: Vec::new(),
            wallet_type: WalletType::Temp,
            timestamp: 1_700_000_000,
            signature: Vec::new(),
        };
        sign_handshake_v1(kp, &mut hs);
        hs
    }

    #[tokio::test]
    async fn test_increasing_sequences_accepted() {
        let dir = PeerDirectory::new();
        let k0 = Keypair::generate();
        let k1 = Keypair::generate();
        let k2 = Keypair::generate();

        dir.accept_rotation(&rotation("u1", &k0, &k1, 1, "n1"), &k0.public_key())
            .await
            .unwrap();
        dir.accept_rotation(&rotation("u1", &k1, &k2, 5, "n2"), &k1.public_key())
            .await
            .unwrap();

        assert_eq!(dir.current_key("u1").await, Some(k2.public_key()));
        assert_eq!(dir.last_sequence("u1").await, 5);
    }

    #[tokio::test]
    async fn test_repeat_and_decrease_are_stale() {
        let dir = PeerDirectory::new();
        let k0 = Keypair::generate();
        let k1 = Keypair::generate();
        let rot = rotation("u1", &k0, &k1, 2, "n1");
        dir.accept_rotation(&rot, &k0.public_key()).await.unwrap();

        assert!(matches!(
            dir.accept_rotation(&rot, &k0.public_key()).await,
            Err(RotationError::StaleRotation { sequence: 2, last_accepted: 2, .. })
        ));
        let lower = rotation("u1", &k1, &Keypair::generate(), 1, "n9");
        assert!(matches!(
            dir.accept_rotation(&lower, &k1.public_key()).await,
            Err(RotationError::StaleRotation { .. })
        ));
        assert_eq!(dir.current_key("u1").await, Some(k1.public_key()));
    }

    #[tokio::test]
    async fn test_repeated_nonce_is_replay() {
        let dir = PeerDirectory::new();
        let k0 = Keypair::generate();
        let k1 = Keypair::generate();
        let k2 = Keypair::generate();
        dir.accept_rotation(&rotation("u1", &k0, &k1, 1, "n1"), &k0.public_key())
            .await
            .unwrap();

        let err = dir
            .accept_rotation(&rotation("u1", &k1, &k2, 2, "n1"), &k1.public_key())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RotationError::ReplayedRotation {
                user_id: "u1".into(),
                nonce: "n1".into()
            }
        );
        assert_eq!(dir.last_sequence("u1").await, 1);
    }

    #[tokio::test]
    async fn test_tampered_new_key_is_invalid_signature() {
        let dir = PeerDirectory::new();
        let k0 = Keypair::generate();
        let k1 = Keypair::generate();
        let mut rot = rotation("u1", &k0, &k1, 1, "n1");
        rot.new_public_key = Keypair::generate().public_key().to_vec();

        assert!(matches!(
            dir.accept_rotation(&rot, &k0.public_key()).await,
            Err(RotationError::InvalidRotationSignature(_))
        ));
        assert_eq!(dir.last_sequence("u1").await, 0);
        assert!(dir.current_key("u1").await.is_none());
    }

    #[tokio::test]
    async fn test_unexpected_old_key_rejected() {
        let dir = PeerDirectory::new();
        let k0 = Keypair::generate();
        let k1 = Keypair::generate();
        let attacker = Keypair::generate();
        // Validly signed by both keys, but the old key is not the recorded one
        let rot = rotation("u1", &attacker, &k1, 1, "n1");
        assert_eq!(
            dir.accept_rotation(&rot, &k0.public_key()).await.unwrap_err(),
            RotationError::InvalidRotationSignature("old key mismatch")
        );
    }

    #[tokio::test]
    async fn test_handshake_trust_on_first_use() {
        let dir = PeerDirectory::new();
        let kp = Keypair::generate();
        let hs = handshake("u1", &kp);

        assert_eq!(dir.accept_handshake(&hs).await.unwrap(), kp.public_key());
        // Same key again is fine
        dir.accept_handshake(&hs).await.unwrap();

        let other = handshake("u1", &Keypair::generate());
        assert_eq!(
            dir.accept_handshake(&other).await.unwrap_err(),
            MessengerError::KeyConflict("u1".into())
        );
        assert_eq!(dir.current_key("u1").await, Some(kp.public_key()));
    }

    #[tokio::test]
    async fn test_forged_handshake_rejected() {
        let dir = PeerDirectory::new();
        let mut hs = handshake("u1", &Keypair::generate());
        hs.timestamp += 1;
        assert!(matches!(
            dir.accept_handshake(&hs).await,
            Err(MessengerError::SignatureInvalid { kind: "handshake", .. })
        ));
        assert!(dir.peer("u1").await.is_none());
    }

    #[tokio::test]
    async fn test_rotation_replaces_handshake_key() {
        let dir = PeerDirectory::new();
        let old = Keypair::generate();
        let new = Keypair::generate();
        dir.accept_handshake(&handshake("u1", &old)).await.unwrap();

        let expected = dir.current_key("u1").await.unwrap();
        dir.accept_rotation(&rotation("u1", &old, &new, 1, "n1"), &expected)
            .await
            .unwrap();

        let peer = dir.peer("u1").await.unwrap();
        assert_eq!(peer.public_key, new.public_key());
        assert_eq!(peer.wallet_type, WalletType::Real);

        // The old key can no longer be re-announced
        assert!(dir.accept_handshake(&handshake("u1", &old)).await.is_err());
    }
}
