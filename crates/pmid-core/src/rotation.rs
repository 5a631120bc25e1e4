//! Key rotation controller (local side).
//!
//! Links a user's temp identity to their real wallet when the wallet is
//! connected mid-session:
//!
//! ```text
//! Idle -> Armed -> RotationProposed -> RotationAccepted | RotationRejected -> Idle
//! ```
//!
//! The controller arms only on the edge from "no wallet" to "wallet" while a
//! temp identity is active. A wallet present at the first observation is the
//! initial identity, not a replacement, and never arms.
//!
//! Peer-side verification lives in [`crate::directory::PeerDirectory`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use pmid_crypto::{
    payloads::{rotation_signing_bytes_v1, sign_rotation_old_v1},
    utils::random_array,
    verify_rotation_v1,
};
use pmid_proto::{KeyRotation, WalletType};

use crate::collaborators::WalletSigner;
use crate::errors::RotationError;
use crate::store::{now_unix, RotationState};
use crate::temp_identity::{Identity, TempIdentityManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    Idle,
    Armed,
    RotationProposed,
    RotationAccepted,
    RotationRejected,
}

/// Drives one user's temp -> real rotation.
pub struct RotationController {
    user_id: String,
    temp: Arc<TempIdentityManager>,
    phase: RotationPhase,
    wallet_seen: Option<bool>,
    pending: Option<KeyRotation>,
    pending_wallet: Option<Arc<dyn WalletSigner>>,
    last_outcome: Option<RotationPhase>,
}

impl RotationController {
    pub fn new(user_id: impl Into<String>, temp: Arc<TempIdentityManager>) -> Self {
        Self {
            user_id: user_id.into(),
            temp,
            phase: RotationPhase::Idle,
            wallet_seen: None,
            pending: None,
            pending_wallet: None,
            last_outcome: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn phase(&self) -> RotationPhase {
        self.phase
    }

    /// Terminal phase of the most recent rotation attempt.
    pub fn last_outcome(&self) -> Option<RotationPhase> {
        self.last_outcome
    }

    /// The proposed envelope awaiting broadcast.
    pub fn pending(&self) -> Option<&KeyRotation> {
        self.pending.as_ref()
    }

    /// Wallet that signed the pending envelope. Held until the rotation
    /// finishes even if the wallet disconnects in between.
    pub fn pending_wallet(&self) -> Option<&Arc<dyn WalletSigner>> {
        self.pending_wallet.as_ref()
    }

    /// Feed the current wallet connection state. Returns the phase after
    /// the observation.
    pub fn observe_wallet(&mut self, connected: bool, temp_active: bool) -> RotationPhase {
        let previous = self.wallet_seen.replace(connected);

        match (previous, connected) {
            (Some(false), true) if self.phase == RotationPhase::Idle && temp_active => {
                self.phase = RotationPhase::Armed;
                info!(user_id = %self.user_id, "wallet connected, rotation armed");
            }
            (_, false) if self.phase == RotationPhase::Armed => {
                self.phase = RotationPhase::Idle;
                debug!(user_id = %self.user_id, "wallet disconnected, rotation disarmed");
            }
            _ => {}
        }
        self.phase
    }

    /// Build and dual-sign the rotation envelope.
    ///
    /// Requires `Armed`. The per-user sequence number is read, incremented
    /// and persisted before signing, so a later failure only burns a number.
    /// The new-key signature comes from `wallet`; both signatures are checked
    /// before the envelope is handed out.
    pub async fn propose_rotation(
        &mut self,
        old: &Identity,
        wallet: Arc<dyn WalletSigner>,
    ) -> Result<KeyRotation, RotationError> {
        if self.phase != RotationPhase::Armed {
            return Err(RotationError::InvalidPhase(self.phase));
        }
        if old.wallet_type() == WalletType::Real {
            return Err(RotationError::UnsupportedRotation);
        }

        match self.build_envelope(old, wallet.as_ref()).await {
            Ok(rot) => {
                self.phase = RotationPhase::RotationProposed;
                self.pending = Some(rot.clone());
                self.pending_wallet = Some(wallet);
                info!(
                    user_id = %self.user_id,
                    sequence = rot.sequence_number,
                    "proposed key rotation"
                );
                Ok(rot)
            }
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "rotation proposal rejected");
                self.finish(RotationPhase::RotationRejected);
                Err(e)
            }
        }
    }

    async fn build_envelope(
        &self,
        old: &Identity,
        wallet: &dyn WalletSigner,
    ) -> Result<KeyRotation, RotationError> {
        let sequence_number = self.next_sequence().await?;
        let nonce: [u8; 16] = random_array()?;

        let mut rot = KeyRotation {
            user_id: self.user_id.clone(),
            old_public_key: old.public_key().to_vec(),
            new_public_key: wallet.public_key().to_vec(),
            signature_old: Vec::new(),
            signature_new: Vec::new(),
            sequence_number,
            nonce: hex::encode(nonce),
            timestamp: now_unix(),
        };
        rot.signature_old = sign_rotation_old_v1(old.keypair(), &rot).to_vec();
        rot.signature_new = wallet.sign(&rotation_signing_bytes_v1(&rot)).await?;

        let sigs = verify_rotation_v1(&rot);
        if !sigs.old_valid {
            return Err(RotationError::InvalidRotationSignature("old key signature"));
        }
        if !sigs.new_valid {
            return Err(RotationError::InvalidRotationSignature("wallet signature"));
        }

        self.temp.mark_rotating_out(&self.user_id).await?;
        Ok(rot)
    }

    async fn next_sequence(&self) -> Result<u32, RotationError> {
        let _guard = self.temp.locks().lock(&self.user_id).await;
        let store = self.temp.store();

        let mut state = store
            .get_rotation_state(&self.user_id)
            .await?
            .unwrap_or_else(|| RotationState::new(self.user_id.clone()));
        let next = state
            .sequence_number
            .checked_add(1)
            .ok_or_else(|| RotationError::SequenceExhausted(self.user_id.clone()))?;

        state.sequence_number = next;
        store.put_rotation_state(state).await?;
        Ok(next)
    }

    /// Stamp the persisted state so later logins know the temp identity
    /// was rotated away. Proposals alone never set this.
    async fn mark_completed(&self) -> Result<(), RotationError> {
        let _guard = self.temp.locks().lock(&self.user_id).await;
        let store = self.temp.store();

        let mut state = store
            .get_rotation_state(&self.user_id)
            .await?
            .unwrap_or_else(|| RotationState::new(self.user_id.clone()));
        state.last_rotated_at = Some(now_unix());
        store.put_rotation_state(state).await?;
        Ok(())
    }

    /// The envelope was broadcast: discard the temp identity for good.
    pub async fn complete_rotation(&mut self) -> Result<RotationPhase, RotationError> {
        if self.phase != RotationPhase::RotationProposed {
            return Err(RotationError::InvalidPhase(self.phase));
        }
        self.mark_completed().await?;
        self.temp.remove(&self.user_id).await?;
        info!(user_id = %self.user_id, "rotation complete, temp identity discarded");
        Ok(self.finish(RotationPhase::RotationAccepted))
    }

    /// Broadcast failed: keep the temp identity.
    pub fn abort_rotation(&mut self) -> Result<RotationPhase, RotationError> {
        if self.phase != RotationPhase::RotationProposed {
            return Err(RotationError::InvalidPhase(self.phase));
        }
        self.temp.restore_active(&self.user_id);
        warn!(user_id = %self.user_id, "rotation aborted, keeping temp identity");
        Ok(self.finish(RotationPhase::RotationRejected))
    }

    fn finish(&mut self, outcome: RotationPhase) -> RotationPhase {
        self.pending = None;
        self.pending_wallet = None;
        self.last_outcome = Some(outcome);
        self.phase = RotationPhase::Idle;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pmid_crypto::{KdfParams, Keypair, PublicKey};

    use crate::collaborators::LocalWallet;
    use crate::directory::PeerDirectory;
    use crate::errors::WalletError;
    use crate::store::{InMemoryStore, Store};
    use crate::temp_identity::TempIdentityState;

    /// Wallet that signs with a key other than the one it advertises.
    struct LyingWallet {
        advertised: Keypair,
        actual: Keypair,
    }

    #[async_trait]
    impl WalletSigner for LyingWallet {
        fn address(&self) -> String {
            "0xbad".into()
        }
        fn public_key(&self) -> PublicKey {
            self.advertised.public_key()
        }
        async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, WalletError> {
            Ok(self.actual.sign(payload).to_vec())
        }
        async fn decrypt(&self, _ciphertext: &[u8]) -> Result<Vec<u8>, WalletError> {
            Err(WalletError::Rejected)
        }
    }

    async fn setup() -> (Arc<InMemoryStore>, Arc<TempIdentityManager>, Identity) {
        let store = InMemoryStore::new_shared();
        let temp = Arc::new(TempIdentityManager::new(store.clone(), KdfParams::new(8, 1, 1)));
        let identity = temp.generate("u1", b"s1").await.unwrap();
        (store, temp, identity)
    }

    fn armed(temp: Arc<TempIdentityManager>) -> RotationController {
        let mut ctl = RotationController::new("u1", temp);
        ctl.observe_wallet(false, true);
        assert_eq!(ctl.observe_wallet(true, true), RotationPhase::Armed);
        ctl
    }

    #[tokio::test]
    async fn test_wallet_present_from_start_never_arms() {
        let (_, temp, _) = setup().await;
        let mut ctl = RotationController::new("u1", temp);
        assert_eq!(ctl.observe_wallet(true, true), RotationPhase::Idle);
        assert_eq!(ctl.observe_wallet(true, true), RotationPhase::Idle);
    }

    #[tokio::test]
    async fn test_no_temp_identity_never_arms() {
        let (_, temp, _) = setup().await;
        let mut ctl = RotationController::new("u1", temp);
        ctl.observe_wallet(false, false);
        assert_eq!(ctl.observe_wallet(true, false), RotationPhase::Idle);
    }

    #[tokio::test]
    async fn test_disconnect_disarms() {
        let (_, temp, _) = setup().await;
        let mut ctl = armed(temp);
        assert_eq!(ctl.observe_wallet(false, true), RotationPhase::Idle);
    }

    #[tokio::test]
    async fn test_propose_requires_armed() {
        let (_, temp, identity) = setup().await;
        let mut ctl = RotationController::new("u1", temp);
        let wallet = Arc::new(LocalWallet::generate("0xabc"));
        assert_eq!(
            ctl.propose_rotation(&identity, wallet).await.unwrap_err(),
            RotationError::InvalidPhase(RotationPhase::Idle)
        );
    }

    #[tokio::test]
    async fn test_propose_complete_flow() {
        let (store, temp, identity) = setup().await;
        let mut ctl = armed(temp.clone());
        let wallet = Arc::new(LocalWallet::generate("0xabc"));

        let rot = ctl.propose_rotation(&identity, wallet.clone()).await.unwrap();
        assert_eq!(rot.sequence_number, 1);
        assert_eq!(rot.nonce.len(), 32);
        assert_eq!(rot.new_public_key, wallet.public_key().to_vec());
        assert!(verify_rotation_v1(&rot).both_valid());
        assert_eq!(ctl.phase(), RotationPhase::RotationProposed);
        assert_eq!(
            ctl.pending_wallet().map(|w| w.public_key()),
            Some(wallet.public_key())
        );
        assert_eq!(temp.state("u1").await.unwrap(), TempIdentityState::RotatingOut);
        assert!(store
            .get_rotation_state("u1")
            .await
            .unwrap()
            .unwrap()
            .last_rotated_at
            .is_none());

        // A peer holding the temp key accepts it
        let peers = PeerDirectory::new();
        peers.accept_rotation(&rot, &identity.public_key()).await.unwrap();

        assert_eq!(ctl.complete_rotation().await.unwrap(), RotationPhase::RotationAccepted);
        assert_eq!(ctl.phase(), RotationPhase::Idle);
        assert!(ctl.pending_wallet().is_none());
        assert!(store.get("u1").await.unwrap().is_none());
        assert_eq!(temp.state("u1").await.unwrap(), TempIdentityState::Deleted);
        assert!(store
            .get_rotation_state("u1")
            .await
            .unwrap()
            .unwrap()
            .last_rotated_at
            .is_some());
    }

    #[tokio::test]
    async fn test_abort_keeps_temp_identity() {
        let (store, temp, identity) = setup().await;
        let mut ctl = armed(temp.clone());
        ctl.propose_rotation(&identity, Arc::new(LocalWallet::generate("0xabc")))
            .await
            .unwrap();

        assert_eq!(ctl.abort_rotation().unwrap(), RotationPhase::RotationRejected);
        assert_eq!(ctl.last_outcome(), Some(RotationPhase::RotationRejected));
        assert!(ctl.pending_wallet().is_none());
        assert!(store.get("u1").await.unwrap().is_some());
        // The sequence is burnt but nothing was rotated away
        let state = store.get_rotation_state("u1").await.unwrap().unwrap();
        assert_eq!(state.sequence_number, 1);
        assert_eq!(state.last_rotated_at, None);
        assert_eq!(temp.state("u1").await.unwrap(), TempIdentityState::TempActive);
    }

    #[tokio::test]
    async fn test_sequence_persists_and_increases() {
        let (store, temp, identity) = setup().await;

        let mut first = armed(temp.clone());
        let r1 = first
            .propose_rotation(&identity, Arc::new(LocalWallet::generate("0xa")))
            .await
            .unwrap();
        first.abort_rotation().unwrap();

        // A fresh controller (e.g. after restart) continues the sequence
        let mut second = armed(temp);
        let r2 = second
            .propose_rotation(&identity, Arc::new(LocalWallet::generate("0xb")))
            .await
            .unwrap();
        assert_eq!(r2.sequence_number, r1.sequence_number + 1);
        assert_ne!(r1.nonce, r2.nonce);
        assert_eq!(
            store.get_rotation_state("u1").await.unwrap().unwrap().sequence_number,
            2
        );
    }

    #[tokio::test]
    async fn test_bad_wallet_signature_rejected() {
        let (store, temp, identity) = setup().await;
        let mut ctl = armed(temp.clone());
        let wallet = Arc::new(LyingWallet {
            advertised: Keypair::generate(),
            actual: Keypair::generate(),
        });

        assert_eq!(
            ctl.propose_rotation(&identity, wallet).await.unwrap_err(),
            RotationError::InvalidRotationSignature("wallet signature")
        );
        assert_eq!(ctl.phase(), RotationPhase::Idle);
        assert_eq!(ctl.last_outcome(), Some(RotationPhase::RotationRejected));
        assert!(store.get("u1").await.unwrap().unwrap().is_active);
        assert_eq!(temp.state("u1").await.unwrap(), TempIdentityState::TempActive);
    }

    #[tokio::test]
    async fn test_real_identity_cannot_rotate() {
        let (_, temp, _) = setup().await;
        let mut ctl = armed(temp);
        let real = Identity::new("u1", Keypair::generate(), WalletType::Real);
        assert_eq!(
            ctl.propose_rotation(&real, Arc::new(LocalWallet::generate("0xabc")))
                .await
                .unwrap_err(),
            RotationError::UnsupportedRotation
        );
    }

    #[tokio::test]
    async fn test_complete_without_proposal_fails() {
        let (_, temp, _) = setup().await;
        let mut ctl = RotationController::new("u1", temp);
        assert!(matches!(
            ctl.complete_rotation().await,
            Err(RotationError::InvalidPhase(RotationPhase::Idle))
        ));
        assert!(ctl.abort_rotation().is_err());
    }
}
