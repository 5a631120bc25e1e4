//! Identity session.
//!
//! One `IdentitySession` per logged-in user holds which identity is active,
//! the rotation controller and the shutdown signal. It is created on login
//! and consumed on logout; there is no global "current identity".
//!
//! After a completed rotation the temp identity is gone for good. If the
//! wallet later disconnects, no replacement temp identity is generated: the
//! session has no active identity until the wallet reconnects. The same
//! holds when the wallet drops between proposing and completing a rotation:
//! peers already expect the wallet key, so the session completes against the
//! proposed wallet and waits for it to return.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use zeroize::Zeroizing;

use pmid_crypto::{KdfParams, PublicKey};
use pmid_proto::{KeyRotation, WalletType};

use crate::collaborators::{SessionProvider, WalletSigner};
use crate::errors::{RotationError, SessionError};
use crate::rotation::{RotationController, RotationPhase};
use crate::store::Store;
use crate::temp_identity::{Identity, TempIdentityManager};

/// The identity currently used to sign and decrypt.
#[derive(Clone)]
pub enum ActiveIdentity {
    Temp(Identity),
    Real(Arc<dyn WalletSigner>),
}

impl ActiveIdentity {
    pub fn wallet_type(&self) -> WalletType {
        match self {
            ActiveIdentity::Temp(_) => WalletType::Temp,
            ActiveIdentity::Real(_) => WalletType::Real,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            ActiveIdentity::Temp(identity) => identity.public_key(),
            ActiveIdentity::Real(wallet) => wallet.public_key(),
        }
    }

    pub async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SessionError> {
        match self {
            ActiveIdentity::Temp(identity) => Ok(identity.sign(payload).to_vec()),
            ActiveIdentity::Real(wallet) => Ok(wallet.sign(payload).await?),
        }
    }

    pub async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SessionError> {
        match self {
            ActiveIdentity::Temp(identity) => identity
                .decrypt(ciphertext)
                .map_err(|e| SessionError::Identity(e.into())),
            ActiveIdentity::Real(wallet) => Ok(wallet.decrypt(ciphertext).await?),
        }
    }
}

impl std::fmt::Debug for ActiveIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveIdentity")
            .field("wallet_type", &self.wallet_type())
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// Signals cancellation to a session's in-flight key derivations.
#[derive(Clone)]
pub struct LogoutHandle(Arc<watch::Sender<bool>>);

impl LogoutHandle {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

pub struct IdentitySession {
    user_id: String,
    temp: Arc<TempIdentityManager>,
    rotation: RotationController,
    active: Option<ActiveIdentity>,
    temp_identity: Option<Identity>,
    wallet: Option<Arc<dyn WalletSigner>>,
    /// Wallet key this session has used as its real identity.
    real_key: Option<PublicKey>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl IdentitySession {
    /// Start a session.
    ///
    /// With a wallet connected the wallet is the initial identity. Without
    /// one the temp identity is loaded, or generated if the user never had
    /// one. A user whose temp identity was already rotated away gets no
    /// active identity until the wallet connects.
    pub async fn login(
        user_id: &str,
        store: Arc<dyn Store>,
        params: KdfParams,
        provider: &dyn SessionProvider,
    ) -> Result<Self, SessionError> {
        let (tx, rx) = watch::channel(false);
        let temp = Arc::new(TempIdentityManager::new(store.clone(), params).with_shutdown(rx));
        let mut rotation = RotationController::new(user_id, temp.clone());
        let wallet = provider.wallet();

        let temp_identity = match &wallet {
            Some(_) => None,
            None => {
                let secret = Zeroizing::new(provider.session_subject());
                match temp.load(user_id, &secret).await? {
                    Some(identity) => Some(identity),
                    None => {
                        if Self::already_rotated(store.as_ref(), user_id).await? {
                            None
                        } else {
                            Some(temp.generate(user_id, &secret).await?)
                        }
                    }
                }
            }
        };

        let active = match (&wallet, &temp_identity) {
            (Some(w), _) => Some(ActiveIdentity::Real(w.clone())),
            (None, Some(identity)) => Some(ActiveIdentity::Temp(identity.clone())),
            (None, None) => None,
        };
        rotation.observe_wallet(wallet.is_some(), temp_identity.is_some());

        match &active {
            Some(a) => info!(user_id, wallet_type = %a.wallet_type(), "session started"),
            None => warn!(user_id, "session started without an active identity; waiting for wallet"),
        }

        Ok(Self {
            user_id: user_id.to_string(),
            temp,
            rotation,
            active,
            temp_identity,
            real_key: wallet.as_ref().map(|w| w.public_key()),
            wallet,
            shutdown: Arc::new(tx),
        })
    }

    async fn already_rotated(store: &dyn Store, user_id: &str) -> Result<bool, SessionError> {
        let state = store
            .get_rotation_state(user_id)
            .await
            .map_err(|e| SessionError::Identity(e.into()))?;
        Ok(state.is_some_and(|s| s.last_rotated_at.is_some()))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn active(&self) -> Option<&ActiveIdentity> {
        self.active.as_ref()
    }

    pub fn wallet_type(&self) -> Option<WalletType> {
        self.active.as_ref().map(ActiveIdentity::wallet_type)
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.active.as_ref().map(ActiveIdentity::public_key)
    }

    pub fn rotation_phase(&self) -> RotationPhase {
        self.rotation.phase()
    }

    pub fn temp_manager(&self) -> &Arc<TempIdentityManager> {
        &self.temp
    }

    pub fn logout_handle(&self) -> LogoutHandle {
        LogoutHandle(self.shutdown.clone())
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if *self.shutdown.borrow() {
            return Err(SessionError::LoggedOut);
        }
        Ok(())
    }

    fn require_active(&self) -> Result<&ActiveIdentity, SessionError> {
        self.ensure_live()?;
        self.active
            .as_ref()
            .ok_or_else(|| SessionError::NoActiveIdentity(self.user_id.clone()))
    }

    pub async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SessionError> {
        self.require_active()?.sign(payload).await
    }

    pub async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SessionError> {
        self.require_active()?.decrypt(ciphertext).await
    }

    /// Report a wallet connection change.
    ///
    /// Returns a rotation envelope to broadcast when a wallet connects while
    /// the temp identity is active. The caller must follow up with
    /// [`complete_rotation`](Self::complete_rotation) or
    /// [`abort_rotation`](Self::abort_rotation).
    pub async fn wallet_changed(
        &mut self,
        wallet: Option<Arc<dyn WalletSigner>>,
    ) -> Result<Option<KeyRotation>, SessionError> {
        self.ensure_live()?;
        let temp_active = matches!(self.active, Some(ActiveIdentity::Temp(_)));
        let phase = self.rotation.observe_wallet(wallet.is_some(), temp_active);

        if phase == RotationPhase::RotationProposed {
            return self.wallet_changed_mid_rotation(wallet);
        }

        let Some(wallet) = wallet else {
            self.wallet = None;
            if matches!(self.active, Some(ActiveIdentity::Real(_))) {
                self.active = None;
                info!(user_id = %self.user_id, "wallet disconnected, messaging paused until it reconnects");
            }
            return Ok(None);
        };

        if phase == RotationPhase::Armed {
            let old = self
                .temp_identity
                .clone()
                .ok_or_else(|| SessionError::NoActiveIdentity(self.user_id.clone()))?;
            let rot = self.rotation.propose_rotation(&old, wallet.clone()).await?;
            self.wallet = Some(wallet);
            return Ok(Some(rot));
        }

        match &self.active {
            Some(ActiveIdentity::Real(current)) if current.public_key() != wallet.public_key() => {
                return Err(RotationError::UnsupportedRotation.into());
            }
            None => {
                if self.real_key.is_some_and(|k| k != wallet.public_key()) {
                    return Err(RotationError::UnsupportedRotation.into());
                }
                info!(user_id = %self.user_id, "wallet reconnected");
                self.real_key = Some(wallet.public_key());
                self.active = Some(ActiveIdentity::Real(wallet.clone()));
            }
            _ => {}
        }
        self.wallet = Some(wallet);
        Ok(None)
    }

    /// The proposal may already be on the wire, so only the proposed wallet
    /// is accepted back.
    fn wallet_changed_mid_rotation(
        &mut self,
        wallet: Option<Arc<dyn WalletSigner>>,
    ) -> Result<Option<KeyRotation>, SessionError> {
        let proposed = self.rotation.pending_wallet().map(|w| w.public_key());
        match wallet {
            None => {
                info!(user_id = %self.user_id, "wallet disconnected during rotation");
                self.wallet = None;
            }
            Some(w) if Some(w.public_key()) == proposed => self.wallet = Some(w),
            Some(_) => return Err(RotationError::UnsupportedRotation.into()),
        }
        Ok(None)
    }

    /// The rotation envelope was broadcast: switch to the proposed wallet
    /// identity and discard the temp identity.
    ///
    /// If the wallet disconnected after the proposal, the rotation still
    /// completes and messaging pauses until that wallet reconnects.
    pub async fn complete_rotation(&mut self) -> Result<RotationPhase, SessionError> {
        self.ensure_live()?;
        let proposed = self.rotation.pending_wallet().cloned();
        let outcome = self.rotation.complete_rotation().await?;
        let proposed =
            proposed.ok_or_else(|| SessionError::NoActiveIdentity(self.user_id.clone()))?;

        self.real_key = Some(proposed.public_key());
        self.temp_identity = None;
        self.active = match &self.wallet {
            Some(wallet) => Some(ActiveIdentity::Real(wallet.clone())),
            None => {
                info!(user_id = %self.user_id, "rotation complete, messaging paused until the wallet reconnects");
                None
            }
        };
        Ok(outcome)
    }

    /// Broadcast failed: keep messaging under the temp identity.
    pub fn abort_rotation(&mut self) -> Result<RotationPhase, SessionError> {
        Ok(self.rotation.abort_rotation()?)
    }

    /// End the session: cancel in-flight derivations and drop key material.
    pub fn logout(self) {
        self.shutdown.send_replace(true);
        info!(user_id = %self.user_id, "session ended");
    }
}
