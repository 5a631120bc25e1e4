//! Temp identity lifecycle.
//!
//! Users without a connected wallet still get a stable keypair. Its private
//! half is wrapped under a key derived from the session subject and stored
//! locally; it never touches disk in plaintext.
//!
//! Per user: `NoIdentity -> TempActive -> (Deleted | RotatingOut)`.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use pmid_crypto::{
    decrypt_message, derive_wrapping_key, generate_salt, hash::fingerprint, unwrap_private_key,
    wrap_private_key, CryptoError, KdfParams, Keypair, PublicKey, WrappingKey,
};
use pmid_proto::WalletType;

use crate::errors::IdentityError;
use crate::locks::UserLocks;
use crate::store::{now_unix, EncryptedKeyRecord, Store};

/// A usable identity: keypair plus the wallet type that backs it.
#[derive(Clone)]
pub struct Identity {
    user_id: String,
    keypair: Keypair,
    wallet_type: WalletType,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, keypair: Keypair, wallet_type: WalletType) -> Self {
        Self {
            user_id: user_id.into(),
            keypair,
            wallet_type,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn wallet_type(&self) -> WalletType {
        self.wallet_type
    }

    pub fn sign(&self, payload: &[u8]) -> [u8; 64] {
        self.keypair.sign(payload)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        decrypt_message(ciphertext, &self.keypair.private_key())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("wallet_type", &self.wallet_type)
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// Lifecycle state of a user's temp identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempIdentityState {
    NoIdentity,
    TempActive,
    /// A rotation to a real wallet has been proposed and not yet resolved.
    RotatingOut,
    Deleted,
}

/// Resolves when the shutdown flag is set. Never resolves without a
/// receiver or after the sender is gone.
pub(crate) async fn wait_for_shutdown(rx: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

pub(crate) fn short_fingerprint(key: &PublicKey) -> String {
    hex::encode(fingerprint(&key.to_bytes()))
}

/// Generates, loads and removes temp identities.
pub struct TempIdentityManager {
    store: Arc<dyn Store>,
    params: KdfParams,
    locks: UserLocks,
    states: DashMap<String, TempIdentityState>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl TempIdentityManager {
    pub fn new(store: Arc<dyn Store>, params: KdfParams) -> Self {
        Self {
            store,
            params,
            locks: UserLocks::new(),
            states: DashMap::new(),
            shutdown: None,
        }
    }

    /// Abort in-flight key derivations once `shutdown` flips to true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Share per-user locks with other components.
    pub fn with_locks(mut self, locks: UserLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Create, wrap and persist a new temp identity.
    ///
    /// Fails with [`IdentityError::AlreadyExists`] if an active record is
    /// present; callers that want a fresh identity must `remove` first.
    pub async fn generate(&self, user_id: &str, secret: &[u8]) -> Result<Identity, IdentityError> {
        let _guard = self.locks.lock(user_id).await;

        if let Some(existing) = self.store.get(user_id).await? {
            if existing.is_active {
                return Err(IdentityError::AlreadyExists(user_id.to_string()));
            }
        }

        let keypair = Keypair::generate();
        let salt = generate_salt()?;
        let key = self.derive_key(secret, &salt).await?;
        let wrapped = wrap_private_key(&keypair.private_key(), &key)?;

        let record = EncryptedKeyRecord {
            user_id: user_id.to_string(),
            ciphertext: wrapped.ciphertext,
            derivation_salt: salt.to_vec(),
            nonce: wrapped.nonce.to_vec(),
            created_at: now_unix(),
            is_active: true,
        };
        self.store.put(record).await?;
        self.states
            .insert(user_id.to_string(), TempIdentityState::TempActive);

        let identity = Identity::new(user_id, keypair, WalletType::Temp);
        info!(
            user_id,
            fingerprint = %short_fingerprint(&identity.public_key()),
            "generated temp identity"
        );
        Ok(identity)
    }

    /// Unwrap the stored temp identity.
    ///
    /// `Ok(None)` means no active record exists. A wrong secret or a
    /// corrupted record is an error, never `None`.
    pub async fn load(&self, user_id: &str, secret: &[u8]) -> Result<Option<Identity>, IdentityError> {
        let _guard = self.locks.lock(user_id).await;

        let record = match self.store.get(user_id).await? {
            Some(record) if record.is_active => record,
            _ => {
                debug!(user_id, "no active temp identity");
                return Ok(None);
            }
        };

        // A stored salt the KDF rejects is a corrupted record, same as a bad tag.
        let key = match self.derive_key(secret, &record.derivation_salt).await {
            Err(IdentityError::Crypto(CryptoError::Kdf(reason))) => {
                warn!(user_id, %reason, "temp identity record has unusable derivation input");
                return Err(CryptoError::Decryption.into());
            }
            other => other?,
        };
        let private_key = unwrap_private_key(&record.ciphertext, &record.nonce, &key)
            .inspect_err(|_| warn!(user_id, "temp identity could not be unwrapped"))?;

        let keypair = Keypair::from_private_key(&private_key);
        self.states
            .entry(user_id.to_string())
            .and_modify(|s| {
                if *s != TempIdentityState::RotatingOut {
                    *s = TempIdentityState::TempActive;
                }
            })
            .or_insert(TempIdentityState::TempActive);

        Ok(Some(Identity::new(user_id, keypair, WalletType::Temp)))
    }

    /// Load the identity, generating one if none exists.
    pub async fn load_or_generate(&self, user_id: &str, secret: &[u8]) -> Result<Identity, IdentityError> {
        match self.load(user_id, secret).await? {
            Some(identity) => Ok(identity),
            None => self.generate(user_id, secret).await,
        }
    }

    /// Irreversibly delete the temp identity. Removing twice is fine.
    pub async fn remove(&self, user_id: &str) -> Result<(), IdentityError> {
        let _guard = self.locks.lock(user_id).await;
        self.store.delete(user_id).await?;
        self.states.insert(user_id.to_string(), TempIdentityState::Deleted);
        info!(user_id, "removed temp identity");
        Ok(())
    }

    /// Logically delete the record, keeping it for audit until purged.
    pub async fn retire(&self, user_id: &str) -> Result<bool, IdentityError> {
        let _guard = self.locks.lock(user_id).await;
        let retired = self.store.deactivate(user_id).await?;
        if retired {
            self.states.insert(user_id.to_string(), TempIdentityState::Deleted);
            info!(user_id, "retired temp identity");
        }
        Ok(retired)
    }

    pub async fn state(&self, user_id: &str) -> Result<TempIdentityState, IdentityError> {
        if let Some(state) = self.states.get(user_id) {
            return Ok(*state);
        }
        Ok(match self.store.get(user_id).await? {
            Some(record) if record.is_active => TempIdentityState::TempActive,
            _ => TempIdentityState::NoIdentity,
        })
    }

    pub async fn mark_rotating_out(&self, user_id: &str) -> Result<(), IdentityError> {
        match self.state(user_id).await? {
            TempIdentityState::TempActive | TempIdentityState::RotatingOut => {
                self.states
                    .insert(user_id.to_string(), TempIdentityState::RotatingOut);
                Ok(())
            }
            other => Err(IdentityError::InvalidState(format!(
                "cannot rotate out of {other:?}"
            ))),
        }
    }

    /// Undo `mark_rotating_out` after a rejected or aborted rotation.
    pub fn restore_active(&self, user_id: &str) {
        if let Some(mut state) = self.states.get_mut(user_id) {
            if *state == TempIdentityState::RotatingOut {
                *state = TempIdentityState::TempActive;
            }
        }
    }

    async fn derive_key(&self, secret: &[u8], salt: &[u8]) -> Result<WrappingKey, IdentityError> {
        let secret = Zeroizing::new(secret.to_vec());
        let salt = salt.to_vec();
        let params = self.params;
        let task = tokio::task::spawn_blocking(move || derive_wrapping_key(&secret, &salt, &params));

        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => {
                debug!("key derivation cancelled");
                Err(IdentityError::Cancelled)
            }
            joined = task => match joined {
                Ok(result) => result.map_err(IdentityError::from),
                Err(e) => Err(IdentityError::InvalidState(format!("key derivation task failed: {e}"))),
            },
        }
    }
}
