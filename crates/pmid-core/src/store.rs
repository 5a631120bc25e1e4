//! Storage abstraction for wrapped identity keys and rotation state.
//!
//! This module defines the `Store` trait and an in-memory implementation
//! for tests and ephemeral sessions. The file-backed implementation lives in
//! [`crate::file_store`].
//!
//! The store never sees plaintext private keys: records carry only the
//! ciphertext produced by the wrapping step plus the public salt and nonce.
//! Every write replaces the whole record (last writer wins); callers
//! serialize per-user access themselves.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub use crate::errors::StoreError;

// ============================================================================
// Data Models
// ============================================================================

/// A wrapped private key at rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKeyRecord {
    pub user_id: String,
    /// ChaCha20-Poly1305 ciphertext of the 64-byte private key
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    /// Argon2id salt (public)
    #[serde(with = "hex_bytes")]
    pub derivation_salt: Vec<u8>,
    /// AEAD nonce (public)
    #[serde(with = "hex_bytes")]
    pub nonce: Vec<u8>,
    /// Unix timestamp (seconds)
    pub created_at: u64,
    /// False once the record has been logically deleted
    pub is_active: bool,
}

/// Per-user rotation sequence, persisted so it survives restarts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    pub user_id: String,
    /// Sequence number of the most recent proposed rotation (0 = none)
    pub sequence_number: u32,
    /// Set when a rotation completes; aborted proposals leave it alone
    pub last_rotated_at: Option<u64>,
}

impl RotationState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            sequence_number: 0,
            last_rotated_at: None,
        }
    }
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ============================================================================
// Store Trait
// ============================================================================

/// Local persistence for identity records, keyed by user id.
#[async_trait]
pub trait Store: Send + Sync {
    /// Save (or atomically replace) the record for `record.user_id`.
    async fn put(&self, record: EncryptedKeyRecord) -> Result<(), StoreError>;

    /// Retrieve the record for a user, active or not.
    async fn get(&self, user_id: &str) -> Result<Option<EncryptedKeyRecord>, StoreError>;

    /// Irreversibly delete the record for a user.
    ///
    /// Deleting a missing record is not an error.
    async fn delete(&self, user_id: &str) -> Result<(), StoreError>;

    /// Mark a record inactive without removing it.
    ///
    /// Returns `false` if no record exists.
    async fn deactivate(&self, user_id: &str) -> Result<bool, StoreError>;

    /// Delete every inactive record. Returns how many were removed.
    async fn purge_inactive(&self) -> Result<usize, StoreError>;

    async fn put_rotation_state(&self, state: RotationState) -> Result<(), StoreError>;

    async fn get_rotation_state(&self, user_id: &str) -> Result<Option<RotationState>, StoreError>;
}

// ============================================================================
// In-Memory Store Implementation
// ============================================================================

/// Thread-safe in-memory store.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    records: Arc<RwLock<HashMap<String, EncryptedKeyRecord>>>,
    rotations: Arc<RwLock<HashMap<String, RotationState>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, record: EncryptedKeyRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<EncryptedKeyRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(user_id).cloned())
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if let Some(mut record) = records.remove(user_id) {
            record.ciphertext.fill(0);
        }
        Ok(())
    }

    async fn deactivate(&self, user_id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(user_id) {
            Some(record) => {
                record.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_inactive(&self) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        let before_count = records.len();
        records.retain(|_, record| record.is_active);
        Ok(before_count - records.len())
    }

    async fn put_rotation_state(&self, state: RotationState) -> Result<(), StoreError> {
        let mut rotations = self.rotations.write().await;
        rotations.insert(state.user_id.clone(), state);
        Ok(())
    }

    async fn get_rotation_state(&self, user_id: &str) -> Result<Option<RotationState>, StoreError> {
        let rotations = self.rotations.read().await;
        Ok(rotations.get(user_id).cloned())
    }
}

#[cfg(test)]
pub(crate) fn make_test_record(user_id: &str) -> EncryptedKeyRecord {
    EncryptedKeyRecord {
        user_id: user_id.to_string(),
        ciphertext: vec![0xAB; 80],
        derivation_salt: vec![1u8; 16],
        nonce: vec![2u8; 12],
        created_at: 1_700_000_000,
        is_active: true,
    }
}
