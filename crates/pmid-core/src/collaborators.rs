//! External collaborators: transport, blob store, session provider, wallet.
//!
//! The core only talks to these through traits. The in-memory
//! implementations here back the tests and the local demo flow.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::debug;

use pmid_crypto::{decrypt_message, Keypair, PublicKey};

use crate::errors::{BlobError, TransportError, WalletError};

// ============================================================================
// Transport
// ============================================================================

/// Best-effort publish/subscribe transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    async fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<Bytes>, TransportError>;
}

/// In-process transport over `tokio::sync::broadcast`, one channel per topic.
///
/// Messages published to a topic with no subscribers are dropped.
#[derive(Clone)]
pub struct LocalBus {
    topics: Arc<DashMap<String, broadcast::Sender<Bytes>>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Bytes> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Transport for LocalBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        let len = payload.len();
        match self.sender(topic).send(payload) {
            Ok(receivers) => debug!(topic, len, receivers, "published"),
            Err(_) => debug!(topic, len, "published with no subscribers"),
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<Bytes>, TransportError> {
        Ok(self.sender(topic).subscribe())
    }
}

// ============================================================================
// Blob store
// ============================================================================

/// Content-addressed storage for attachments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, data: Bytes) -> Result<String, BlobError>;

    async fn download(&self, address: &str) -> Result<Bytes, BlobError>;
}

/// In-memory blob store; the address is the hex SHA-256 of the content.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<DashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, data: Bytes) -> Result<String, BlobError> {
        let address = hex::encode(Sha256::digest(&data));
        self.blobs.insert(address.clone(), data);
        Ok(address)
    }

    async fn download(&self, address: &str) -> Result<Bytes, BlobError> {
        self.blobs
            .get(address)
            .map(|b| b.clone())
            .ok_or_else(|| BlobError::NotFound(address.to_string()))
    }
}

// ============================================================================
// Wallet
// ============================================================================

/// A connected real wallet. The private key never leaves it; the core asks
/// it to sign rotation payloads and messages and to open sealed content.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> String;

    fn public_key(&self) -> PublicKey;

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, WalletError>;

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, WalletError>;
}

/// Wallet backed by an in-process keypair.
pub struct LocalWallet {
    address: String,
    keypair: Keypair,
}

impl LocalWallet {
    pub fn generate(address: impl Into<String>) -> Self {
        Self::from_keypair(address, Keypair::generate())
    }

    pub fn from_keypair(address: impl Into<String>, keypair: Keypair) -> Self {
        Self {
            address: address.into(),
            keypair,
        }
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, WalletError> {
        Ok(self.keypair.sign(payload).to_vec())
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, WalletError> {
        Ok(decrypt_message(ciphertext, &self.keypair.private_key())?)
    }
}

// ============================================================================
// Session provider
// ============================================================================

/// The authenticated session: a stable low-entropy subject and the wallet
/// currently connected, if any.
pub trait SessionProvider: Send + Sync {
    fn session_subject(&self) -> Vec<u8>;

    fn wallet(&self) -> Option<Arc<dyn WalletSigner>>;

    fn wallet_address(&self) -> Option<String> {
        self.wallet().map(|w| w.address())
    }
}

/// Session provider with fixed values.
pub struct StaticSession {
    subject: Vec<u8>,
    wallet: Option<Arc<dyn WalletSigner>>,
}

impl StaticSession {
    pub fn new(subject: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            wallet: None,
        }
    }

    pub fn with_wallet(mut self, wallet: Arc<dyn WalletSigner>) -> Self {
        self.wallet = Some(wallet);
        self
    }
}

impl SessionProvider for StaticSession {
    fn session_subject(&self) -> Vec<u8> {
        self.subject.clone()
    }

    fn wallet(&self) -> Option<Arc<dyn WalletSigner>> {
        self.wallet.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmid_crypto::encrypt_message;

    #[tokio::test]
    async fn test_bus_delivers_to_subscribers() {
        let bus = LocalBus::default();
        let mut a = bus.subscribe("t").await.unwrap();
        let mut b = bus.subscribe("t").await.unwrap();

        bus.publish("t", Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(a.recv().await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_bus_topics_are_isolated() {
        let bus = LocalBus::default();
        let mut other = bus.subscribe("other").await.unwrap();
        bus.publish("t", Bytes::from_static(b"x")).await.unwrap();
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = LocalBus::default();
        bus.publish("nobody", Bytes::from_static(b"x")).await.unwrap();
    }

    #[tokio::test]
    async fn test_blob_round_trip_and_not_found() {
        let blobs = MemoryBlobStore::new();
        let addr = blobs.upload(Bytes::from_static(b"file")).await.unwrap();
        assert_eq!(addr.len(), 64);
        assert_eq!(blobs.download(&addr).await.unwrap(), Bytes::from_static(b"file"));
        assert!(matches!(
            blobs.download("missing").await,
            Err(BlobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_wallet_opens_sealed_content() {
        let wallet = LocalWallet::generate("0xabc");
        let ct = encrypt_message(b"hi", &wallet.public_key()).unwrap();
        assert_eq!(wallet.decrypt(&ct).await.unwrap(), b"hi");

        let other = LocalWallet::generate("0xdef");
        assert_eq!(
            other.decrypt(&ct).await.unwrap_err(),
            WalletError::Crypto(pmid_crypto::CryptoError::Decryption)
        );
    }

    #[test]
    fn test_static_session_wallet_address() {
        let session = StaticSession::new("subject");
        assert!(session.wallet_address().is_none());

        let session = session.with_wallet(Arc::new(LocalWallet::generate("0xabc")));
        assert_eq!(session.wallet_address().as_deref(), Some("0xabc"));
    }
}
