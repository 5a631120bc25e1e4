//! Error types for PMID core.
//!
//! Each component has its own typed error; `CoreError` unifies them for
//! callers that drive several components at once.

use thiserror::Error;

use pmid_crypto::CryptoError;
use pmid_proto::CodecError;

use crate::rotation::RotationPhase;

/// Errors from the secure local store.
///
/// I/O failures are surfaced as-is and never retried inside the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(String),

    #[error("data corruption detected: {0}")]
    DataCorruption(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Errors from the temp identity manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// An active record already exists; callers must remove it first.
    #[error("an active identity already exists for user {0}")]
    AlreadyExists(String),

    #[error("invalid identity state: {0}")]
    InvalidState(String),

    /// The session was torn down while key derivation was running.
    #[error("operation cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl IdentityError {
    /// True when the stored ciphertext could not be unwrapped, i.e. the
    /// secret was wrong or the record is corrupted.
    pub fn is_decryption(&self) -> bool {
        matches!(self, IdentityError::Crypto(CryptoError::Decryption))
    }
}

/// Errors raised by a wallet when asked to sign or decrypt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet request rejected by user")]
    Rejected,

    #[error("wallet unavailable: {0}")]
    Unavailable(String),

    #[error("wallet crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Errors from the key rotation protocol.
///
/// The three rejection variants are adversarial or out-of-order inputs: the
/// prior identity stays active and nothing is recorded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RotationError {
    #[error("stale rotation for {user_id}: sequence {sequence} <= last accepted {last_accepted}")]
    StaleRotation {
        user_id: String,
        sequence: u32,
        last_accepted: u32,
    },

    #[error("replayed rotation for {user_id}: nonce {nonce} already seen")]
    ReplayedRotation { user_id: String, nonce: String },

    #[error("invalid rotation signature: {0}")]
    InvalidRotationSignature(&'static str),

    #[error("rotation not allowed in phase {0:?}")]
    InvalidPhase(RotationPhase),

    /// Only temp -> real rotation is defined.
    #[error("rotation from a real wallet identity is not supported")]
    UnsupportedRotation,

    #[error("rotation sequence exhausted for user {0}")]
    SequenceExhausted(String),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Transport collaborator errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("publish failed: {0}")]
    Publish(String),
}

/// Blob store collaborator errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("upload failed: {0}")]
    Upload(String),
}

/// Errors from the identity session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No identity can sign or decrypt right now, e.g. the wallet
    /// disconnected after rotation.
    #[error("no active identity for user {0}")]
    NoActiveIdentity(String),

    #[error("session is logged out")]
    LoggedOut,

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("rotation error: {0}")]
    Rotation(#[from] RotationError),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),
}

/// Errors from the messenger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessengerError {
    /// Undecodable frame; the message is dropped.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("no known public key for {0}")]
    UnknownPeer(String),

    /// Signature did not verify; the message is dropped, never trusted.
    #[error("invalid signature on {kind} from {user_id}")]
    SignatureInvalid { kind: &'static str, user_id: String },

    /// A handshake tried to replace a key outside the rotation protocol.
    #[error("key conflict for {0}: a different key is already recorded")]
    KeyConflict(String),

    #[error("message addressed to {0}, not this session")]
    NotForUs(String),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("rotation error: {0}")]
    Rotation(#[from] RotationError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),
}

/// Unified error type for PMID core operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Rotation(#[from] RotationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Messenger(#[from] MessengerError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
