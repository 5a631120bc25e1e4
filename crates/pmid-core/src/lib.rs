#![forbid(unsafe_code)]

//! PMID core.
//!
//! Identity layer for peer-to-peer end-to-end encrypted messaging:
//! - Secure local store for wrapped private keys (in-memory and file-backed)
//! - Temp identity lifecycle for users without a connected wallet
//! - Dual-signed temp -> real key rotation, with replay and ordering checks
//! - Per-session state object and messaging over pluggable collaborators

pub mod errors;
pub mod store;
pub mod file_store;
pub mod locks;
pub mod temp_identity;
pub mod rotation;
pub mod directory;
pub mod collaborators;
pub mod session;
pub mod messenger;
pub mod config;

#[cfg(test)]
mod proptests;

pub use collaborators::{
    BlobStore, LocalBus, LocalWallet, MemoryBlobStore, SessionProvider, StaticSession, Transport,
    WalletSigner,
};
pub use config::{ConfigError, PmidConfig};
pub use directory::{PeerDirectory, PeerKey};
pub use errors::{
    BlobError, CoreError, IdentityError, MessengerError, RotationError, SessionError, StoreError,
    TransportError, WalletError,
};
pub use file_store::FileStore;
pub use locks::UserLocks;
pub use messenger::{
    IncomingEvent, MessageBody, Messenger, OutgoingAttachment, ReceivedMessage, Topics,
};
pub use rotation::{RotationController, RotationPhase};
pub use session::{ActiveIdentity, IdentitySession, LogoutHandle};
pub use store::{EncryptedKeyRecord, InMemoryStore, RotationState, Store};
pub use temp_identity::{Identity, TempIdentityManager, TempIdentityState};
