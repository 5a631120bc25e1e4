#![forbid(unsafe_code)]

//! PMID key derivation and encryption engine.
//!
//! - Argon2id derivation of wrapping keys from low-entropy session secrets
//! - ChaCha20-Poly1305 wrapping of private key material at rest
//! - Ed25519 signing / X25519 key agreement keypairs
//! - Sealed-box encryption of message content to a recipient public key
//! - Canonical signing payloads for chat, handshake and rotation envelopes

pub mod error;
pub mod hash;
pub mod transcript;
pub mod utils;

pub mod keys;
pub mod kdf;
pub mod wrap;
pub mod sealed;
pub mod payloads;

#[cfg(test)]
mod proptests;

pub use error::CryptoError;
pub use kdf::{derive_wrapping_key, generate_salt, KdfParams, WrappingKey};
pub use keys::{sign, verify, Keypair, PrivateKey, PublicKey};
pub use sealed::{decrypt_message, encrypt_message};
pub use wrap::{unwrap_private_key, wrap_private_key, WrappedKey};
pub use payloads::{
    sign_chat_v1, sign_handshake_v1, sign_rotation_old_v1, verify_chat_v1, verify_handshake_v1,
    verify_rotation_v1, RotationSignatures,
};
