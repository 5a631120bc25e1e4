//! Crypto error types.

/// Errors produced by the key derivation and encryption engine.
///
/// `Decryption` carries no detail: callers learn that the ciphertext was
/// rejected, never why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key material: {what} must be {expected} bytes, got {got}")]
    InvalidKeyMaterial {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("decryption failed")]
    Decryption,
    #[error("encryption failed")]
    Encryption,
    #[error("key derivation failed: {0}")]
    Kdf(String),
    #[error("random source unavailable")]
    Random,
}

impl CryptoError {
    pub(crate) fn key_length(what: &'static str, expected: usize, got: usize) -> Self {
        CryptoError::InvalidKeyMaterial { what, expected, got }
    }
}
