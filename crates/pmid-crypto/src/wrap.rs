//! Private key wrapping with ChaCha20-Poly1305.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::kdf::WrappingKey;
use crate::keys::PrivateKey;
use crate::utils::random_array;

pub const WRAP_NONCE_LEN: usize = 12;

/// Binds wrapped blobs to this use so they cannot be replayed as other
/// ciphertexts under the same key.
const WRAP_AAD: &[u8] = b"pmid_wrap_v1";

/// A private key encrypted under a wrapping key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; WRAP_NONCE_LEN],
}

/// Encrypt `private_key` under `key` with a fresh random nonce.
pub fn wrap_private_key(
    private_key: &PrivateKey,
    key: &WrappingKey,
) -> Result<WrappedKey, CryptoError> {
    let nonce: [u8; WRAP_NONCE_LEN] = random_array()?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: private_key.as_bytes(),
                aad: WRAP_AAD,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    Ok(WrappedKey { ciphertext, nonce })
}

/// Decrypt a wrapped private key.
///
/// Any tampering, a wrong key, or a malformed nonce fails with
/// [`CryptoError::Decryption`]; no partial plaintext is ever returned.
pub fn unwrap_private_key(
    ciphertext: &[u8],
    nonce: &[u8],
    key: &WrappingKey,
) -> Result<PrivateKey, CryptoError> {
    if nonce.len() != WRAP_NONCE_LEN {
        return Err(CryptoError::Decryption);
    }
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: WRAP_AAD,
                },
            )
            .map_err(|_| CryptoError::Decryption)?,
    );

    PrivateKey::from_bytes(&plaintext).map_err(|_| CryptoError::Decryption)
}
