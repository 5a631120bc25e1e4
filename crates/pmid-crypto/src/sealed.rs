//! Sealed-box encryption of message content.
//! X25519 ephemeral key agreement + HKDF-SHA256 + ChaCha20Poly1305.
//!
//! Ciphertext layout: `ephemeral_pub (32) || aead_ciphertext`.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

use crate::error::CryptoError;
use crate::keys::{Keypair, PrivateKey, PublicKey};

const EPHEMERAL_PUB_LEN: usize = 32;
const TAG_LEN: usize = 16;

fn kdf_key_nonce(shared_secret: &[u8; 32], salt: &[u8]) -> Result<([u8; 32], [u8; 12]), CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);

    let mut key = [0u8; 32];
    hk.expand(b"pmid_seal_v1_key", &mut key)
        .map_err(|_| CryptoError::Encryption)?;

    let mut nonce = [0u8; 12];
    hk.expand(b"pmid_seal_v1_nonce", &mut nonce)
        .map_err(|_| CryptoError::Encryption)?;

    Ok((key, nonce))
}

/// HKDF salt binds the derived key to both the ephemeral key and the full
/// recipient identity.
fn seal_salt(eph_pub: &[u8; 32], recipient: &PublicKey) -> Vec<u8> {
    let mut salt = Vec::with_capacity(EPHEMERAL_PUB_LEN + 64);
    salt.extend_from_slice(eph_pub);
    salt.extend_from_slice(&recipient.to_bytes());
    salt
}

/// Encrypt `plaintext` so only the holder of `recipient`'s private key can
/// read it.
pub fn encrypt_message(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let eph = EphemeralSecret::random_from_rng(OsRng);
    let eph_pub = X25519PublicKey::from(&eph);

    let recip_pub = X25519PublicKey::from(*recipient.kex_pub());
    let shared = eph.diffie_hellman(&recip_pub);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidPublicKey);
    }

    let salt = seal_salt(eph_pub.as_bytes(), recipient);
    let (key32, nonce12) = kdf_key_nonce(shared.as_bytes(), &salt)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key32));
    let ct = cipher
        .encrypt(
            Nonce::from_slice(&nonce12),
            Payload {
                msg: plaintext,
                aad: eph_pub.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    let mut out = Vec::with_capacity(EPHEMERAL_PUB_LEN + ct.len());
    out.extend_from_slice(eph_pub.as_bytes());
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Decrypt a sealed box with the recipient's own private key.
///
/// Fails with [`CryptoError::Decryption`] on tampering, truncation or a
/// key that is not the intended recipient's.
pub fn decrypt_message(ciphertext: &[u8], own_private_key: &PrivateKey) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < EPHEMERAL_PUB_LEN + TAG_LEN {
        return Err(CryptoError::Decryption);
    }
    let (eph_bytes, ct) = ciphertext.split_at(EPHEMERAL_PUB_LEN);
    let mut eph_arr = [0u8; EPHEMERAL_PUB_LEN];
    eph_arr.copy_from_slice(eph_bytes);
    let eph_pub = X25519PublicKey::from(eph_arr);

    let own = Keypair::from_private_key(own_private_key);
    let shared = own.kex_secret().diffie_hellman(&eph_pub);
    if !shared.was_contributory() {
        return Err(CryptoError::Decryption);
    }

    let salt = seal_salt(&eph_arr, &own.public_key());
    let (key32, nonce12) = kdf_key_nonce(shared.as_bytes(), &salt)
        .map_err(|_| CryptoError::Decryption)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key32));
    cipher
        .decrypt(
            Nonce::from_slice(&nonce12),
            Payload {
                msg: ct,
                aad: &eph_arr,
            },
        )
        .map_err(|_| CryptoError::Decryption)
}
