//! Identity keypairs.
//!
//! A messaging identity is an Ed25519 signing key plus an X25519 key
//! agreement key. On the wire the public half travels as a single 64-byte
//! value (`sign_pub || kex_pub`); the private half is persisted, wrapped,
//! as 64 bytes (`sign_seed || kex_secret`).

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub const PUBLIC_KEY_LEN: usize = 64;
pub const PRIVATE_KEY_LEN: usize = 64;
pub const SIGNATURE_LEN: usize = 64;

/// Public half of an identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    sign_pub: [u8; 32],
    kex_pub: [u8; 32],
}

impl PublicKey {
    /// Parse the 64-byte wire form.
    ///
    /// Fails with [`CryptoError::InvalidKeyMaterial`] on a wrong length and
    /// [`CryptoError::InvalidPublicKey`] if the signing half is not a valid
    /// Ed25519 point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::key_length("public key", PUBLIC_KEY_LEN, bytes.len()));
        }
        let mut sign_pub = [0u8; 32];
        let mut kex_pub = [0u8; 32];
        sign_pub.copy_from_slice(&bytes[..32]);
        kex_pub.copy_from_slice(&bytes[32..]);

        VerifyingKey::from_bytes(&sign_pub).map_err(|_| CryptoError::InvalidPublicKey)?;

        Ok(Self { sign_pub, kex_pub })
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out[..32].copy_from_slice(&self.sign_pub);
        out[32..].copy_from_slice(&self.kex_pub);
        out
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    /// Ed25519 verifying key bytes.
    pub fn sign_pub(&self) -> &[u8; 32] {
        &self.sign_pub
    }

    /// X25519 public key bytes.
    pub fn kex_pub(&self) -> &[u8; 32] {
        &self.kex_pub
    }

    /// Strict Ed25519 verification of `signature` over `payload`.
    ///
    /// A signature of the wrong length simply does not verify.
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        let Ok(sig_bytes) = <[u8; SIGNATURE_LEN]>::try_from(signature) else {
            return false;
        };
        let Ok(vk) = VerifyingKey::from_bytes(&self.sign_pub) else {
            return false;
        };
        vk.verify_strict(payload, &Signature::from_bytes(&sig_bytes)).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fp = crate::hash::fingerprint(&self.to_bytes());
        write!(f, "PublicKey(")?;
        for b in fp {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

/// Private half of an identity. Zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; PRIVATE_KEY_LEN]);

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; PRIVATE_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::key_length("private key", PRIVATE_KEY_LEN, bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Signing and key agreement keys for one identity.
///
/// Both inner secrets zeroize themselves on drop.
#[derive(Clone)]
pub struct Keypair {
    sign_key: SigningKey,
    kex_key: StaticSecret,
}

impl Keypair {
    /// Generate a new random keypair using the OS random source.
    pub fn generate() -> Self {
        let sign_key = SigningKey::generate(&mut OsRng);
        let kex_key = StaticSecret::random_from_rng(OsRng);
        Self { sign_key, kex_key }
    }

    pub fn from_private_key(private_key: &PrivateKey) -> Self {
        let bytes = private_key.as_bytes();
        let mut seed = [0u8; 32];
        let mut kex = [0u8; 32];
        seed.copy_from_slice(&bytes[..32]);
        kex.copy_from_slice(&bytes[32..]);

        let keypair = Self {
            sign_key: SigningKey::from_bytes(&seed),
            kex_key: StaticSecret::from(kex),
        };
        seed.zeroize();
        kex.zeroize();
        keypair
    }

    pub fn private_key(&self) -> PrivateKey {
        let mut out = PrivateKey([0u8; PRIVATE_KEY_LEN]);
        out.0[..32].copy_from_slice(&self.sign_key.to_bytes());
        out.0[32..].copy_from_slice(self.kex_key.as_bytes());
        out
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            sign_pub: self.sign_key.verifying_key().to_bytes(),
            kex_pub: *X25519PublicKey::from(&self.kex_key).as_bytes(),
        }
    }

    /// Sign a message using Ed25519.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        let signature: Signature = self.sign_key.sign(message);
        signature.to_bytes()
    }

    pub(crate) fn kex_secret(&self) -> &StaticSecret {
        &self.kex_key
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Sign `payload` with a private key.
pub fn sign(payload: &[u8], private_key: &PrivateKey) -> [u8; SIGNATURE_LEN] {
    Keypair::from_private_key(private_key).sign(payload)
}

/// Verify `signature` over `payload` against a 64-byte wire public key.
///
/// Returns `Ok(false)` for a bad signature and an error only when the
/// public key itself is malformed.
pub fn verify(payload: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, CryptoError> {
    let pk = PublicKey::from_bytes(public_key)?;
    Ok(pk.verify(payload, signature))
}
