//! Argon2id derivation of wrapping keys.
//!
//! The session subject that unlocks a temp identity is low-entropy, so the
//! wrapping key is derived with a memory-hard function and a per-identity
//! random salt. The salt is stored next to the ciphertext; it is not secret.

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::utils::random_array;

pub const WRAPPING_KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
const MIN_SALT_LEN: usize = 8;

/// Argon2id cost parameters.
///
/// Defaults follow the argon2 crate's recommended settings
/// (19 MiB, 2 passes, 1 lane).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB. Must be at least 8 * `p_cost`.
    pub m_cost: u32,
    /// Number of passes.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    pub fn new(m_cost: u32, t_cost: u32, p_cost: u32) -> Self {
        Self { m_cost, t_cost, p_cost }
    }

    fn to_argon2(self) -> Result<Params, CryptoError> {
        Params::new(self.m_cost, self.t_cost, self.p_cost, Some(WRAPPING_KEY_LEN))
            .map_err(|e| CryptoError::Kdf(format!("invalid Argon2 parameters: {e}")))
    }

    /// Check the parameters without running a derivation.
    pub fn validate(&self) -> Result<(), CryptoError> {
        self.to_argon2().map(|_| ())
    }
}

/// Symmetric key used to wrap a private key at rest.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct WrappingKey([u8; WRAPPING_KEY_LEN]);

impl WrappingKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; WRAPPING_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::key_length("wrapping key", WRAPPING_KEY_LEN, bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; WRAPPING_KEY_LEN] {
        &self.0
    }
}

/// Fresh random salt for a new identity.
pub fn generate_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    random_array()
}

/// Derive a wrapping key from `secret` and `salt` with Argon2id.
pub fn derive_wrapping_key(
    secret: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<WrappingKey, CryptoError> {
    if secret.is_empty() {
        return Err(CryptoError::Kdf("secret must not be empty".to_string()));
    }
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::Kdf(format!(
            "salt must be at least {MIN_SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);

    let mut key = WrappingKey([0u8; WRAPPING_KEY_LEN]);
    argon2
        .hash_password_into(secret, salt, &mut key.0)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::new(8, 1, 1)
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let k1 = derive_wrapping_key(b"subject-1", &salt, &fast()).unwrap();
        let k2 = derive_wrapping_key(b"subject-1", &salt, &fast()).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_different_secret_or_salt_differs() {
        let salt = [7u8; SALT_LEN];
        let base = derive_wrapping_key(b"subject-1", &salt, &fast()).unwrap();
        let other_secret = derive_wrapping_key(b"subject-2", &salt, &fast()).unwrap();
        let other_salt = derive_wrapping_key(b"subject-1", &[8u8; SALT_LEN], &fast()).unwrap();
        assert_ne!(base.as_bytes(), other_secret.as_bytes());
        assert_ne!(base.as_bytes(), other_salt.as_bytes());
    }

    #[test]
    fn test_short_salt_rejected() {
        assert!(matches!(
            derive_wrapping_key(b"s", &[0u8; 4], &fast()),
            Err(CryptoError::Kdf(_))
        ));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(derive_wrapping_key(b"", &[0u8; SALT_LEN], &fast()).is_err());
    }

    #[test]
    fn test_invalid_params() {
        assert!(KdfParams::new(8, 0, 1).validate().is_err());
        assert!(KdfParams::default().validate().is_ok());
    }

    #[test]
    fn test_wrapping_key_length_checked() {
        assert!(matches!(
            WrappingKey::from_bytes(&[0u8; 16]),
            Err(CryptoError::InvalidKeyMaterial { expected: 32, got: 16, .. })
        ));
    }
}
