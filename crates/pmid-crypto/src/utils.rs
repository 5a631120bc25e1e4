//! Constant-time comparison and randomness helpers.

use constant_time_eq::constant_time_eq;

use crate::error::CryptoError;

/// Compare two byte slices in constant time.
///
/// Used wherever public keys or signatures are compared against pinned
/// values, so the comparison time does not reveal the matching prefix.
///
/// ```rust
/// use pmid_crypto::utils::constant_time_compare;
///
/// assert!(constant_time_compare(&[0u8; 64], &[0u8; 64]));
/// assert!(!constant_time_compare(&[0u8; 64], &[1u8; 64]));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

/// Fill a fixed-size array from the OS random source.
pub fn random_array<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut out = [0u8; N];
    getrandom::getrandom(&mut out).map_err(|_| CryptoError::Random)?;
    Ok(out)
}
