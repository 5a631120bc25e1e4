use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// Short key fingerprint for logs: first 8 bytes of sha256(public_key).
pub fn fingerprint(public_key: &[u8]) -> [u8; 8] {
    let digest = sha256(public_key);
    let mut fp = [0u8; 8];
    fp.copy_from_slice(&digest[..8]);
    fp
}
