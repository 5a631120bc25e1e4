//! Transcript module for deterministic signing payloads.
//!
//! Appends tagged fields in a canonical format so the same logical envelope
//! produces the same bytes on every peer, independent of wire encoding.

use bytes::{BufMut, BytesMut};
use sha2::{Digest, Sha256};

/// Tag reserved for the domain separator.
pub const DOMAIN_TAG: u32 = 0;

/// A minimal deterministic transcript builder.
/// We append (tag, len, bytes) tuples so the same logical data hashes the same everywhere.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    buf: BytesMut,
}

impl Transcript {
    /// Create a new transcript with the given domain separator.
    pub fn new(domain: &'static str) -> Self {
        let mut t = Self { buf: BytesMut::with_capacity(256) };
        t.append_str(DOMAIN_TAG, domain);
        t
    }

    /// Append raw bytes with a tag.
    pub fn append_bytes(&mut self, tag: u32, data: &[u8]) -> &mut Self {
        // tag (u32 be) + len (u32 be) + data
        self.buf.put_u32(tag);
        self.buf.put_u32(data.len() as u32);
        self.buf.extend_from_slice(data);
        self
    }

    /// Append a u64 value with a tag.
    pub fn append_u64(&mut self, tag: u32, v: u64) -> &mut Self {
        self.buf.put_u32(tag);
        self.buf.put_u32(8);
        self.buf.put_u64(v);
        self
    }

    /// Append a u32 value with a tag.
    pub fn append_u32(&mut self, tag: u32, v: u32) -> &mut Self {
        self.buf.put_u32(tag);
        self.buf.put_u32(4);
        self.buf.put_u32(v);
        self
    }

    /// Append a string with a tag (encoded as UTF-8 bytes).
    pub fn append_str(&mut self, tag: u32, s: &str) -> &mut Self {
        self.append_bytes(tag, s.as_bytes())
    }

    /// Get the raw transcript bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finalize the transcript by computing SHA-256 hash of its contents.
    pub fn finalize(self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.buf);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }
}
