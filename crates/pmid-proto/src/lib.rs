#![forbid(unsafe_code)]

//! PMID wire format.
//!
//! This crate defines the four messaging envelopes exchanged over the
//! publish/subscribe transport:
//! - Chat messages (end-to-end encrypted content plus signature)
//! - Handshakes (public key announcement with proof of possession)
//! - Key rotation announcements (dual-signed old -> new key transition)
//! - Typing indicators (unsigned, best-effort)
//!
//! Envelopes are encoded as proto3 messages with fixed field numbers, so
//! older decoders skip fields they do not know about.

pub mod v1;
pub mod types;
pub mod validation;
pub mod conversions;
pub mod codec;

#[cfg(test)]
mod proptests;

pub use codec::{
    decode_envelope, decode_frame, encode_envelope, encode_frame, CodecError,
};
pub use types::{
    Attachment, ChatMessage, Envelope, EnvelopeKind, Handshake, KeyRotation, TypingIndicator,
    WalletType,
};
pub use validation::{Validate, ValidationError};
