//! Version 1 wire messages.
//!
//! Field numbers are part of the protocol and must never be reused. New
//! fields get fresh numbers; decoders skip numbers they do not recognise.

/// End-to-end encrypted direct message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChatMessageV1 {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub sender_user_id: String,
    #[prost(string, tag = "3")]
    pub recipient_user_id: String,
    /// Sealed-box ciphertext, opaque to the codec.
    #[prost(bytes = "vec", tag = "4")]
    pub content: Vec<u8>,
    #[prost(string, tag = "5")]
    pub content_type: String,
    #[prost(uint64, tag = "6")]
    pub timestamp: u64,
    #[prost(bytes = "vec", tag = "7")]
    pub signature: Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub nonce: Vec<u8>,
    /// Content address of an uploaded attachment blob.
    #[prost(string, optional, tag = "9")]
    pub attachment_ref: Option<String>,
    #[prost(string, optional, tag = "10")]
    pub file_name: Option<String>,
    #[prost(string, optional, tag = "11")]
    pub mime_type: Option<String>,
    #[prost(uint64, optional, tag = "12")]
    pub file_size: Option<u64>,
    #[prost(string, optional, tag = "13")]
    pub reply_to_id: Option<String>,
}

/// Public key announcement signed with the announced key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HandshakeV1 {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(bytes = "vec", tag = "2")]
    pub public_key: Vec<u8>,
    /// "temp" or "real".
    #[prost(string, tag = "3")]
    pub wallet_type: String,
    #[prost(uint64, tag = "4")]
    pub timestamp: u64,
    #[prost(bytes = "vec", tag = "5")]
    pub signature: Vec<u8>,
}

/// Announcement that `user_id` moved from `old_public_key` to `new_public_key`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyRotationV1 {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(bytes = "vec", tag = "2")]
    pub old_public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub new_public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub signature_old: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub signature_new: Vec<u8>,
    #[prost(uint32, tag = "6")]
    pub sequence_number: u32,
    #[prost(string, tag = "7")]
    pub nonce: String,
    #[prost(uint64, tag = "8")]
    pub timestamp: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TypingIndicatorV1 {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub conversation_id: String,
    #[prost(bool, tag = "3")]
    pub is_typing: bool,
    #[prost(uint64, tag = "4")]
    pub timestamp: u64,
}

/// Outer container published on the transport so subscribers can decode a
/// buffer without knowing its envelope kind up front.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireFrameV1 {
    #[prost(oneof = "wire_frame_v1::Body", tags = "1, 2, 3, 4")]
    pub body: Option<wire_frame_v1::Body>,
}

pub mod wire_frame_v1 {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "1")]
        Chat(super::ChatMessageV1),
        #[prost(message, tag = "2")]
        Handshake(super::HandshakeV1),
        #[prost(message, tag = "3")]
        KeyRotation(super::KeyRotationV1),
        #[prost(message, tag = "4")]
        Typing(super::TypingIndicatorV1),
    }
}
