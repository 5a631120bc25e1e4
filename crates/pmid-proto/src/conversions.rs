//! Conversions between wire messages and domain types.
//!
//! Domain -> wire is infallible; wire -> domain validates the message first
//! so a domain value always satisfies the envelope's required fields.

use crate::types::*;
use crate::v1::*;
use crate::validation::{Validate, ValidationError};

// ============================================================================
// Chat messages
// ============================================================================

impl From<&ChatMessage> for ChatMessageV1 {
    fn from(m: &ChatMessage) -> Self {
        let (attachment_ref, file_name, mime_type, file_size) = match m.attachment {
            Some(ref a) => (
                Some(a.content_address.clone()),
                Some(a.file_name.clone()),
                Some(a.mime_type.clone()),
                Some(a.file_size),
            ),
            None => (None, None, None, None),
        };

        Self {
            id: m.id.clone(),
            sender_user_id: m.sender_user_id.clone(),
            recipient_user_id: m.recipient_user_id.clone(),
            content: m.encrypted_content.clone(),
            content_type: m.content_type.clone(),
            timestamp: m.timestamp,
            signature: m.signature.clone(),
            nonce: m.nonce.clone(),
            attachment_ref,
            file_name,
            mime_type,
            file_size,
            reply_to_id: m.reply_to_id.clone(),
        }
    }
}

impl TryFrom<ChatMessageV1> for ChatMessage {
    type Error = ValidationError;

    fn try_from(value: ChatMessageV1) -> Result<Self, Self::Error> {
        value.validate()?;

        let attachment = match (value.attachment_ref, value.file_name, value.mime_type, value.file_size) {
            (Some(content_address), Some(file_name), Some(mime_type), Some(file_size)) => {
                Some(Attachment {
                    content_address,
                    file_name,
                    mime_type,
                    file_size,
                })
            }
            _ => None,
        };

        Ok(Self {
            id: value.id,
            sender_user_id: value.sender_user_id,
            recipient_user_id: value.recipient_user_id,
            encrypted_content: value.content,
            content_type: value.content_type,
            timestamp: value.timestamp,
            signature: value.signature,
            nonce: value.nonce,
            attachment,
            reply_to_id: value.reply_to_id,
        })
    }
}

// ============================================================================
// Handshakes
// ============================================================================

impl From<&Handshake> for HandshakeV1 {
    fn from(h: &Handshake) -> Self {
        Self {
            user_id: h.user_id.clone(),
            public_key: h.public_key.clone(),
            wallet_type: h.wallet_type.as_str().to_string(),
            timestamp: h.timestamp,
            signature: h.signature.clone(),
        }
    }
}

impl TryFrom<HandshakeV1> for Handshake {
    type Error = ValidationError;

    fn try_from(value: HandshakeV1) -> Result<Self, Self::Error> {
        value.validate()?;
        let wallet_type = value
            .wallet_type
            .parse::<WalletType>()
            .map_err(|reason| ValidationError::InvalidData {
                field: "wallet_type",
                reason,
            })?;

        Ok(Self {
            user_id: value.user_id,
            public_key: value.public_key,
            wallet_type,
            timestamp: value.timestamp,
            signature: value.signature,
        })
    }
}

// ============================================================================
// Key rotations
// ============================================================================

impl From<&KeyRotation> for KeyRotationV1 {
    fn from(r: &KeyRotation) -> Self {
        Self {
            user_id: r.user_id.clone(),
            old_public_key: r.old_public_key.clone(),
            new_public_key: r.new_public_key.clone(),
            signature_old: r.signature_old.clone(),
            signature_new: r.signature_new.clone(),
            sequence_number: r.sequence_number,
            nonce: r.nonce.clone(),
            timestamp: r.timestamp,
        }
    }
}

impl TryFrom<KeyRotationV1> for KeyRotation {
    type Error = ValidationError;

    fn try_from(value: KeyRotationV1) -> Result<Self, Self::Error> {
        value.validate()?;
        Ok(Self {
            user_id: value.user_id,
            old_public_key: value.old_public_key,
            new_public_key: value.new_public_key,
            signature_old: value.signature_old,
            signature_new: value.signature_new,
            sequence_number: value.sequence_number,
            nonce: value.nonce,
            timestamp: value.timestamp,
        })
    }
}

// ============================================================================
// Typing indicators
// ============================================================================

impl From<&TypingIndicator> for TypingIndicatorV1 {
    fn from(t: &TypingIndicator) -> Self {
        Self {
            user_id: t.user_id.clone(),
            conversation_id: t.conversation_id.clone(),
            is_typing: t.is_typing,
            timestamp: t.timestamp,
        }
    }
}

impl TryFrom<TypingIndicatorV1> for TypingIndicator {
    type Error = ValidationError;

    fn try_from(value: TypingIndicatorV1) -> Result<Self, Self::Error> {
        value.validate()?;
        Ok(Self {
            user_id: value.user_id,
            conversation_id: value.conversation_id,
            is_typing: value.is_typing,
            timestamp: value.timestamp,
        })
    }
}

// ============================================================================
// Frames
// ============================================================================

impl From<&Envelope> for WireFrameV1 {
    fn from(envelope: &Envelope) -> Self {
        use wire_frame_v1::Body;

        let body = match envelope {
            Envelope::Chat(m) => Body::Chat(m.into()),
            Envelope::Handshake(h) => Body::Handshake(h.into()),
            Envelope::KeyRotation(r) => Body::KeyRotation(r.into()),
            Envelope::Typing(t) => Body::Typing(t.into()),
        };
        Self { body: Some(body) }
    }
}

impl TryFrom<WireFrameV1> for Envelope {
    type Error = ValidationError;

    fn try_from(value: WireFrameV1) -> Result<Self, Self::Error> {
        use wire_frame_v1::Body;

        match value.body {
            Some(Body::Chat(m)) => Ok(Envelope::Chat(m.try_into()?)),
            Some(Body::Handshake(h)) => Ok(Envelope::Handshake(h.try_into()?)),
            Some(Body::KeyRotation(r)) => Ok(Envelope::KeyRotation(r.try_into()?)),
            Some(Body::Typing(t)) => Ok(Envelope::Typing(t.try_into()?)),
            None => Err(ValidationError::MissingBody),
        }
    }
}
