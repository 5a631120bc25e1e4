//! Envelope encode/decode.
//!
//! `encode_*` validates before serializing and reports a caller bug as
//! [`CodecError::Validation`]. `decode_*` treats any byte-level problem or
//! missing required field as [`CodecError::MalformedEnvelope`]; the caller
//! drops the message.
//!
//! A single envelope carries a varint length prefix. Without it a body cut
//! on a field boundary would still parse, minus its trailing fields.

use prost::Message;
use tracing::debug;

use crate::types::{Envelope, EnvelopeKind};
use crate::v1::*;
use crate::validation::{Validate, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("malformed {kind} envelope: {reason}")]
    MalformedEnvelope { kind: &'static str, reason: String },
}

impl CodecError {
    fn malformed(kind: &'static str, reason: impl ToString) -> Self {
        CodecError::MalformedEnvelope {
            kind,
            reason: reason.to_string(),
        }
    }
}

fn encode_wire<M: Message + Validate>(msg: &M) -> Result<Vec<u8>, CodecError> {
    msg.validate()?;
    Ok(msg.encode_to_vec())
}

fn encode_delimited<M: Message + Validate>(msg: &M) -> Result<Vec<u8>, CodecError> {
    msg.validate()?;
    Ok(msg.encode_length_delimited_to_vec())
}

fn decode_wire<M, T>(kind: &'static str, bytes: &[u8]) -> Result<T, CodecError>
where
    M: Message + Default,
    T: TryFrom<M, Error = ValidationError>,
{
    let msg = M::decode(bytes).map_err(|e| {
        debug!(kind, len = bytes.len(), error = %e, "envelope decode failed");
        CodecError::malformed(kind, e)
    })?;
    T::try_from(msg).map_err(|e| CodecError::malformed(kind, e))
}

/// Strip the length prefix and require the body to fill the rest exactly.
fn decode_delimited<M, T>(kind: &'static str, bytes: &[u8]) -> Result<T, CodecError>
where
    M: Message + Default,
    T: TryFrom<M, Error = ValidationError>,
{
    let mut body = bytes;
    let declared = prost::decode_length_delimiter(&mut body).map_err(|e| {
        debug!(kind, len = bytes.len(), error = %e, "envelope length prefix invalid");
        CodecError::malformed(kind, e)
    })?;
    if declared != body.len() {
        debug!(kind, declared, actual = body.len(), "envelope length mismatch");
        return Err(CodecError::malformed(
            kind,
            format!("declared {declared} bytes, got {}", body.len()),
        ));
    }
    decode_wire::<M, T>(kind, body)
}

/// Encode a single length-prefixed envelope without the outer frame.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    match envelope {
        Envelope::Chat(m) => encode_delimited(&ChatMessageV1::from(m)),
        Envelope::Handshake(h) => encode_delimited(&HandshakeV1::from(h)),
        Envelope::KeyRotation(r) => encode_delimited(&KeyRotationV1::from(r)),
        Envelope::Typing(t) => encode_delimited(&TypingIndicatorV1::from(t)),
    }
}

/// Decode a single length-prefixed envelope of a known kind.
pub fn decode_envelope(kind: EnvelopeKind, bytes: &[u8]) -> Result<Envelope, CodecError> {
    match kind {
        EnvelopeKind::Chat => {
            decode_delimited::<ChatMessageV1, _>("chat", bytes).map(Envelope::Chat)
        }
        EnvelopeKind::Handshake => {
            decode_delimited::<HandshakeV1, _>("handshake", bytes).map(Envelope::Handshake)
        }
        EnvelopeKind::KeyRotation => {
            decode_delimited::<KeyRotationV1, _>("key_rotation", bytes).map(Envelope::KeyRotation)
        }
        EnvelopeKind::Typing => {
            decode_delimited::<TypingIndicatorV1, _>("typing", bytes).map(Envelope::Typing)
        }
    }
}

/// Encode an envelope inside a [`WireFrameV1`] for publishing.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    encode_wire(&WireFrameV1::from(envelope))
}

/// Decode a [`WireFrameV1`] received from the transport.
pub fn decode_frame(bytes: &[u8]) -> Result<Envelope, CodecError> {
    decode_wire::<WireFrameV1, _>("frame", bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn sample_rotation() -> KeyRotation {
        KeyRotation {
            user_id: "u1".to_string(),
            old_public_key: vec![1u8; 64],
            new_public_key: vec![2u8; 64],
            signature_old: vec![3u8; 64],
            signature_new: vec![4u8; 64],
            sequence_number: 1,
            nonce: "00112233445566778899aabbccddeeff".to_string(),
            timestamp: 1_700_000_000,
        }
    }

    fn sample_typing() -> TypingIndicator {
        TypingIndicator {
            user_id: "u1".to_string(),
            conversation_id: "u1:u2".to_string(),
            is_typing: true,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_rotation_round_trip() {
        let env = Envelope::KeyRotation(sample_rotation());
        let bytes = encode_envelope(&env).unwrap();
        let decoded = decode_envelope(EnvelopeKind::KeyRotation, &bytes).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let env = Envelope::KeyRotation(sample_rotation());
        assert_eq!(encode_envelope(&env).unwrap(), encode_envelope(&env).unwrap());
    }

    #[test]
    fn test_encode_missing_field_is_validation_error() {
        let mut rot = sample_rotation();
        rot.signature_new.clear();
        let err = encode_envelope(&Envelope::KeyRotation(rot)).unwrap_err();
        assert_eq!(
            err,
            CodecError::Validation(ValidationError::EmptyField { field: "signature_new" })
        );
    }

    #[test]
    fn test_decode_truncated_is_malformed() {
        let bytes = encode_envelope(&Envelope::Typing(sample_typing())).unwrap();
        let err = decode_envelope(EnvelopeKind::Typing, &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope { kind: "typing", .. }));
    }

    #[test]
    fn test_decode_empty_is_malformed() {
        for kind in [
            EnvelopeKind::Chat,
            EnvelopeKind::Handshake,
            EnvelopeKind::KeyRotation,
            EnvelopeKind::Typing,
        ] {
            assert!(matches!(
                decode_envelope(kind, &[]),
                Err(CodecError::MalformedEnvelope { .. })
            ));
        }
        assert!(matches!(decode_frame(&[]), Err(CodecError::MalformedEnvelope { .. })));
    }

    #[test]
    fn test_decode_garbage_does_not_panic() {
        let garbage = [0xFFu8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert!(decode_frame(&garbage).is_err());
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut body = TypingIndicatorV1::from(&sample_typing()).encode_to_vec();
        // Field 15, wire type 2 (length-delimited), 3 bytes of payload.
        body.extend_from_slice(&[(15 << 3) | 2, 3, b'x', b'y', b'z']);
        // Field 16, wire type 0 (varint).
        body.extend_from_slice(&[0x80, 0x01, 42]);
        let mut bytes = Vec::new();
        prost::encode_length_delimiter(body.len(), &mut bytes).unwrap();
        bytes.extend_from_slice(&body);

        let decoded = decode_envelope(EnvelopeKind::Typing, &bytes).unwrap();
        assert_eq!(decoded, Envelope::Typing(sample_typing()));
    }

    fn sample_chat(attachment: Option<Attachment>) -> ChatMessage {
        ChatMessage {
            id: "m1".to_string(),
            sender_user_id: "u1".to_string(),
            recipient_user_id: "u2".to_string(),
            encrypted_content: vec![7u8; 40],
            content_type: "text/plain".to_string(),
            timestamp: 1_700_000_000,
            signature: vec![8u8; 64],
            nonce: vec![9u8; 12],
            attachment,
            reply_to_id: None,
        }
    }

    #[test]
    fn test_chat_cut_before_attachment_is_malformed() {
        let attachment = Attachment {
            content_address: "bafy".to_string(),
            file_name: "a.png".to_string(),
            mime_type: "image/png".to_string(),
            file_size: 1024,
        };
        let full = encode_envelope(&Envelope::Chat(sample_chat(Some(attachment)))).unwrap();
        let without = encode_envelope(&Envelope::Chat(sample_chat(None))).unwrap();
        assert!(without.len() < full.len());

        // Ends exactly on the field boundary before the attachment.
        let err = decode_envelope(EnvelopeKind::Chat, &full[..without.len()]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope { kind: "chat", .. }));
    }

    #[test]
    fn test_trailing_bytes_are_malformed() {
        let mut bytes = encode_envelope(&Envelope::Typing(sample_typing())).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_envelope(EnvelopeKind::Typing, &bytes),
            Err(CodecError::MalformedEnvelope { kind: "typing", .. })
        ));
    }

    #[test]
    fn test_frame_round_trip_keeps_kind() {
        let env = Envelope::Typing(sample_typing());
        let bytes = encode_frame(&env).unwrap();
        let decoded = decode_frame(&bytes).unwrap();
        assert_eq!(decoded.kind(), EnvelopeKind::Typing);
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_wrong_kind_is_malformed_not_panic() {
        let bytes = encode_envelope(&Envelope::Typing(sample_typing())).unwrap();
        // Typing field 3 is a bool varint; as a handshake it would be the
        // wallet_type string, so the wire types disagree.
        assert!(decode_envelope(EnvelopeKind::Handshake, &bytes).is_err());
    }
}
