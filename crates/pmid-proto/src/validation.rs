//! Validation helpers for PMID wire messages.
//!
//! Every envelope is validated before it is encoded and after it is
//! decoded. Opaque byte fields (ciphertext, signatures, nonces, keys) are
//! only checked for presence; their contents belong to the crypto layer.

use crate::v1::*;
use crate::types::WalletType;

/// Validation error types for protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required string or byte field is empty
    EmptyField { field: &'static str },
    /// Required numeric field is zero
    ZeroValue { field: &'static str },
    /// Field contains invalid data
    InvalidData { field: &'static str, reason: &'static str },
    /// Only part of a group of fields that must appear together is present
    IncompleteGroup { group: &'static str, missing: &'static str },
    /// Outer frame carries no envelope
    MissingBody,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField { field } => {
                write!(f, "required field '{}' is empty", field)
            }
            Self::ZeroValue { field } => {
                write!(f, "required field '{}' is zero", field)
            }
            Self::InvalidData { field, reason } => {
                write!(f, "field '{}' contains invalid data: {}", field, reason)
            }
            Self::IncompleteGroup { group, missing } => {
                write!(f, "{} is incomplete: '{}' is missing", group, missing)
            }
            Self::MissingBody => write!(f, "frame has no envelope body"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn validate_not_empty(field: &'static str, data: &[u8]) -> ValidationResult<()> {
    if data.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

fn validate_str(field: &'static str, s: &str) -> ValidationResult<()> {
    validate_not_empty(field, s.as_bytes())
}

fn validate_nonzero(field: &'static str, value: u64) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::ZeroValue { field });
    }
    Ok(())
}

// ============================================================================
// Validation trait and implementations
// ============================================================================

/// Trait for validating protocol messages.
pub trait Validate {
    /// Validate the message fields.
    fn validate(&self) -> ValidationResult<()>;
}

impl Validate for ChatMessageV1 {
    fn validate(&self) -> ValidationResult<()> {
        validate_str("id", &self.id)?;
        validate_str("sender_user_id", &self.sender_user_id)?;
        validate_str("recipient_user_id", &self.recipient_user_id)?;
        validate_not_empty("content", &self.content)?;
        validate_str("content_type", &self.content_type)?;
        validate_nonzero("timestamp", self.timestamp)?;
        validate_not_empty("signature", &self.signature)?;
        validate_not_empty("nonce", &self.nonce)?;

        // Attachment fields travel as a unit: either all four or none.
        let present = [
            ("attachment_ref", self.attachment_ref.is_some()),
            ("file_name", self.file_name.is_some()),
            ("mime_type", self.mime_type.is_some()),
            ("file_size", self.file_size.is_some()),
        ];
        if present.iter().any(|(_, p)| *p) {
            if let Some(&(missing, _)) = present.iter().find(|(_, p)| !*p) {
                return Err(ValidationError::IncompleteGroup {
                    group: "attachment",
                    missing,
                });
            }
            if let Some(ref address) = self.attachment_ref {
                validate_str("attachment_ref", address)?;
            }
        }

        if let Some(ref reply_to) = self.reply_to_id {
            validate_str("reply_to_id", reply_to)?;
        }
        Ok(())
    }
}

impl Validate for HandshakeV1 {
    fn validate(&self) -> ValidationResult<()> {
        validate_str("user_id", &self.user_id)?;
        validate_not_empty("public_key", &self.public_key)?;
        validate_str("wallet_type", &self.wallet_type)?;
        self.wallet_type
            .parse::<WalletType>()
            .map_err(|reason| ValidationError::InvalidData {
                field: "wallet_type",
                reason,
            })?;
        validate_nonzero("timestamp", self.timestamp)?;
        validate_not_empty("signature", &self.signature)?;
        Ok(())
    }
}

impl Validate for KeyRotationV1 {
    fn validate(&self) -> ValidationResult<()> {
        validate_str("user_id", &self.user_id)?;
        validate_not_empty("old_public_key", &self.old_public_key)?;
        validate_not_empty("new_public_key", &self.new_public_key)?;
        validate_not_empty("signature_old", &self.signature_old)?;
        validate_not_empty("signature_new", &self.signature_new)?;
        // Accepted sequence numbers start at 1; 0 is the "never rotated" value.
        validate_nonzero("sequence_number", self.sequence_number as u64)?;
        validate_str("nonce", &self.nonce)?;
        validate_nonzero("timestamp", self.timestamp)?;
        Ok(())
    }
}

impl Validate for TypingIndicatorV1 {
    fn validate(&self) -> ValidationResult<()> {
        validate_str("user_id", &self.user_id)?;
        validate_str("conversation_id", &self.conversation_id)?;
        validate_nonzero("timestamp", self.timestamp)?;
        Ok(())
    }
}

impl Validate for WireFrameV1 {
    fn validate(&self) -> ValidationResult<()> {
        use wire_frame_v1::Body;

        match self.body {
            Some(Body::Chat(ref m)) => m.validate(),
            Some(Body::Handshake(ref m)) => m.validate(),
            Some(Body::KeyRotation(ref m)) => m.validate(),
            Some(Body::Typing(ref m)) => m.validate(),
            None => Err(ValidationError::MissingBody),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_chat() -> ChatMessageV1 {
        ChatMessageV1 {
            id: "m1".to_string(),
            sender_user_id: "alice".to_string(),
            recipient_user_id: "bob".to_string(),
            content: vec![1, 2, 3],
            content_type: "text/plain".to_string(),
            timestamp: 1_700_000_000,
            signature: vec![9u8; 64],
            nonce: vec![7u8; 16],
            ..Default::default()
        }
    }

    #[test]
    fn test_chat_valid() {
        assert!(valid_chat().validate().is_ok());
    }

    #[test]
    fn test_chat_missing_sender() {
        let mut msg = valid_chat();
        msg.sender_user_id.clear();
        assert_eq!(
            msg.validate(),
            Err(ValidationError::EmptyField { field: "sender_user_id" })
        );
    }

    #[test]
    fn test_chat_zero_timestamp() {
        let mut msg = valid_chat();
        msg.timestamp = 0;
        assert_eq!(
            msg.validate(),
            Err(ValidationError::ZeroValue { field: "timestamp" })
        );
    }

    #[test]
    fn test_chat_partial_attachment() {
        let mut msg = valid_chat();
        msg.attachment_ref = Some("abc".to_string());
        msg.file_name = Some("a.png".to_string());
        assert_eq!(
            msg.validate(),
            Err(ValidationError::IncompleteGroup {
                group: "attachment",
                missing: "mime_type"
            })
        );

        msg.mime_type = Some("image/png".to_string());
        msg.file_size = Some(0);
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_handshake_unknown_wallet_type() {
        let hs = HandshakeV1 {
            user_id: "alice".to_string(),
            public_key: vec![1u8; 64],
            wallet_type: "metamask".to_string(),
            timestamp: 5,
            signature: vec![2u8; 64],
        };
        assert!(matches!(
            hs.validate(),
            Err(ValidationError::InvalidData { field: "wallet_type", .. })
        ));
    }

    #[test]
    fn test_rotation_zero_sequence() {
        let rot = KeyRotationV1 {
            user_id: "alice".to_string(),
            old_public_key: vec![1u8; 64],
            new_public_key: vec![2u8; 64],
            signature_old: vec![3u8; 64],
            signature_new: vec![4u8; 64],
            sequence_number: 0,
            nonce: "n".to_string(),
            timestamp: 5,
        };
        assert_eq!(
            rot.validate(),
            Err(ValidationError::ZeroValue { field: "sequence_number" })
        );
    }

    #[test]
    fn test_frame_without_body() {
        assert_eq!(
            WireFrameV1::default().validate(),
            Err(ValidationError::MissingBody)
        );
    }
}
