#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::codec::{decode_envelope, decode_frame, encode_envelope, encode_frame};
    use crate::types::*;

    fn non_empty_string() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_:.-]{1,24}"
    }

    fn non_empty_bytes(max: usize) -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 1..max)
    }

    prop_compose! {
        fn any_attachment()(
            content_address in non_empty_string(),
            file_name in any::<String>(),
            mime_type in any::<String>(),
            file_size in any::<u64>()
        ) -> Attachment {
            Attachment { content_address, file_name, mime_type, file_size }
        }
    }

    prop_compose! {
        fn any_chat()(
            id in non_empty_string(),
            sender_user_id in non_empty_string(),
            recipient_user_id in non_empty_string(),
            encrypted_content in non_empty_bytes(256),
            content_type in non_empty_string(),
            timestamp in 1..u64::MAX,
            signature in non_empty_bytes(80),
            nonce in non_empty_bytes(32),
            attachment in proptest::option::of(any_attachment()),
            reply_to_id in proptest::option::of(non_empty_string())
        ) -> ChatMessage {
            ChatMessage {
                id,
                sender_user_id,
                recipient_user_id,
                encrypted_content,
                content_type,
                timestamp,
                signature,
                nonce,
                attachment,
                reply_to_id,
            }
        }
    }

    prop_compose! {
        fn any_handshake()(
            user_id in non_empty_string(),
            public_key in non_empty_bytes(80),
            real in any::<bool>(),
            timestamp in 1..u64::MAX,
            signature in non_empty_bytes(80)
        ) -> Handshake {
            Handshake {
                user_id,
                public_key,
                wallet_type: if real { WalletType::Real } else { WalletType::Temp },
                timestamp,
                signature,
            }
        }
    }

    prop_compose! {
        fn any_rotation()(
            user_id in non_empty_string(),
            old_public_key in non_empty_bytes(80),
            new_public_key in non_empty_bytes(80),
            signature_old in non_empty_bytes(80),
            signature_new in non_empty_bytes(80),
            sequence_number in 1..u32::MAX,
            nonce in non_empty_string(),
            timestamp in 1..u64::MAX
        ) -> KeyRotation {
            KeyRotation {
                user_id,
                old_public_key,
                new_public_key,
                signature_old,
                signature_new,
                sequence_number,
                nonce,
                timestamp,
            }
        }
    }

    prop_compose! {
        fn any_typing()(
            user_id in non_empty_string(),
            conversation_id in non_empty_string(),
            is_typing in any::<bool>(),
            timestamp in 1..u64::MAX
        ) -> TypingIndicator {
            TypingIndicator { user_id, conversation_id, is_typing, timestamp }
        }
    }

    fn any_envelope() -> impl Strategy<Value = Envelope> {
        prop_oneof![
            any_chat().prop_map(Envelope::Chat),
            any_handshake().prop_map(Envelope::Handshake),
            any_rotation().prop_map(Envelope::KeyRotation),
            any_typing().prop_map(Envelope::Typing),
        ]
    }

    proptest! {
        // decode(encode(x)) == x for every envelope kind.
        #[test]
        fn test_envelope_round_trip(env in any_envelope()) {
            let bytes = encode_envelope(&env).unwrap();
            let decoded = decode_envelope(env.kind(), &bytes).unwrap();
            prop_assert_eq!(decoded, env);
        }

        #[test]
        fn test_frame_round_trip(env in any_envelope()) {
            let bytes = encode_frame(&env).unwrap();
            prop_assert_eq!(decode_frame(&bytes).unwrap(), env);
        }

        // The body is length-delimited inside the frame, so every strict
        // prefix of an encoded frame must be rejected.
        #[test]
        fn test_truncated_frame_rejected(env in any_envelope(), cut in any::<prop::sample::Index>()) {
            let bytes = encode_frame(&env).unwrap();
            let len = cut.index(bytes.len());
            prop_assert!(decode_frame(&bytes[..len]).is_err());
        }

        // Same for a single envelope: its length prefix must cover the body.
        #[test]
        fn test_truncated_envelope_rejected(env in any_envelope(), cut in any::<prop::sample::Index>()) {
            let bytes = encode_envelope(&env).unwrap();
            let len = cut.index(bytes.len());
            prop_assert!(decode_envelope(env.kind(), &bytes[..len]).is_err());
        }

        #[test]
        fn test_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode_frame(&data);
            let _ = decode_envelope(EnvelopeKind::Chat, &data);
            let _ = decode_envelope(EnvelopeKind::KeyRotation, &data);
        }
    }
}
