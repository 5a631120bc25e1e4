#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::kdf::{derive_wrapping_key, KdfParams};
    use crate::keys::{sign, verify, Keypair};
    use crate::sealed::{decrypt_message, encrypt_message};
    use crate::transcript::Transcript;
    use crate::wrap::{unwrap_private_key, wrap_private_key};

    fn fast() -> KdfParams {
        KdfParams::new(8, 1, 1)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_transcript_determinism(
            tag1 in any::<u32>(),
            data1 in any::<Vec<u8>>(),
            tag2 in any::<u32>(),
            data2 in any::<Vec<u8>>()
        ) {
            let mut t1 = Transcript::new("test");
            t1.append_bytes(tag1, &data1);
            t1.append_bytes(tag2, &data2);

            let mut t2 = Transcript::new("test");
            t2.append_bytes(tag1, &data1);
            t2.append_bytes(tag2, &data2);

            prop_assert_eq!(t1.finalize(), t2.finalize());
        }

        #[test]
        fn test_signature_bit_flip(
            payload in proptest::collection::vec(any::<u8>(), 1..256),
            bit in any::<usize>()
        ) {
            let kp = Keypair::generate();
            let pk = kp.public_key().to_bytes();
            let sig = sign(&payload, &kp.private_key());
            prop_assert!(verify(&payload, &sig, &pk).unwrap());

            let mut flipped_payload = payload.clone();
            let idx = bit % (flipped_payload.len() * 8);
            flipped_payload[idx / 8] ^= 1 << (idx % 8);
            prop_assert!(!verify(&flipped_payload, &sig, &pk).unwrap());

            let mut flipped_sig = sig;
            let idx = bit % (flipped_sig.len() * 8);
            flipped_sig[idx / 8] ^= 1 << (idx % 8);
            prop_assert!(!verify(&payload, &flipped_sig, &pk).unwrap());
        }

        #[test]
        fn test_signature_other_keypair(payload in any::<Vec<u8>>()) {
            let kp = Keypair::generate();
            let other = Keypair::generate();
            let sig = sign(&payload, &kp.private_key());
            prop_assert!(!verify(&payload, &sig, &other.public_key().to_bytes()).unwrap());
        }

        #[test]
        fn test_wrap_round_trip(
            secret in proptest::collection::vec(any::<u8>(), 1..64),
            salt in any::<[u8; 16]>()
        ) {
            let kp = Keypair::generate();
            let key = derive_wrapping_key(&secret, &salt, &fast()).unwrap();
            let wrapped = wrap_private_key(&kp.private_key(), &key).unwrap();

            let again = derive_wrapping_key(&secret, &salt, &fast()).unwrap();
            let restored = unwrap_private_key(&wrapped.ciphertext, &wrapped.nonce, &again).unwrap();
            let original = kp.private_key();
            prop_assert_eq!(restored.as_bytes(), original.as_bytes());
        }

        #[test]
        fn test_wrap_other_secret_fails(
            secret in "[a-z]{1,16}",
            other in "[A-Z]{1,16}",
            salt in any::<[u8; 16]>()
        ) {
            let kp = Keypair::generate();
            let key = derive_wrapping_key(secret.as_bytes(), &salt, &fast()).unwrap();
            let wrapped = wrap_private_key(&kp.private_key(), &key).unwrap();

            let wrong = derive_wrapping_key(other.as_bytes(), &salt, &fast()).unwrap();
            prop_assert!(unwrap_private_key(&wrapped.ciphertext, &wrapped.nonce, &wrong).is_err());
        }

        #[test]
        fn test_sealed_round_trip(plaintext in any::<Vec<u8>>()) {
            let recipient = Keypair::generate();
            let ct = encrypt_message(&plaintext, &recipient.public_key()).unwrap();
            prop_assert_eq!(decrypt_message(&ct, &recipient.private_key()).unwrap(), plaintext);
        }

        #[test]
        fn test_sealed_tamper_detected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..128),
            pos in any::<usize>()
        ) {
            let recipient = Keypair::generate();
            let mut ct = encrypt_message(&plaintext, &recipient.public_key()).unwrap();
            let idx = pos % ct.len();
            ct[idx] ^= 0x01;
            prop_assert!(decrypt_message(&ct, &recipient.private_key()).is_err());
        }
    }
}
