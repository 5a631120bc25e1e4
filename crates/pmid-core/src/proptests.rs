#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use pmid_crypto::{payloads::rotation_signing_bytes_v1, Keypair};
    use pmid_proto::KeyRotation;

    use crate::directory::PeerDirectory;
    use crate::errors::RotationError;

    fn signed_rotation(old: &Keypair, new: &Keypair, seq: u32, nonce: String) -> KeyRotation {
        let mut rot = KeyRotation {
            user_id: "u1".to_string(),
            old_public_key: old.public_key().to_vec(),
            new_public_key: new.public_key().to_vec(),
            signature_old: Vec::new(),
            signature_new: Vec::new(),
            sequence_number: seq,
            nonce,
            timestamp: 1_700_000_000,
        };
        let digest = rotation_signing_bytes_v1(&rot);
        rot.signature_old = old.sign(&digest).to_vec();
        rot.signature_new = new.sign(&digest).to_vec();
        rot
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// A rotation is accepted exactly when its sequence number exceeds
        /// every previously accepted one.
        #[test]
        fn test_rotation_ordering(seqs in proptest::collection::vec(0u32..40, 1..12)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let dir = PeerDirectory::new();
                let mut current = Keypair::generate();
                let mut high = 0u32;

                for (i, seq) in seqs.into_iter().enumerate() {
                    let next = Keypair::generate();
                    let rot = signed_rotation(&current, &next, seq, format!("n{i}"));
                    let result = dir.accept_rotation(&rot, &current.public_key()).await;

                    if seq > high {
                        prop_assert_eq!(result, Ok(next.public_key()));
                        high = seq;
                        current = next;
                    } else {
                        let is_stale = matches!(result, Err(RotationError::StaleRotation { .. }));
                        prop_assert!(is_stale);
                    }
                    prop_assert_eq!(dir.last_sequence("u1").await, high);
                }
                Ok(())
            })?;
        }
    }
}
