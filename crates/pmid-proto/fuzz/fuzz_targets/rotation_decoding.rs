//! Fuzzing target for key rotation envelopes.

#![no_main]
use libfuzzer_sys::fuzz_target;
use pmid_proto::EnvelopeKind;

fuzz_target!(|data: &[u8]| {
    if let Ok(env) = pmid_proto::decode_envelope(EnvelopeKind::KeyRotation, data) {
        // Anything that decodes must re-encode.
        let _ = pmid_proto::encode_envelope(&env).expect("decoded envelope re-encodes");
    }
});
