//! Fuzzing target for wire frame decoding.

#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Frames arrive from untrusted peers; decoding must never panic.
    let _ = pmid_proto::decode_frame(data);
});
