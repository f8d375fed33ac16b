#![no_main]

use libfuzzer_sys::fuzz_target;
use seqrets_core::{codec, expand, Payload, SecretPayload};

fuzz_target!(|data: &[u8]| {
    // Decrypted plaintext is attacker-shaped once a share is forged;
    // framing and expansion must reject it without panicking.
    if let Ok(payload) = Payload::from_bytes(data) {
        let _ = expand(&payload);
    }
    let _ = SecretPayload::from_bytes(data);

    // Same for the decompressor in front of it
    let _ = codec::decompress(data);
});
