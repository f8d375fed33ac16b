#![no_main]

use libfuzzer_sys::fuzz_target;
use seqrets_card::layout::{decode_items, encode_items, LAYOUT_MAGIC};

fuzz_target!(|data: &[u8]| {
    let mut blob = LAYOUT_MAGIC.to_vec();
    blob.extend_from_slice(data);

    // Whatever decodes must encode back to a blob that decodes the same
    if let Ok(items) = decode_items(&blob, 0, "") {
        if let Ok(encoded) = encode_items(&items) {
            let again = decode_items(&encoded, 0, "").ok();
            assert_eq!(again.as_ref(), Some(&items));
        }
    }

    // Legacy path: any blob without the magic
    let _ = decode_items(data, 2, "legacy");
});
