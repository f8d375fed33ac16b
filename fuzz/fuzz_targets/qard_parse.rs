#![no_main]

use libfuzzer_sys::fuzz_target;
use seqrets_shamir::{combine_qards, Qard};

fuzz_target!(|data: &[u8]| {
    // Qard::parse must never panic, it returns Ok or Err.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(qard) = Qard::parse(s) {
            // Anything that parses must survive an encode/parse cycle
            let reparsed = Qard::parse(&qard.encode()).ok();
            assert_eq!(reparsed.as_ref(), Some(&qard));

            // and a combine attempt with itself
            let _ = combine_qards(&[qard.clone(), qard]);
        }
    }

    // Behind a valid prefix the fragment decoder gets the raw bytes
    let fragment = String::from_utf8_lossy(data);
    let _ = Qard::parse(&format!("seQRets|AAAAAAAAAAAAAAAAAAAAAA==|{}", fragment));
});
