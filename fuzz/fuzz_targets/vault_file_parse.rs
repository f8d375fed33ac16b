#![no_main]

use libfuzzer_sys::fuzz_target;
use seqrets_vault::{EncryptedInstruction, VaultFile};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    // Plain vaults get their shares checked; encrypted ones stop at the header
    if let Ok(VaultFile::Plain(vault)) = VaultFile::parse(s) {
        let _ = vault.share_set();
    }
    let _ = EncryptedInstruction::from_json(s);
});
