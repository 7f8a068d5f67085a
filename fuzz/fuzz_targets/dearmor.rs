#![no_main]

use libfuzzer_sys::fuzz_target;
use pass_crypto::armor::{armor, dearmor};
use pass_crypto::key::PublicKey;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok((kind, bytes)) = dearmor(text) {
        assert_eq!(dearmor(&armor(&bytes, kind)).expect("re-armor parses").1, bytes);
        let _ = PublicKey::from_bytes(&bytes);
    }
});
