#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;
use pass_crypto::key::PrivateKey;
use pass_crypto::wire;

static KEY: Lazy<PrivateKey> = Lazy::new(|| {
    PrivateKey::generate("Fuzz", "fuzz@example.com").expect("keygen")
});

fuzz_target!(|data: &[u8]| {
    if let Ok((key_packet, data_packet)) = wire::split_message(data) {
        let joined = wire::join_message(key_packet, data_packet).expect("split output rejoins");
        assert_eq!(joined, data);
    }
    let _ = KEY.decrypt(data);
});
