#![no_main]

use libfuzzer_sys::fuzz_target;
use rust_swarm::session::{TransferId, magnet::parse_magnet};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(id) = parse_magnet(text) {
        let hex = id.to_hex_lower();
        assert_eq!(hex.len(), 40);
        assert_eq!(TransferId::from_hex(&hex), Some(id));
    }
});
