#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(result) = sifen::submit::parse_relay_response(s) {
            // Approval is only ever reported with a protocol number.
            assert!(!result.is_accepted() || result.protocol_number.is_some());
        }
    }
});
