#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Anything the authority sends back must classify, never panic.
        let _ = sifen::submit::parse_submit_response(s);
    }
});
