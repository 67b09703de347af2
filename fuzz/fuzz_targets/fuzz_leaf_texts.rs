#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(leaves) = sifen::xml::leaf_texts(s) {
            for leaf in &leaves {
                assert!(!leaf.path.is_empty());
                assert!(!leaf.text.is_empty());
            }
        }
    }
});
