#![no_main]

use libfuzzer_sys::fuzz_target;
use sifen::core::*;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let folded = normalize_label(s);
        assert_eq!(normalize_label(&folded), folded);
        let _ = resolve_tax_affectation(s);
        let _ = resolve_currency(s);
        if let Ok(department) = resolve_department(s) {
            let _ = resolve_city(department, s);
        }
    }
});
