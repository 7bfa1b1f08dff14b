#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Normalization and boolean parsing must reject bad input, never panic
    let normalized = irx::query::normalize(data);
    let _ = irx::query::parse_boolean(&normalized.text);
    let _ = irx::query::parse_boolean(data);
});
