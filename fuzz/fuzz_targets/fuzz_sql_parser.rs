#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary statements must be rejected cleanly, never panic
    let _ = searchprime::service::sql::parse_select(data);
});
