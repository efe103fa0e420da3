#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Frame decoding must never panic: arbitrary bytes either decode to a
    // ServerFrame (possibly Unknown) or come back as a protocol error.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = word_race_client::ServerFrame::decode(s);
    }
});
