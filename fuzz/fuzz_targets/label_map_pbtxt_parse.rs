//! Fuzz target for `.pbtxt` label map parsing.
//!
//! Inputs that are not valid UTF-8 are skipped; the parser only ever sees
//! text read from disk.

#![no_main]

use libfuzzer_sys::fuzz_target;
use recordprep::LabelMap;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = LabelMap::from_pbtxt_str(text);
    }
});
