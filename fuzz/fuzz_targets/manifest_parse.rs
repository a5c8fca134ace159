//! Fuzz target for manifest parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the manifest CSV reader,
//! checking for panics, crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use volset::manifest::from_manifest_slice;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = from_manifest_slice(data);
});
