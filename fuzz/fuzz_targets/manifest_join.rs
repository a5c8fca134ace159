//! Fuzz target for the in-memory manifest join.
//!
//! The input is split on NUL bytes into up to four manifests which are
//! parsed and inner-joined; the join must never grow the table.

#![no_main]

use libfuzzer_sys::fuzz_target;
use volset::manifest::fuzz_join_manifests;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let inputs: Vec<&[u8]> = data.split(|b| *b == 0).take(4).collect();
    let _ = fuzz_join_manifests(&inputs);
});
