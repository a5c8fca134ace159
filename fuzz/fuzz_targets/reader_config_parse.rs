//! Fuzz target for YAML reader configuration parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use volset::ReaderConfig;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(config) = ReaderConfig::from_yaml_str(text) {
            let _ = config.manifests();
        }
    }
});
