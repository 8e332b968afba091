#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    if let Ok(cfg) = toml::from_str::<sipper_config::Config>(data) {
        if cfg.validate().is_ok() {
            // Anything that validates must convert into a usable engine config.
            let detection = sipper_core::DetectionCfg::from(&cfg);
            assert!(detection.validate().is_ok());
        }
    }
});
