#![cfg(feature = "hardware")]

use std::time::Duration;

use sipper_hardware::HardwareScale;
use sipper_traits::Scale;

// These tests only make sense on a Raspberry Pi with an HX711 wired to BCM 5/6.

#[test]
fn hx711_read_does_not_busy_spin() {
    let mut sc = HardwareScale::new(5, 6, 25, 420.0, 1, Duration::from_millis(20))
        .expect("make scale");
    let _ = sc.read(Duration::from_millis(50)); // may fail on non-wired rigs
}

#[test]
fn calibration_reads_raw_counts_against_tare_offset() {
    let mut sc = HardwareScale::new(5, 6, 25, 420.0, 4, Duration::from_millis(50))
        .expect("make scale");
    if sc.tare().is_err() {
        return; // non-wired rig
    }
    // Nothing placed: the result is tare drift per unit, not the configured 420.0.
    match sc.factor_for_known_weight(1000.0, 4, Duration::from_millis(50)) {
        Ok(f) => assert!(f.abs() < 420.0, "factor {f}"),
        Err(e) => assert!(e.to_string().contains("no change"), "{e}"),
    }
}

#[test]
fn hx711_unwired_times_out() {
    let mut sc = HardwareScale::new(5, 6, 25, 420.0, 1, Duration::from_millis(5))
        .expect("make scale");
    let err = sc
        .read(Duration::from_millis(5))
        .expect_err("expect timeout");
    assert!(err.to_string().to_lowercase().contains("timeout"));
}
