#![no_main]
use libfuzzer_sys::fuzz_target;
use sipper_core::{Detector, Event};

#[derive(Debug, libfuzzer_sys::arbitrary::Arbitrary)]
struct Trace {
    deviation: u16,
    baseline: i32,
    readings: Vec<i32>,
}

fuzz_target!(|t: Trace| {
    let Ok(mut d) = Detector::new(i32::from(t.deviation)) else {
        return;
    };
    d.calibrate(t.baseline);
    for r in t.readings {
        let before = d.snapshot();
        match d.step(r) {
            Some(Event::Sip { amount }) => {
                assert!(amount > 0);
                assert_eq!(
                    i64::from(amount),
                    i64::from(before.last_observed_weight) - i64::from(r)
                );
            }
            Some(Event::Refill { amount }) => assert!(amount > 0),
            Some(_) => {}
            None => assert_eq!(d.snapshot(), before),
        }
        assert_eq!(d.snapshot().tare_baseline, t.baseline);
    }
});
