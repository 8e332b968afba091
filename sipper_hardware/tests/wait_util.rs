use std::cell::Cell;
use std::time::{Duration, Instant};

use rstest::rstest;
use sipper_hardware::error::HwError;
use sipper_hardware::util::wait_until_low_with_timeout;

/// DT line that stays high for the first `high_polls` checks.
fn scripted_line(high_polls: u32) -> (impl FnMut() -> bool, std::rc::Rc<Cell<u32>>) {
    let polls = std::rc::Rc::new(Cell::new(0u32));
    let seen = polls.clone();
    let line = move || {
        let n = seen.get();
        seen.set(n + 1);
        n < high_polls
    };
    (line, polls)
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(5)]
fn data_ready_is_seen_once_line_drops(#[case] high_polls: u32) {
    let (line, polls) = scripted_line(high_polls);
    let res = wait_until_low_with_timeout(line, Duration::from_secs(1), Duration::from_micros(50));
    assert!(res.is_ok(), "expected data ready, got {res:?}");
    assert_eq!(polls.get(), high_polls + 1);
}

#[test]
fn stuck_high_line_times_out_promptly() {
    let start = Instant::now();
    let err = wait_until_low_with_timeout(|| true, Duration::from_millis(5), Duration::from_micros(200))
        .unwrap_err();
    assert!(matches!(err, HwError::DataReadyTimeout), "unexpected error: {err:?}");
    assert!(start.elapsed() < Duration::from_millis(500));
}
