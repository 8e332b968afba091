use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait until the provided `is_high` predicate becomes false (i.e., line goes low),
/// or a timeout expires. Sleeps in small intervals to avoid CPU spinning.
pub fn wait_until_low_with_timeout(
    mut is_high: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while is_high() {
        if Instant::now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

/// Integer mean of raw samples, rounded to nearest. `None` for an empty slice.
pub fn mean_i32(samples: &[i32]) -> Option<i32> {
    if samples.is_empty() {
        return None;
    }
    let sum: i64 = samples.iter().map(|&v| i64::from(v)).sum();
    let n = samples.len() as i64;
    let half = n / 2;
    let rounded = if sum >= 0 {
        (sum + half) / n
    } else {
        (sum - half) / n
    };
    // The mean of i32 values always fits in i32.
    Some(rounded as i32)
}

#[cfg(test)]
mod tests {
    use super::mean_i32;

    #[test]
    fn mean_rounds_to_nearest() {
        assert_eq!(mean_i32(&[]), None);
        assert_eq!(mean_i32(&[1, 2]), Some(2));
        assert_eq!(mean_i32(&[-1, -2]), Some(-2));
        assert_eq!(mean_i32(&[10, 10, 10]), Some(10));
        assert_eq!(mean_i32(&[i32::MAX, i32::MAX]), Some(i32::MAX));
    }
}
