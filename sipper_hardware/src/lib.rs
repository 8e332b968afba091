//! Scale backends: a scripted simulator and, behind the `hardware` feature,
//! an HX711 load cell on Raspberry Pi GPIO.
pub mod calibration;
pub mod error;
#[cfg(feature = "hardware")]
pub mod hx711;
pub mod util;

pub use calibration::Calibration;
pub use error::HwError;

use sipper_traits::{BoxError, Scale};
use std::time::Duration;

/// Simulated load cell that replays a script of weight readings.
///
/// Each `read` yields the next scripted value minus the tare offset; the
/// last value repeats once the script is exhausted. `tare` zeroes against
/// the value the next read would return.
#[derive(Debug, Clone, Default)]
pub struct SimulatedScale {
    readings: Vec<i32>,
    idx: usize,
    offset: i32,
    timeouts: bool,
}

impl SimulatedScale {
    /// An empty scale that always reads zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_readings(readings: impl Into<Vec<i32>>) -> Self {
        Self {
            readings: readings.into(),
            ..Self::default()
        }
    }

    /// Make every read fail with `HwError::Timeout` (exercises skip-and-retry paths).
    pub fn with_timeouts(mut self, timeouts: bool) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn current(&self) -> i32 {
        self.readings
            .get(self.idx)
            .or_else(|| self.readings.last())
            .copied()
            .unwrap_or(0)
    }
}

impl Scale for SimulatedScale {
    fn tare(&mut self) -> Result<(), BoxError> {
        if self.timeouts {
            return Err(Box::new(HwError::Timeout));
        }
        self.offset = self.current();
        tracing::debug!(offset = self.offset, "simulated tare");
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        if self.timeouts {
            return Err(Box::new(HwError::Timeout));
        }
        let w = self.current().saturating_sub(self.offset);
        if self.idx < self.readings.len() {
            self.idx += 1;
        }
        tracing::trace!(weight = w, "simulated read");
        Ok(w)
    }
}

#[cfg(feature = "hardware")]
pub struct HardwareScale {
    hx711: hx711::Hx711,
    calibration: Calibration,
    tare_samples: u8,
    tare_timeout: Duration,
}

#[cfg(feature = "hardware")]
impl HardwareScale {
    pub fn new(
        dt_pin: u8,
        sck_pin: u8,
        gain_pulses: u8,
        calibration_factor: f32,
        tare_samples: u8,
        read_timeout: Duration,
    ) -> error::Result<Self> {
        let hx711 = hx711::Hx711::open(dt_pin, sck_pin, gain_pulses)?;
        Ok(HardwareScale {
            hx711,
            calibration: Calibration::new(calibration_factor)?,
            tare_samples: tare_samples.max(1),
            tare_timeout: read_timeout,
        })
    }

    /// Averaged raw counts, for deriving a calibration factor.
    pub fn read_raw_average(&mut self, n: u8, timeout: Duration) -> error::Result<i32> {
        let samples = self.hx711.read_samples(n, timeout)?;
        util::mean_i32(&samples).ok_or(HwError::Timeout)
    }

    /// Raw counts at zero load established by the last tare.
    pub fn offset(&self) -> i32 {
        self.calibration.offset
    }

    /// Factor for a known weight now on the scale, from raw counts against
    /// the tare offset. Independent of the factor currently configured.
    pub fn factor_for_known_weight(
        &mut self,
        known_units: f32,
        samples: u8,
        timeout: Duration,
    ) -> error::Result<f32> {
        let raw = self.read_raw_average(samples.max(1), timeout)?;
        let factor = Calibration::factor_for_known_weight(raw, self.offset(), known_units)?;
        tracing::info!(raw, offset = self.offset(), known_units, factor, "hx711 calibrated");
        Ok(factor)
    }
}

#[cfg(feature = "hardware")]
impl Scale for HardwareScale {
    fn tare(&mut self) -> Result<(), BoxError> {
        let offset = self.read_raw_average(self.tare_samples, self.tare_timeout)?;
        self.calibration.offset = offset;
        tracing::info!(offset, samples = self.tare_samples, "hx711 tared");
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<i32, BoxError> {
        let mut attempts = 0;
        let max_attempts = 3;
        loop {
            match self.hx711.read_with_timeout(timeout) {
                Ok(raw) => {
                    let units = self.calibration.to_units(raw);
                    tracing::debug!(raw, units, "hx711 sample");
                    return Ok(units);
                }
                Err(HwError::Timeout) if attempts < max_attempts => {
                    attempts += 1;
                    tracing::warn!(retries = attempts, "scale timeout, retrying");
                }
                Err(e) => {
                    tracing::error!("Scale read error: {}", e);
                    return Err(Box::new(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_scale_replays_then_holds_last() {
        let mut scale = SimulatedScale::from_readings([0, 500, 420]);
        let t = Duration::from_millis(10);
        assert_eq!(scale.read(t).unwrap(), 0);
        assert_eq!(scale.read(t).unwrap(), 500);
        assert_eq!(scale.read(t).unwrap(), 420);
        assert_eq!(scale.read(t).unwrap(), 420);
    }

    #[test]
    fn simulated_tare_zeroes_against_next_reading() {
        let mut scale = SimulatedScale::from_readings([30, 30, 530]);
        let t = Duration::from_millis(10);
        scale.tare().unwrap();
        assert_eq!(scale.read(t).unwrap(), 0);
        assert_eq!(scale.read(t).unwrap(), 0);
        assert_eq!(scale.read(t).unwrap(), 500);
    }

    #[test]
    fn empty_simulated_scale_reads_zero() {
        let mut scale = SimulatedScale::new();
        assert_eq!(scale.read(Duration::from_millis(1)).unwrap(), 0);
    }

    #[test]
    fn simulated_timeouts_surface_as_hw_error() {
        let mut scale = SimulatedScale::from_readings([1]).with_timeouts(true);
        let err = scale.read(Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::Timeout)));
        assert!(scale.tare().is_err());
    }
}
