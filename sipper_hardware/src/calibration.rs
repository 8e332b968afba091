//! Raw-count to weight-unit conversion for load cells.
//!
//! units = (raw - offset) / factor, rounded to the nearest unit.

use crate::error::{HwError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Raw counts at zero load (set by tare).
    pub offset: i32,
    /// Raw counts per weight unit.
    pub factor: f32,
}

impl Calibration {
    pub fn new(factor: f32) -> Result<Self> {
        if !factor.is_finite() || factor == 0.0 {
            return Err(HwError::NotCalibrated("calibration factor must be finite and non-zero"));
        }
        Ok(Self { offset: 0, factor })
    }

    /// Convert a raw reading to weight units, saturating at the i32 range.
    pub fn to_units(&self, raw: i32) -> i32 {
        let delta = f64::from(raw) - f64::from(self.offset);
        let units = (delta / f64::from(self.factor)).round();
        if units >= f64::from(i32::MAX) {
            i32::MAX
        } else if units <= f64::from(i32::MIN) {
            i32::MIN
        } else {
            units as i32
        }
    }

    /// Derive the factor from an averaged raw reading taken with a known
    /// weight on a tared scale.
    pub fn factor_for_known_weight(raw_avg: i32, offset: i32, known_units: f32) -> Result<f32> {
        if !known_units.is_finite() || known_units <= 0.0 {
            return Err(HwError::NotCalibrated("known weight must be positive"));
        }
        let delta = f64::from(raw_avg) - f64::from(offset);
        let factor = (delta / f64::from(known_units)) as f32;
        if !factor.is_finite() || factor == 0.0 {
            return Err(HwError::NotCalibrated(
                "known weight produced no change in raw counts",
            ));
        }
        Ok(factor)
    }
}
