//! Runtime configuration for the detection engine.
//!
//! Separate from the TOML schema in `sipper_config`; see `conversions`.

use std::time::Duration;

use crate::error::SipError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionCfg {
    /// Noise margin; weight changes at or below it are ignored. Must be >= 0.
    pub deviation_threshold: i32,
    /// Wait between ticks.
    pub tick: Duration,
    /// Bounded wait for a single sensor read.
    pub read_timeout: Duration,
    /// Bounded wait for the sampling thread to acknowledge a queued tare.
    pub command_timeout: Duration,
}

impl Default for DetectionCfg {
    fn default() -> Self {
        Self {
            deviation_threshold: 5,
            tick: Duration::from_secs(1),
            read_timeout: Duration::from_millis(500),
            command_timeout: Duration::from_secs(3),
        }
    }
}

impl DetectionCfg {
    pub fn validate(&self) -> Result<(), SipError> {
        if self.deviation_threshold < 0 {
            return Err(SipError::Config(format!(
                "deviation_threshold must be >= 0, got {}",
                self.deviation_threshold
            )));
        }
        if self.tick.is_zero() {
            return Err(SipError::Config("tick must be > 0".into()));
        }
        if self.read_timeout.is_zero() {
            return Err(SipError::Config("read_timeout must be > 0".into()));
        }
        if self.command_timeout.is_zero() {
            return Err(SipError::Config("command_timeout must be > 0".into()));
        }
        Ok(())
    }
}
