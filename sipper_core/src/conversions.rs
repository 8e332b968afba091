//! `From` implementations bridging `sipper_config` types to `sipper_core` types.

use std::time::Duration;

use crate::config::DetectionCfg;

impl From<&sipper_config::Config> for DetectionCfg {
    fn from(c: &sipper_config::Config) -> Self {
        Self {
            deviation_threshold: c.detection.deviation_threshold,
            tick: Duration::from_millis(c.detection.tick_ms),
            read_timeout: Duration::from_millis(c.hardware.sensor_read_timeout_ms),
            command_timeout: Duration::from_millis(c.hardware.command_timeout_ms),
        }
    }
}
