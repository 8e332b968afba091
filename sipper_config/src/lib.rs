#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the drink detection scale.
//!
//! `Config` and its sections are deserialized from TOML and checked by
//! `Config::validate`. Runtime types live in `sipper_core`; this crate only
//! knows the file format.
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScaleCfg {
    /// Raw HX711 counts per weight unit.
    pub calibration_factor: f32,
    /// Raw readings averaged when taring.
    pub tare_samples: u8,
    /// 25 = channel A gain 128, 26 = channel B gain 32, 27 = channel A gain 64
    pub gain_pulses: u8,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            calibration_factor: 1.0,
            tare_samples: 10,
            gain_pulses: 25,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DetectionCfg {
    /// Weight changes at or below this margin are treated as noise.
    pub deviation_threshold: i32,
    /// Wait between ticks (ms).
    pub tick_ms: u64,
}

impl Default for DetectionCfg {
    fn default() -> Self {
        Self {
            deviation_threshold: 5,
            tick_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// Max time to wait for HX711 data-ready (DT low) before failing a read
    #[serde(alias = "sensor_ms")]
    pub sensor_read_timeout_ms: u64,
    /// Max time a caller waits for a queued tare to be acknowledged
    pub command_timeout_ms: u64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            sensor_read_timeout_ms: 500,
            command_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Never,
    Daily,
    Hourly,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    pub rotation: Rotation,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Simulation {
    /// Weight readings replayed by the simulated backend, one per read.
    pub readings: Vec<i32>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub scale: ScaleCfg,
    #[serde(default)]
    pub detection: DetectionCfg,
    #[serde(default)]
    pub hardware: Hardware,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulation: Simulation,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("invalid configuration: {e}"))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        if self.pins.hx711_dt == self.pins.hx711_sck {
            eyre::bail!("pins.hx711_dt and pins.hx711_sck must differ");
        }

        // Scale
        let f = self.scale.calibration_factor;
        if !f.is_finite() || f == 0.0 {
            eyre::bail!("scale.calibration_factor must be finite and non-zero");
        }
        if self.scale.tare_samples == 0 {
            eyre::bail!("scale.tare_samples must be >= 1");
        }
        if !(25..=27).contains(&self.scale.gain_pulses) {
            eyre::bail!("scale.gain_pulses must be 25, 26 or 27");
        }

        // Detection
        if self.detection.deviation_threshold < 0 {
            eyre::bail!("detection.deviation_threshold must be >= 0");
        }
        if self.detection.tick_ms == 0 {
            eyre::bail!("detection.tick_ms must be >= 1");
        }
        if self.detection.tick_ms > 60 * 60 * 1000 {
            eyre::bail!("detection.tick_ms is unreasonably large (>1h)");
        }

        // Hardware
        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be >= 1");
        }
        if self.hardware.command_timeout_ms == 0 {
            eyre::bail!("hardware.command_timeout_ms must be >= 1");
        }

        // Logging
        if let Some(level) = self.logging.level.as_deref()
            && !matches!(
                level.to_ascii_lowercase().as_str(),
                "error" | "warn" | "info" | "debug" | "trace"
            )
        {
            eyre::bail!("logging.level must be one of error|warn|info|debug|trace");
        }

        Ok(())
    }
}
