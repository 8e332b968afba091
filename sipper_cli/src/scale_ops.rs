//! Scale backend selection plus the one-shot commands (tare, calibrate, self-check).

use eyre::Result;
use sipper_config::Config;
use sipper_core::hw_error::map_hw_error;
use sipper_traits::Scale;
use std::time::Duration;

pub type DynScale = Box<dyn Scale + Send>;

/// Env var that makes the simulated scale fail every tare and read.
#[cfg(not(feature = "hardware"))]
pub const SIM_TIMEOUT_ENV: &str = "SIPPER_TEST_SIM_TIMEOUT";

pub fn read_timeout(cfg: &Config) -> Duration {
    Duration::from_millis(cfg.hardware.sensor_read_timeout_ms)
}

#[cfg(feature = "hardware")]
pub fn open_hx711(cfg: &Config) -> Result<sipper_hardware::HardwareScale> {
    let scale = sipper_hardware::HardwareScale::new(
        cfg.pins.hx711_dt,
        cfg.pins.hx711_sck,
        cfg.scale.gain_pulses,
        cfg.scale.calibration_factor,
        cfg.scale.tare_samples,
        read_timeout(cfg),
    )
    .map_err(|e| {
        eyre::eyre!(
            "open hx711 (dt={}, sck={}): {e}",
            cfg.pins.hx711_dt,
            cfg.pins.hx711_sck
        )
    })?;
    tracing::info!(
        dt = cfg.pins.hx711_dt,
        sck = cfg.pins.hx711_sck,
        "hx711 ready"
    );
    Ok(scale)
}

#[cfg(feature = "hardware")]
pub fn open_scale(cfg: &Config) -> Result<DynScale> {
    Ok(Box::new(open_hx711(cfg)?))
}

#[cfg(not(feature = "hardware"))]
pub fn open_scale(cfg: &Config) -> Result<DynScale> {
    let timeouts = std::env::var_os(SIM_TIMEOUT_ENV).is_some();
    tracing::info!(
        readings = cfg.simulation.readings.len(),
        timeouts,
        "using simulated scale"
    );
    Ok(Box::new(
        sipper_hardware::SimulatedScale::from_readings(cfg.simulation.readings.clone())
            .with_timeouts(timeouts),
    ))
}

/// Zero the scale and return the first reading taken after it.
pub fn tare(scale: &mut DynScale, timeout: Duration) -> Result<i32> {
    scale.tare().map_err(|e| map_hw_error(e.as_ref()))?;
    let w = scale.read(timeout).map_err(|e| map_hw_error(e.as_ref()))?;
    tracing::info!(reading = w, "tare complete");
    Ok(w)
}

fn check_known_weight(known: f32) -> Result<()> {
    if !known.is_finite() || known <= 0.0 {
        return Err(sipper_hardware::HwError::NotCalibrated("known weight must be positive").into());
    }
    Ok(())
}

/// Tare, wait for the known weight, and derive the factor from raw counts.
#[cfg(feature = "hardware")]
pub fn calibrate_hx711(
    scale: &mut sipper_hardware::HardwareScale,
    known: f32,
    samples: u8,
    settle: Duration,
    timeout: Duration,
) -> Result<f32> {
    check_known_weight(known)?;
    scale.tare().map_err(|e| map_hw_error(e.as_ref()))?;
    eprintln!("Scale zeroed. Place {known} on the scale now...");
    std::thread::sleep(settle);

    // First conversion after settling may straddle the load change.
    scale.read_raw_average(1, timeout)?;
    Ok(scale.factor_for_known_weight(known, samples, timeout)?)
}

/// Tare, wait for the known weight to be placed, and derive a new factor.
///
/// Backends without raw counts report in the units of `current_factor`, so
/// the result is that factor rescaled by how far the averaged reading is
/// from `known`.
#[cfg(any(test, not(feature = "hardware")))]
pub fn calibrate(
    scale: &mut DynScale,
    known: f32,
    current_factor: f32,
    samples: u8,
    settle: Duration,
    timeout: Duration,
) -> Result<f32> {
    check_known_weight(known)?;
    scale.tare().map_err(|e| map_hw_error(e.as_ref()))?;
    eprintln!("Scale zeroed. Place {known} on the scale now...");
    std::thread::sleep(settle);

    // First conversion after settling may straddle the load change.
    scale.read(timeout).map_err(|e| map_hw_error(e.as_ref()))?;

    let mut readings = Vec::with_capacity(usize::from(samples));
    for _ in 0..samples.max(1) {
        readings.push(scale.read(timeout).map_err(|e| map_hw_error(e.as_ref()))?);
    }
    let mean = sipper_hardware::util::mean_i32(&readings)
        .ok_or_else(|| eyre::eyre!("no calibration readings"))?;
    let ratio = sipper_hardware::Calibration::factor_for_known_weight(mean, 0, known)?;
    let factor = ratio * current_factor;
    tracing::info!(mean, known, factor, "calibration computed");
    Ok(factor)
}

/// One tare and one read; proves the scale answers within the timeout.
pub fn self_check(scale: &mut DynScale, timeout: Duration) -> Result<i32> {
    let w = tare(scale, timeout)?;
    let again = scale.read(timeout).map_err(|e| map_hw_error(e.as_ref()))?;
    tracing::debug!(first = w, second = again, "self-check readings");
    Ok(again)
}
