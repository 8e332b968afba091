use std::time::Duration;
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::wait_until_low_with_timeout;

pub struct Hx711 {
    dt: rppal::gpio::InputPin,
    sck: rppal::gpio::OutputPin,
    gain_pulses: u8, // 25, 26, 27 based on gain/channel
}

impl Hx711 {
    pub fn new(
        dt_pin: rppal::gpio::InputPin,
        mut sck_pin: rppal::gpio::OutputPin,
        gain_pulses: u8,
    ) -> Result<Self> {
        if !(25..=27).contains(&gain_pulses) {
            return Err(HwError::Gpio(format!(
                "hx711 gain pulses must be 25, 26 or 27, got {gain_pulses}"
            )));
        }
        sck_pin.set_low(); // clock idle low
        Ok(Self {
            dt: dt_pin,
            sck: sck_pin,
            gain_pulses,
        })
    }

    /// Open the DT/SCK pins by BCM number.
    pub fn open(dt_pin: u8, sck_pin: u8, gain_pulses: u8) -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let dt = gpio
            .get(dt_pin)
            .map_err(|e| HwError::Gpio(format!("open hx711 dt pin {dt_pin}: {e}")))?
            .into_input();
        let sck = gpio
            .get(sck_pin)
            .map_err(|e| HwError::Gpio(format!("open hx711 sck pin {sck_pin}: {e}")))?
            .into_output();
        Self::new(dt, sck, gain_pulses)
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        // Data ready when DT goes low
        let dt = &self.dt;
        wait_until_low_with_timeout(|| dt.is_high(), timeout, Duration::from_micros(200))
            .map_err(|_| HwError::Timeout)?;

        // Clock out 24 bits
        let mut value: i32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            spin_delay_100ns();
            value = (value << 1) | i32::from(self.dt.is_high());
            self.sck.set_low();
            spin_delay_100ns();
        }

        // Extra pulses select gain/channel for the next conversion
        for _ in 24..self.gain_pulses {
            self.sck.set_high();
            spin_delay_100ns();
            self.sck.set_low();
            spin_delay_100ns();
        }

        // Sign extend 24-bit
        if (value & 0x80_0000) != 0 {
            value |= !0xFF_FFFF;
        }
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }

    /// Collect `n` consecutive raw samples.
    pub fn read_samples(&mut self, n: u8, timeout: Duration) -> Result<Vec<i32>> {
        let mut out = Vec::with_capacity(usize::from(n));
        for _ in 0..n.max(1) {
            out.push(self.read_with_timeout(timeout)?);
        }
        Ok(out)
    }
}

#[inline(always)]
fn spin_delay_100ns() {
    std::hint::spin_loop();
}
