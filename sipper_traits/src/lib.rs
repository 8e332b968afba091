pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Error type crossing the hardware boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A load cell that reports calibrated weight as signed integer units.
///
/// Implementations own the calibration factor; callers only see units.
pub trait Scale {
    /// Re-zero the sensor so that the current load reads as zero.
    fn tare(&mut self) -> Result<(), BoxError>;

    /// Read one calibrated sample, waiting at most `timeout` for the sensor.
    fn read(&mut self, timeout: std::time::Duration) -> Result<i32, BoxError>;
}

impl<S: Scale + ?Sized> Scale for Box<S> {
    fn tare(&mut self) -> Result<(), BoxError> {
        (**self).tare()
    }

    fn read(&mut self, timeout: std::time::Duration) -> Result<i32, BoxError> {
        (**self).read(timeout)
    }
}
