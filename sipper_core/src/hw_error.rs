//! Maps `Box<dyn Error>` from trait boundaries to typed `SipError`.
//!
//! The traits in `sipper_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `sipper_hardware::HwError` downcasting.

use crate::error::SipError;

/// Map a trait-boundary error to a typed `SipError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> SipError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<sipper_hardware::error::HwError>() {
            return match hw {
                sipper_hardware::error::HwError::Timeout => SipError::Timeout,
                sipper_hardware::error::HwError::DataReadyTimeout => SipError::Timeout,
                other => SipError::SensorRead(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        SipError::Timeout
    } else {
        SipError::SensorRead(s)
    }
}
