//! Contracts for the two outward-facing callbacks: what to do with a sip,
//! and where to show the current state.

use crate::state::{DetectionState, Indicator};
use sipper_traits::BoxError;

/// Receives detected sips (and refills) from the sampling thread.
///
/// Called synchronously on the sampling thread: a slow handler delays the
/// next tick. Errors and panics are contained by the engine.
pub trait SipHandler: Send {
    fn on_sip(&mut self, amount: i32) -> Result<(), BoxError>;

    /// Liquid was added to the cup. Ignored unless overridden.
    fn on_refill(&mut self, _amount: i32) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<F> SipHandler for F
where
    F: FnMut(i32) + Send,
{
    fn on_sip(&mut self, amount: i32) -> Result<(), BoxError> {
        self(amount);
        Ok(())
    }
}

/// Best-effort observer of state changes (LEDs, displays, diagnostics).
pub trait SignalSink: Send {
    fn on_state_changed(&mut self, state: DetectionState, indicator: Indicator);
}

/// Sink that reports state changes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SignalSink for TracingSink {
    fn on_state_changed(&mut self, state: DetectionState, indicator: Indicator) {
        tracing::info!(state = state.name(), color = %indicator.code(), "state changed");
    }
}
