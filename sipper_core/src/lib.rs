#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Drink detection from a single load cell (hardware-agnostic).
//!
//! All hardware interaction goes through `sipper_traits::Scale`.
//!
//! ## Architecture
//!
//! - **Detector**: pure state machine, reading → transition + event (`detector`)
//! - **Engine**: sampling thread, lifecycle, re-tare handoff (`engine`)
//! - **Handlers**: sip callback and state signal contracts (`handler`)
//! - **State**: detection states and their indicator colors (`state`)
//!
//! Weights are signed integers in whatever unit the scale's calibration
//! factor produces (grams in practice).

pub mod config;
pub mod conversions;
pub mod detector;
pub mod engine;
pub mod error;
pub mod handler;
pub mod hw_error;
pub mod mocks;
pub mod state;

pub use config::DetectionCfg;
pub use detector::{Detector, Event, Outcome, Snapshot, evaluate};
pub use engine::{Engine, EngineBuilder, EngineStats};
pub use error::SipError;
pub use handler::{SignalSink, SipHandler, TracingSink};
pub use state::{DetectionState, Indicator};
