//! Test doubles for driving the engine without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sipper_traits::{BoxError, Scale};

use crate::handler::SipHandler;

#[derive(Debug, Default)]
struct FeedState {
    weight: i32,
    queued: VecDeque<i32>,
    fail_reads: u32,
    fail_tares: u32,
    reads: u64,
    tares: u64,
}

/// Test-side handle controlling what a `FeedScale` reports.
#[derive(Debug, Clone, Default)]
pub struct ScaleFeed(Arc<Mutex<FeedState>>);

impl ScaleFeed {
    fn lock(&self) -> MutexGuard<'_, FeedState> {
        // A panicking test thread must not wedge the sampling thread.
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Weight reported from now on (after any queued readings).
    pub fn set_weight(&self, w: i32) {
        self.lock().weight = w;
    }

    /// Readings returned one per read before falling back to the sticky weight.
    pub fn queue(&self, readings: impl IntoIterator<Item = i32>) {
        self.lock().queued.extend(readings);
    }

    /// Make the next `n` reads fail with a timeout.
    pub fn fail_reads(&self, n: u32) {
        self.lock().fail_reads = n;
    }

    /// Make the next `n` tares fail.
    pub fn fail_tares(&self, n: u32) {
        self.lock().fail_tares = n;
    }

    pub fn reads(&self) -> u64 {
        self.lock().reads
    }

    pub fn tares(&self) -> u64 {
        self.lock().tares
    }

    pub fn scale(&self) -> FeedScale {
        FeedScale(self.clone())
    }
}

/// Scale whose readings are driven through a `ScaleFeed`.
#[derive(Debug, Clone)]
pub struct FeedScale(ScaleFeed);

impl Scale for FeedScale {
    fn tare(&mut self) -> Result<(), BoxError> {
        let mut st = self.0.lock();
        if st.fail_tares > 0 {
            st.fail_tares -= 1;
            return Err("feed scale tare timeout".into());
        }
        st.tares += 1;
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        let mut st = self.0.lock();
        st.reads += 1;
        if st.fail_reads > 0 {
            st.fail_reads -= 1;
            return Err("feed scale read timeout".into());
        }
        Ok(st.queued.pop_front().unwrap_or(st.weight))
    }
}

/// Handler that records every sip and refill amount.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    sips: Arc<Mutex<Vec<i32>>>,
    refills: Arc<Mutex<Vec<i32>>>,
}

impl RecordingHandler {
    pub fn sips(&self) -> Vec<i32> {
        self.sips.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn refills(&self) -> Vec<i32> {
        self.refills.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl SipHandler for RecordingHandler {
    fn on_sip(&mut self, amount: i32) -> Result<(), BoxError> {
        self.sips
            .lock()
            .map_err(|_| "sip log poisoned")?
            .push(amount);
        Ok(())
    }

    fn on_refill(&mut self, amount: i32) -> Result<(), BoxError> {
        self.refills
            .lock()
            .map_err(|_| "refill log poisoned")?
            .push(amount);
        Ok(())
    }
}
