//! Detection engine: one background thread that owns the scale, ticks the
//! `Detector`, and applies side effects (handler calls, signals, logs).
//!
//! Lifecycle:
//! - `start()` spawns the sampling thread; tare happens on that thread.
//!   Calling it again while running queues a re-tare.
//! - `stop()` clears the running flag, wakes the thread, and joins it. The
//!   scale, handler and sink come back to the engine for a later `start()`.
//! - `tare()` zeroes the sensor directly when idle; while running the request
//!   is queued to the sampling thread and serviced between ticks.
//!
//! Detector state is private to the sampling thread. Callers only see copies
//! published through `snapshot()` and counters through `stats()`.
use crossbeam_channel as xch;
use sipper_traits::clock::{Clock, MonotonicClock};
use sipper_traits::{BoxError, Scale};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::DetectionCfg;
use crate::detector::{Detector, Event, Snapshot};
use crate::error::SipError;
use crate::handler::{SignalSink, SipHandler};
use crate::hw_error::map_hw_error;
use crate::state::DetectionState;

/// Requests serviced by the sampling thread between ticks.
enum Command {
    /// Re-tare and re-baseline the detector (a `start()` while running).
    Recalibrate,
    /// Zero the sensor only; reply when done.
    ZeroSensor(xch::Sender<Result<(), SipError>>),
    /// Interrupt the inter-tick wait (used by `stop()`).
    Wake,
}

/// Counters accumulated across the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub ticks: u64,
    /// Successful sensor reads, including the baseline read after each tare.
    pub good_reads: u64,
    pub skipped_reads: u64,
    pub sips: u64,
    pub refills: u64,
    /// Sum of all sip amounts.
    pub consumed_total: i64,
    pub handler_failures: u64,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    good_reads: AtomicU64,
    skipped_reads: AtomicU64,
    sips: AtomicU64,
    refills: AtomicU64,
    consumed_total: AtomicI64,
    handler_failures: AtomicU64,
}

/// State shared read-only with callers (written by the sampling thread).
struct Shared {
    snapshot: Mutex<Option<Snapshot>>,
    counters: Counters,
    epoch: Instant,
    last_ok_ms: AtomicU64,
}

impl Shared {
    fn publish(&self, s: Snapshot) {
        if let Ok(mut g) = self.snapshot.lock() {
            *g = Some(s);
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything the sampling thread borrows from the engine while running.
struct Parts<S> {
    scale: S,
    handler: Box<dyn SipHandler>,
    sink: Option<Box<dyn SignalSink>>,
}

struct Worker<S> {
    running: Arc<AtomicBool>,
    cmd_tx: xch::Sender<Command>,
    join: JoinHandle<Parts<S>>,
}

/// Drink detection engine over a single `Scale`.
pub struct Engine<S>
where
    S: Scale + Send + 'static,
{
    parts: Option<Parts<S>>,
    worker: Option<Worker<S>>,
    cfg: DetectionCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    shared: Arc<Shared>,
}

impl<S> std::fmt::Debug for Engine<S>
where
    S: Scale + Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cfg", &self.cfg)
            .field("running", &self.is_running())
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl<S> Engine<S>
where
    S: Scale + Send + 'static,
{
    pub fn builder() -> EngineBuilder<S> {
        EngineBuilder::default()
    }

    /// Construct with default timing and no signal sink.
    pub fn new(
        scale: S,
        deviation_threshold: i32,
        handler: impl SipHandler + 'static,
    ) -> Result<Self, SipError> {
        Self::builder()
            .with_scale(scale)
            .with_handler(handler)
            .with_detection(DetectionCfg {
                deviation_threshold,
                ..DetectionCfg::default()
            })
            .build()
    }

    /// Start sampling, or re-tare if already running.
    pub fn start(&mut self) -> Result<(), SipError> {
        if let Some(w) = &self.worker {
            if w.running.load(Ordering::SeqCst) && !w.join.is_finished() {
                info!("engine already running; queueing re-tare");
                return w
                    .cmd_tx
                    .send(Command::Recalibrate)
                    .map_err(|_| SipError::State("sampling thread is gone".into()));
            }
            // Thread exited on its own; reclaim the parts before respawning.
            self.stop()?;
        }

        let detector = Detector::new(self.cfg.deviation_threshold)?;
        let parts = self.parts.take().ok_or_else(|| {
            SipError::State("scale was lost after a sampling thread failure".into())
        })?;
        let running = Arc::new(AtomicBool::new(true));
        let (cmd_tx, cmd_rx) = xch::unbounded();

        let session = Session {
            detector,
            parts,
            cfg: self.cfg.clone(),
            clock: self.clock.clone(),
            shared: self.shared.clone(),
            running: running.clone(),
            cmd_rx,
        };
        let join = std::thread::Builder::new()
            .name("sip-detect".into())
            .spawn(move || session.run())
            .map_err(|e| SipError::Io(format!("spawn sampling thread: {e}")))?;

        info!(
            deviation = self.cfg.deviation_threshold,
            tick_ms = u64::try_from(self.cfg.tick.as_millis()).unwrap_or(u64::MAX),
            "engine started"
        );
        self.worker = Some(Worker {
            running,
            cmd_tx,
            join,
        });
        Ok(())
    }

    /// Stop sampling and wait for the current tick to finish.
    ///
    /// A tick already past its read may still call the handler while this
    /// waits on the join; a read that completes after the flag is cleared is
    /// discarded. No handler runs after `stop()` returns.
    pub fn stop(&mut self) -> Result<(), SipError> {
        let Some(w) = self.worker.take() else {
            return Ok(());
        };
        w.running.store(false, Ordering::SeqCst);
        // The thread may already be gone; nothing to wake then.
        let _ = w.cmd_tx.send(Command::Wake);
        match w.join.join() {
            Ok(parts) => {
                self.parts = Some(parts);
                info!("engine stopped");
                Ok(())
            }
            Err(_) => {
                warn!("sampling thread panicked; scale handle lost");
                Err(SipError::State("sampling thread panicked".into()))
            }
        }
    }

    /// Re-zero the sensor without touching the detector's baseline or state.
    pub fn tare(&mut self) -> Result<(), SipError> {
        if let Some(w) = &self.worker {
            let (reply_tx, reply_rx) = xch::bounded(1);
            w.cmd_tx
                .send(Command::ZeroSensor(reply_tx))
                .map_err(|_| SipError::State("sampling thread is gone".into()))?;
            return match reply_rx.recv_timeout(self.cfg.command_timeout) {
                Ok(res) => res,
                Err(xch::RecvTimeoutError::Timeout) => Err(SipError::Timeout),
                Err(xch::RecvTimeoutError::Disconnected) => Err(SipError::State(
                    "sampling thread exited before taring".into(),
                )),
            };
        }
        match self.parts.as_mut() {
            Some(p) => p.scale.tare().map_err(|e| map_hw_error(e.as_ref())),
            None => Err(SipError::State("no scale available".into())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::SeqCst) && !w.join.is_finished())
    }

    /// Latest state published by the sampling thread; `None` before the first tick.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.shared.snapshot.lock().ok().and_then(|g| *g)
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.shared.counters;
        EngineStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            good_reads: c.good_reads.load(Ordering::Relaxed),
            skipped_reads: c.skipped_reads.load(Ordering::Relaxed),
            sips: c.sips.load(Ordering::Relaxed),
            refills: c.refills.load(Ordering::Relaxed),
            consumed_total: c.consumed_total.load(Ordering::Relaxed),
            handler_failures: c.handler_failures.load(Ordering::Relaxed),
        }
    }

    /// Milliseconds since the last successful sensor read (or since construction).
    pub fn stalled_for_now(&self) -> u64 {
        let now = self.clock.ms_since(self.shared.epoch);
        now.saturating_sub(self.shared.last_ok_ms.load(Ordering::Relaxed))
    }

    pub fn config(&self) -> &DetectionCfg {
        &self.cfg
    }
}

impl<S> Drop for Engine<S>
where
    S: Scale + Send + 'static,
{
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "engine shutdown during drop failed");
        }
    }
}

/// Builder for `Engine`. Scale and handler are required.
pub struct EngineBuilder<S> {
    scale: Option<S>,
    handler: Option<Box<dyn SipHandler>>,
    sink: Option<Box<dyn SignalSink>>,
    detection: DetectionCfg,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
}

impl<S> Default for EngineBuilder<S> {
    fn default() -> Self {
        Self {
            scale: None,
            handler: None,
            sink: None,
            detection: DetectionCfg::default(),
            clock: None,
        }
    }
}

impl<S> EngineBuilder<S>
where
    S: Scale + Send + 'static,
{
    pub fn with_scale(mut self, scale: S) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_handler(mut self, handler: impl SipHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn with_sink(mut self, sink: impl SignalSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_detection(mut self, cfg: DetectionCfg) -> Self {
        self.detection = cfg;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn build(self) -> Result<Engine<S>, SipError> {
        let scale = self
            .scale
            .ok_or_else(|| SipError::Config("missing scale".into()))?;
        let handler = self
            .handler
            .ok_or_else(|| SipError::Config("missing sip handler".into()))?;
        self.detection.validate()?;

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        let shared = Arc::new(Shared {
            snapshot: Mutex::new(None),
            counters: Counters::default(),
            epoch: clock.now(),
            last_ok_ms: AtomicU64::new(0),
        });

        Ok(Engine {
            parts: Some(Parts {
                scale,
                handler,
                sink: self.sink,
            }),
            worker: None,
            cfg: self.detection,
            clock,
            shared,
        })
    }
}

// ── Sampling thread ──────────────────────────────────────────────────────────

enum Flow {
    Continue,
    Stop,
}

struct Session<S> {
    detector: Detector,
    parts: Parts<S>,
    cfg: DetectionCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    cmd_rx: xch::Receiver<Command>,
}

impl<S: Scale> Session<S> {
    fn run(mut self) -> Parts<S> {
        debug!("sampling thread started");
        self.signal(DetectionState::Undefined);
        self.calibrate();

        // Calibration already took a reading, so every iteration waits first;
        // a failed tare is retried one tick later, not immediately.
        while self.is_running() {
            if let Flow::Stop = self.wait_for_next_tick() {
                break;
            }
            if let Flow::Stop = self.tick() {
                break;
            }
        }

        debug!("sampling thread exiting cleanly");
        self.parts
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Tare, take the baseline reading, enter `Initialized`. On failure the
    /// detector stays `Undefined` and the next tick retries.
    fn calibrate(&mut self) {
        let scale = &mut self.parts.scale;
        let timeout = self.cfg.read_timeout;
        let res = scale.tare().and_then(|()| scale.read(timeout));
        match res {
            Ok(baseline) => {
                self.mark_ok();
                self.detector.calibrate(baseline);
                info!(tare_baseline = baseline, "tare done, place a cup on the scale");
                self.signal(DetectionState::Initialized);
            }
            Err(e) => {
                let err = map_hw_error(e.as_ref());
                Shared::bump(&self.shared.counters.skipped_reads);
                warn!(error = %err, "tare failed; retrying next tick");
                if self.detector.state() != DetectionState::Undefined {
                    self.detector.invalidate();
                    self.signal(DetectionState::Undefined);
                }
            }
        }
        self.shared.publish(self.detector.snapshot());
    }

    fn tick(&mut self) -> Flow {
        if self.detector.state() == DetectionState::Undefined {
            self.calibrate();
            return Flow::Continue;
        }

        let reading = match self.parts.scale.read(self.cfg.read_timeout) {
            Ok(w) => w,
            Err(e) => {
                let err = map_hw_error(e.as_ref());
                Shared::bump(&self.shared.counters.skipped_reads);
                warn!(error = %err, state = %self.detector.state(), "sensor read failed; skipping tick");
                return Flow::Continue;
            }
        };
        self.mark_ok();

        // stop() raced with the read: drop the sample rather than act on it.
        if !self.is_running() {
            trace!(reading, "discarding reading taken after stop");
            return Flow::Stop;
        }

        let before = self.detector.state();
        let event = self.detector.step(reading);
        Shared::bump(&self.shared.counters.ticks);
        trace!(reading, state = %self.detector.state(), "tick");

        if let Some(ev) = event {
            self.dispatch(ev);
        }
        let after = self.detector.state();
        if after != before {
            debug!(from = %before, to = %after, reading, "transition");
            self.signal(after);
        }
        self.shared.publish(self.detector.snapshot());
        Flow::Continue
    }

    fn dispatch(&mut self, ev: Event) {
        let counters = &self.shared.counters;
        match ev {
            Event::Sip { amount } => {
                info!(amount, "sip detected");
                Shared::bump(&counters.sips);
                counters
                    .consumed_total
                    .fetch_add(i64::from(amount), Ordering::Relaxed);
                let handler = &mut self.parts.handler;
                if let Err(e) = isolate(|| handler.on_sip(amount)) {
                    Shared::bump(&counters.handler_failures);
                    warn!(error = %e, amount, "sip handler failed");
                }
            }
            Event::Refill { amount } => {
                info!(amount, "refill detected");
                Shared::bump(&counters.refills);
                let handler = &mut self.parts.handler;
                if let Err(e) = isolate(|| handler.on_refill(amount)) {
                    Shared::bump(&counters.handler_failures);
                    warn!(error = %e, amount, "refill handler failed");
                }
            }
            Event::CupReturned => debug!("cup put back without drinking"),
            Event::CupPlaced { weight } => debug!(weight, "cup placed"),
            Event::DrinkingStarted { weight } => debug!(weight, "cup lifted or weight dropped"),
        }
    }

    fn signal(&mut self, state: DetectionState) {
        let Some(sink) = self.parts.sink.as_mut() else {
            return;
        };
        let res = isolate(|| {
            sink.on_state_changed(state, state.indicator());
            Ok(())
        });
        if let Err(e) = res {
            Shared::bump(&self.shared.counters.handler_failures);
            warn!(error = %e, state = %state, "signal sink failed");
        }
    }

    fn mark_ok(&self) {
        Shared::bump(&self.shared.counters.good_reads);
        let now = self.clock.ms_since(self.shared.epoch);
        self.shared.last_ok_ms.store(now, Ordering::Relaxed);
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Recalibrate => {
                info!("re-tare requested");
                self.calibrate();
            }
            Command::ZeroSensor(reply) => {
                let res = self
                    .parts
                    .scale
                    .tare()
                    .map_err(|e| map_hw_error(e.as_ref()));
                match &res {
                    Ok(()) => info!("sensor re-zeroed"),
                    Err(e) => warn!(error = %e, "sensor re-zero failed"),
                }
                // The caller may have timed out already.
                let _ = reply.try_send(res);
            }
            Command::Wake => {}
        }
    }

    /// Sleep until the next tick, servicing commands as they arrive.
    fn wait_for_next_tick(&mut self) -> Flow {
        let deadline = self.clock.now() + self.cfg.tick;
        loop {
            if !self.is_running() {
                return Flow::Stop;
            }
            let remaining = deadline.saturating_duration_since(self.clock.now());
            if remaining.is_zero() {
                return Flow::Continue;
            }
            match self.cmd_rx.recv_timeout(remaining) {
                Ok(cmd) => self.handle(cmd),
                Err(xch::RecvTimeoutError::Timeout) => return Flow::Continue,
                Err(xch::RecvTimeoutError::Disconnected) => return Flow::Stop,
            }
        }
    }
}

/// Run a handler, turning both errors and panics into `SipError::Callback`.
fn isolate(f: impl FnOnce() -> Result<(), BoxError>) -> Result<(), SipError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SipError::Callback(e.to_string())),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(SipError::Callback(format!("panic: {msg}")))
        }
    }
}
