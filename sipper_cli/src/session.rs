//! `sipper run`: drive the engine until Ctrl-C or a deadline, emitting JSON lines.

use crate::scale_ops::DynScale;
use eyre::Result;
use serde_json::json;
use sipper_core::{DetectionCfg, Engine, EngineStats, SipError, SipHandler, TracingSink};
use sipper_traits::BoxError;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const POLL: Duration = Duration::from_millis(10);

fn unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Writes one JSON object per sip or refill.
pub struct JsonlHandler<W> {
    out: W,
}

impl<W: Write + Send> JsonlHandler<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, event: &str, amount: i32) -> Result<(), BoxError> {
        let line = json!({ "event": event, "amount": amount, "timestamp": unix_ms() });
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> SipHandler for JsonlHandler<W> {
    fn on_sip(&mut self, amount: i32) -> Result<(), BoxError> {
        self.emit("sip", amount)
    }

    fn on_refill(&mut self, amount: i32) -> Result<(), BoxError> {
        self.emit("refill", amount)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Summary {
    pub stats: EngineStats,
    pub duration_ms: u64,
}

impl Summary {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "event": "summary",
            "sips": self.stats.sips,
            "consumed_total": self.stats.consumed_total,
            "refills": self.stats.refills,
            "skipped_reads": self.stats.skipped_reads,
            "handler_failures": self.stats.handler_failures,
            "duration_ms": self.duration_ms,
            "timestamp": unix_ms(),
        })
    }
}

pub fn run(
    scale: DynScale,
    detection: DetectionCfg,
    duration: Option<Duration>,
    shutdown: &Arc<AtomicBool>,
) -> Result<Summary> {
    let mut engine = Engine::builder()
        .with_scale(scale)
        .with_handler(JsonlHandler::new(std::io::stdout()))
        .with_sink(TracingSink)
        .with_detection(detection)
        .build()?;

    let started = Instant::now();
    engine.start()?;
    while !shutdown.load(Ordering::Relaxed) {
        let remaining = match duration {
            Some(d) => match d.checked_sub(started.elapsed()) {
                Some(r) if !r.is_zero() => r,
                _ => break,
            },
            None => POLL,
        };
        std::thread::sleep(remaining.min(POLL));
    }
    engine.stop()?;

    let stats = engine.stats();
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        sips = stats.sips,
        consumed_total = stats.consumed_total,
        refills = stats.refills,
        duration_ms,
        "session finished"
    );

    // The scale never answered: nothing was measured, so the run itself failed.
    if stats.good_reads == 0 && stats.skipped_reads > 0 {
        return Err(SipError::SensorRead(format!(
            "{} attempts failed, no reading succeeded",
            stats.skipped_reads
        ))
        .into());
    }
    Ok(Summary { stats, duration_ms })
}
