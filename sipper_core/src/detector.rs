//! Pure sip detection state machine.
//!
//! `evaluate` maps a `Snapshot` and one reading to the next snapshot and an
//! optional `Event`. It performs no I/O; the engine applies side effects.
//!
//! All comparisons are done on `i64` so that `reading + deviation` and
//! `last - reading` cannot overflow for any pair of `i32` inputs.

use crate::error::SipError;
use crate::state::DetectionState;

/// Everything the state machine knows between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub state: DetectionState,
    /// "No cup" weight recorded right after tare.
    pub tare_baseline: i32,
    /// Anchor for the next tick's deltas.
    pub last_observed_weight: i32,
}

/// Something worth telling the outside world about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    CupPlaced { weight: i32 },
    DrinkingStarted { weight: i32 },
    /// Weight consumed since the cup was last seen at rest.
    Sip { amount: i32 },
    /// Weight added since the cup was last seen at rest.
    Refill { amount: i32 },
    /// Cup came back within the deviation margin of where it left.
    CupReturned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub next: Snapshot,
    pub event: Option<Event>,
}

impl Outcome {
    fn stay(s: Snapshot) -> Self {
        Self {
            next: s,
            event: None,
        }
    }

    fn go(next: Snapshot, event: Event) -> Self {
        Self {
            next,
            event: Some(event),
        }
    }
}

#[inline]
fn clamp_i32(v: i64) -> i32 {
    i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
}

/// One transition step.
///
/// `Undefined` never advances here: leaving it requires a tare, which is
/// the engine's job (see `Detector::calibrate`).
pub fn evaluate(s: Snapshot, deviation: i32, reading: i32) -> Outcome {
    let cur = i64::from(reading);
    let last = i64::from(s.last_observed_weight);
    let tare = i64::from(s.tare_baseline);
    let dev = i64::from(deviation);

    match s.state {
        DetectionState::Undefined => Outcome::stay(s),
        DetectionState::Initialized => {
            if cur > tare + dev {
                let next = Snapshot {
                    state: DetectionState::CupOnScale,
                    last_observed_weight: reading,
                    ..s
                };
                Outcome::go(next, Event::CupPlaced { weight: reading })
            } else {
                Outcome::stay(s)
            }
        }
        DetectionState::CupOnScale => {
            if last - cur > dev {
                let next = Snapshot {
                    state: DetectionState::DrinkingInProgress,
                    ..s
                };
                Outcome::go(next, Event::DrinkingStarted { weight: reading })
            } else {
                Outcome::stay(s)
            }
        }
        // Order matters: sip and cup-returned both fire on a decrease, and a
        // genuine sip must never be shadowed by the return rule.
        DetectionState::DrinkingInProgress => {
            if cur > dev && cur + dev < last {
                let next = Snapshot {
                    state: DetectionState::CupOnScale,
                    last_observed_weight: reading,
                    ..s
                };
                Outcome::go(
                    next,
                    Event::Sip {
                        amount: clamp_i32(last - cur),
                    },
                )
            } else if last + dev < cur {
                let next = Snapshot {
                    state: DetectionState::CupOnScale,
                    last_observed_weight: reading,
                    ..s
                };
                Outcome::go(
                    next,
                    Event::Refill {
                        amount: clamp_i32(cur - last),
                    },
                )
            } else if last - cur < dev {
                let next = Snapshot {
                    state: DetectionState::CupOnScale,
                    ..s
                };
                Outcome::go(next, Event::CupReturned)
            } else {
                Outcome::stay(s)
            }
        }
    }
}

/// Stateful wrapper over `evaluate` owned by the sampling thread.
#[derive(Debug, Clone)]
pub struct Detector {
    snapshot: Snapshot,
    deviation: i32,
}

impl Detector {
    pub fn new(deviation: i32) -> Result<Self, SipError> {
        if deviation < 0 {
            return Err(SipError::Config(format!(
                "deviation_threshold must be >= 0, got {deviation}"
            )));
        }
        Ok(Self {
            snapshot: Snapshot::default(),
            deviation,
        })
    }

    /// Record the post-tare reading as both baseline and anchor; enter `Initialized`.
    pub fn calibrate(&mut self, reading: i32) {
        self.snapshot = Snapshot {
            state: DetectionState::Initialized,
            tare_baseline: reading,
            last_observed_weight: reading,
        };
    }

    /// Back to `Undefined`, keeping the last known weights for diagnostics.
    pub fn invalidate(&mut self) {
        self.snapshot.state = DetectionState::Undefined;
    }

    pub fn step(&mut self, reading: i32) -> Option<Event> {
        let out = evaluate(self.snapshot, self.deviation, reading);
        self.snapshot = out.next;
        out.event
    }

    pub fn state(&self) -> DetectionState {
        self.snapshot.state
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn at(state: DetectionState, tare: i32, last: i32) -> Snapshot {
        Snapshot {
            state,
            tare_baseline: tare,
            last_observed_weight: last,
        }
    }

    #[test]
    fn negative_deviation_is_a_config_error() {
        match Detector::new(-1) {
            Err(SipError::Config(msg)) => assert!(msg.contains("-1")),
            other => panic!("expected Config error, got {other:?}"),
        }
        assert!(Detector::new(0).is_ok());
    }

    #[test]
    fn fresh_detector_is_undefined_and_ignores_readings() {
        let mut d = Detector::new(10).unwrap();
        assert_eq!(d.state(), DetectionState::Undefined);
        assert_eq!(d.step(1_000), None);
        assert_eq!(d.state(), DetectionState::Undefined);
    }

    #[test]
    fn calibrate_sets_baseline_and_anchor() {
        let mut d = Detector::new(10).unwrap();
        d.calibrate(7);
        assert_eq!(d.snapshot(), at(DetectionState::Initialized, 7, 7));
        d.invalidate();
        assert_eq!(d.state(), DetectionState::Undefined);
        assert_eq!(d.snapshot().tare_baseline, 7);
    }

    #[rstest]
    #[case(10, false)] // exactly tare + D: strict comparison
    #[case(11, true)]
    #[case(-50, false)]
    fn cup_placement_threshold_is_strict(#[case] reading: i32, #[case] placed: bool) {
        let out = evaluate(at(DetectionState::Initialized, 0, 0), 10, reading);
        if placed {
            assert_eq!(out.next, at(DetectionState::CupOnScale, 0, reading));
            assert_eq!(out.event, Some(Event::CupPlaced { weight: reading }));
        } else {
            assert_eq!(out.next, at(DetectionState::Initialized, 0, 0));
            assert_eq!(out.event, None);
        }
    }

    #[rstest]
    #[case(490, false)] // drop of exactly D stays
    #[case(489, true)]
    #[case(600, false)] // increases never start drinking
    fn drinking_starts_on_drop_beyond_threshold(#[case] reading: i32, #[case] starts: bool) {
        let out = evaluate(at(DetectionState::CupOnScale, 0, 500), 10, reading);
        if starts {
            assert_eq!(out.next, at(DetectionState::DrinkingInProgress, 0, 500));
            assert_eq!(out.event, Some(Event::DrinkingStarted { weight: reading }));
        } else {
            assert_eq!(out, Outcome::stay(at(DetectionState::CupOnScale, 0, 500)));
        }
    }

    #[test]
    fn sip_reports_consumed_amount() {
        let out = evaluate(at(DetectionState::DrinkingInProgress, 0, 500), 10, 420);
        assert_eq!(out.event, Some(Event::Sip { amount: 80 }));
        assert_eq!(out.next, at(DetectionState::CupOnScale, 0, 420));
    }

    #[test]
    fn refill_takes_precedence_over_return() {
        let out = evaluate(at(DetectionState::DrinkingInProgress, 0, 300), 10, 400);
        assert_eq!(out.event, Some(Event::Refill { amount: 100 }));
        assert_eq!(out.next, at(DetectionState::CupOnScale, 0, 400));
    }

    #[test]
    fn small_decrease_is_a_return_without_drinking() {
        let out = evaluate(at(DetectionState::DrinkingInProgress, 0, 500), 50, 460);
        assert_eq!(out.event, Some(Event::CupReturned));
        assert_eq!(out.next, at(DetectionState::CupOnScale, 0, 500));
    }

    #[rstest]
    // Cup lifted: reading near zero is below the absolute floor and the drop is large.
    #[case(500, 10, 0)]
    #[case(500, 10, 10)]
    #[case(500, 10, -30)]
    // Decrease of exactly D: not a sip (420+80 == 500), not a return (80 !< 80).
    #[case(500, 80, 420)]
    fn no_match_leaves_everything_unchanged(
        #[case] last: i32,
        #[case] dev: i32,
        #[case] reading: i32,
    ) {
        let s = at(DetectionState::DrinkingInProgress, 0, last);
        assert_eq!(evaluate(s, dev, reading), Outcome::stay(s));
    }

    #[test]
    fn zero_threshold_returns_on_unchanged_weight() {
        // D = 0: any change counts, an identical reading is neither sip nor return.
        let s = at(DetectionState::DrinkingInProgress, 0, 500);
        assert_eq!(evaluate(s, 0, 500), Outcome::stay(s));
        assert_eq!(evaluate(s, 0, 499).event, Some(Event::Sip { amount: 1 }));
        assert_eq!(evaluate(s, 0, 501).event, Some(Event::Refill { amount: 1 }));
    }

    #[test]
    fn extremes_do_not_overflow() {
        let s = at(DetectionState::DrinkingInProgress, 0, i32::MAX);
        let out = evaluate(s, i32::MAX, i32::MAX);
        assert_eq!(out.event, Some(Event::CupReturned));

        let s = at(DetectionState::DrinkingInProgress, 0, i32::MIN);
        let out = evaluate(s, 0, i32::MAX);
        assert_eq!(out.event, Some(Event::Refill { amount: i32::MAX }));
    }

    #[test]
    fn full_session_sequence() {
        let mut d = Detector::new(10).unwrap();
        d.calibrate(0);
        let events: Vec<_> = [0, 5, 500, 498, 0, 0, 420, 420, 300, 300, 0, 655]
            .into_iter()
            .filter_map(|w| d.step(w))
            .collect();
        assert_eq!(
            events,
            vec![
                Event::CupPlaced { weight: 500 },
                Event::DrinkingStarted { weight: 0 },
                Event::Sip { amount: 80 },
                Event::DrinkingStarted { weight: 300 },
                Event::Sip { amount: 120 },
                Event::DrinkingStarted { weight: 0 },
                Event::Refill { amount: 355 },
            ]
        );
        assert_eq!(d.snapshot(), at(DetectionState::CupOnScale, 0, 655));
    }
}
