//! Reconciliation of local predictions against authoritative state

use tracing::{debug, info, warn};

use super::history::PredictionHistory;
use super::motion::{apply_motion, MotionParams};
use super::state::{states_agree, DivergenceCheck, PredictedState};
use super::tick::Tick;

/// What a single authoritative update did to the local timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Not newer than the last update reconciled against; ignored entirely
    Stale { tick: Tick, last_reconciled: Tick },
    /// Prediction matched the authority
    Confirmed { tick: Tick, pruned: usize },
    /// Prediction was wrong (or missing): snapped and replayed
    Corrected {
        tick: Tick,
        /// Distance between stored prediction and authority, if one was stored
        error: Option<f32>,
        replayed: usize,
        pruned: usize,
    },
}

impl ReconcileOutcome {
    pub fn is_correction(&self) -> bool {
        matches!(self, Self::Corrected { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

/// Compares authoritative updates against the predictor's history
#[derive(Debug, Clone)]
pub struct Reconciler {
    check: DivergenceCheck,
    epsilon_sq: f32,
    last_reconciled: Option<Tick>,
    corrections: u64,
}

impl Reconciler {
    pub fn new(check: DivergenceCheck, epsilon_sq: f32) -> Self {
        Self {
            check,
            epsilon_sq,
            last_reconciled: None,
            corrections: 0,
        }
    }

    /// Tick of the last authoritative update accepted
    pub fn last_reconciled(&self) -> Option<Tick> {
        self.last_reconciled
    }

    /// Number of corrections applied so far
    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    /// Reconcile `live` and `history` against one authoritative update.
    ///
    /// `live` is the visible state; it is only moved on misprediction, except
    /// for the status expiry which always follows the authority.
    pub fn reconcile(
        &mut self,
        authoritative: &PredictedState,
        live: &mut PredictedState,
        history: &mut PredictionHistory,
        motion: &MotionParams,
    ) -> ReconcileOutcome {
        let tick = authoritative.tick;

        if let Some(last) = self.last_reconciled {
            if tick <= last {
                // Same tick: a status-only republication (e.g. a stun), not reordering
                if tick == last {
                    debug!(tick = %tick, "Ignoring repeated authoritative state for reconciled tick");
                } else {
                    warn!(tick = %tick, last_reconciled = %last, "Discarding out-of-order authoritative state");
                }
                return ReconcileOutcome::Stale {
                    tick,
                    last_reconciled: last,
                };
            }
        }
        self.last_reconciled = Some(tick);

        let predicted = history.state_at(tick).copied();
        let agrees = predicted
            .as_ref()
            .is_some_and(|p| states_agree(p, authoritative, self.check, self.epsilon_sq));

        // Replay only touches newer ticks, so acknowledged history can go first
        let pruned = history.prune_through(tick);
        debug!(tick = %tick, pruned, remaining = history.len(), "Acknowledged history pruned");

        if agrees {
            live.disabled_until = authoritative.disabled_until;
            return ReconcileOutcome::Confirmed { tick, pruned };
        }

        let error = predicted.map(|p| p.position.distance(&authoritative.position));

        // Snap, then fast-forward through everything not yet acknowledged
        let (replayed_state, replayed) = history.replay_after(tick, *authoritative, |input, prev| {
            apply_motion(input, prev, input.tick(), motion)
        });
        *live = replayed_state;
        self.corrections += 1;

        info!(tick = %tick, error = ?error, replayed, "Misprediction corrected");
        ReconcileOutcome::Corrected {
            tick,
            error,
            replayed,
            pruned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::{Actions, Input};
    use crate::game::state::{Vec3, DEFAULT_POSITION_EPSILON_SQ};

    fn forward(tick: i64) -> Input {
        Input::new(
            Actions {
                forward: true,
                ..Default::default()
            },
            Tick::new(tick),
        )
    }

    /// Predict `ticks` forward inputs from the origin
    fn predicted_run(ticks: i64, motion: &MotionParams) -> (PredictedState, PredictionHistory) {
        let mut live = PredictedState::default();
        let mut history = PredictionHistory::default();
        for t in 1..=ticks {
            let input = forward(t);
            live = apply_motion(&input, &live, input.tick(), motion);
            history.record(input, live);
        }
        (live, history)
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(DivergenceCheck::PositionOnly, DEFAULT_POSITION_EPSILON_SQ)
    }

    #[test]
    fn test_matching_state_only_prunes() {
        let motion = MotionParams::new(5.0, 1.0 / 60.0);
        let (mut live, mut history) = predicted_run(5, &motion);
        let before = live;
        let authoritative = *history.state_at(Tick::new(3)).unwrap();

        let outcome = reconciler().reconcile(&authoritative, &mut live, &mut history, &motion);

        assert_eq!(outcome, ReconcileOutcome::Confirmed { tick: Tick::new(3), pruned: 3 });
        assert_eq!(live, before);
        assert_eq!(history.input_ticks(), vec![Tick::new(4), Tick::new(5)]);
    }

    #[test]
    fn test_mismatch_snaps_and_replays() {
        let motion = MotionParams::new(5.0, 1.0 / 60.0);
        let (mut live, mut history) = predicted_run(5, &motion);
        let authoritative = PredictedState::at(Vec3::new(1.0, 0.0, 0.0), Tick::new(3));

        let outcome = reconciler().reconcile(&authoritative, &mut live, &mut history, &motion);

        assert!(outcome.is_correction());
        if let ReconcileOutcome::Corrected { replayed, pruned, .. } = outcome {
            assert_eq!(replayed, 2);
            assert_eq!(pruned, 3);
        }
        assert_eq!(live.position.x, 1.0);
        assert!((live.position.z - 2.0 * motion.step()).abs() < 1e-6);
        assert_eq!(live.tick, Tick::new(5));
        assert_eq!(history.state_at(Tick::new(5)).copied(), Some(live));
    }

    #[test]
    fn test_missing_entry_is_a_misprediction() {
        let motion = MotionParams::new(5.0, 1.0 / 60.0);
        let mut live = PredictedState::default();
        let mut history = PredictionHistory::default();
        let authoritative = PredictedState::at(Vec3::new(0.0, 0.0, 4.0), Tick::new(12));

        let outcome = reconciler().reconcile(&authoritative, &mut live, &mut history, &motion);

        assert_eq!(
            outcome,
            ReconcileOutcome::Corrected {
                tick: Tick::new(12),
                error: None,
                replayed: 0,
                pruned: 0,
            }
        );
        assert_eq!(live, authoritative);
    }

    #[test]
    fn test_older_update_is_discarded() {
        let motion = MotionParams::new(5.0, 1.0 / 60.0);
        let (mut live, mut history) = predicted_run(12, &motion);
        let mut reconciler = reconciler();

        let at_10 = *history.state_at(Tick::new(10)).unwrap();
        let at_8 = *history.state_at(Tick::new(8)).unwrap();
        reconciler.reconcile(&at_10, &mut live, &mut history, &motion);
        let outcome = reconciler.reconcile(&at_8, &mut live, &mut history, &motion);

        assert!(outcome.is_stale());
        assert_eq!(reconciler.last_reconciled(), Some(Tick::new(10)));
        assert_eq!(history.oldest_tick(), Some(Tick::new(11)));
    }

    #[test]
    fn test_status_adopted_without_correction() {
        let motion = MotionParams::new(5.0, 1.0 / 60.0);
        let (mut live, mut history) = predicted_run(4, &motion);
        let stunned = PredictedState {
            disabled_until: Tick::new(50),
            ..*history.state_at(Tick::new(2)).unwrap()
        };

        let outcome = reconciler().reconcile(&stunned, &mut live, &mut history, &motion);
        assert!(!outcome.is_correction());
        assert_eq!(live.disabled_until, Tick::new(50));
    }

    #[test]
    fn test_status_mismatch_corrects_when_compared() {
        let motion = MotionParams::new(5.0, 1.0 / 60.0);
        let (mut live, mut history) = predicted_run(4, &motion);
        let stunned = PredictedState {
            disabled_until: Tick::new(50),
            ..*history.state_at(Tick::new(2)).unwrap()
        };
        let mut reconciler = Reconciler::new(DivergenceCheck::PositionAndStatus, DEFAULT_POSITION_EPSILON_SQ);

        let outcome = reconciler.reconcile(&stunned, &mut live, &mut history, &motion);

        assert!(outcome.is_correction());
        // Replayed ticks 3 and 4 happen while disabled: no movement past tick 2
        assert_eq!(live.position, stunned.position);
        assert_eq!(reconciler.corrections(), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn lines_at(&self, level: &str) -> Vec<String> {
            let text = String::from_utf8(self.0.lock().clone()).unwrap();
            text.lines()
                .filter(|line| line.contains(level))
                .map(str::to_owned)
                .collect()
        }
    }

    #[test]
    fn test_repeated_tick_discard_is_quiet() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let motion = MotionParams::new(5.0, 1.0 / 60.0);
        let (mut live, mut history) = predicted_run(6, &motion);
        let mut reconciler = reconciler();
        let at_five = *history.state_at(Tick::new(5)).unwrap();
        let stunned = PredictedState {
            disabled_until: Tick::new(50),
            ..at_five
        };
        let at_three = PredictedState::at(Vec3::ZERO, Tick::new(3));

        let (repeated, older) = tracing::subscriber::with_default(subscriber, || {
            reconciler.reconcile(&at_five, &mut live, &mut history, &motion);
            let repeated = reconciler.reconcile(&stunned, &mut live, &mut history, &motion);
            assert!(logs.lines_at("WARN").is_empty());

            let older = reconciler.reconcile(&at_three, &mut live, &mut history, &motion);
            (repeated, older)
        });

        assert!(repeated.is_stale());
        assert!(older.is_stale());
        assert_eq!(logs.lines_at("WARN").len(), 1);
        assert!(logs
            .lines_at("DEBUG")
            .iter()
            .any(|line| line.contains("reconciled tick")));
    }
}
