//! Local prediction on the input-owning endpoint

use tracing::{debug, trace};

use crate::config::SimulationConfig;

use super::history::PredictionHistory;
use super::input::{Actions, Input, InputSource};
use super::motion::{apply_motion, MotionParams};
use super::reconcile::{ReconcileOutcome, Reconciler};
use super::state::{PredictedState, Vec3};
use super::tick::{Tick, TickSource};
use super::transport::InputSink;
use super::EntityId;

/// Predicts an owned entity locally and reconciles it with the authority.
///
/// Drive it with [`LocalPredictor::on_tick`] once per scheduler tick and
/// [`LocalPredictor::on_authoritative_update`] whenever the replicated state
/// for this entity changes. Both must be called from the same thread.
pub struct LocalPredictor<C, I, S> {
    entity_id: EntityId,
    clock: C,
    input: I,
    sink: S,
    motion: MotionParams,
    live: PredictedState,
    history: PredictionHistory,
    reconciler: Reconciler,
}

impl<C, I, S> LocalPredictor<C, I, S>
where
    C: TickSource,
    I: InputSource,
    S: InputSink,
{
    pub fn new(
        entity_id: EntityId,
        spawn: PredictedState,
        clock: C,
        input: I,
        sink: S,
        config: &SimulationConfig,
    ) -> Self {
        let motion = MotionParams::from_source(config.move_speed, &clock);
        Self {
            entity_id,
            clock,
            input,
            sink,
            motion,
            live: spawn,
            history: PredictionHistory::new(config.history_capacity),
            reconciler: Reconciler::new(config.divergence_check, config.position_epsilon_sq),
        }
    }

    /// Sample, send and predict the current tick.
    ///
    /// Returns the newly predicted state, or `None` if the current tick was
    /// already predicted (the scheduler fired twice or went backwards).
    pub fn on_tick(&mut self) -> Option<PredictedState> {
        let tick = self.clock.current_tick();
        if tick <= self.live.tick {
            debug!(entity_id = %self.entity_id, tick = %tick, "Tick already predicted, skipping");
            return None;
        }

        let actions = match self.input.sample() {
            Ok(actions) => actions,
            Err(e) => {
                debug!(entity_id = %self.entity_id, error = %e, "Input sampling failed, treating as idle");
                Actions::NONE
            }
        };
        let input = Input::new(actions, tick);

        self.sink.send_input(self.entity_id, input);

        let predicted = apply_motion(&input, &self.live, tick, &self.motion);
        self.history.record(input, predicted);
        self.live = predicted;

        trace!(
            entity_id = %self.entity_id,
            tick = %tick,
            z = predicted.position.z,
            x = predicted.position.x,
            "Predicted tick"
        );
        Some(predicted)
    }

    /// Reconcile against a freshly replicated authoritative state
    pub fn on_authoritative_update(&mut self, authoritative: &PredictedState) -> ReconcileOutcome {
        self.reconciler
            .reconcile(authoritative, &mut self.live, &mut self.history, &self.motion)
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Visible position, readable by rendering at any time
    pub fn position(&self) -> Vec3 {
        self.live.position
    }

    pub fn live_state(&self) -> &PredictedState {
        &self.live
    }

    pub fn history(&self) -> &PredictionHistory {
        &self.history
    }

    pub fn last_reconciled(&self) -> Option<Tick> {
        self.reconciler.last_reconciled()
    }

    pub fn corrections(&self) -> u64 {
        self.reconciler.corrections()
    }

    pub fn input_source_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
