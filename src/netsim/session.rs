//! One owner and one authority wired through simulated links

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::config::SimulationConfig;
use crate::game::{
    Actions, EntityId, InputEnvelope, LocalPredictor, PredictedState, ReconcileOutcome,
    RemoteAuthority, Replicated, ScriptedInput, Subscription, Tick, TickClock, TickSource, Vec3,
};

use super::link::{LinkConditions, SimulatedLink};

type OwnerPredictor = LocalPredictor<TickClock, ScriptedInput, Vec<InputEnvelope>>;

/// What happened during one simulated tick
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub tick: Tick,
    pub predicted: Option<PredictedState>,
    pub inputs_applied: usize,
    pub inputs_rejected: usize,
    pub outcomes: Vec<ReconcileOutcome>,
}

/// Owner endpoint + authority endpoint stepping in lock-step over lossy links.
///
/// Authoritative states reach the owner through a [`Replicated`] value whose
/// listener runs the reconciler, the same way a replication layer would.
pub struct LoopbackSession {
    clock: TickClock,
    entity_id: EntityId,
    predictor: Arc<Mutex<OwnerPredictor>>,
    authority: RemoteAuthority,
    uplink: SimulatedLink<InputEnvelope>,
    downlink: SimulatedLink<PredictedState>,
    replicated: Replicated<PredictedState>,
    outcomes: Arc<Mutex<Vec<ReconcileOutcome>>>,
    _subscription: Subscription,
}

impl LoopbackSession {
    pub fn new(config: &SimulationConfig, uplink: LinkConditions, downlink: LinkConditions, seed: u64) -> Self {
        let clock = TickClock::new(config.tick_rate);
        let entity_id = EntityId::new();
        let spawn = PredictedState::at(Vec3::ZERO, Tick::ZERO);

        let mut authority = RemoteAuthority::new(config, &clock);
        if let Err(e) = authority.register(entity_id, spawn) {
            warn!(error = %e, "Loopback registration failed");
        }

        let predictor = Arc::new(Mutex::new(LocalPredictor::new(
            entity_id,
            spawn,
            clock.clone(),
            ScriptedInput::default(),
            Vec::new(),
            config,
        )));

        let replicated = Replicated::new(spawn);
        let outcomes = Arc::new(Mutex::new(Vec::new()));

        let subscription = {
            let predictor = predictor.clone();
            let outcomes = outcomes.clone();
            replicated.subscribe(move |_previous: &PredictedState, current: &PredictedState| {
                let outcome = predictor.lock().on_authoritative_update(current);
                outcomes.lock().push(outcome);
            })
        };

        Self {
            clock,
            entity_id,
            predictor,
            authority,
            uplink: SimulatedLink::new(uplink, seed),
            downlink: SimulatedLink::new(downlink, seed.wrapping_add(1)),
            replicated,
            outcomes,
            _subscription: subscription,
        }
    }

    /// Queue actions for the owner's next ticks
    pub fn queue_actions(&self, actions: impl IntoIterator<Item = Actions>) {
        self.predictor.lock().input_source_mut().extend(actions);
    }

    /// Advance both endpoints by one tick
    pub fn step(&mut self) -> StepReport {
        let tick = self.clock.advance();
        let mut report = StepReport {
            tick,
            ..Default::default()
        };

        // Owner: sample, predict, send
        let outgoing = {
            let mut predictor = self.predictor.lock();
            report.predicted = predictor.on_tick();
            std::mem::take(predictor.sink_mut())
        };
        for envelope in outgoing {
            self.uplink.send(tick, envelope);
        }

        // Authority: receive, simulate, publish
        for envelope in self.uplink.deliver(tick) {
            match self.authority.submit_input(envelope.entity_id, envelope.input) {
                Ok(()) => report.inputs_applied += 1,
                Err(e) => {
                    debug!(error = %e, "Authority rejected input");
                    report.inputs_rejected += 1;
                }
            }
        }
        for update in self.authority.on_tick() {
            if update.entity_id == self.entity_id {
                self.downlink.send(tick, update.state);
            }
        }

        // Owner: replicated value changes drive reconciliation
        for state in self.downlink.deliver(tick) {
            self.replicated.set(state);
        }
        report.outcomes = std::mem::take(&mut *self.outcomes.lock());

        report
    }

    /// Step `ticks` times, returning every report
    pub fn run(&mut self, ticks: usize) -> Vec<StepReport> {
        (0..ticks).map(|_| self.step()).collect()
    }

    pub fn set_uplink(&mut self, conditions: LinkConditions) {
        self.uplink.set_conditions(conditions);
    }

    pub fn set_downlink(&mut self, conditions: LinkConditions) {
        self.downlink.set_conditions(conditions);
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn current_tick(&self) -> Tick {
        self.clock.current_tick()
    }

    pub fn owner_position(&self) -> Vec3 {
        self.predictor.lock().position()
    }

    pub fn predictor(&self) -> MutexGuard<'_, OwnerPredictor> {
        self.predictor.lock()
    }

    pub fn authority(&self) -> &RemoteAuthority {
        &self.authority
    }

    /// Authoritative state of the owned entity
    pub fn authority_state(&self) -> Option<PredictedState> {
        self.authority.state(self.entity_id).copied()
    }

    /// Last authoritative state that reached the owner
    pub fn replicated_state(&self) -> PredictedState {
        self.replicated.get()
    }

    pub fn uplink(&self) -> &SimulatedLink<InputEnvelope> {
        &self.uplink
    }

    pub fn downlink(&self) -> &SimulatedLink<PredictedState> {
        &self.downlink
    }
}
