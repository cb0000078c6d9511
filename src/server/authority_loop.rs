//! Authoritative tick loop

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::game::{
    AuthorityError, EntityId, Input, PredictedState, RemoteAuthority, StateUpdate, Tick, TickClock,
    TickSource, Vec3,
};
use crate::util::time::{tick_duration, Timer};
use crate::ws::protocol::ServerMsg;

/// Radius of the ring new entities spawn on
const SPAWN_RADIUS: f32 = 10.0;

/// Events from sessions (and external timers) into the tick loop
#[derive(Debug)]
pub enum SessionEvent {
    /// Spawn an entity owned by a new session
    Join {
        entity_id: EntityId,
        reply: oneshot::Sender<Result<PredictedState, AuthorityError>>,
    },
    /// Owner input
    Input { entity_id: EntityId, input: Input },
    /// Owner disconnected
    Leave { entity_id: EntityId },
    /// Disable every entity (debug timer)
    StunAll,
}

/// Handle for talking to a running tick loop
#[derive(Clone)]
pub struct AuthorityHandle {
    pub event_tx: mpsc::Sender<SessionEvent>,
    pub state_tx: broadcast::Sender<ServerMsg>,
    pub clock: TickClock,
}

impl AuthorityHandle {
    pub fn current_tick(&self) -> Tick {
        self.clock.current_tick()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.state_tx.subscribe()
    }
}

/// Owns the [`RemoteAuthority`] and drives it at the configured tick rate
pub struct AuthorityLoop {
    authority: RemoteAuthority,
    clock: TickClock,
    event_rx: mpsc::Receiver<SessionEvent>,
    state_tx: broadcast::Sender<ServerMsg>,
    config: SimulationConfig,
    rng: ChaCha8Rng,
}

impl AuthorityLoop {
    pub fn new(config: SimulationConfig, seed: u64) -> (Self, AuthorityHandle) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (state_tx, _) = broadcast::channel(256);
        let clock = TickClock::new(config.tick_rate);

        let handle = AuthorityHandle {
            event_tx,
            state_tx: state_tx.clone(),
            clock: clock.clone(),
        };

        let authority_loop = Self {
            authority: RemoteAuthority::new(&config, &clock),
            clock,
            event_rx,
            state_tx,
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };

        (authority_loop, handle)
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(tick_rate = self.config.tick_rate, "Authority tick loop started");

        let budget = tick_duration(self.config.tick_rate);
        let mut tick_interval = interval(budget);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            let timer = Timer::new();
            if !self.step() {
                info!("All authority handles dropped, stopping tick loop");
                break;
            }

            if timer.elapsed() > budget {
                warn!(
                    tick = %self.clock.current_tick(),
                    elapsed_micros = timer.elapsed_micros(),
                    "Tick exceeded its time budget"
                );
            }
        }
    }

    /// Advance one tick: drain events, simulate, broadcast.
    ///
    /// Returns false once the event channel is closed.
    pub fn step(&mut self) -> bool {
        let tick = self.clock.advance();
        let open = self.process_events(tick);

        for update in self.authority.on_tick() {
            self.publish(update);
        }

        open
    }

    fn process_events(&mut self, tick: Tick) -> bool {
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => self.handle_event(event, tick),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle_event(&mut self, event: SessionEvent, tick: Tick) {
        match event {
            SessionEvent::Join { entity_id, reply } => {
                let spawn = self.spawn_state(tick);
                let result = self.authority.register(entity_id, spawn).map(|()| spawn);
                if result.is_ok() {
                    self.publish(StateUpdate {
                        entity_id,
                        state: spawn,
                    });
                }
                let _ = reply.send(result);
            }
            SessionEvent::Input { entity_id, input } => {
                if let Err(e) = self.authority.submit_input(entity_id, input) {
                    debug!(entity_id = %entity_id, error = %e, "Input not accepted");
                }
            }
            SessionEvent::Leave { entity_id } => {
                if self.authority.remove(entity_id).is_some() {
                    let _ = self.state_tx.send(ServerMsg::EntityLeft { entity_id });
                }
            }
            SessionEvent::StunAll => self.stun_all(tick),
        }
    }

    fn stun_all(&mut self, tick: Tick) {
        let until = tick + self.config.disable_duration;
        let ids: Vec<EntityId> = self.authority.entity_ids().collect();

        for entity_id in ids {
            match self.authority.disable(entity_id, until) {
                Ok(update) => self.publish(update),
                Err(e) => warn!(entity_id = %entity_id, error = %e, "Debug stun failed"),
            }
        }
        debug!(tick = %tick, until = %until, "Debug stun applied");
    }

    fn publish(&self, update: StateUpdate) {
        // No receivers just means nobody is connected
        let _ = self.state_tx.send(ServerMsg::State {
            entity_id: update.entity_id,
            state: update.state,
        });
    }

    fn spawn_state(&mut self, tick: Tick) -> PredictedState {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let position = Vec3::new(angle.cos() * SPAWN_RADIUS, 0.0, angle.sin() * SPAWN_RADIUS);
        PredictedState::at(position, tick)
    }

    pub fn authority(&self) -> &RemoteAuthority {
        &self.authority
    }
}

/// Periodically ask the tick loop to disable every entity.
///
/// Testing aid scheduled outside the simulation; never part of normal play.
pub fn spawn_debug_stun(handle: AuthorityHandle, every_ticks: u32, tick_rate: u32) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = tick_duration(tick_rate) * every_ticks.max(1);
        let mut timer = interval(period);
        // First tick completes immediately
        timer.tick().await;

        loop {
            timer.tick().await;
            if handle.event_tx.send(SessionEvent::StunAll).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Actions;
    use tokio_test::{assert_err, assert_ok};

    fn forward(tick: Tick) -> Input {
        Input::new(
            Actions {
                forward: true,
                ..Default::default()
            },
            tick,
        )
    }

    #[tokio::test]
    async fn test_join_then_input_is_broadcast() {
        let (mut authority_loop, handle) = AuthorityLoop::new(SimulationConfig::default(), 7);
        let mut states = handle.subscribe();
        let entity_id = EntityId::new();

        let (reply_tx, reply_rx) = oneshot::channel();
        assert_ok!(handle.event_tx.try_send(SessionEvent::Join { entity_id, reply: reply_tx }));
        assert!(authority_loop.step());

        let spawn = assert_ok!(assert_ok!(reply_rx.await));
        assert_eq!(spawn.tick, Tick::new(1));
        assert!(matches!(states.try_recv(), Ok(ServerMsg::State { .. })));

        assert_ok!(handle.event_tx.try_send(SessionEvent::Input {
            entity_id,
            input: forward(Tick::new(2)),
        }));
        authority_loop.step();

        match assert_ok!(states.try_recv()) {
            ServerMsg::State { entity_id: id, state } => {
                assert_eq!(id, entity_id);
                assert_eq!(state.tick, Tick::new(2));
                assert!(state.position.z > spawn.position.z);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_join_is_refused() {
        let (mut authority_loop, handle) = AuthorityLoop::new(SimulationConfig::default(), 7);
        let entity_id = EntityId::new();

        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        assert_ok!(handle.event_tx.try_send(SessionEvent::Join { entity_id, reply: first_tx }));
        assert_ok!(handle.event_tx.try_send(SessionEvent::Join { entity_id, reply: second_tx }));
        authority_loop.step();

        assert_ok!(assert_ok!(first_rx.await));
        assert_err!(assert_ok!(second_rx.await));
        assert_eq!(authority_loop.authority().entity_count(), 1);
    }

    #[tokio::test]
    async fn test_leave_and_stun_all() {
        let (mut authority_loop, handle) = AuthorityLoop::new(SimulationConfig::default(), 7);
        let mut states = handle.subscribe();
        let a = EntityId::new();
        let b = EntityId::new();

        for entity_id in [a, b] {
            let (reply, _) = oneshot::channel();
            assert_ok!(handle.event_tx.try_send(SessionEvent::Join { entity_id, reply }));
        }
        authority_loop.step();
        while states.try_recv().is_ok() {}

        assert_ok!(handle.event_tx.try_send(SessionEvent::StunAll));
        authority_loop.step();
        let stunned = authority_loop.authority().state(a).unwrap();
        assert_eq!(stunned.disabled_until, Tick::new(2) + SimulationConfig::default().disable_duration);

        assert_ok!(handle.event_tx.try_send(SessionEvent::Leave { entity_id: b }));
        authority_loop.step();
        assert_eq!(authority_loop.authority().entity_count(), 1);

        let mut saw_left = false;
        while let Ok(msg) = states.try_recv() {
            if let ServerMsg::EntityLeft { entity_id } = msg {
                assert_eq!(entity_id, b);
                saw_left = true;
            }
        }
        assert!(saw_left);
    }

    #[tokio::test]
    async fn test_step_reports_closed_channel() {
        let (mut authority_loop, handle) = AuthorityLoop::new(SimulationConfig::default(), 7);
        drop(handle);
        assert!(!authority_loop.step());
    }
}
