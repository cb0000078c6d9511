//! Remote authority: the single source of truth for entity state

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::config::SimulationConfig;

use super::ability::{resolve_ability, AbilityParams};
use super::input::Input;
use super::motion::{apply_motion, MotionParams};
use super::state::PredictedState;
use super::tick::{Tick, TickSource};
use super::EntityId;

/// An authoritative state change to replicate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateUpdate {
    pub entity_id: EntityId,
    pub state: PredictedState,
}

/// Authority errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    #[error("Entity already registered: {0}")]
    AlreadyRegistered(EntityId),

    #[error("Stale input for {entity_id}: tick {tick} is not newer than {last_accepted}")]
    StaleInput {
        entity_id: EntityId,
        tick: Tick,
        last_accepted: Tick,
    },

    #[error("Invalid ability target for {0}")]
    InvalidTarget(EntityId),
}

#[derive(Debug, Clone)]
struct EntityRecord {
    state: PredictedState,
    target: Option<EntityId>,
    last_accepted: Option<Tick>,
}

/// Applies owner inputs and resolves abilities.
///
/// Owners and their pending inputs are visited in entity id order so a tick
/// is reproducible given the same arrivals.
pub struct RemoteAuthority {
    entities: BTreeMap<EntityId, EntityRecord>,
    pending: BTreeMap<EntityId, Vec<Input>>,
    motion: MotionParams,
    ability: AbilityParams,
    reject_stale_inputs: bool,
}

impl RemoteAuthority {
    /// `clock` only provides the step size; the authority never reads the
    /// current tick, inputs carry their own.
    pub fn new<C: TickSource + ?Sized>(config: &SimulationConfig, clock: &C) -> Self {
        Self {
            entities: BTreeMap::new(),
            pending: BTreeMap::new(),
            motion: MotionParams::from_source(config.move_speed, clock),
            ability: AbilityParams {
                disable_duration: config.disable_duration,
            },
            reject_stale_inputs: config.reject_stale_inputs,
        }
    }

    /// Start simulating an entity.
    ///
    /// The newcomer targets the first other entity; entities without a target
    /// target the newcomer.
    pub fn register(&mut self, entity_id: EntityId, spawn: PredictedState) -> Result<(), AuthorityError> {
        if self.entities.contains_key(&entity_id) {
            return Err(AuthorityError::AlreadyRegistered(entity_id));
        }

        let target = self.entities.keys().next().copied();
        for record in self.entities.values_mut() {
            if record.target.is_none() {
                record.target = Some(entity_id);
            }
        }

        self.entities.insert(
            entity_id,
            EntityRecord {
                state: spawn,
                target,
                last_accepted: None,
            },
        );

        info!(entity_id = %entity_id, entities = self.entities.len(), "Entity registered");
        Ok(())
    }

    /// Stop simulating an entity, dropping its pending inputs
    pub fn remove(&mut self, entity_id: EntityId) -> Option<PredictedState> {
        let record = self.entities.remove(&entity_id)?;
        self.pending.remove(&entity_id);

        let replacement = self.entities.keys().next().copied();
        for (id, other) in self.entities.iter_mut() {
            if other.target == Some(entity_id) {
                other.target = replacement.filter(|r| r != id);
            }
        }

        info!(entity_id = %entity_id, entities = self.entities.len(), "Entity removed");
        Some(record.state)
    }

    /// Point `actor`'s ability at `target` (or at nothing)
    pub fn set_target(&mut self, actor: EntityId, target: Option<EntityId>) -> Result<(), AuthorityError> {
        if let Some(target_id) = target {
            if target_id == actor || !self.entities.contains_key(&target_id) {
                return Err(AuthorityError::InvalidTarget(actor));
            }
        }

        let record = self
            .entities
            .get_mut(&actor)
            .ok_or(AuthorityError::UnknownEntity(actor))?;
        record.target = target;
        Ok(())
    }

    /// Queue an input from the owner of `entity_id` for the next tick
    pub fn submit_input(&mut self, entity_id: EntityId, input: Input) -> Result<(), AuthorityError> {
        let record = self
            .entities
            .get_mut(&entity_id)
            .ok_or(AuthorityError::UnknownEntity(entity_id))?;

        if self.reject_stale_inputs {
            if let Some(last_accepted) = record.last_accepted {
                if input.tick() <= last_accepted {
                    warn!(
                        entity_id = %entity_id,
                        tick = %input.tick(),
                        last_accepted = %last_accepted,
                        "Rejecting stale input"
                    );
                    return Err(AuthorityError::StaleInput {
                        entity_id,
                        tick: input.tick(),
                        last_accepted,
                    });
                }
            }
        }
        record.last_accepted = Some(record.last_accepted.map_or(input.tick(), |t| t.max(input.tick())));

        self.pending.entry(entity_id).or_default().push(input);
        Ok(())
    }

    /// Apply every buffered input and return the states to publish.
    ///
    /// Inputs are applied in arrival order, each at its own embedded tick.
    /// Each changed entity appears once, with its final state for this tick.
    pub fn on_tick(&mut self) -> Vec<StateUpdate> {
        let pending = std::mem::take(&mut self.pending);
        let mut changed: BTreeMap<EntityId, PredictedState> = BTreeMap::new();

        for (entity_id, inputs) in pending {
            for input in inputs {
                let Some(record) = self.entities.get_mut(&entity_id) else {
                    break;
                };

                record.state = apply_motion(&input, &record.state, input.tick(), &self.motion);
                let actor = record.state;
                let target = record.target;
                changed.insert(entity_id, actor);

                if let Some(target_id) = target {
                    self.resolve_against(&input, &actor, target_id, &mut changed);
                }
            }
        }

        if !changed.is_empty() {
            debug!(published = changed.len(), "Authoritative states updated");
        }

        changed
            .into_iter()
            .map(|(entity_id, state)| StateUpdate { entity_id, state })
            .collect()
    }

    fn resolve_against(
        &mut self,
        input: &Input,
        actor: &PredictedState,
        target_id: EntityId,
        changed: &mut BTreeMap<EntityId, PredictedState>,
    ) {
        let Some(target) = self.entities.get_mut(&target_id) else {
            return;
        };

        if let Some(hit) = resolve_ability(input, actor, &target.state, input.tick(), &self.ability) {
            info!(
                target_id = %target_id,
                tick = %input.tick(),
                disabled_until = %hit.disabled_until,
                "Target disabled"
            );
            target.state = hit;
            changed.insert(target_id, hit);
        }
    }

    /// Disable an entity until `until`, outside of any input.
    ///
    /// Used by externally scheduled effects (e.g. a debug stun timer).
    pub fn disable(&mut self, entity_id: EntityId, until: Tick) -> Result<StateUpdate, AuthorityError> {
        let record = self
            .entities
            .get_mut(&entity_id)
            .ok_or(AuthorityError::UnknownEntity(entity_id))?;

        record.state.disabled_until = until;
        Ok(StateUpdate {
            entity_id,
            state: record.state,
        })
    }

    pub fn state(&self, entity_id: EntityId) -> Option<&PredictedState> {
        self.entities.get(&entity_id).map(|r| &r.state)
    }

    pub fn target(&self, entity_id: EntityId) -> Option<EntityId> {
        self.entities.get(&entity_id).and_then(|r| r.target)
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Inputs waiting for the next tick, across all owners
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}
