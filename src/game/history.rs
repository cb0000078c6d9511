//! Paired input/state history kept by the owning endpoint

use std::collections::{BTreeMap, VecDeque};

use super::input::Input;
use super::state::PredictedState;
use super::tick::Tick;

/// Suggested capacity: ~17 seconds of unacknowledged ticks at 60Hz
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

/// Input history plus the state predicted for each of those inputs.
///
/// Both collections always hold exactly the same set of ticks, and inputs are
/// kept in ascending tick order.
#[derive(Debug, Clone)]
pub struct PredictionHistory {
    inputs: VecDeque<Input>,
    states: BTreeMap<Tick, PredictedState>,
    capacity: usize,
}

impl PredictionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            inputs: VecDeque::new(),
            states: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Remember a predicted tick.
    ///
    /// Returns false (and records nothing) if the tick is not newer than the
    /// latest recorded one or if `state` was computed for a different tick.
    pub fn record(&mut self, input: Input, state: PredictedState) -> bool {
        if state.tick != input.tick() {
            return false;
        }
        if self.latest_tick().is_some_and(|latest| input.tick() <= latest) {
            return false;
        }

        self.inputs.push_back(input);
        self.states.insert(input.tick(), state);

        // Never acknowledged for too long: forget the oldest pair
        while self.inputs.len() > self.capacity {
            if let Some(evicted) = self.inputs.pop_front() {
                self.states.remove(&evicted.tick());
            }
        }
        true
    }

    pub fn state_at(&self, tick: Tick) -> Option<&PredictedState> {
        self.states.get(&tick)
    }

    /// Re-run every input newer than `after`, starting from `base`.
    ///
    /// `step` produces the state for one input given the previous state; each
    /// result overwrites the stored prediction for that tick. Returns the last
    /// produced state (or `base` if nothing was newer) and the replay count.
    pub fn replay_after<F>(&mut self, after: Tick, base: PredictedState, mut step: F) -> (PredictedState, usize)
    where
        F: FnMut(&Input, &PredictedState) -> PredictedState,
    {
        let mut current = base;
        let mut replayed = 0;

        for input in self.inputs.iter().filter(|input| input.tick() > after) {
            current = step(input, &current);
            self.states.insert(input.tick(), current);
            replayed += 1;
        }

        (current, replayed)
    }

    /// Drop every input and state at or before `tick`. Returns how many pairs
    /// were removed.
    pub fn prune_through(&mut self, tick: Tick) -> usize {
        let mut removed = 0;
        while self.inputs.front().is_some_and(|input| input.tick() <= tick) {
            if let Some(input) = self.inputs.pop_front() {
                self.states.remove(&input.tick());
                removed += 1;
            }
        }
        removed
    }

    pub fn latest_tick(&self) -> Option<Tick> {
        self.inputs.back().map(Input::tick)
    }

    pub fn oldest_tick(&self) -> Option<Tick> {
        self.inputs.front().map(Input::tick)
    }

    /// Ticks currently held by the input side
    pub fn input_ticks(&self) -> Vec<Tick> {
        self.inputs.iter().map(Input::tick).collect()
    }

    /// Ticks currently held by the state side
    pub fn state_ticks(&self) -> Vec<Tick> {
        self.states.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl Default for PredictionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
