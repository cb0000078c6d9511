//! Sampled player input

use serde::{Deserialize, Serialize};

use super::tick::Tick;

/// Logical actions polled once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Actions {
    pub forward: bool,
    pub backward: bool,
    pub strafe_left: bool,
    pub strafe_right: bool,
    /// Fire the disabling ability at the current target
    pub primary: bool,
}

impl Actions {
    pub const NONE: Actions = Actions {
        forward: false,
        backward: false,
        strafe_left: false,
        strafe_right: false,
        primary: false,
    };

    /// True if any action is held
    pub fn any(&self) -> bool {
        self.forward || self.backward || self.strafe_left || self.strafe_right || self.primary
    }
}

/// Input for one tick of one entity. Immutable once sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    actions: Actions,
    tick: Tick,
}

impl Input {
    pub fn new(actions: Actions, tick: Tick) -> Self {
        Self { actions, tick }
    }

    /// "No input this tick"
    pub fn idle(tick: Tick) -> Self {
        Self::new(Actions::NONE, tick)
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    /// Tick the input was sampled at. Authoritative for every consumer.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Whether anything was pressed
    pub fn is_set(&self) -> bool {
        self.actions.any()
    }
}

/// Input polling failure
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Input device unavailable: {0}")]
    Unavailable(String),
}

/// Raw action state provider (keyboard, gamepad, scripted bot...)
pub trait InputSource {
    fn sample(&mut self) -> Result<Actions, InputError>;
}

impl<F> InputSource for F
where
    F: FnMut() -> Result<Actions, InputError>,
{
    fn sample(&mut self) -> Result<Actions, InputError> {
        self()
    }
}

/// Replays a fixed list of actions, then reports no input
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    script: std::collections::VecDeque<Actions>,
}

impl ScriptedInput {
    pub fn new(script: impl IntoIterator<Item = Actions>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Queue more actions after the current script
    pub fn extend(&mut self, actions: impl IntoIterator<Item = Actions>) {
        self.script.extend(actions);
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self) -> Result<Actions, InputError> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
