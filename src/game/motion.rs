//! Deterministic movement shared by predictor, authority and replay

use super::input::Input;
use super::state::{is_disabled, PredictedState};
use super::tick::{Tick, TickSource};

/// Movement constants for one entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionParams {
    /// Units per second along each axis
    pub speed: f32,
    /// Fixed step in seconds
    pub delta: f32,
}

impl MotionParams {
    pub fn new(speed: f32, delta: f32) -> Self {
        Self { speed, delta }
    }

    /// Step size taken from the tick source driving the simulation
    pub fn from_source<C: TickSource + ?Sized>(speed: f32, source: &C) -> Self {
        Self::new(speed, source.tick_delta())
    }

    /// Distance covered per active direction per tick
    pub fn step(&self) -> f32 {
        self.speed * self.delta
    }
}

/// Advance `current` by one tick of `input`, stamping the result with `tick`.
///
/// Must stay bit-for-bit deterministic: the authority, the predictor and every
/// replay pass run exactly this code with exactly these operations in this
/// order.
pub fn apply_motion(
    input: &Input,
    current: &PredictedState,
    tick: Tick,
    params: &MotionParams,
) -> PredictedState {
    let mut next = PredictedState {
        tick,
        ..*current
    };

    if !input.is_set() || is_disabled(current, tick) {
        return next;
    }

    let step = params.step();
    let actions = input.actions();
    let position = &mut next.position;

    if actions.forward {
        position.z += step;
    }
    if actions.backward {
        position.z -= step;
    }
    if actions.strafe_left {
        position.x -= step;
    }
    if actions.strafe_right {
        position.x += step;
    }

    next
}
