//! Predicted / authoritative entity state

use serde::{Deserialize, Serialize};

use super::tick::Tick;

/// Default squared-distance tolerance for position equality
pub const DEFAULT_POSITION_EPSILON_SQ: f32 = 1e-10;

/// Position in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &Vec3) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

/// Entity state at a tick. Plain value; behavior lives in free functions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictedState {
    pub position: Vec3,
    /// Tick this state was computed for
    pub tick: Tick,
    /// Entity is disabled while `tick < disabled_until`
    pub disabled_until: Tick,
}

impl PredictedState {
    pub fn at(position: Vec3, tick: Tick) -> Self {
        Self {
            position,
            tick,
            disabled_until: Tick::ZERO,
        }
    }
}

/// Returns true if the entity cannot act at `tick`
pub fn is_disabled(state: &PredictedState, tick: Tick) -> bool {
    state.disabled_until > tick
}

/// Which fields decide that a prediction went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceCheck {
    /// Compare positions only. Status changes are adopted silently.
    #[default]
    PositionOnly,
    /// A differing status expiry is also a misprediction
    PositionAndStatus,
}

/// Approximate equality used for misprediction detection
pub fn states_agree(
    predicted: &PredictedState,
    authoritative: &PredictedState,
    check: DivergenceCheck,
    epsilon_sq: f32,
) -> bool {
    let position_matches =
        predicted.position.distance_squared(&authoritative.position) < epsilon_sq;

    match check {
        DivergenceCheck::PositionOnly => position_matches,
        DivergenceCheck::PositionAndStatus => {
            position_matches && predicted.disabled_until == authoritative.disabled_until
        }
    }
}
