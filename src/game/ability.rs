//! Authority-only ability resolution
//!
//! Disabling another entity is never predicted by the owner. Only the
//! authority runs this and publishes the result.

use super::input::Input;
use super::state::{is_disabled, PredictedState};
use super::tick::{Tick, TickSpan};

/// Ability constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbilityParams {
    /// How long a hit target stays disabled
    pub disable_duration: TickSpan,
}

/// Resolve the primary action of `actor` against `target` at `tick`.
///
/// Returns the target's new state if the ability landed.
pub fn resolve_ability(
    input: &Input,
    actor: &PredictedState,
    target: &PredictedState,
    tick: Tick,
    params: &AbilityParams,
) -> Option<PredictedState> {
    if !input.actions().primary || is_disabled(actor, tick) {
        return None;
    }

    Some(PredictedState {
        disabled_until: tick + params.disable_duration,
        ..*target
    })
}
