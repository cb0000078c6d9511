//! Prediction, reconciliation and authoritative simulation

pub mod ability;
pub mod authority;
pub mod history;
pub mod input;
pub mod motion;
pub mod predictor;
pub mod reconcile;
pub mod replication;
pub mod state;
pub mod tick;
pub mod transport;

pub use authority::{AuthorityError, RemoteAuthority, StateUpdate};
pub use input::{Actions, Input, InputError, InputSource, ScriptedInput};
pub use predictor::LocalPredictor;
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use replication::{Replicated, Subscription};
pub use state::{DivergenceCheck, PredictedState, Vec3};
pub use tick::{Tick, TickClock, TickSource, TickSpan};
pub use transport::{InputEnvelope, InputSink};

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a simulated entity. On the authority it also identifies the
/// owner allowed to submit input for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
