//! Deterministic network simulation for exercising prediction end to end

pub mod link;
pub mod session;

pub use link::{LinkConditions, LinkStats, SimulatedLink};
pub use session::{LoopbackSession, StepReport};
