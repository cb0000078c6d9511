//! Tick identity and the tick source seam

use std::fmt;
use std::ops::Add;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One discrete simulation step.
///
/// Only ordering, equality and `Tick + TickSpan` are offered. There is no
/// implicit conversion from or to plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tick(i64);

impl Tick {
    /// Tick zero. Used as the "never disabled" status expiry.
    pub const ZERO: Tick = Tick(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw value, for logging and wire encoding
    pub const fn value(self) -> i64 {
        self.0
    }

    /// The tick immediately after this one
    pub fn next(self) -> Self {
        self + TickSpan::ONE
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative number of ticks, e.g. a status duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickSpan(u32);

impl TickSpan {
    pub const ONE: TickSpan = TickSpan(1);

    pub const fn new(ticks: u32) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> u32 {
        self.0
    }
}

impl Add<TickSpan> for Tick {
    type Output = Tick;

    fn add(self, span: TickSpan) -> Tick {
        Tick(self.0.saturating_add(i64::from(span.0)))
    }
}

/// Source of simulation time.
///
/// The scheduler that fires the per-tick callback owns the clock; simulation
/// code only reads it.
pub trait TickSource {
    /// Tick currently being simulated
    fn current_tick(&self) -> Tick;

    /// Ticks per second. Both endpoints must agree on it.
    fn tick_rate(&self) -> u32;

    /// Fixed simulation step in seconds
    fn tick_delta(&self) -> f32 {
        1.0 / self.tick_rate().max(1) as f32
    }
}

/// Shared, manually advanced tick counter.
///
/// Cloning yields another handle onto the same counter, so a scheduler can
/// advance it while simulation components read it.
#[derive(Debug, Clone)]
pub struct TickClock {
    current: Arc<AtomicI64>,
    tick_rate: u32,
}

impl TickClock {
    pub fn new(tick_rate: u32) -> Self {
        Self::starting_at(Tick::ZERO, tick_rate)
    }

    pub fn starting_at(tick: Tick, tick_rate: u32) -> Self {
        Self {
            current: Arc::new(AtomicI64::new(tick.value())),
            tick_rate: tick_rate.max(1),
        }
    }

    /// Move to the next tick and return it
    pub fn advance(&self) -> Tick {
        Tick(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Jump to an explicit tick (e.g. after syncing with a remote clock)
    pub fn set(&self, tick: Tick) {
        self.current.store(tick.value(), Ordering::Release);
    }
}

impl TickSource for TickClock {
    fn current_tick(&self) -> Tick {
        Tick(self.current.load(Ordering::Acquire))
    }

    fn tick_rate(&self) -> u32 {
        self.tick_rate
    }
}
