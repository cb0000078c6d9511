//! One-directional simulated network link

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::game::{Tick, TickSpan};

/// Delay and loss characteristics of a link
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConditions {
    /// Fixed delay in ticks
    pub latency: u32,
    /// Up to this many extra ticks of random delay; reorders messages
    pub jitter: u32,
    /// Probability (0..=1) that a message is lost
    pub loss: f64,
}

impl LinkConditions {
    /// Delivered on the same tick, in order, never lost
    pub const fn perfect() -> Self {
        Self {
            latency: 0,
            jitter: 0,
            loss: 0.0,
        }
    }

    pub const fn delayed(latency: u32) -> Self {
        Self {
            latency,
            jitter: 0,
            loss: 0.0,
        }
    }
}

impl Default for LinkConditions {
    fn default() -> Self {
        Self::perfect()
    }
}

#[derive(Debug)]
struct InFlight<T> {
    deliver_at: Tick,
    seq: u64,
    msg: T,
}

/// Counters for a link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
}

/// Seeded, deterministic lossy link
#[derive(Debug)]
pub struct SimulatedLink<T> {
    conditions: LinkConditions,
    rng: ChaCha8Rng,
    in_flight: Vec<InFlight<T>>,
    next_seq: u64,
    stats: LinkStats,
}

impl<T> SimulatedLink<T> {
    pub fn new(conditions: LinkConditions, seed: u64) -> Self {
        Self {
            conditions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            in_flight: Vec::new(),
            next_seq: 0,
            stats: LinkStats::default(),
        }
    }

    /// Change conditions for messages sent from now on
    pub fn set_conditions(&mut self, conditions: LinkConditions) {
        self.conditions = conditions;
    }

    /// Put a message on the wire at `now`. Returns false if it was lost.
    pub fn send(&mut self, now: Tick, msg: T) -> bool {
        self.stats.sent += 1;

        if self.conditions.loss > 0.0 && self.rng.gen_bool(self.conditions.loss.clamp(0.0, 1.0)) {
            self.stats.dropped += 1;
            return false;
        }

        let jitter = if self.conditions.jitter > 0 {
            self.rng.gen_range(0..=self.conditions.jitter)
        } else {
            0
        };
        let deliver_at = now + TickSpan::new(self.conditions.latency + jitter);

        self.in_flight.push(InFlight {
            deliver_at,
            seq: self.next_seq,
            msg,
        });
        self.next_seq += 1;
        true
    }

    /// Take every message due at or before `now`, in arrival order
    pub fn deliver(&mut self, now: Tick) -> Vec<T> {
        let (mut due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|m| m.deliver_at <= now);
        self.in_flight = waiting;

        due.sort_by_key(|m| (m.deliver_at, m.seq));
        self.stats.delivered += due.len() as u64;
        due.into_iter().map(|m| m.msg).collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }
}
