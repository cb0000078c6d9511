//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::{EntityId, Input, PredictedState, Tick};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Owner input for one tick of its entity
    Input {
        /// Carries its own sample tick; the server never re-stamps it
        input: Input,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once after the session's entity is spawned
    Welcome {
        entity_id: EntityId,
        /// Ticks per second; the client must simulate at the same rate
        tick_rate: u32,
        /// Server tick at spawn, for clock alignment
        tick: Tick,
        move_speed: f32,
        spawn: PredictedState,
        server_time: u64,
    },

    /// Authoritative state of one entity
    State {
        entity_id: EntityId,
        state: PredictedState,
    },

    /// Entity removed (owner disconnected)
    EntityLeft {
        entity_id: EntityId,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}
