//! Registry of connected websocket sessions

use dashmap::DashMap;

use crate::game::EntityId;
use crate::util::time::unix_millis;

/// A connected owner
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub entity_id: EntityId,
    pub connected_at: u64,
    /// Inputs dropped by the rate limiter
    pub inputs_limited: u64,
}

/// Connected sessions, keyed by the entity they own
pub struct SessionRegistry {
    sessions: DashMap<EntityId, SessionInfo>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn insert(&self, entity_id: EntityId) {
        self.sessions.insert(
            entity_id,
            SessionInfo {
                entity_id,
                connected_at: unix_millis(),
                inputs_limited: 0,
            },
        );
    }

    pub fn remove(&self, entity_id: &EntityId) -> Option<SessionInfo> {
        self.sessions.remove(entity_id).map(|(_, info)| info)
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<SessionInfo> {
        self.sessions.get(entity_id).map(|s| s.value().clone())
    }

    pub fn record_limited(&self, entity_id: &EntityId) {
        if let Some(mut session) = self.sessions.get_mut(entity_id) {
            session.inputs_limited += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Total inputs dropped by rate limiting across connected sessions
    pub fn total_limited(&self) -> u64 {
        self.sessions.iter().map(|s| s.value().inputs_limited).sum()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
