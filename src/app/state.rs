//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::server::{AuthorityHandle, SessionRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub authority: AuthorityHandle,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config, authority: AuthorityHandle) -> Self {
        Self {
            config: Arc::new(config),
            authority,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }
}
