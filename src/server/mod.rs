//! Authority server: tick loop and session bookkeeping

pub mod authority_loop;
pub mod sessions;

pub use authority_loop::{spawn_debug_stun, AuthorityHandle, AuthorityLoop, SessionEvent};
pub use sessions::{SessionInfo, SessionRegistry};
