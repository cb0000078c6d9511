//! WebSocket transport for the authority server

pub mod handler;
pub mod protocol;
