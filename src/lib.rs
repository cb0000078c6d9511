//! Tick-based client prediction with server reconciliation
//!
//! - `game`: the prediction core (predictor, reconciler, authority, shared
//!   motion and ability functions)
//! - `netsim`: seeded lossy links for driving both endpoints in-process
//! - `server`, `ws`, `http`, `app`: the authoritative websocket server
//! - `config`, `util`: environment configuration and helpers

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod netsim;
pub mod server;
pub mod util;
pub mod ws;
