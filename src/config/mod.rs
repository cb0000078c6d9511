//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::history::DEFAULT_HISTORY_CAPACITY;
use crate::game::state::{DivergenceCheck, DEFAULT_POSITION_EPSILON_SQ};
use crate::game::tick::TickSpan;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated, `*` for any)
    pub client_origin: String,
    /// Simulation constants shared with clients
    pub simulation: SimulationConfig,
}

/// Constants both endpoints must agree on, plus authority hardening knobs
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Ticks per second
    pub tick_rate: u32,
    /// Movement speed in units per second
    pub move_speed: f32,
    /// How long the primary ability disables its target
    pub disable_duration: TickSpan,
    /// Squared distance below which two positions are considered equal
    pub position_epsilon_sq: f32,
    /// Whether a differing status expiry counts as a misprediction
    pub divergence_check: DivergenceCheck,
    /// Reject inputs whose tick is not newer than the last accepted one
    pub reject_stale_inputs: bool,
    /// Max input messages per second per session
    pub input_rate_limit: u32,
    /// Max unacknowledged ticks remembered by a predictor
    pub history_capacity: usize,
    /// Periodically disable every entity (testing aid, off when `None`)
    pub debug_stun_every: Option<TickSpan>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            move_speed: 5.0,
            disable_duration: TickSpan::new(90),
            position_epsilon_sq: DEFAULT_POSITION_EPSILON_SQ,
            divergence_check: DivergenceCheck::PositionOnly,
            reject_stale_inputs: true,
            input_rate_limit: 120,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            debug_stun_every: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            simulation: SimulationConfig::from_env()?,
        })
    }
}

impl SimulationConfig {
    /// Read overrides from the environment, keeping defaults for unset vars
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let tick_rate: u32 = parse_var("TICK_RATE", defaults.tick_rate)?;
        if tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }

        let compare_status: bool = parse_var("COMPARE_STATUS_EXPIRY", false)?;
        let stun_every: u32 = parse_var("DEBUG_STUN_EVERY_TICKS", 0)?;

        Ok(Self {
            tick_rate,
            move_speed: parse_var("MOVE_SPEED", defaults.move_speed)?,
            disable_duration: TickSpan::new(parse_var(
                "DISABLE_DURATION_TICKS",
                defaults.disable_duration.ticks(),
            )?),
            position_epsilon_sq: parse_var("POSITION_EPSILON_SQ", defaults.position_epsilon_sq)?,
            divergence_check: if compare_status {
                DivergenceCheck::PositionAndStatus
            } else {
                DivergenceCheck::PositionOnly
            },
            reject_stale_inputs: parse_var("REJECT_STALE_INPUTS", defaults.reject_stale_inputs)?,
            input_rate_limit: parse_var("INPUT_RATE_LIMIT", defaults.input_rate_limit)?,
            history_capacity: parse_var("HISTORY_CAPACITY", defaults.history_capacity)?,
            debug_stun_every: (stun_every > 0).then(|| TickSpan::new(stun_every)),
        })
    }
}

/// Parse an optional env var, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_tuning() {
        let sim = SimulationConfig::default();
        assert_eq!(sim.tick_rate, 60);
        assert_eq!(sim.move_speed, 5.0);
        assert_eq!(sim.divergence_check, DivergenceCheck::PositionOnly);
        assert!(sim.debug_stun_every.is_none());
    }

    #[test]
    fn test_parse_var_falls_back_when_unset() {
        let value: u32 = parse_var("TICK_PREDICTION_TEST_SURELY_UNSET", 42).unwrap();
        assert_eq!(value, 42);
    }
}
