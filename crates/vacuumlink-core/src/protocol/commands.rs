//! Polling mode commands
//!
//! Each polling discipline is entered with its own ASCII command.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::ConfigError;

/// Polling discipline negotiated with the gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    /// Gauge streams a reading every 100 ms (`COM,0`)
    FastFixed,

    /// Gauge streams a reading every second (`COM,1`)
    SlowFixed,

    /// Host picks the interval (`COM`)
    Manual,
}

impl PollMode {
    /// Map the operator's 1/2/3 menu choice to a mode
    pub fn from_selector(selector: u8) -> Result<Self, ConfigError> {
        match selector {
            1 => Ok(PollMode::FastFixed),
            2 => Ok(PollMode::SlowFixed),
            3 => Ok(PollMode::Manual),
            other => Err(ConfigError::InvalidMode(other)),
        }
    }

    /// The operator-facing menu number
    pub fn selector(&self) -> u8 {
        match self {
            PollMode::FastFixed => 1,
            PollMode::SlowFixed => 2,
            PollMode::Manual => 3,
        }
    }

    /// Bytes written to enter this mode
    pub fn command(&self) -> &'static [u8] {
        match self {
            PollMode::FastFixed => b"COM,0\r",
            PollMode::SlowFixed => b"COM,1\r",
            PollMode::Manual => b"COM\r",
        }
    }

    /// Whether the gauge answers the mode command with an ACK byte
    pub fn expects_ack(&self) -> bool {
        !matches!(self, PollMode::Manual)
    }

    /// Cadence at which the gauge transmits on its own, if it does
    pub fn instrument_period(&self) -> Option<Duration> {
        match self {
            PollMode::FastFixed => Some(Duration::from_millis(100)),
            PollMode::SlowFixed => Some(Duration::from_secs(1)),
            PollMode::Manual => None,
        }
    }
}

impl fmt::Display for PollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollMode::FastFixed => write!(f, "fixed 100ms"),
            PollMode::SlowFixed => write!(f, "fixed 1s"),
            PollMode::Manual => write!(f, "manual"),
        }
    }
}
