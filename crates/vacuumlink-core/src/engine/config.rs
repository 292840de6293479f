//! Engine configuration
//!
//! Everything the polling thread needs is fixed here, validated once, and
//! moved into the thread. Nothing is shared or mutated after start.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::protocol::{
    ConfigError, HandshakeTiming, PollMode, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS,
    MIN_MANUAL_INTERVAL_MS,
};

/// Default size of the event channel between the engine and its consumers
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u32 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Validated polling engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Polling discipline
    pub mode: PollMode,
    /// Host-driven interval, manual mode only
    #[serde(default)]
    pub manual_interval_ms: Option<u32>,
    /// Blocking read timeout of the transport
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u32,
    /// Serial line speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Handshake windows
    #[serde(default)]
    pub handshake: HandshakeTiming,
    /// Stop with an error when a fixed-cadence gauge goes silent this long
    #[serde(default)]
    pub idle_timeout_ms: Option<u32>,
    /// Events buffered per consumer before the oldest are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl EngineConfig {
    fn unchecked(mode: PollMode, manual_interval_ms: Option<u32>) -> Self {
        Self {
            mode,
            manual_interval_ms,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            baud_rate: DEFAULT_BAUD_RATE,
            handshake: HandshakeTiming::default(),
            idle_timeout_ms: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Build and validate a configuration for `mode`
    pub fn new(mode: PollMode, manual_interval_ms: Option<u32>) -> Result<Self, ConfigError> {
        let config = Self::unchecked(mode, manual_interval_ms);
        config.validate()?;
        Ok(config)
    }

    /// Gauge-paced readings every 100 ms
    pub fn fast_fixed() -> Self {
        Self::unchecked(PollMode::FastFixed, None)
    }

    /// Gauge-paced readings every second
    pub fn slow_fixed() -> Self {
        Self::unchecked(PollMode::SlowFixed, None)
    }

    /// Host-paced readings every `interval_ms`
    pub fn manual(interval_ms: u32) -> Result<Self, ConfigError> {
        Self::new(PollMode::Manual, Some(interval_ms))
    }

    /// Configuration from the operator's 1/2/3 menu choice
    pub fn from_selector(selector: u8, manual_interval_ms: Option<u32>) -> Result<Self, ConfigError> {
        Self::new(PollMode::from_selector(selector)?, manual_interval_ms)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Set the read timeout
    pub fn with_read_timeout_ms(mut self, read_timeout_ms: u32) -> Self {
        self.read_timeout_ms = read_timeout_ms;
        self
    }

    /// Set the handshake timing
    pub fn with_handshake(mut self, handshake: HandshakeTiming) -> Self {
        self.handshake = handshake;
        self
    }

    /// Enable the fixed-cadence stall check
    pub fn with_idle_timeout_ms(mut self, idle_timeout_ms: Option<u32>) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    /// Set the per-consumer event buffer
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Check every field combination. Runs before any port is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.mode, self.manual_interval_ms) {
            (PollMode::Manual, None) => return Err(ConfigError::MissingInterval),
            (PollMode::Manual, Some(ms)) if ms < MIN_MANUAL_INTERVAL_MS => {
                return Err(ConfigError::IntervalTooShort(ms))
            }
            (PollMode::FastFixed | PollMode::SlowFixed, Some(_)) => {
                return Err(ConfigError::UnexpectedInterval)
            }
            _ => {}
        }

        if self.read_timeout_ms == 0 {
            return Err(invalid("read_timeout_ms", "must be greater than zero"));
        }
        if self.baud_rate == 0 {
            return Err(invalid("baud_rate", "must be greater than zero"));
        }
        if self.handshake.ack_window_ms == 0 {
            return Err(invalid("handshake.ack_window_ms", "must be greater than zero"));
        }
        if self.idle_timeout_ms == Some(0) {
            return Err(invalid("idle_timeout_ms", "must be greater than zero"));
        }
        if self.channel_capacity == 0 {
            return Err(invalid("channel_capacity", "must be greater than zero"));
        }
        Ok(())
    }

    /// Manual interval as a duration, if any
    pub fn manual_interval(&self) -> Option<Duration> {
        self.manual_interval_ms
            .map(|ms| Duration::from_millis(ms as u64))
    }

    /// Transport read timeout as a duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms as u64)
    }

    /// Idle timeout as a duration, if enabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms
            .map(|ms| Duration::from_millis(ms as u64))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}
