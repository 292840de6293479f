//! Protocol errors

use thiserror::Error;

/// Configuration rejected before any I/O takes place
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Mode selector outside 1..=3
    #[error("Invalid mode selector {0}: valid values are 1, 2, 3")]
    InvalidMode(u8),

    /// Manual mode without an interval
    #[error("Manual mode requires an interval")]
    MissingInterval,

    /// Manual interval below the gauge's minimum
    #[error("Interval {0}ms is too short: manual mode needs at least {min}ms", min = super::MIN_MANUAL_INTERVAL_MS)]
    IntervalTooShort(u32),

    /// Interval given for a fixed-cadence mode
    #[error("Interval is only accepted in manual mode")]
    UnexpectedInterval,

    /// Configuration file could not be read or decoded
    #[error("Invalid configuration file: {0}")]
    Parse(String),

    /// A field holds an unusable value
    #[error("Invalid {field}: {reason}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Errors that can stop the polling engine
#[derive(Error, Debug)]
pub enum GaugeError {
    /// Configuration rejected before any I/O
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The serial port could not be opened or configured
    #[error("Port unavailable: {port}: {reason}")]
    PortUnavailable {
        /// Port name as given
        port: String,
        /// Error reported by the OS
        reason: String,
    },

    /// No ACK within the handshake window (ms)
    #[error("No acknowledgement from gauge within {0}ms")]
    HandshakeTimeout(u32),

    /// A fixed-cadence gauge went silent for this long (ms)
    #[error("No data from gauge for {0}ms")]
    IdleTimeout(u32),

    /// The gauge side closed the connection
    #[error("Gauge closed the stream")]
    EndOfStream,

    /// The engine was started twice
    #[error("Engine is already running")]
    AlreadyRunning,

    /// The transport has already been closed
    #[error("Not connected to gauge")]
    NotConnected,

    /// Read or write failure, e.g. the adapter was unplugged
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GaugeError {
    /// Errors raised before the port was ever touched
    pub fn is_config(&self) -> bool {
        matches!(self, GaugeError::Config(_))
    }
}
