//! Gauge Serial Protocol
//!
//! Implements the line-oriented ASCII protocol spoken by TPG-361 class
//! vacuum gauges: mode commands terminated by `\r`, a single `0x06` byte as
//! acknowledgement, and `\n`-terminated `<status>,<value>` measurement lines.

pub mod commands;
mod error;
pub mod framer;
pub mod handshake;
pub mod memory;
pub mod parser;
pub mod serial;
pub mod transport;

pub use commands::PollMode;
pub use error::{ConfigError, GaugeError};
pub use framer::{Frame, LineFramer};
pub use handshake::{clear_input, negotiate, Handshake, HandshakeTiming};
pub use memory::MemoryTransport;
pub use parser::{parse_line, LineKind, MalformedReason, ProtocolEvent, Sample};
pub use serial::{list_ports, PortInfo};
pub use transport::{ReadOutcome, SerialTransport, Transport};

/// Default baud rate for gauge communication
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default blocking read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u32 = 1000;

/// Acknowledgement byte sent by the gauge after a mode command
pub const ACK: u8 = 0x06;

/// Shortest host-driven interval the gauge can keep up with
pub const MIN_MANUAL_INTERVAL_MS: u32 = 1100;
