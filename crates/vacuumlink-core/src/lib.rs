//! # VacuumLink Core Library
//!
//! Pressure acquisition from serial vacuum gauges.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial transport with an in-memory stand-in for tests
//! - Line framing and measurement parsing for the gauge's ASCII protocol
//! - Mode negotiation (fixed 100 ms, fixed 1 s, host-paced manual)
//! - A polling engine publishing timestamped samples to any number of consumers
//! - Log file and live chart sinks
//! - A simulated gauge for running without hardware
//!
//! ## Example
//!
//! ```rust,no_run
//! use vacuumlink_core::prelude::*;
//!
//! let config = EngineConfig::manual(1500)?;
//! let engine = Engine::new(config)?;
//! let mut events = engine.subscribe();
//! let handle = engine.spawn_serial("/dev/ttyUSB0")?;
//!
//! while let Ok(event) = events.blocking_recv() {
//!     if let GaugeEvent::Sample(sample) = event {
//!         println!("{} mbar", sample.value);
//!     }
//! }
//! handle.join()?;
//! # Ok::<(), vacuumlink_core::protocol::GaugeError>(())
//! ```

pub mod cancellation;
pub mod datalog;
pub mod demo;
pub mod engine;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::datalog::{PressureLog, SampleHistory};
    pub use crate::demo::GaugeSimulator;
    pub use crate::engine::{
        Engine, EngineConfig, EngineHandle, EngineState, GaugeEvent, RunSummary, StopReason,
    };
    pub use crate::protocol::{
        GaugeError, MemoryTransport, PollMode, ProtocolEvent, Sample, SerialTransport, Transport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
