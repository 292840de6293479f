//! Data Logging
//!
//! Consumers of the engine's event stream: the append-only text log and the
//! in-memory series behind a live pressure chart.

mod format;
mod recorder;

pub use format::{
    format_event, format_record, format_timestamp, PressureLog, LOG_HEADER, TIMESTAMP_FORMAT,
};
pub use recorder::{AxisScale, ChartPoint, SampleHistory};

use chrono::{DateTime, Local};

use crate::engine::GaugeEvent;
use crate::protocol::ProtocolEvent;

/// Timestamp and raw text of an event that belongs in the log, if it does
pub fn loggable(event: &GaugeEvent) -> Option<(&DateTime<Local>, &str)> {
    match event {
        GaugeEvent::Sample(sample) => Some((&sample.timestamp, sample.raw_line.as_str())),
        GaugeEvent::Protocol(ProtocolEvent::MalformedLine {
            raw_line,
            timestamp,
            ..
        }) => Some((timestamp, raw_line.as_str())),
        GaugeEvent::Protocol(_) => None,
    }
}
