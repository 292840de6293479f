//! Pressure log file format
//!
//! One header line per session followed by one record per measurement line:
//!
//! ```text
//! #    [DateTime]             Pressure [mBar]
//! [2025-05-09 14:03:27.512]   0,1.2300E-03
//! ```

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use super::loggable;
use crate::engine::GaugeEvent;
use crate::protocol::ProtocolEvent;

/// Written once at the start of every session
pub const LOG_HEADER: &str = "#    [DateTime]             Pressure [mBar]\n";

/// `yyyy-MM-dd HH:mm:ss.SSS`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Render a timestamp the way log records show it
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Render one log record, newline included
pub fn format_record(timestamp: &DateTime<Local>, raw_line: &str) -> String {
    format!("[{}]   {}\n", format_timestamp(timestamp), raw_line)
}

/// Render any event as one terminal line, newline included.
///
/// Samples and malformed lines carry their capture time; the other
/// protocol events are stamped with `now`.
pub fn format_event(event: &GaugeEvent, now: &DateTime<Local>) -> String {
    match event {
        GaugeEvent::Sample(sample) => format_record(&sample.timestamp, &sample.raw_line),
        GaugeEvent::Protocol(ProtocolEvent::MalformedLine {
            raw_line,
            reason,
            timestamp,
        }) => format!(
            "[{}]   {}   (malformed: {})\n",
            format_timestamp(timestamp),
            raw_line,
            reason
        ),
        GaugeEvent::Protocol(ProtocolEvent::Ack) => format_record(now, "ACK"),
        GaugeEvent::Protocol(ProtocolEvent::Timeout) => format_record(now, "(no reading)"),
        GaugeEvent::Protocol(ProtocolEvent::EndOfStream) => {
            format_record(now, "(gauge closed the stream)")
        }
    }
}

/// Append-only pressure log
pub struct PressureLog<W: Write> {
    writer: W,
    records: u64,
}

impl PressureLog<File> {
    /// Open (or create) `path` for appending and start a new session
    pub fn append<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::new(file)
    }
}

impl<W: Write> PressureLog<W> {
    /// Start a session on `writer` by writing the header
    pub fn new(mut writer: W) -> io::Result<Self> {
        writer.write_all(LOG_HEADER.as_bytes())?;
        writer.flush()?;
        Ok(Self { writer, records: 0 })
    }

    /// Write a record for `event` if it is a sample or a malformed line.
    ///
    /// Each record is flushed immediately so a crash loses nothing already seen.
    pub fn record(&mut self, event: &GaugeEvent) -> io::Result<bool> {
        let Some((timestamp, raw_line)) = loggable(event) else {
            return Ok(false);
        };
        self.writer
            .write_all(format_record(timestamp, raw_line).as_bytes())?;
        self.writer.flush()?;
        self.records += 1;
        Ok(true)
    }

    /// Records written this session
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Give back the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}
