//! Measurement line parsing
//!
//! Gauge lines look like `<status>,<value>`, e.g. `0,1.2300E-03`. The status
//! code is kept on the sample for reference only.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ACK;

/// A single pressure reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock time the line was captured
    pub timestamp: DateTime<Local>,
    /// Pressure in mbar
    pub value: f64,
    /// First field of the line (gauge status code)
    pub status: String,
    /// The line exactly as framed
    pub raw_line: String,
}

/// Why a line could not be turned into a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MalformedReason {
    /// Fewer than two comma-separated fields
    FieldCount,
    /// Second field is not a number
    NumericParse,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::FieldCount => write!(f, "field count"),
            MalformedReason::NumericParse => write!(f, "numeric parse"),
        }
    }
}

/// Non-sample conditions reported alongside samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    /// The gauge acknowledged a command
    Ack,
    /// The gauge did not answer in time
    Timeout,
    /// A line that is neither data nor control
    MalformedLine {
        /// The line exactly as framed
        raw_line: String,
        /// Why it was rejected
        reason: MalformedReason,
        /// Wall-clock time the line was captured
        timestamp: DateTime<Local>,
    },
    /// The stream closed; nothing follows
    EndOfStream,
}

/// Classification of one framed line
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// Blank line, ignored
    Empty,
    /// ACK sentinel, not data
    Ack,
    /// A measurement
    Sample(Sample),
    /// Unusable line
    Malformed(MalformedReason),
}

impl LineKind {
    /// Whether this line carries data (good or bad) rather than control
    pub fn is_data(&self) -> bool {
        matches!(self, LineKind::Sample(_) | LineKind::Malformed(_))
    }
}

fn is_ack(line: &str) -> bool {
    line.eq_ignore_ascii_case("ACK") || line.as_bytes() == [ACK]
}

/// Classify a trimmed line captured at `timestamp`
pub fn parse_line(line: &str, timestamp: DateTime<Local>) -> LineKind {
    let line = line.trim();
    if line.is_empty() {
        return LineKind::Empty;
    }
    if is_ack(line) {
        return LineKind::Ack;
    }

    let mut fields = line.split(',');
    let (status, value) = match (fields.next(), fields.next()) {
        (Some(status), Some(value)) => (status, value),
        _ => return LineKind::Malformed(MalformedReason::FieldCount),
    };

    match value.trim().parse::<f64>() {
        Ok(value) => LineKind::Sample(Sample {
            timestamp,
            value,
            status: status.trim().to_string(),
            raw_line: line.to_string(),
        }),
        Err(_) => LineKind::Malformed(MalformedReason::NumericParse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> LineKind {
        parse_line(line, Local::now())
    }

    fn value_of(line: &str) -> f64 {
        match parse(line) {
            LineKind::Sample(s) => s.value,
            other => panic!("Expected sample for {:?}, got {:?}", line, other),
        }
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(value_of("0,1.23E-3"), 0.00123);
        assert_eq!(value_of("0,1.50E-3"), 0.0015);
        assert_eq!(value_of("0, 8.2000E+02"), 820.0);
    }

    #[test]
    fn test_status_field_is_ignored() {
        assert_eq!(value_of("0,2.0"), 2.0);
        assert_eq!(value_of("5,2.0"), 2.0);
        assert_eq!(value_of("whatever,2.0"), 2.0);
        assert_eq!(value_of(",2.0"), 2.0);
    }

    #[test]
    fn test_status_and_raw_line_kept() {
        match parse("1,3.5E-2") {
            LineKind::Sample(s) => {
                assert_eq!(s.status, "1");
                assert_eq!(s.raw_line, "1,3.5E-2");
            }
            other => panic!("Expected sample, got {:?}", other),
        }
    }

    #[test]
    fn test_extra_fields_use_second() {
        assert_eq!(value_of("0,4.0,1,9.9"), 4.0);
    }

    #[test]
    fn test_control_lines() {
        assert_eq!(parse(""), LineKind::Empty);
        assert_eq!(parse("   "), LineKind::Empty);
        assert_eq!(parse("ACK"), LineKind::Ack);
        assert_eq!(parse("ack"), LineKind::Ack);
        assert_eq!(parse("\u{6}"), LineKind::Ack);
        assert!(!LineKind::Ack.is_data());
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(
            parse("justtext"),
            LineKind::Malformed(MalformedReason::FieldCount)
        );
        assert_eq!(
            parse("0,abc"),
            LineKind::Malformed(MalformedReason::NumericParse)
        );
        assert_eq!(
            parse("0,"),
            LineKind::Malformed(MalformedReason::NumericParse)
        );
        assert!(LineKind::Malformed(MalformedReason::FieldCount).is_data());
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(MalformedReason::FieldCount.to_string(), "field count");
        assert_eq!(MalformedReason::NumericParse.to_string(), "numeric parse");
    }
}
