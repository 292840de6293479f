//! Demo Mode - Simulated vacuum gauge for running without hardware
//!
//! Behaves like a TPG-361 on the other end of the serial line: it answers
//! the fixed-cadence mode commands with an ACK byte and then streams
//! readings of a chamber being pumped down.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::protocol::{GaugeError, PollMode, ReadOutcome, Transport, ACK};

/// Atmospheric pressure the simulated chamber starts from (mbar)
const ATMOSPHERE_MBAR: f64 = 1013.25;

/// Ultimate pressure of the simulated pump (mbar)
const BASE_PRESSURE_MBAR: f64 = 2.0e-4;

/// Pump-down time constant
const PUMP_DOWN_TAU_S: f64 = 20.0;

/// Format a pressure the way the gauge prints it, e.g. `1.2300E-03`
pub fn format_pressure(value: f64) -> String {
    if value <= 0.0 || !value.is_finite() {
        return "0.0000E+00".to_string();
    }
    let mut exponent = value.log10().floor() as i32;
    let mut mantissa = value / 10f64.powi(exponent);
    // Rounding to four decimals can carry into the next decade
    if (mantissa * 10_000.0).round() >= 100_000.0 {
        mantissa /= 10.0;
        exponent += 1;
    }
    format!("{:.4}E{:+03}", mantissa, exponent)
}

/// Simulated gauge implementing [`Transport`]
pub struct GaugeSimulator {
    /// Bytes waiting in the host's receive buffer
    output: VecDeque<u8>,
    /// Partial command received from the host
    command: Vec<u8>,
    /// Mode the gauge was put into, if any
    mode: Option<PollMode>,
    /// Transmission period in the current mode
    period: Duration,
    /// When the next reading goes out
    next_emit: Instant,
    /// Start of the pump-down
    started: Instant,
    /// How long an empty read blocks
    read_timeout: Duration,
    /// Chance per reading of a garbled line
    glitch_rate: f64,
    /// Readings transmitted so far
    transmitted: u64,
    rng: StdRng,
    closed: bool,
}

impl Default for GaugeSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl GaugeSimulator {
    /// Create a simulator with a 1 s read timeout
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            output: VecDeque::new(),
            command: Vec::new(),
            mode: None,
            period: Duration::from_secs(1),
            next_emit: now,
            started: now,
            read_timeout: Duration::from_secs(1),
            glitch_rate: 0.0,
            transmitted: 0,
            rng: StdRng::from_entropy(),
            closed: false,
        }
    }

    /// Deterministic noise for tests
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// How long a read waits when nothing is due
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Probability (0..=1) that a reading comes out garbled
    pub fn with_glitch_rate(mut self, rate: f64) -> Self {
        self.glitch_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Mode the host selected, if any
    pub fn mode(&self) -> Option<PollMode> {
        self.mode
    }

    /// Readings transmitted so far
    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }

    /// Chamber pressure at `elapsed` into the pump-down, with a little noise
    fn pressure(&mut self, elapsed: Duration) -> f64 {
        let t = elapsed.as_secs_f64();
        let ideal =
            BASE_PRESSURE_MBAR + (ATMOSPHERE_MBAR - BASE_PRESSURE_MBAR) * (-t / PUMP_DOWN_TAU_S).exp();
        let noise = 1.0 + self.rng.gen_range(-0.02..0.02);
        ideal * noise
    }

    fn handle_command(&mut self) {
        let text = String::from_utf8_lossy(&self.command).trim().to_string();
        self.command.clear();

        let mode = match text.as_str() {
            "COM,0" => PollMode::FastFixed,
            "COM,1" => PollMode::SlowFixed,
            "COM" => PollMode::Manual,
            other => {
                tracing::debug!(command = other, "simulator ignoring unknown command");
                return;
            }
        };

        if mode.expects_ack() {
            self.output.push_back(ACK);
        }
        self.period = mode.instrument_period().unwrap_or(Duration::from_secs(1));
        self.next_emit = Instant::now() + self.period;
        self.mode = Some(mode);
        tracing::debug!(%mode, "simulator switched mode");
    }

    /// Put every reading that is due by now into the receive buffer
    fn transmit_due(&mut self) {
        if self.mode.is_none() {
            return;
        }
        let now = Instant::now();
        while self.next_emit <= now {
            let at = self.next_emit.duration_since(self.started);
            let line = if self.rng.gen_bool(self.glitch_rate) {
                "0,#####".to_string()
            } else {
                format!("0,{}", format_pressure(self.pressure(at)))
            };
            self.output.extend(line.as_bytes());
            self.output.extend(b"\r\n");
            self.transmitted += 1;
            self.next_emit += self.period;
        }
    }
}

impl Transport for GaugeSimulator {
    fn write(&mut self, bytes: &[u8]) -> Result<(), GaugeError> {
        if self.closed {
            return Err(GaugeError::NotConnected);
        }
        for &byte in bytes {
            if byte == b'\r' {
                self.handle_command();
            } else {
                self.command.push(byte);
            }
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<ReadOutcome, GaugeError> {
        if self.closed {
            return Err(GaugeError::NotConnected);
        }
        self.transmit_due();
        if self.output.is_empty() {
            let wait = match self.mode {
                Some(_) => self
                    .next_emit
                    .saturating_duration_since(Instant::now())
                    .min(self.read_timeout),
                None => self.read_timeout,
            };
            std::thread::sleep(wait);
            self.transmit_due();
        }
        Ok(match self.output.pop_front() {
            Some(byte) => ReadOutcome::Byte(byte),
            None => ReadOutcome::Timeout,
        })
    }

    fn available_count(&mut self) -> Result<usize, GaugeError> {
        if self.closed {
            return Err(GaugeError::NotConnected);
        }
        self.transmit_due();
        Ok(self.output.len())
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.output.clear();
            tracing::info!(transmitted = self.transmitted, "simulated gauge closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{parse_line, LineKind};

    #[test]
    fn test_format_pressure() {
        assert_eq!(format_pressure(0.00123), "1.2300E-03");
        assert_eq!(format_pressure(1013.0), "1.0130E+03");
        assert_eq!(format_pressure(1.0), "1.0000E+00");
        assert_eq!(format_pressure(9.99999e-5), "1.0000E-04");
        assert_eq!(format_pressure(0.0), "0.0000E+00");
    }

    #[test]
    fn test_formatted_pressure_parses_back() {
        let text = format_pressure(4.5678e-7);
        let value: f64 = text.parse().unwrap();
        assert!((value - 4.5678e-7).abs() < 1e-12);
    }

    #[test]
    fn test_fast_mode_acks_then_streams() {
        let mut sim = GaugeSimulator::new()
            .with_seed(7)
            .with_read_timeout(Duration::from_millis(300));
        sim.write(b"COM,0\r").unwrap();
        assert_eq!(sim.mode(), Some(PollMode::FastFixed));
        assert_eq!(sim.read_byte().unwrap(), ReadOutcome::Byte(ACK));

        let mut line = Vec::new();
        loop {
            match sim.read_byte().unwrap() {
                ReadOutcome::Byte(b'\n') => break,
                ReadOutcome::Byte(b) => line.push(b),
                ReadOutcome::Timeout => {}
                ReadOutcome::EndOfStream => panic!("simulator never ends the stream"),
            }
        }
        let line = String::from_utf8(line).unwrap();
        match parse_line(&line, chrono::Local::now()) {
            LineKind::Sample(sample) => {
                assert_eq!(sample.status, "0");
                assert!(sample.value > 900.0 && sample.value < 1100.0);
            }
            other => panic!("Expected sample from {:?}, got {:?}", line, other),
        }
    }

    #[test]
    fn test_manual_mode_sends_no_ack() {
        let mut sim = GaugeSimulator::new().with_read_timeout(Duration::from_millis(10));
        sim.write(b"COM\r").unwrap();
        assert_eq!(sim.mode(), Some(PollMode::Manual));
        assert_eq!(sim.available_count().unwrap(), 0);
    }

    #[test]
    fn test_idle_until_commanded() {
        let mut sim = GaugeSimulator::new().with_read_timeout(Duration::from_millis(5));
        assert_eq!(sim.read_byte().unwrap(), ReadOutcome::Timeout);
        sim.write(b"HELLO\r").unwrap();
        assert_eq!(sim.mode(), None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut sim = GaugeSimulator::new();
        sim.close();
        sim.close();
        assert!(sim.is_closed());
        assert!(matches!(sim.write(b"COM\r"), Err(GaugeError::NotConnected)));
    }
}
