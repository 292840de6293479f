//! Poll scheduler
//!
//! Drives the `Polling` state: frame a line, classify it, publish the
//! result, and pace the next cycle according to the mode's [`Cadence`].

use chrono::Local;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::{EngineConfig, EventEmitter, GaugeEvent, RunSummary, StopReason};
use crate::cancellation::sleep_cancellable;
use crate::protocol::{
    clear_input, parse_line, Frame, GaugeError, LineFramer, LineKind, PollMode, ProtocolEvent,
    Transport,
};

/// How polling cycles are paced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// The gauge transmits on its own clock; the host just keeps reading
    InstrumentPaced,
    /// The host takes one reading per `interval`
    HostPaced {
        /// Time between cycle starts
        interval: Duration,
    },
}

impl Cadence {
    /// Pick the cadence for a validated configuration
    pub fn for_config(config: &EngineConfig) -> Self {
        match (config.mode, config.manual_interval()) {
            (PollMode::Manual, Some(interval)) => Cadence::HostPaced { interval },
            _ => Cadence::InstrumentPaced,
        }
    }

    /// Time left to wait after a cycle body took `elapsed`, never negative
    pub fn sleep_after(&self, elapsed: Duration) -> Duration {
        match self {
            Cadence::InstrumentPaced => Duration::ZERO,
            Cadence::HostPaced { interval } => interval.saturating_sub(elapsed),
        }
    }
}

/// Runs the read/parse/emit loop on the polling thread
pub struct PollScheduler<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    framer: LineFramer,
    cadence: Cadence,
    read_timeout: Duration,
    idle_timeout: Option<Duration>,
    emitter: &'a EventEmitter,
    cancel: &'a CancellationToken,
    summary: RunSummary,
}

impl<'a, T: Transport + ?Sized> PollScheduler<'a, T> {
    /// Create a scheduler for `config` over an already negotiated transport
    pub fn new(
        transport: &'a mut T,
        config: &EngineConfig,
        emitter: &'a EventEmitter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            transport,
            framer: LineFramer::new(),
            cadence: Cadence::for_config(config),
            read_timeout: config.read_timeout(),
            idle_timeout: config.idle_timeout(),
            emitter,
            cancel,
            summary: RunSummary::default(),
        }
    }

    /// Poll until cancelled or a fatal error
    pub fn run(mut self) -> Result<RunSummary, GaugeError> {
        let result = match self.cadence {
            Cadence::InstrumentPaced => self.run_instrument_paced(),
            Cadence::HostPaced { interval } => self.run_host_paced(interval),
        };
        match result {
            Ok(reason) => {
                self.summary.reason = Some(reason);
                Ok(self.summary)
            }
            Err(e) => {
                tracing::info!(
                    samples = self.summary.samples,
                    malformed = self.summary.malformed,
                    "polling ended with counts"
                );
                Err(e)
            }
        }
    }

    fn run_instrument_paced(&mut self) -> Result<StopReason, GaugeError> {
        let mut last_line = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
            match self.framer.next_line(&mut *self.transport)? {
                Frame::Line(line) => {
                    last_line = Instant::now();
                    self.handle_line(&line);
                }
                Frame::Idle => {
                    tracing::debug!("read timed out, gauge idle");
                    if let Some(limit) = self.idle_timeout {
                        if last_line.elapsed() >= limit {
                            self.emitter.emit(GaugeEvent::Protocol(ProtocolEvent::Timeout));
                            return Err(GaugeError::IdleTimeout(limit.as_millis() as u32));
                        }
                    }
                }
                Frame::EndOfStream => return Err(self.end_of_stream()),
            }
        }
    }

    fn run_host_paced(&mut self, interval: Duration) -> Result<StopReason, GaugeError> {
        // A data line from a 1 s gauge shows up within one interval of a clear
        let read_budget = interval.max(self.read_timeout);
        loop {
            if self.cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
            let start = Instant::now();

            let stale = clear_input(&mut *self.transport)? + self.framer.pending();
            self.framer.reset();
            if stale > 0 {
                tracing::debug!(stale, "buffer cleared");
            }

            let deadline = start + read_budget;
            loop {
                if self.cancel.is_cancelled() {
                    return Ok(StopReason::Cancelled);
                }
                if Instant::now() >= deadline {
                    tracing::warn!("no reading this cycle");
                    self.summary.timeouts += 1;
                    self.emitter.emit(GaugeEvent::Protocol(ProtocolEvent::Timeout));
                    break;
                }
                match self.framer.next_line(&mut *self.transport)? {
                    Frame::Line(line) => {
                        if self.handle_line(&line).is_data() {
                            break;
                        }
                    }
                    Frame::Idle => {}
                    Frame::EndOfStream => return Err(self.end_of_stream()),
                }
            }

            let elapsed = start.elapsed();
            let pause = self.cadence.sleep_after(elapsed);
            if elapsed > interval {
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_ms = interval.as_millis() as u64,
                    "cycle overran interval"
                );
            }
            if !sleep_cancellable(pause, self.cancel) {
                return Ok(StopReason::Cancelled);
            }
        }
    }

    /// Classify one line and publish whatever it turned out to be
    fn handle_line(&mut self, line: &str) -> LineKind {
        let timestamp = Local::now();
        let kind = parse_line(line, timestamp);
        match &kind {
            LineKind::Empty => {}
            LineKind::Ack => {
                tracing::debug!("ACK line");
                self.summary.acks += 1;
                self.emitter.emit(GaugeEvent::Protocol(ProtocolEvent::Ack));
            }
            LineKind::Sample(sample) => {
                tracing::info!(value = sample.value, line = %sample.raw_line, "measurement");
                self.summary.samples += 1;
                self.emitter.emit(GaugeEvent::Sample(sample.clone()));
            }
            LineKind::Malformed(reason) => {
                tracing::warn!(%reason, %line, "malformed line");
                self.summary.malformed += 1;
                self.emitter
                    .emit(GaugeEvent::Protocol(ProtocolEvent::MalformedLine {
                        raw_line: line.to_string(),
                        reason: *reason,
                        timestamp,
                    }));
            }
        }
        kind
    }

    fn end_of_stream(&mut self) -> GaugeError {
        tracing::error!("gauge closed the stream");
        self.emitter.emit(GaugeEvent::Protocol(ProtocolEvent::EndOfStream));
        GaugeError::EndOfStream
    }
}
