//! In-memory transport
//!
//! A scripted byte source standing in for a gauge. Bytes are released one
//! scripted arrival at a time: a chunk only becomes "buffered" (visible to
//! [`Transport::available_count`]) once a read has pulled it in, which is
//! how bytes trickle into a real UART receive buffer.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{GaugeError, ReadOutcome, Transport};

#[derive(Debug, Clone)]
enum Arrival {
    Bytes(Vec<u8>),
    Stall,
    Disconnect,
}

#[derive(Debug, Default)]
struct ProbeState {
    written: Vec<u8>,
    close_count: usize,
    bytes_read: usize,
}

/// Shared view of a [`MemoryTransport`] that outlives moving it into the engine
#[derive(Debug, Clone, Default)]
pub struct MemoryProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl MemoryProbe {
    /// Everything the host wrote so far
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().map(|s| s.written.clone()).unwrap_or_default()
    }

    /// How many times the handle was actually released
    pub fn close_count(&self) -> usize {
        self.state.lock().map(|s| s.close_count).unwrap_or_default()
    }

    /// Bytes handed out by `read_byte`
    pub fn bytes_read(&self) -> usize {
        self.state.lock().map(|s| s.bytes_read).unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut ProbeState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }
}

/// Scripted [`Transport`] for tests and offline runs
#[derive(Debug)]
pub struct MemoryTransport {
    arrivals: VecDeque<Arrival>,
    buffered: VecDeque<u8>,
    read_timeout: Duration,
    silent_when_drained: bool,
    fail_writes: bool,
    closed: bool,
    probe: MemoryProbe,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Empty script: the first read reports end-of-stream
    pub fn new() -> Self {
        Self {
            arrivals: VecDeque::new(),
            buffered: VecDeque::new(),
            read_timeout: Duration::ZERO,
            silent_when_drained: false,
            fail_writes: false,
            closed: false,
            probe: MemoryProbe::default(),
        }
    }

    /// Queue a chunk that arrives in one piece
    pub fn then_bytes(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.arrivals.push_back(Arrival::Bytes(bytes.as_ref().to_vec()));
        self
    }

    /// Queue bytes that arrive one at a time
    pub fn then_bytes_singly(mut self, bytes: impl AsRef<[u8]>) -> Self {
        for &b in bytes.as_ref() {
            self.arrivals.push_back(Arrival::Bytes(vec![b]));
        }
        self
    }

    /// Queue one read that times out
    pub fn then_stall(mut self) -> Self {
        self.arrivals.push_back(Arrival::Stall);
        self
    }

    /// Queue a hard I/O failure, as when the USB adapter is unplugged
    pub fn then_disconnect(mut self) -> Self {
        self.arrivals.push_back(Arrival::Disconnect);
        self
    }

    /// Bytes already sitting in the receive buffer before the first read
    pub fn with_stale(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.buffered.extend(bytes.as_ref());
        self
    }

    /// How long a timed-out read blocks
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Keep timing out once the script is exhausted instead of ending the stream
    pub fn silent_when_drained(mut self) -> Self {
        self.silent_when_drained = true;
        self
    }

    /// Make every write fail
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Handle for inspecting traffic after the transport has been moved
    pub fn probe(&self) -> MemoryProbe {
        self.probe.clone()
    }

    fn timed_out(&self) -> ReadOutcome {
        if !self.read_timeout.is_zero() {
            std::thread::sleep(self.read_timeout);
        }
        ReadOutcome::Timeout
    }
}

impl Transport for MemoryTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), GaugeError> {
        if self.closed {
            return Err(GaugeError::NotConnected);
        }
        if self.fail_writes {
            return Err(GaugeError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write to gauge failed",
            )));
        }
        self.probe.update(|s| s.written.extend_from_slice(bytes));
        Ok(())
    }

    fn read_byte(&mut self) -> Result<ReadOutcome, GaugeError> {
        if self.closed {
            return Err(GaugeError::NotConnected);
        }

        while self.buffered.is_empty() {
            match self.arrivals.pop_front() {
                Some(Arrival::Bytes(chunk)) => self.buffered.extend(chunk),
                Some(Arrival::Stall) => return Ok(self.timed_out()),
                Some(Arrival::Disconnect) => {
                    return Err(GaugeError::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "gauge disconnected",
                    )))
                }
                None if self.silent_when_drained => return Ok(self.timed_out()),
                None => return Ok(ReadOutcome::EndOfStream),
            }
        }

        match self.buffered.pop_front() {
            Some(byte) => {
                self.probe.update(|s| s.bytes_read += 1);
                Ok(ReadOutcome::Byte(byte))
            }
            None => Ok(ReadOutcome::EndOfStream),
        }
    }

    fn available_count(&mut self) -> Result<usize, GaugeError> {
        if self.closed {
            return Err(GaugeError::NotConnected);
        }
        Ok(self.buffered.len())
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.probe.update(|s| s.close_count += 1);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
