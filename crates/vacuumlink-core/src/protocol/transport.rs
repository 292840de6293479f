//! Byte transport
//!
//! The polling engine only ever talks to a gauge through [`Transport`], so
//! the same state machine runs over a real serial port, the in-memory
//! transport used by tests, or the gauge simulator.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{serial, GaugeError};

/// Result of a single blocking byte read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One byte arrived
    Byte(u8),
    /// Nothing arrived within the read timeout
    Timeout,
    /// The other side closed the stream
    EndOfStream,
}

/// Byte-level access to a gauge connection
pub trait Transport: Send {
    /// Write all bytes and flush them to the wire
    fn write(&mut self, bytes: &[u8]) -> Result<(), GaugeError>;

    /// Block for at most the read timeout waiting for one byte
    fn read_byte(&mut self) -> Result<ReadOutcome, GaugeError>;

    /// Number of bytes already buffered, without consuming them
    fn available_count(&mut self) -> Result<usize, GaugeError>;

    /// Longest time a single [`Transport::read_byte`] can block
    fn read_timeout(&self) -> Duration;

    /// Release the underlying handle. Calling this more than once is a no-op.
    fn close(&mut self);

    /// Whether [`Transport::close`] has been called
    fn is_closed(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), GaugeError> {
        (**self).write(bytes)
    }

    fn read_byte(&mut self) -> Result<ReadOutcome, GaugeError> {
        (**self).read_byte()
    }

    fn available_count(&mut self) -> Result<usize, GaugeError> {
        (**self).available_count()
    }

    fn read_timeout(&self) -> Duration {
        (**self).read_timeout()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Serial port wrapper implementing [`Transport`]
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    read_timeout: Duration,
}

impl SerialTransport {
    /// Open `name` at `baud_rate` with 8N1 framing and the given read timeout
    pub fn open(name: &str, baud_rate: u32, read_timeout_ms: u32) -> Result<Self, GaugeError> {
        let mut port = serial::open_port(name, baud_rate, read_timeout_ms)?;
        serial::configure_port(port.as_mut()).map_err(|e| GaugeError::PortUnavailable {
            port: name.to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!(port = name, baud_rate, "serial port open");
        Ok(Self::new(port))
    }

    /// Wrap an already opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        let name = port.name().unwrap_or_default();
        let read_timeout = port.timeout();
        Self {
            port: Some(port),
            name,
            read_timeout,
        }
    }

    /// Name the port was opened with
    pub fn name(&self) -> &str {
        &self.name
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, GaugeError> {
        self.port.as_mut().ok_or(GaugeError::NotConnected)
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), GaugeError> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<ReadOutcome, GaugeError> {
        let port = self.port()?;
        let mut buf = [0u8; 1];
        match port.read(&mut buf) {
            Ok(0) => Ok(ReadOutcome::EndOfStream),
            Ok(_) => Ok(ReadOutcome::Byte(buf[0])),
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(ReadOutcome::Timeout)
            }
            Err(e) => Err(GaugeError::Io(e)),
        }
    }

    fn available_count(&mut self) -> Result<usize, GaugeError> {
        let port = self.port()?;
        port.bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| GaugeError::Io(io::Error::new(io::ErrorKind::Other, e)))
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            drop(port);
            tracing::info!(port = %self.name, "serial port closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.port.is_none()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}
