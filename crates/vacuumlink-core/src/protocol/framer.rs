//! Line framing
//!
//! Turns the byte stream coming off a [`Transport`] into `\n`-terminated
//! lines. Bytes may arrive one at a time; partial lines survive read
//! timeouts and are only discarded when the stream ends.

use super::{GaugeError, ReadOutcome, Transport};

/// Longest line kept before it is handed on unterminated
pub const MAX_LINE_LEN: usize = 256;

/// One step of framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, terminator stripped and whitespace trimmed
    Line(String),
    /// The read timed out; any partial line is kept for the next call
    Idle,
    /// The stream closed; any partial line was dropped
    EndOfStream,
}

/// Accumulates bytes into lines
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
        }
    }

    /// Read until a full line, a read timeout or the end of the stream
    pub fn next_line<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<Frame, GaugeError> {
        loop {
            match transport.read_byte()? {
                ReadOutcome::Byte(b'\n') => return Ok(Frame::Line(self.take_line())),
                ReadOutcome::Byte(byte) => {
                    self.buffer.push(byte);
                    if self.buffer.len() >= MAX_LINE_LEN {
                        tracing::warn!(len = self.buffer.len(), "line too long, flushing");
                        return Ok(Frame::Line(self.take_line()));
                    }
                }
                ReadOutcome::Timeout => return Ok(Frame::Idle),
                ReadOutcome::EndOfStream => {
                    if !self.buffer.is_empty() {
                        tracing::debug!(
                            partial = %String::from_utf8_lossy(&self.buffer),
                            "stream ended mid-line, dropping partial line"
                        );
                    }
                    self.buffer.clear();
                    return Ok(Frame::EndOfStream);
                }
            }
        }
    }

    /// Bytes of the line currently being assembled
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Forget any partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        line
    }
}
