//! Mode negotiation
//!
//! The fixed-cadence modes answer their command with a lone ACK byte before
//! they start streaming. Manual mode sends nothing back at this point, so
//! the host just waits for the gauge to settle.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::{GaugeError, PollMode, ReadOutcome, Transport, ACK};
use crate::cancellation::{sleep_cancellable, SLEEP_SLICE};

/// Timing of the one-time mode handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeTiming {
    /// How long to wait for the ACK byte
    pub ack_window_ms: u32,
    /// How long to keep draining bytes that trail the ACK
    pub drain_grace_ms: u32,
    /// Pause after the manual-mode command
    pub manual_settle_ms: u32,
}

impl Default for HandshakeTiming {
    fn default() -> Self {
        Self {
            ack_window_ms: 3000,
            drain_grace_ms: 100,
            manual_settle_ms: 500,
        }
    }
}

/// How the handshake ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// ACK received
    Acknowledged {
        /// Bytes thrown away before and after the ACK
        discarded: usize,
    },
    /// Manual mode command sent and settle delay elapsed
    Settled,
    /// Stop was requested before the handshake finished
    Cancelled,
}

/// Put the gauge into `mode`. Never retries.
pub fn negotiate<T: Transport + ?Sized>(
    transport: &mut T,
    mode: PollMode,
    timing: &HandshakeTiming,
    cancel: &CancellationToken,
) -> Result<Handshake, GaugeError> {
    tracing::info!(%mode, command = ?String::from_utf8_lossy(mode.command()), "sending mode command");
    transport.write(mode.command())?;

    if !mode.expects_ack() {
        let settle = Duration::from_millis(timing.manual_settle_ms as u64);
        if !sleep_cancellable(settle, cancel) {
            return Ok(Handshake::Cancelled);
        }
        return Ok(Handshake::Settled);
    }

    let window = Duration::from_millis(timing.ack_window_ms as u64);
    let deadline = Instant::now() + window;
    let mut discarded = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Ok(Handshake::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            tracing::error!(window_ms = timing.ack_window_ms, "no ACK from gauge");
            return Err(GaugeError::HandshakeTimeout(timing.ack_window_ms));
        }
        // A blocking read may only start if it cannot outlast the window
        let remaining = deadline - now;
        if transport.available_count()? == 0 && transport.read_timeout() > remaining {
            sleep_cancellable(remaining.min(SLEEP_SLICE), cancel);
            continue;
        }
        match transport.read_byte()? {
            ReadOutcome::Byte(ACK) => break,
            ReadOutcome::Byte(byte) => {
                tracing::warn!("discarding byte 0x{:02x} before ACK", byte);
                discarded += 1;
            }
            ReadOutcome::Timeout => {}
            ReadOutcome::EndOfStream => return Err(GaugeError::EndOfStream),
        }
    }

    tracing::info!("gauge acknowledged mode command");
    let grace = Duration::from_millis(timing.drain_grace_ms as u64);
    discarded += drain(transport, grace, cancel)?;
    Ok(Handshake::Acknowledged { discarded })
}

/// Read and discard whatever turns up in the receive buffer for `grace`
fn drain<T: Transport + ?Sized>(
    transport: &mut T,
    grace: Duration,
    cancel: &CancellationToken,
) -> Result<usize, GaugeError> {
    let deadline = Instant::now() + grace;
    let mut drained = 0usize;
    loop {
        drained += clear_input(transport)?;
        let now = Instant::now();
        if now >= deadline || cancel.is_cancelled() {
            break;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
    if drained > 0 {
        tracing::debug!(drained, "drained bytes after ACK");
    }
    Ok(drained)
}

/// Discard every byte currently buffered, returning how many were dropped
pub fn clear_input<T: Transport + ?Sized>(transport: &mut T) -> Result<usize, GaugeError> {
    let mut cleared = 0usize;
    while transport.available_count()? > 0 {
        match transport.read_byte()? {
            ReadOutcome::Byte(_) => cleared += 1,
            ReadOutcome::Timeout | ReadOutcome::EndOfStream => break,
        }
    }
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MemoryTransport;

    fn fast_timing() -> HandshakeTiming {
        HandshakeTiming {
            ack_window_ms: 200,
            drain_grace_ms: 10,
            manual_settle_ms: 10,
        }
    }

    #[test]
    fn test_fast_mode_ack() {
        let mut t = MemoryTransport::new().then_bytes([ACK]);
        let probe = t.probe();
        let token = CancellationToken::new();
        let outcome = negotiate(&mut t, PollMode::FastFixed, &fast_timing(), &token).unwrap();
        assert_eq!(outcome, Handshake::Acknowledged { discarded: 0 });
        assert_eq!(probe.written(), b"COM,0\r".to_vec());
    }

    #[test]
    fn test_noise_before_ack_and_trailing_bytes_are_discarded() {
        let mut t = MemoryTransport::new()
            .then_bytes(b"\r\n")
            .then_bytes([ACK, b'\r', b'\n']);
        let token = CancellationToken::new();
        let outcome = negotiate(&mut t, PollMode::SlowFixed, &fast_timing(), &token).unwrap();
        assert_eq!(outcome, Handshake::Acknowledged { discarded: 4 });
    }

    #[test]
    fn test_ack_timeout() {
        let mut t = MemoryTransport::new()
            .with_read_timeout(Duration::from_millis(20))
            .silent_when_drained();
        let token = CancellationToken::new();
        let err = negotiate(&mut t, PollMode::FastFixed, &fast_timing(), &token).unwrap_err();
        assert!(matches!(err, GaugeError::HandshakeTimeout(200)));
    }

    #[test]
    fn test_ack_window_shorter_than_read_timeout() {
        let mut t = MemoryTransport::new()
            .with_read_timeout(Duration::from_millis(1000))
            .silent_when_drained();
        let token = CancellationToken::new();
        let timing = HandshakeTiming {
            ack_window_ms: 100,
            ..fast_timing()
        };

        let start = Instant::now();
        let err = negotiate(&mut t, PollMode::FastFixed, &timing, &token).unwrap_err();
        assert!(matches!(err, GaugeError::HandshakeTimeout(100)));
        assert!(start.elapsed() < Duration::from_millis(400), "{:?}", start.elapsed());
    }

    #[test]
    fn test_buffered_ack_read_despite_long_read_timeout() {
        let mut t = MemoryTransport::new()
            .with_read_timeout(Duration::from_millis(1000))
            .with_stale([ACK])
            .silent_when_drained();
        let token = CancellationToken::new();
        let timing = HandshakeTiming {
            ack_window_ms: 100,
            ..fast_timing()
        };
        let outcome = negotiate(&mut t, PollMode::SlowFixed, &timing, &token).unwrap();
        assert_eq!(outcome, Handshake::Acknowledged { discarded: 0 });
    }

    #[test]
    fn test_stream_closed_during_handshake() {
        let mut t = MemoryTransport::new().then_bytes(b"0,1\n");
        let token = CancellationToken::new();
        let err = negotiate(&mut t, PollMode::FastFixed, &fast_timing(), &token).unwrap_err();
        assert!(matches!(err, GaugeError::EndOfStream));
    }

    #[test]
    fn test_manual_mode_expects_no_ack() {
        let mut t = MemoryTransport::new();
        let probe = t.probe();
        let token = CancellationToken::new();
        let outcome = negotiate(&mut t, PollMode::Manual, &fast_timing(), &token).unwrap();
        assert_eq!(outcome, Handshake::Settled);
        assert_eq!(probe.written(), b"COM\r".to_vec());
        assert_eq!(probe.bytes_read(), 0);
    }

    #[test]
    fn test_cancelled_before_ack() {
        let mut t = MemoryTransport::new().silent_when_drained();
        let token = CancellationToken::new();
        token.cancel();
        let outcome = negotiate(&mut t, PollMode::FastFixed, &fast_timing(), &token).unwrap();
        assert_eq!(outcome, Handshake::Cancelled);
    }

    #[test]
    fn test_write_failure() {
        let mut t = MemoryTransport::new().failing_writes();
        let token = CancellationToken::new();
        let err = negotiate(&mut t, PollMode::Manual, &fast_timing(), &token).unwrap_err();
        assert!(matches!(err, GaugeError::Io(_)));
    }

    #[test]
    fn test_clear_input() {
        let mut t = MemoryTransport::new().with_stale(b"0,1\n0,2\n").then_bytes(b"0,3\n");
        assert_eq!(clear_input(&mut t).unwrap(), 8);
        assert_eq!(t.available_count().unwrap(), 0);
        assert_eq!(t.read_byte().unwrap(), ReadOutcome::Byte(b'0'));
    }
}
