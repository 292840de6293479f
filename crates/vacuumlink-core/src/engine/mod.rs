//! Polling Engine
//!
//! Composition root: owns the configuration, runs the handshake and the
//! poll scheduler against one transport, and publishes samples, protocol
//! events and state changes to any number of consumers.
//!
//! The engine runs on a single dedicated thread that is the only reader and
//! writer of the transport. Consumers receive events over a bounded
//! broadcast channel and can never stall the gauge: a consumer that falls
//! behind loses its oldest events and is told how many.

mod config;
mod scheduler;

pub use config::{EngineConfig, DEFAULT_CHANNEL_CAPACITY};
pub use scheduler::{Cadence, PollScheduler};

use serde::{Deserialize, Serialize};
use std::thread::JoinHandle;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::protocol::{
    negotiate, GaugeError, Handshake, ProtocolEvent, Sample, SerialTransport, Transport,
};

/// Something the engine has to tell its consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GaugeEvent {
    /// A parsed measurement
    Sample(Sample),
    /// A control or error condition
    Protocol(ProtocolEvent),
}

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// Created, not started
    Idle,
    /// Mode command sent, waiting for the gauge
    Negotiating,
    /// Reading samples
    Polling,
    /// Finished; the transport has been released
    Stopped,
}

/// Why a run ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Stop was requested
    Cancelled,
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Samples published
    pub samples: u64,
    /// Malformed lines reported
    pub malformed: u64,
    /// ACK lines seen while polling
    pub acks: u64,
    /// Manual cycles that produced no reading
    pub timeouts: u64,
    /// Set when the run ended cleanly
    pub reason: Option<StopReason>,
}

/// Sending half of the event channel, held by the polling thread
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<GaugeEvent>,
}

impl EventEmitter {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Never blocks; with no consumers the event is dropped.
    pub fn emit(&self, event: GaugeEvent) {
        let _ = self.tx.send(event);
    }

    /// New consumer seeing every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GaugeEvent> {
        self.tx.subscribe()
    }
}

/// Gauge polling engine
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    emitter: EventEmitter,
    state: watch::Sender<EngineState>,
    cancel: CancellationToken,
}

impl Engine {
    /// Validate `config` and create an idle engine. No I/O happens here.
    pub fn new(config: EngineConfig) -> Result<Self, GaugeError> {
        config.validate()?;
        let (state, _) = watch::channel(EngineState::Idle);
        Ok(Self {
            emitter: EventEmitter::new(config.channel_capacity),
            config,
            state,
            cancel: CancellationToken::new(),
        })
    }

    /// The configuration this engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Follow lifecycle changes
    pub fn watch_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Receive samples and protocol events. Subscribe before starting.
    pub fn subscribe(&self) -> broadcast::Receiver<GaugeEvent> {
        self.emitter.subscribe()
    }

    /// Token that stops the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask the polling loop to stop at its next loop boundary
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Open the named serial port and run on the calling thread
    pub fn open_and_run(&self, port_name: &str) -> Result<RunSummary, GaugeError> {
        self.begin()?;
        let transport = match SerialTransport::open(
            port_name,
            self.config.baud_rate,
            self.config.read_timeout_ms,
        ) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!(port = port_name, error = %e, "could not open port");
                self.state.send_replace(EngineState::Stopped);
                return Err(e);
            }
        };
        self.execute(transport)
    }

    /// Run over `transport` on the calling thread until stopped or a fatal error.
    ///
    /// The transport is closed before this returns, whatever the outcome.
    pub fn run<T: Transport>(&self, transport: T) -> Result<RunSummary, GaugeError> {
        self.begin()?;
        self.execute(transport)
    }

    /// Move the engine onto its own polling thread
    pub fn spawn<T: Transport + 'static>(self, transport: T) -> Result<EngineHandle, GaugeError> {
        let handle = self.handle_parts();
        let thread = std::thread::Builder::new()
            .name("vacuumlink-poll".into())
            .spawn(move || self.run(transport))?;
        Ok(handle.with_thread(thread))
    }

    /// Open `port_name` on a new polling thread
    pub fn spawn_serial(self, port_name: &str) -> Result<EngineHandle, GaugeError> {
        let handle = self.handle_parts();
        let port_name = port_name.to_string();
        let thread = std::thread::Builder::new()
            .name("vacuumlink-poll".into())
            .spawn(move || self.open_and_run(&port_name))?;
        Ok(handle.with_thread(thread))
    }

    fn handle_parts(&self) -> EngineHandle {
        EngineHandle {
            thread: None,
            emitter: self.emitter.clone(),
            state: self.state.subscribe(),
            cancel: self.cancel.clone(),
        }
    }

    /// Idle -> Negotiating, exactly once per engine
    fn begin(&self) -> Result<(), GaugeError> {
        let started = self.state.send_if_modified(|state| {
            if *state == EngineState::Idle {
                *state = EngineState::Negotiating;
                true
            } else {
                false
            }
        });
        if started {
            Ok(())
        } else {
            Err(GaugeError::AlreadyRunning)
        }
    }

    fn execute<T: Transport>(&self, mut transport: T) -> Result<RunSummary, GaugeError> {
        tracing::info!(mode = %self.config.mode, "engine starting");
        let result = self.drive(&mut transport);
        transport.close();
        self.state.send_replace(EngineState::Stopped);
        match &result {
            Ok(summary) => tracing::info!(
                samples = summary.samples,
                malformed = summary.malformed,
                "engine stopped"
            ),
            Err(e) => tracing::error!(error = %e, "engine stopped"),
        }
        result
    }

    fn drive<T: Transport>(&self, transport: &mut T) -> Result<RunSummary, GaugeError> {
        match negotiate(transport, self.config.mode, &self.config.handshake, &self.cancel)? {
            Handshake::Cancelled => {
                return Ok(RunSummary {
                    reason: Some(StopReason::Cancelled),
                    ..RunSummary::default()
                })
            }
            Handshake::Acknowledged { discarded } => {
                tracing::debug!(discarded, "handshake complete");
            }
            Handshake::Settled => tracing::debug!("manual mode settled"),
        }

        self.state.send_replace(EngineState::Polling);
        PollScheduler::new(transport, &self.config, &self.emitter, &self.cancel).run()
    }
}

/// Control handle for an engine running on its own thread
#[derive(Debug)]
pub struct EngineHandle {
    thread: Option<JoinHandle<Result<RunSummary, GaugeError>>>,
    emitter: EventEmitter,
    state: watch::Receiver<EngineState>,
    cancel: CancellationToken,
}

impl EngineHandle {
    fn with_thread(mut self, thread: JoinHandle<Result<RunSummary, GaugeError>>) -> Self {
        self.thread = Some(thread);
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Follow lifecycle changes
    pub fn watch_state(&self) -> watch::Receiver<EngineState> {
        self.state.clone()
    }

    /// Receive events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GaugeEvent> {
        self.emitter.subscribe()
    }

    /// Request a stop; the thread winds down within one cycle
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the polling thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the polling thread and return its outcome
    pub fn join(mut self) -> Result<RunSummary, GaugeError> {
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| {
                Err(GaugeError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "polling thread panicked",
                )))
            }),
            None => Err(GaugeError::NotConnected),
        }
    }

    /// Stop and wait
    pub fn stop_and_join(self) -> Result<RunSummary, GaugeError> {
        self.stop();
        self.join()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel.cancel();
        }
    }
}
