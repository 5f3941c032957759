//! Session supervision
//!
//! Owns the device link for its whole lifetime: open, communication test,
//! steady polling, and a full reconnect once the link looks dead.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use super::{
    commands::{ReadParams, DEFAULT_RECORD_LENGTH, REALTIME_TABLE},
    decode_frame, encode_frame, Command, CommunicationChannel, Connector, ProtocolError,
    RawPayload, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS,
};

/// Longest uninterrupted sleep; cancellation is checked between slices
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No device handle
    Closed,
    /// Trying to open the device
    Opening,
    /// Device open, waiting for a communication test to succeed
    HandshakeTesting,
    /// Fetching realtime data every poll interval
    Polling,
    /// Too many consecutive poll failures, about to close and reopen
    Failing,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    pub timeout_ms: u64,
    /// Delay before retrying a failed open
    pub open_retry_ms: u64,
    /// Settle time between open and the input flush
    pub flush_settle_ms: u64,
    /// Delay before retrying a failed communication test
    pub handshake_retry_ms: u64,
    /// Settle time between a good communication test and the first poll
    pub handshake_settle_ms: u64,
    /// Delay before each realtime fetch
    pub poll_interval_ms: u64,
    /// Consecutive poll failures tolerated; one more forces a reconnect
    pub error_threshold: u32,
    /// Realtime record length requested from the ECU
    pub record_length: u16,
    /// CAN id of the ECU (0 for the directly attached one)
    pub can_id: u8,
    /// Table id holding the realtime record
    pub table: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            open_retry_ms: 2000,
            flush_settle_ms: 15,
            handshake_retry_ms: 2000,
            handshake_settle_ms: 2000,
            poll_interval_ms: 100,
            error_threshold: 5,
            record_length: DEFAULT_RECORD_LENGTH,
            can_id: 0,
            table: REALTIME_TABLE,
        }
    }
}

impl SessionConfig {
    /// Default configuration for the given port
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// The realtime fetch command described by this configuration
    pub fn realtime_command(&self) -> Command {
        Command::Read(ReadParams {
            can_id: self.can_id,
            table: self.table,
            offset: 0,
            length: self.record_length,
        })
    }

    /// Per-read timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Supervised ECU session
///
/// A single sequential state machine. `step` performs exactly one transition
/// (or one poll) and returns the payload fetched by it, if any.
pub struct SerialSession {
    config: SessionConfig,
    connector: Box<dyn Connector>,
    channel: Option<Box<dyn CommunicationChannel>>,
    state: ConnectionState,
    realtime: Command,
    consecutive_errors: u32,
    opens: u64,
    cancel: CancellationToken,
}

impl SerialSession {
    /// Create a closed session
    pub fn new(config: SessionConfig, connector: Box<dyn Connector>) -> Self {
        let realtime = config.realtime_command();
        Self {
            config,
            connector,
            channel: None,
            state: ConnectionState::Closed,
            realtime,
            consecutive_errors: 0,
            opens: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of times the device has been opened successfully
    pub fn opens(&self) -> u64 {
        self.opens
    }

    /// Poll failures since the last successful fetch
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Token that stops `run` when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Advance the state machine by one transition
    pub fn step(&mut self) -> Option<RawPayload> {
        match self.state {
            ConnectionState::Closed => {
                self.state = ConnectionState::Opening;
                None
            }
            ConnectionState::Opening => {
                self.open();
                None
            }
            ConnectionState::HandshakeTesting => {
                self.handshake();
                None
            }
            ConnectionState::Polling => self.poll(),
            ConnectionState::Failing => {
                tracing::warn!(
                    target_port = %self.connector.describe(),
                    "serial failure, resetting connection"
                );
                self.close();
                None
            }
        }
    }

    /// Drive the session until cancelled or the consumer goes away
    pub fn run(mut self, tx: UnboundedSender<RawPayload>) {
        tracing::info!(port = %self.connector.describe(), "session started");
        while !self.cancel.is_cancelled() {
            if let Some(payload) = self.step() {
                if tx.send(payload).is_err() {
                    tracing::info!("payload consumer dropped, stopping session");
                    break;
                }
            }
        }
        self.close();
        tracing::info!("session stopped");
    }

    /// Run the session on a dedicated thread
    pub fn spawn(self) -> Result<(SessionHandle, PayloadStream), ProtocolError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.cancellation_token();
        let thread = std::thread::Builder::new()
            .name("serial-session".to_string())
            .spawn(move || self.run(tx))?;

        Ok((
            SessionHandle {
                cancel,
                thread: Some(thread),
            },
            PayloadStream { rx },
        ))
    }

    fn open(&mut self) {
        tracing::info!(port = %self.connector.describe(), "opening serial port");
        match self.connector.open() {
            Ok(mut channel) => {
                self.opens += 1;
                tracing::info!("successfully opened serial port");
                self.pause(self.config.flush_settle_ms);
                if let Err(e) = channel.clear_input_buffer() {
                    tracing::warn!(error = %e, "failed to flush stale input");
                }
                self.channel = Some(channel);
                self.state = ConnectionState::HandshakeTesting;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    retry_ms = self.config.open_retry_ms,
                    "unable to open serial port, retrying"
                );
                self.pause(self.config.open_retry_ms);
            }
        }
    }

    fn handshake(&mut self) {
        match self.exchange(Command::CommunicationTest) {
            Ok(_) => {
                tracing::info!("communication test OK");
                self.pause(self.config.handshake_settle_ms);
                self.consecutive_errors = 0;
                self.state = ConnectionState::Polling;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    retry_ms = self.config.handshake_retry_ms,
                    "communication test failure, retrying"
                );
                self.pause(self.config.handshake_retry_ms);
            }
        }
    }

    fn poll(&mut self) -> Option<RawPayload> {
        self.pause(self.config.poll_interval_ms);
        match self.exchange(self.realtime) {
            Ok(payload) => {
                self.consecutive_errors = 0;
                tracing::debug!(len = payload.len(), "realtime record fetched");
                Some(payload)
            }
            Err(e) => {
                self.consecutive_errors += 1;
                tracing::error!(
                    error = %e,
                    consecutive = self.consecutive_errors,
                    "data fetch error"
                );
                if self.consecutive_errors > self.config.error_threshold {
                    self.state = ConnectionState::Failing;
                }
                None
            }
        }
    }

    /// Send one framed command and wait for the framed response
    fn exchange(&mut self, command: Command) -> Result<RawPayload, ProtocolError> {
        let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;
        let frame = encode_frame(&command.payload())?;
        tracing::trace!(command = command.name(), frame = ?frame, "sending frame");

        channel.write_all(&frame)?;
        channel.flush()?;

        Ok(decode_frame(channel.as_mut())?)
    }

    fn close(&mut self) {
        self.channel = None;
        self.consecutive_errors = 0;
        self.state = ConnectionState::Closed;
    }

    fn pause(&self, ms: u64) {
        let mut remaining = Duration::from_millis(ms);
        while !remaining.is_zero() && !self.cancel.is_cancelled() {
            let slice = remaining.min(PAUSE_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }
}

/// Control handle for a spawned session
pub struct SessionHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Ask the session to stop after its current step
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the session thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancel and wait for the session thread to exit
    ///
    /// Blocks for up to one read timeout while an exchange is in flight.
    pub fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("session thread panicked");
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Ordered stream of payloads from a running session
///
/// Not replayable: each payload is delivered once. Yields `None` after the
/// session has stopped and every buffered payload was taken.
pub struct PayloadStream {
    rx: UnboundedReceiver<RawPayload>,
}

impl PayloadStream {
    /// Wait for the next payload
    pub async fn recv(&mut self) -> Option<RawPayload> {
        self.rx.recv().await
    }

    /// Blocking receive for use outside an async runtime
    pub fn blocking_recv(&mut self) -> Option<RawPayload> {
        self.rx.blocking_recv()
    }

    /// Take a payload if one is already buffered
    pub fn try_recv(&mut self) -> Option<RawPayload> {
        match self.rx.try_recv() {
            Ok(payload) => Some(payload),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
