//! Protocol errors

use thiserror::Error;

/// Errors raised while validating a received frame
///
/// All of these are transient from the session's point of view: they count
/// toward the reconnect threshold but never surface to consumers.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The link ran dry or timed out before the whole frame arrived
    #[error("Incomplete frame: {0}")]
    IncompleteFrame(#[source] std::io::Error),

    /// Payload length disagrees with the length header
    #[error("Frame size mismatch: header says {expected} bytes, received {actual}")]
    SizeMismatch {
        /// Length announced by the header
        expected: usize,
        /// Length actually received
        actual: usize,
    },

    /// CRC32 trailer does not match the payload
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// CRC32 computed over the received payload
        expected: u32,
        /// CRC32 carried in the trailer
        actual: u32,
    },

    /// Payload too long for the length header
    #[error("Payload of {0} bytes does not fit a 16-bit length header")]
    FrameTooLarge(usize),
}

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The serial device could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(String),

    /// No device handle is open
    #[error("Not connected to ECU")]
    NotConnected,

    /// A response frame failed validation
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Read or write on the link failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        ProtocolError::Serial(e.to_string())
    }
}
