//! Serial Protocol Communication
//!
//! Implements the MegaSquirt CRC32 envelope protocol and the supervised
//! session that polls realtime data over it.

pub mod commands;
mod error;
mod packet;
pub mod serial;
mod session;
mod stream;

pub use commands::{Command, ReadParams};
pub use error::{FrameError, ProtocolError};
pub use packet::{decode_frame, encode_frame, PacketBuilder, HEADER_LEN, TRAILER_LEN};
pub use serial::{list_ports, open_port, Connector, PortInfo, SerialConnector};
pub use session::{
    ConnectionState, PayloadStream, SerialSession, SessionConfig, SessionHandle,
};
pub use stream::{CommunicationChannel, SerialChannel};

/// One validated response payload, shared without copying
pub type RawPayload = bytes::Bytes;

/// Default baud rate for ECU communication
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Largest payload a 16-bit length header can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;
