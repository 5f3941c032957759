//! Frame encoding/decoding
//!
//! Frame format (msEnvelope_1.0):
//! - 2 bytes: Payload length (big-endian)
//! - N bytes: Payload
//! - 4 bytes: CRC32 (IEEE, of payload only, NOT length+payload)

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use crc32fast::Hasher;
use std::io::Read;

use super::{FrameError, MAX_PAYLOAD_SIZE};

/// Size of the length header
pub const HEADER_LEN: usize = 2;

/// Size of the CRC32 trailer
pub const TRAILER_LEN: usize = 4;

/// Wrap a command payload in a length header and CRC32 trailer
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::FrameTooLarge(payload.len()));
    }

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);

    let mut len_bytes = [0u8; HEADER_LEN];
    BigEndian::write_u16(&mut len_bytes, payload.len() as u16);
    bytes.extend_from_slice(&len_bytes);

    bytes.extend_from_slice(payload);

    let mut crc_bytes = [0u8; TRAILER_LEN];
    BigEndian::write_u32(&mut crc_bytes, checksum(payload));
    bytes.extend_from_slice(&crc_bytes);

    Ok(bytes)
}

/// Read one frame from `reader` and return its validated payload
///
/// Reads exactly header, payload and trailer before checking anything, so a
/// partially received frame is never handed back.
pub fn decode_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Bytes, FrameError> {
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .map_err(FrameError::IncompleteFrame)?;
    let expected_len = BigEndian::read_u16(&header) as usize;

    let mut payload = vec![0u8; expected_len];
    reader
        .read_exact(&mut payload)
        .map_err(FrameError::IncompleteFrame)?;

    let mut trailer = [0u8; TRAILER_LEN];
    reader
        .read_exact(&mut trailer)
        .map_err(FrameError::IncompleteFrame)?;

    if payload.len() != expected_len {
        return Err(FrameError::SizeMismatch {
            expected: expected_len,
            actual: payload.len(),
        });
    }

    let received_crc = BigEndian::read_u32(&trailer);
    let expected_crc = checksum(&payload);
    if received_crc != expected_crc {
        return Err(FrameError::ChecksumMismatch {
            expected: expected_crc,
            actual: received_crc,
        });
    }

    tracing::trace!(len = payload.len(), "received frame");
    Ok(Bytes::from(payload))
}

/// Builder for command payloads
pub struct PacketBuilder {
    payload: Vec<u8>,
}

impl PacketBuilder {
    /// Create a new packet builder
    pub fn new() -> Self {
        Self { payload: Vec::new() }
    }

    /// Add a command byte
    pub fn command(mut self, cmd: u8) -> Self {
        self.payload.push(cmd);
        self
    }

    /// Add a single byte
    pub fn byte(mut self, b: u8) -> Self {
        self.payload.push(b);
        self
    }

    /// Add a 16-bit value (big-endian)
    pub fn u16_be(mut self, value: u16) -> Self {
        let mut bytes = [0u8; 2];
        BigEndian::write_u16(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Finish and return the command payload
    pub fn build(self) -> Vec<u8> {
        self.payload
    }
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}
