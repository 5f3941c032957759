//! Protocol commands
//!
//! The two commands the logger issues: the communication test used as a
//! handshake, and the table read that fetches the realtime record.

use serde::{Deserialize, Serialize};

use super::PacketBuilder;

/// Communication test command byte
pub const COMM_TEST: u8 = b'c';

/// Table read command byte
pub const READ: u8 = b'r';

/// Table id holding the realtime output channels
pub const REALTIME_TABLE: u8 = 0x07;

/// Default realtime record length (full set of output channels)
pub const DEFAULT_RECORD_LENGTH: u16 = 212;

/// Commands sent to the ECU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Communication test ('c'), answered with any valid frame
    CommunicationTest,

    /// Read a block of a table ('r')
    Read(ReadParams),
}

impl Command {
    /// Realtime fetch for a record of `length` bytes from CAN id 0
    pub fn realtime(length: u16) -> Self {
        Command::Read(ReadParams::new(REALTIME_TABLE, 0, length))
    }

    /// Encode the command payload (unframed)
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Command::CommunicationTest => vec![COMM_TEST],
            Command::Read(params) => PacketBuilder::new()
                .command(READ)
                .byte(params.can_id)
                .byte(params.table)
                .u16_be(params.offset)
                .u16_be(params.length)
                .build(),
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::CommunicationTest => "comm-test",
            Command::Read(_) => "read",
        }
    }
}

/// Read command parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadParams {
    /// CAN ID for CAN-enabled ECUs (0 for local)
    pub can_id: u8,
    /// Table to read from
    pub table: u8,
    /// Offset within table
    pub offset: u16,
    /// Number of bytes to read
    pub length: u16,
}

impl ReadParams {
    /// Read of `length` bytes at `offset` in `table`, CAN id 0
    pub fn new(table: u8, offset: u16, length: u16) -> Self {
        Self {
            can_id: 0,
            table,
            offset,
            length,
        }
    }
}
