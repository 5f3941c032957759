//! Type definitions shared by the schema compiler

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte encoding of a scalar field in the realtime record
///
/// All multi-byte encodings are big-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// Unsigned 8-bit integer
    U08,
    /// Signed 8-bit integer
    S08,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 16-bit integer
    S16,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 32-bit integer
    S32,
}

impl Encoding {
    /// Parse an encoding from its INI spelling
    pub fn from_ini_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "U08" => Some(Encoding::U08),
            "S08" => Some(Encoding::S08),
            "U16" => Some(Encoding::U16),
            "S16" => Some(Encoding::S16),
            "U32" => Some(Encoding::U32),
            "S32" => Some(Encoding::S32),
            _ => None,
        }
    }

    /// Width in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            Encoding::U08 | Encoding::S08 => 1,
            Encoding::U16 | Encoding::S16 => 2,
            Encoding::U32 | Encoding::S32 => 4,
        }
    }

    /// Read the raw integer at `offset`, sign-extended for signed encodings
    ///
    /// Returns `None` when the field does not fit inside `data`.
    pub fn read(&self, data: &[u8], offset: usize) -> Option<i64> {
        let end = offset.checked_add(self.size_bytes())?;
        let bytes = data.get(offset..end)?;
        let value = match self {
            Encoding::U08 => bytes[0] as i64,
            Encoding::S08 => bytes[0] as i8 as i64,
            Encoding::U16 => BigEndian::read_u16(bytes) as i64,
            Encoding::S16 => BigEndian::read_i16(bytes) as i64,
            Encoding::U32 => BigEndian::read_u32(bytes) as i64,
            Encoding::S32 => BigEndian::read_i32(bytes) as i64,
        };
        Some(value)
    }

    /// INI spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::U08 => "U08",
            Encoding::S08 => "S08",
            Encoding::U16 => "U16",
            Encoding::S16 => "S16",
            Encoding::U32 => "U32",
            Encoding::S32 => "S32",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Datalog entry definition
///
/// Format: `entry = channel, "Label", type, "format"[, condition]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatalogEntry {
    /// Output channel name
    pub channel: String,
    /// Column header
    pub label: String,
    /// Value type (`int`, `float`)
    pub data_type: String,
    /// printf-style format string
    pub format: Option<String>,
    /// Expression gating the column, when present
    pub condition: Option<String>,
}
