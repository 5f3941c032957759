//! Realtime data
//!
//! Decoded records, the latest-value cell shared with readers, and raw
//! record formatting.

mod dump;
mod snapshot;

pub use dump::hex_dump;
pub use snapshot::{LatestSnapshot, Snapshot, SnapshotReader};

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Per-channel decode failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The field lies past the end of the record
    #[error("Channel '{channel}': {width} bytes at offset {offset} exceed record of {len} bytes")]
    OffsetOutOfBounds {
        /// Channel name
        channel: String,
        /// First byte of the field
        offset: usize,
        /// Field width in bytes
        width: usize,
        /// Record length
        len: usize,
    },

    /// A bit channel addresses a bit outside its byte
    #[error("Channel '{channel}': bit {bit} is outside a byte")]
    BitOutOfRange {
        /// Channel name
        channel: String,
        /// Bit index as configured
        bit: u8,
    },
}

/// A decoded channel value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelValue {
    /// Scaled value
    pub value: f64,
    /// Unit label from the schema
    pub units: String,
}

/// Every channel decoded from one realtime record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    /// Channel name → value
    pub values: BTreeMap<String, ChannelValue>,
    /// Channels that could not be decoded from this record
    #[serde(skip)]
    pub errors: Vec<DecodeError>,
}

impl Record {
    /// Value of one channel, if it decoded
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(|v| v.value)
    }

    /// Name → value map without units
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.values
            .iter()
            .map(|(name, v)| (name.clone(), v.value))
            .collect()
    }
}
