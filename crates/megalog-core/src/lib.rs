//! # megalog Core Library
//!
//! Core functionality for logging realtime data from MegaSquirt ECUs.

//!
//! This library provides:
//! - CRC32 frame encoding/decoding for the serial protocol
//! - A supervised serial session that polls the realtime record and
//!   reconnects when the link dies
//! - INI schema loading and compilation of output channels into extractors
//! - A latest-value cell for sharing decoded records
//!
//! ## Example
//!
//! ```rust,ignore
//! use megalog_core::prelude::*;
//!
//! let table = Schema::from_file("config/mainController.ini")?.compile()?;
//!
//! let config = SessionConfig::for_port("/dev/ttyUSB0");
//! let connector = SerialConnector::new(&config.port_name, config.baud_rate, config.timeout());
//! let (handle, mut payloads) = SerialSession::new(config, Box::new(connector)).spawn()?;
//!
//! while let Some(raw) = payloads.blocking_recv() {
//!     let record = table.decode(&raw);
//!     println!("RPM: {:?}", record.get("rpm"));
//! }
//! handle.shutdown();
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod ini;
pub mod protocol;
pub mod realtime;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ini::{ChannelTable, CompileError, OutputChannel, Schema};
    pub use crate::protocol::{
        ConnectionState, PayloadStream, RawPayload, SerialConnector, SerialSession,
        SessionConfig, SessionHandle,
    };
    pub use crate::realtime::{hex_dump, LatestSnapshot, Record, Snapshot, SnapshotReader};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
