//! Error types for schema loading and compilation

use thiserror::Error;

/// Errors that can occur while reading a schema source
#[derive(Error, Debug)]
pub enum IniError {
    /// The file could not be read
    #[error("I/O error: {0}")]
    Io(String),

    /// A line is neither a section header nor `key = value`
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        message: String,
    },
}

/// Fatal configuration errors found while compiling output channels
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompileError {
    /// A `bits` channel spans more than one bit, exceeds bit 7 or is not U08
    #[error("Channel '{channel}': only single-bit ranges over U08 are supported, got {encoding} {range}")]
    UnsupportedBitRange {
        /// Channel name
        channel: String,
        /// Encoding as written
        encoding: String,
        /// Bit range as written
        range: String,
    },

    /// A `scalar` channel names an encoding outside U08..S32
    #[error("Channel '{channel}': unknown encoding '{encoding}'")]
    UnknownEncoding {
        /// Channel name
        channel: String,
        /// Encoding as written
        encoding: String,
    },

    /// A numeric field does not parse
    #[error("Channel '{channel}': invalid {field} '{value}'")]
    MalformedDescriptor {
        /// Channel name
        channel: String,
        /// Which field failed
        field: &'static str,
        /// The offending text
        value: String,
    },

    /// The schema has no section with the channel descriptors
    #[error("Missing required section: [{0}]")]
    MissingSection(String),
}
