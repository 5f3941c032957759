//! Output channels compiler
//!
//! Turns the [OutputChannels] descriptors into typed channel specs that are
//! evaluated directly against each realtime record.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use super::{types::Encoding, CompileError, Schema};
use crate::realtime::{ChannelValue, DecodeError, Record};

/// Section holding the channel descriptors
pub const OUTPUT_CHANNELS_SECTION: &str = "OutputChannels";

/// Every record starts with a flag byte that schema offsets do not count
pub const RECORD_FLAG_BYTES: usize = 1;

/// Units expression some schemas embed instead of a literal unit string
static UNITS_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{.*bitStringValue\(.*algorithmUnits.*\}").expect("units expression regex")
});

/// Literal the units expression is normalized to
const UNITS_EXPRESSION_LITERAL: &str = "\"kPa\"";

/// How a channel's value is obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Integer field: `(raw + scale) * multiplier`
    Scalar {
        /// Width and signedness of the field
        encoding: Encoding,
        /// Byte offset in the record, flag byte included
        offset: usize,
        /// Applied after the scale
        multiplier: f64,
        /// Added to the raw integer
        scale: i64,
    },
    /// Single bit of a byte; bit 0 is the most significant
    Bit {
        /// Byte offset in the record, flag byte included
        offset: usize,
        /// Bit index, 0..=7
        bit: u8,
    },
    /// Wall-clock seconds since the epoch, independent of the record
    Time,
}

/// A compiled output channel (real-time data) definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputChannel {
    /// Channel name/identifier
    pub name: String,

    /// Unit of measurement
    pub units: String,

    /// How the value is read
    pub kind: ChannelKind,
}

impl OutputChannel {
    /// Wall-clock channel
    pub fn time(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: String::new(),
            kind: ChannelKind::Time,
        }
    }

    /// Extract this channel's value from a realtime record
    pub fn extract(&self, data: &[u8]) -> Result<f64, DecodeError> {
        match &self.kind {
            ChannelKind::Scalar {
                encoding,
                offset,
                multiplier,
                scale,
            } => {
                let raw = encoding
                    .read(data, *offset)
                    .ok_or_else(|| self.out_of_bounds(*offset, encoding.size_bytes(), data))?;
                // The schema format applies the additive scale before the multiplier
                Ok(raw.saturating_add(*scale) as f64 * multiplier)
            }
            ChannelKind::Bit { offset, bit } => {
                let shift = 7u8
                    .checked_sub(*bit)
                    .ok_or_else(|| DecodeError::BitOutOfRange {
                        channel: self.name.clone(),
                        bit: *bit,
                    })?;
                let byte = data
                    .get(*offset)
                    .ok_or_else(|| self.out_of_bounds(*offset, 1, data))?;
                Ok(((byte >> shift) & 1) as f64)
            }
            ChannelKind::Time => Ok(chrono::Utc::now().timestamp() as f64),
        }
    }

    /// One past the last record byte this channel reads (0 for Time)
    pub fn extent(&self) -> usize {
        match &self.kind {
            ChannelKind::Scalar {
                encoding, offset, ..
            } => offset + encoding.size_bytes(),
            ChannelKind::Bit { offset, .. } => offset + 1,
            ChannelKind::Time => 0,
        }
    }

    fn out_of_bounds(&self, offset: usize, width: usize, data: &[u8]) -> DecodeError {
        DecodeError::OffsetOutOfBounds {
            channel: self.name.clone(),
            offset,
            width,
            len: data.len(),
        }
    }
}

/// Compile one descriptor
///
/// Returns `Ok(None)` for descriptor shapes outside the supported set, which
/// are skipped rather than rejected.
///
/// Formats:
/// - `name = scalar, U16, 6, "RPM", 1.000, 0`
/// - `name = bits, U08, 11, [3:3]`
pub fn compile_output_channel(
    name: &str,
    descriptor: &str,
) -> Result<Option<OutputChannel>, CompileError> {
    if name == "time" {
        return Ok(Some(OutputChannel::time(name)));
    }

    let normalized = UNITS_EXPRESSION.replace_all(descriptor, UNITS_EXPRESSION_LITERAL);
    let fields: Vec<&str> = normalized.split(", ").map(str::trim).collect();

    match (fields[0], fields.len()) {
        ("scalar", 6) => compile_scalar(name, &fields).map(Some),
        ("bits", 4) => compile_bits(name, &fields).map(Some),
        _ => Ok(None),
    }
}

fn compile_scalar(name: &str, fields: &[&str]) -> Result<OutputChannel, CompileError> {
    let encoding =
        Encoding::from_ini_str(fields[1]).ok_or_else(|| CompileError::UnknownEncoding {
            channel: name.to_string(),
            encoding: fields[1].to_string(),
        })?;
    let offset = parse_offset(name, fields[2])?;
    let units = fields[3].trim_matches('"').to_string();
    let multiplier: f64 = fields[4]
        .parse()
        .map_err(|_| malformed(name, "multiplier", fields[4]))?;
    let scale = parse_scale(fields[5]).ok_or_else(|| malformed(name, "scale", fields[5]))?;

    Ok(OutputChannel {
        name: name.to_string(),
        units,
        kind: ChannelKind::Scalar {
            encoding,
            offset,
            multiplier,
            scale,
        },
    })
}

fn compile_bits(name: &str, fields: &[&str]) -> Result<OutputChannel, CompileError> {
    let encoding = fields[1];
    let offset = parse_offset(name, fields[2])?;
    let range = fields[3];

    let (start, end) = range
        .trim_matches(|c| c == '[' || c == ']')
        .split_once(':')
        .ok_or_else(|| malformed(name, "bit range", range))?;
    let start: u8 = start
        .trim()
        .parse()
        .map_err(|_| malformed(name, "bit range", range))?;
    let end: u8 = end
        .trim()
        .parse()
        .map_err(|_| malformed(name, "bit range", range))?;

    if start != end || start > 7 || Encoding::from_ini_str(encoding) != Some(Encoding::U08) {
        return Err(CompileError::UnsupportedBitRange {
            channel: name.to_string(),
            encoding: encoding.to_string(),
            range: range.to_string(),
        });
    }

    Ok(OutputChannel {
        name: name.to_string(),
        units: String::new(),
        kind: ChannelKind::Bit { offset, bit: start },
    })
}

fn parse_offset(name: &str, value: &str) -> Result<usize, CompileError> {
    let offset: usize = value
        .parse()
        .map_err(|_| malformed(name, "offset", value))?;
    Ok(offset + RECORD_FLAG_BYTES)
}

/// Integer scale; vendor files sometimes spell it `0.0`
fn parse_scale(value: &str) -> Option<i64> {
    if let Ok(scale) = value.parse::<i64>() {
        return Some(scale);
    }
    let scale: f64 = value.parse().ok()?;
    (scale.is_finite() && scale.fract() == 0.0).then_some(scale as i64)
}

fn malformed(name: &str, field: &'static str, value: &str) -> CompileError {
    CompileError::MalformedDescriptor {
        channel: name.to_string(),
        field,
        value: value.to_string(),
    }
}

/// Compiled channels by name
///
/// Built once per schema load and read-only afterwards; share it behind an
/// `Arc` to decode from several consumers.
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    channels: HashMap<String, OutputChannel>,
}

impl ChannelTable {
    /// Compile every supported descriptor in [OutputChannels]
    pub fn compile(schema: &Schema) -> Result<Self, CompileError> {
        let section = schema
            .section(OUTPUT_CHANNELS_SECTION)
            .ok_or_else(|| CompileError::MissingSection(OUTPUT_CHANNELS_SECTION.to_string()))?;

        let mut channels = HashMap::new();
        let mut skipped = 0usize;
        for (name, descriptor) in section.entries() {
            match compile_output_channel(name, descriptor)? {
                Some(channel) => {
                    if channels.insert(name.to_string(), channel).is_some() {
                        tracing::debug!(channel = name, "duplicate channel, last definition wins");
                    }
                }
                None => skipped += 1,
            }
        }

        tracing::info!(
            compiled = channels.len(),
            skipped,
            "compiled output channels"
        );
        Ok(Self { channels })
    }

    /// Compiled channel by name
    pub fn get(&self, name: &str) -> Option<&OutputChannel> {
        self.channels.get(name)
    }

    /// Number of compiled channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no descriptor compiled
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channel names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Minimum record length (flag byte included) every channel fits in
    pub fn required_len(&self) -> usize {
        self.channels
            .values()
            .map(OutputChannel::extent)
            .max()
            .unwrap_or(0)
    }

    /// Decode every channel from one record
    ///
    /// A channel that cannot be read is reported in `Record::errors` and the
    /// rest of the record still decodes.
    pub fn decode(&self, data: &[u8]) -> Record {
        let mut record = Record::default();
        for channel in self.channels.values() {
            match channel.extract(data) {
                Ok(value) => {
                    record.values.insert(
                        channel.name.clone(),
                        ChannelValue {
                            value,
                            units: channel.units.clone(),
                        },
                    );
                }
                Err(e) => record.errors.push(e),
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(name: &str, descriptor: &str) -> OutputChannel {
        compile_output_channel(name, descriptor)
            .unwrap()
            .expect("descriptor should compile")
    }

    #[test]
    fn test_compile_scalar() {
        let ch = scalar("rpm", "scalar, U16, 6, \"RPM\", 1.000, 0");
        assert_eq!(ch.units, "RPM");
        assert_eq!(
            ch.kind,
            ChannelKind::Scalar {
                encoding: Encoding::U16,
                offset: 7,
                multiplier: 1.0,
                scale: 0,
            }
        );
        assert_eq!(ch.extent(), 9);
    }

    #[test]
    fn test_compile_scalar_float_spelled_scale() {
        let ch = scalar("clt", "scalar, S16, 22, \"°F\", 0.100, -40.0");
        assert!(matches!(ch.kind, ChannelKind::Scalar { scale: -40, .. }));
    }

    #[test]
    fn test_fractional_scale_rejected() {
        let err = compile_output_channel("x", "scalar, U08, 1, \"\", 1.0, 0.5").unwrap_err();
        assert!(matches!(
            err,
            CompileError::MalformedDescriptor { field: "scale", .. }
        ));
    }

    #[test]
    fn test_units_expression_normalized() {
        let ch = scalar(
            "map",
            "scalar, S16, 18, { bitStringValue( algorithmUnits , algorithm ) }, 0.100, 0",
        );
        assert_eq!(ch.units, "kPa");
    }

    #[test]
    fn test_scalar_add_before_multiply() {
        let ch = scalar("x", "scalar, U08, 4, \"\", 2.0, -5");
        let mut data = vec![0u8; 8];
        data[5] = 0x0A;
        assert_eq!(ch.extract(&data).unwrap(), 10.0);
    }

    #[test]
    fn test_bit_from_msb() {
        let bit1 = compile_output_channel("b1", "bits, U08, 0, [1:1]")
            .unwrap()
            .unwrap();
        let bit0 = compile_output_channel("b0", "bits, U08, 0, [0:0]")
            .unwrap()
            .unwrap();
        let data = [0x00, 0b0100_0000];
        assert_eq!(bit1.extract(&data).unwrap(), 1.0);
        assert_eq!(bit0.extract(&data).unwrap(), 0.0);
    }

    #[test]
    fn test_bit_index_past_byte_is_decode_error() {
        let ch: OutputChannel = serde_json::from_str(
            r#"{"name": "flag", "units": "", "kind": {"Bit": {"offset": 0, "bit": 9}}}"#,
        )
        .unwrap();
        assert_eq!(
            ch.extract(&[0xFF, 0xFF]),
            Err(DecodeError::BitOutOfRange {
                channel: "flag".to_string(),
                bit: 9,
            })
        );

        let edge = OutputChannel {
            name: "edge".to_string(),
            units: String::new(),
            kind: ChannelKind::Bit { offset: 0, bit: 8 },
        };
        assert!(matches!(
            edge.extract(&[0xFF]),
            Err(DecodeError::BitOutOfRange { bit: 8, .. })
        ));

        let last = OutputChannel {
            kind: ChannelKind::Bit { offset: 0, bit: 7 },
            ..edge
        };
        assert_eq!(last.extract(&[0x01]), Ok(1.0));
    }

    #[test]
    fn test_multi_bit_range_rejected() {
        let err = compile_output_channel("status", "bits, U08, 3, [2:5]").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedBitRange { .. }));
    }

    #[test]
    fn test_non_byte_bits_rejected() {
        let err = compile_output_channel("status", "bits, U16, 3, [2:2]").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedBitRange { .. }));
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let err = compile_output_channel("afr", "scalar, F32, 3, \"AFR\", 1.0, 0").unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownEncoding {
                channel: "afr".to_string(),
                encoding: "F32".to_string(),
            }
        );
    }

    #[test]
    fn test_unsupported_shapes_skipped() {
        assert_eq!(
            compile_output_channel("afr", "{ ego1 / 10.0 }, \"AFR\"").unwrap(),
            None
        );
        assert_eq!(
            compile_output_channel("rpm", "scalar, U16, 6, \"RPM\", 1.0").unwrap(),
            None
        );
        assert_eq!(
            compile_output_channel("arr", "array, U08, 0, [16], \"\", 1.0, 0").unwrap(),
            None
        );
    }

    #[test]
    fn test_time_channel() {
        let ch = compile_output_channel("time", "{ timeNow }, \"s\"")
            .unwrap()
            .unwrap();
        assert_eq!(ch.kind, ChannelKind::Time);
        assert!(ch.extract(&[]).unwrap() > 1_600_000_000.0);
    }

    #[test]
    fn test_out_of_bounds() {
        let ch = scalar("far", "scalar, U32, 10, \"\", 1.0, 0");
        assert_eq!(
            ch.extract(&[0u8; 12]),
            Err(DecodeError::OffsetOutOfBounds {
                channel: "far".to_string(),
                offset: 11,
                width: 4,
                len: 12,
            })
        );
    }
}
