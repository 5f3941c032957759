//! Schema loading, channel compilation and record decoding

use megalog_core::ini::{ChannelKind, CompileError, DatalogEntry, Encoding, Schema};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::io::Write;

const CONTROLLER_INI: &str = r#"
;-------------------------------------------------------------------------------
[MegaTune]
   MTversion      = 2.25
   queryCommand   = "Q"

#unset CELSIUS
[OutputChannels]
   ochBlockSize     = 212
   time             = { timeNow }, "s"
   seconds          = scalar, U16,    0, "s",      1.000, 0.0
   rpm              = scalar, U16,    6, "RPM",    1.000, 0.0
   advance          = scalar, S16,    8, "deg",    0.100, 0.0
   map              = scalar, S16,   18, { bitStringValue( algorithmUnits , algorithm ) }, 0.100, 0.0
   coolant          = scalar, S16,   22, "°F",     0.100, 0.0
   afrTarget        = scalar, U08,   12, "AFR",    0.1, 0
   tpsDot           = scalar, S16,   26, "%/s",    0.100, 0.0
   ready            = bits,   U08,   11, [0:0]
   crank            = bits,   U08,   11, [1:1]
   lambda1          = { afr1 / stoich }, ""
   egoCorrection    = scalar, S32,  200, "%",      0.01, 0  ; beyond short records

[Datalog]
   entry = time,      "Time",      float,  "%.3f"
   entry = rpm,       "RPM",       int,    "%d"
   entry = map,       "MAP",       float,  "%.1f"
   entry = advance,   "SparkAdv",  float,  "%.1f", { sparkMode }
"#;

fn controller_schema() -> Schema {
    Schema::from_str(CONTROLLER_INI).expect("controller INI parses")
}

/// A short record: leading flag byte followed by 40 bytes of channel data
fn short_record() -> Vec<u8> {
    let mut data = vec![0u8; 41];
    data[0] = 0x00; // flag byte
    data[7..9].copy_from_slice(&3250u16.to_be_bytes()); // rpm
    data[9..11].copy_from_slice(&(-55i16).to_be_bytes()); // advance
    data[12] = 0b1000_0000; // ready
    data[13] = 147; // afrTarget
    data[19..21].copy_from_slice(&1013i16.to_be_bytes()); // map
    data[23..25].copy_from_slice(&1850i16.to_be_bytes()); // coolant
    data
}

#[test]
fn test_compile_controller_schema() {
    let table = controller_schema().compile().unwrap();

    let mut names = table.names();
    names.sort();
    assert_eq!(
        names,
        vec![
            "advance",
            "afrTarget",
            "coolant",
            "crank",
            "egoCorrection",
            "map",
            "ready",
            "rpm",
            "seconds",
            "time",
            "tpsDot",
        ]
    );

    // ochBlockSize and the expression channel are not channel descriptors
    assert!(table.get("ochBlockSize").is_none());
    assert!(table.get("lambda1").is_none());

    let map = table.get("map").unwrap();
    assert_eq!(map.units, "kPa");
    assert_eq!(
        map.kind,
        ChannelKind::Scalar {
            encoding: Encoding::S16,
            offset: 19,
            multiplier: 0.1,
            scale: 0,
        }
    );
    assert_eq!(
        table.get("crank").unwrap().kind,
        ChannelKind::Bit { offset: 12, bit: 1 }
    );
    assert_eq!(table.required_len(), 205);
}

#[test]
fn test_decode_record_with_per_channel_failure() {
    let table = controller_schema().compile().unwrap();
    let record = table.decode(&short_record());

    let mut values = record.to_map();
    values.remove("time");

    let expected: BTreeMap<String, f64> = [
        ("advance", -55.0 * 0.1),
        ("afrTarget", 147.0 * 0.1),
        ("coolant", 1850.0 * 0.1),
        ("crank", 0.0),
        ("map", 1013.0 * 0.1),
        ("ready", 1.0),
        ("rpm", 3250.0),
        ("seconds", 0.0),
        ("tpsDot", 0.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    assert_eq!(values, expected);

    assert_eq!(record.errors.len(), 1);
    assert!(record.errors[0].to_string().contains("egoCorrection"));
    assert!(record.get("egoCorrection").is_none());
    assert!(record.get("time").unwrap() > 0.0);
    assert_eq!(record.values["coolant"].units, "°F");
}

#[test]
fn test_literal_scalar_case() {
    let schema = Schema::from_str(
        "[OutputChannels]\negoTrim = scalar, U08, 4, \"x\", 2.0, -5\n",
    )
    .unwrap();
    let table = schema.compile().unwrap();

    let mut data = vec![0u8; 6];
    data[5] = 0x0A;
    assert_eq!(table.decode(&data).get("egoTrim"), Some(10.0));
}

#[test]
fn test_duplicate_channel_last_wins() {
    let schema = Schema::from_str(
        "[OutputChannels]\n\
         rpm = scalar, U16, 6, \"RPM\", 1.000, 0\n\
         rpm = scalar, U08, 2, \"RPM/100\", 100.0, 0\n",
    )
    .unwrap();
    let table = schema.compile().unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(table.get("rpm").unwrap().units, "RPM/100");
}

#[test]
fn test_multi_bit_range_aborts_compile() {
    let schema = Schema::from_str(
        "[OutputChannels]\n\
         rpm = scalar, U16, 6, \"RPM\", 1.000, 0\n\
         status = bits, U08, 3, [2:5]\n",
    )
    .unwrap();

    assert_eq!(
        schema.compile().unwrap_err(),
        CompileError::UnsupportedBitRange {
            channel: "status".to_string(),
            encoding: "U08".to_string(),
            range: "[2:5]".to_string(),
        }
    );
}

#[test]
fn test_malformed_offset_aborts_compile() {
    let schema = Schema::from_str("[OutputChannels]\nrpm = scalar, U16, six, \"RPM\", 1.0, 0\n")
        .unwrap();
    assert!(matches!(
        schema.compile(),
        Err(CompileError::MalformedDescriptor { field: "offset", .. })
    ));
}

#[test]
fn test_datalog_entries() {
    let entries = controller_schema().datalog_entries();
    assert_eq!(entries.len(), 4);
    assert_eq!(
        entries[0],
        DatalogEntry {
            channel: "time".to_string(),
            label: "Time".to_string(),
            data_type: "float".to_string(),
            format: Some("%.3f".to_string()),
            condition: None,
        }
    );
    assert_eq!(entries[3].condition.as_deref(), Some("{ sparkMode }"));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONTROLLER_INI.as_bytes()).unwrap();

    let schema = Schema::from_file(file.path()).unwrap();
    assert_eq!(schema.compile().unwrap().len(), 11);
}

#[test]
fn test_load_latin1_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // "°F" in Windows-1252
    file.write_all(b"[OutputChannels]\ncoolant = scalar, S16, 22, \"\xb0F\", 0.1, 0\n")
        .unwrap();

    let table = Schema::from_file(file.path()).unwrap().compile().unwrap();
    assert_eq!(table.get("coolant").unwrap().units, "\u{FFFD}F");
}

#[test]
fn test_missing_file() {
    assert!(Schema::from_file("/nonexistent/mainController.ini").is_err());
}
