//! INI Definition Schema
//!
//! Reads the ECU's INI definition file into a generic section/key view and
//! compiles its [OutputChannels] section into extractors for the realtime
//! record. Only the parts the logger needs are interpreted:
//! - [OutputChannels]: scalar and single-bit channel descriptors
//! - [Datalog]: log column entries (surfaced, not acted on)

mod error;
mod output_channels;
mod parser;
mod types;

pub use error::{CompileError, IniError};
pub use output_channels::{
    compile_output_channel, ChannelKind, ChannelTable, OutputChannel, OUTPUT_CHANNELS_SECTION,
    RECORD_FLAG_BYTES,
};
pub use parser::split_ini_line;
pub use types::{DatalogEntry, Encoding};

use std::collections::HashMap;
use std::path::Path;

/// Section holding the datalog column definitions
pub const DATALOG_SECTION: &str = "Datalog";

/// One INI section
///
/// Keys keep their first-seen order. A key written more than once keeps every
/// value ("shadows"), which is how [Datalog] lists its `entry` lines.
#[derive(Debug, Clone, Default)]
pub struct Section {
    keys: Vec<String>,
    values: HashMap<String, Vec<String>>,
    entries: Vec<(String, String)>,
}

impl Section {
    fn push(&mut self, key: &str, value: &str) {
        match self.values.get_mut(key) {
            Some(values) => values.push(value.to_string()),
            None => {
                self.keys.push(key.to_string());
                self.values.insert(key.to_string(), vec![value.to_string()]);
            }
        }
        self.entries.push((key.to_string(), value.to_string()));
    }

    /// Last value written for `key`
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.last())
            .map(String::as_str)
    }

    /// Every value written for `key`, in file order
    pub fn values(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct keys in first-seen order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Every key/value line in file order, repeats included
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True for a header with no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Parsed INI definition: section name → keys → values
#[derive(Debug, Clone, Default)]
pub struct Schema {
    sections: HashMap<String, Section>,
}

impl Schema {
    /// Parse a schema from an INI file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, IniError> {
        let content = parser::read_ini_file(path.as_ref())?;
        parser::parse_schema(&content)
    }

    /// Parse a schema from INI text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, IniError> {
        parser::parse_schema(content)
    }

    /// Section by exact name
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Add a value, creating the section if needed
    pub fn insert(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .push(key, value);
    }

    pub(crate) fn ensure_section(&mut self, section: &str) {
        self.sections.entry(section.to_string()).or_default();
    }

    /// Parse the [Datalog] `entry` lines
    ///
    /// Lines with fewer than two fields are skipped.
    pub fn datalog_entries(&self) -> Vec<DatalogEntry> {
        let Some(section) = self.section(DATALOG_SECTION) else {
            return Vec::new();
        };

        section
            .values("entry")
            .iter()
            .filter_map(|line| {
                let parts = split_ini_line(line);
                if parts.len() < 2 {
                    return None;
                }
                let unquote = |s: &String| s.trim_matches('"').to_string();
                Some(DatalogEntry {
                    channel: unquote(&parts[0]),
                    label: unquote(&parts[1]),
                    data_type: parts.get(2).map(unquote).unwrap_or_else(|| "float".to_string()),
                    format: parts.get(3).map(unquote),
                    condition: parts.get(4).map(unquote),
                })
            })
            .collect()
    }

    /// Compile [OutputChannels] into a channel table
    pub fn compile(&self) -> Result<ChannelTable, CompileError> {
        ChannelTable::compile(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowed_keys() {
        let mut schema = Schema::default();
        schema.insert("Datalog", "entry", "a");
        schema.insert("Datalog", "entry", "b");
        schema.insert("Datalog", "other", "c");

        let section = schema.section("Datalog").unwrap();
        assert_eq!(section.value("entry"), Some("b"));
        assert_eq!(section.values("entry"), &["a".to_string(), "b".to_string()]);
        assert_eq!(section.keys().collect::<Vec<_>>(), vec!["entry", "other"]);
        assert_eq!(section.entries().count(), 3);
        assert_eq!(section.len(), 2);
    }

    #[test]
    fn test_missing_section() {
        let schema = Schema::default();
        assert!(schema.section("OutputChannels").is_none());
        assert!(schema.datalog_entries().is_empty());
        assert_eq!(
            schema.compile().unwrap_err(),
            CompileError::MissingSection("OutputChannels".to_string())
        );
    }
}
