//! Line-level INI reader
//!
//! Produces the generic section/key/value view the compiler works on. Only the
//! structure is interpreted here: preprocessor directives are skipped and
//! values are kept verbatim apart from trailing comments.

use std::path::Path;

use super::{IniError, Schema};

/// Parse INI text into a schema
pub fn parse_schema(content: &str) -> Result<Schema, IniError> {
    let mut schema = Schema::default();
    let mut current_section = String::new();

    for (idx, raw_line) in content.lines().enumerate() {
        let line = strip_comment(raw_line);
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') {
            if !line.ends_with(']') {
                return Err(IniError::Parse {
                    line: idx + 1,
                    message: format!("unterminated section header '{}'", line),
                });
            }
            current_section = line[1..line.len() - 1].trim().to_string();
            schema.ensure_section(&current_section);
            continue;
        }

        match parse_key_value(line) {
            Some((key, value)) if !key.is_empty() => {
                schema.insert(&current_section, key, value);
            }
            _ => {
                return Err(IniError::Parse {
                    line: idx + 1,
                    message: format!("expected 'key = value', got '{}'", line),
                });
            }
        }
    }

    Ok(schema)
}

/// Read an INI file with encoding fallback (UTF-8 first, then lossy)
pub fn read_ini_file(path: &Path) -> Result<String, IniError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            // Vendor files are often Windows-1252
            let bytes = std::fs::read(path)
                .map_err(|e| IniError::Io(format!("{}: {}", path.display(), e)))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Err(e) => Err(IniError::Io(format!("{}: {}", path.display(), e))),
    }
}

/// Drop everything after a `;` that is not inside quotes
fn strip_comment(line: &str) -> String {
    let mut result = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            result.push(ch);
        } else if ch == ';' && !in_quotes {
            break;
        } else {
            result.push(ch);
        }
    }

    result
}

/// Parse a key = value line
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

/// Split an INI line value by commas, respecting quotes and braces
pub fn split_ini_line(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_braces = 0u32;

    for ch in value.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '{' if !in_quotes => {
                in_braces += 1;
                current.push(ch);
            }
            '}' if !in_quotes => {
                in_braces = in_braces.saturating_sub(1);
                current.push(ch);
            }
            ',' if !in_quotes && in_braces == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    parts.push(current.trim().to_string());
    parts
}
