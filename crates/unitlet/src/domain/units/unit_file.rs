//! Text codec for the systemd unit-file format.
//!
//! Only the subset needed by this provider is supported: `[Section]`
//! headers, `Key=Value` entries, `#`/`;` comments and backslash line
//! continuations. Specifiers and drop-in directories are left to systemd.

use error_stack::Report;

use super::error::UnitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitEntry {
    pub key: String,
    pub value: String,
}

impl UnitEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSection {
    pub name: String,
    pub entries: Vec<UnitEntry>,
}

impl UnitSection {
    pub fn new(name: impl Into<String>, entries: Vec<UnitEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }
}

/// Renders sections, one blank line between them.
pub fn serialize_sections(sections: &[UnitSection]) -> String {
    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push('[');
        out.push_str(&section.name);
        out.push_str("]\n");
        for entry in &section.entries {
            out.push_str(&entry.key);
            out.push('=');
            out.push_str(&entry.value);
            out.push('\n');
        }
    }
    out
}

/// Parses unit-file text into its sections, preserving order.
///
/// Repeated sections are kept as separate [`UnitSection`]s.
///
/// # Errors
///
/// - [`UnitError::Malformed`] on entries outside a section, unterminated
///   headers, or lines without `=`
pub fn deserialize_sections(input: &str) -> Result<Vec<UnitSection>, Report<UnitError>> {
    let mut sections: Vec<UnitSection> = Vec::new();
    let mut lines = input.lines().enumerate();

    while let Some((idx, raw)) = lines.next() {
        let line_no = idx + 1;
        let mut line = raw.trim().to_string();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        // a trailing backslash joins the next line with a single space
        while line.ends_with('\\') {
            line.pop();
            match lines.next() {
                Some((_, next)) => {
                    line.push(' ');
                    line.push_str(next.trim());
                }
                None => break,
            }
        }

        if let Some(header) = line.strip_prefix('[') {
            let Some(name) = header.strip_suffix(']') else {
                return Err(Report::new(UnitError::Malformed {
                    line: line_no,
                    reason: "unterminated section header".to_string(),
                }));
            };
            if name.is_empty() {
                return Err(Report::new(UnitError::Malformed {
                    line: line_no,
                    reason: "empty section name".to_string(),
                }));
            }
            sections.push(UnitSection::new(name, Vec::new()));
            continue;
        }

        let Some(section) = sections.last_mut() else {
            return Err(Report::new(UnitError::Malformed {
                line: line_no,
                reason: "entry before the first section header".to_string(),
            }));
        };

        let Some((key, value)) = line.split_once('=') else {
            return Err(Report::new(UnitError::Malformed {
                line: line_no,
                reason: "expected Key=Value".to_string(),
            }));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(Report::new(UnitError::Malformed {
                line: line_no,
                reason: "empty key".to_string(),
            }));
        }
        section.entries.push(UnitEntry::new(key, value.trim()));
    }

    Ok(sections)
}
