//! Object paths of systemd units on the bus.

pub const UNIT_PATH_PREFIX: &str = "/org/freedesktop/systemd1/unit/";

/// Escapes a string into a single bus object path label.
///
/// ASCII letters pass through, as do digits except in the first position.
/// Every other byte becomes `_` followed by two lower-case hex digits. An
/// empty input is `_`.
pub fn bus_label_escape(s: &str) -> String {
    if s.is_empty() {
        return "_".to_string();
    }

    let mut escaped = String::with_capacity(s.len() * 3);
    for (i, b) in s.bytes().enumerate() {
        let keep = b.is_ascii_alphabetic() || (b.is_ascii_digit() && i != 0);
        if keep {
            escaped.push(char::from(b));
        } else {
            escaped.push_str(&format!("_{b:02x}"));
        }
    }
    escaped
}

/// Object path of a loaded unit.
pub fn unit_object_path(name: &str) -> String {
    format!("{UNIT_PATH_PREFIX}{}", bus_label_escape(name))
}
