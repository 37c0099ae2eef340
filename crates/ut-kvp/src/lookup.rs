//! Static string/integer lookup tables.
//!
//! Used to decode enumerated configuration values read from a document, and
//! to go back from a value to its canonical name.

/// One row of a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStringMapping {
    /// Canonical name.
    pub key: &'static str,
    /// Value the name maps to.
    pub value: i32,
}

impl KeyStringMapping {
    /// Builds a row.
    #[must_use]
    pub const fn new(key: &'static str, value: i32) -> Self {
        Self { key, value }
    }
}

/// Returns the value of the first row whose key equals `key`, or
/// `on_not_found` when no row matches.
#[must_use]
pub fn map_value(map: &[KeyStringMapping], key: &str, on_not_found: i32) -> i32 {
    map.iter()
        .find(|row| row.key == key)
        .map_or(on_not_found, |row| row.value)
}

/// Returns the key of the first row whose value equals `value`.
#[must_use]
pub fn map_string(map: &[KeyStringMapping], value: i32) -> Option<&'static str> {
    map.iter().find(|row| row.value == value).map(|row| row.key)
}
