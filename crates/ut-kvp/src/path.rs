//! Key paths addressing nodes inside a document.
//!
//! A key is a list of segments separated by `/` or `.`; the two separators
//! are interchangeable. Empty segments are skipped, so `/a//b.` and `a/b`
//! address the same node.

use std::fmt;

use crate::error::KvpError;

/// Parsed key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    raw: String,
    segments: Vec<String>,
}

impl KeyPath {
    /// Splits `key` into segments.
    ///
    /// # Errors
    ///
    /// Returns [`KvpError::NullParam`] when the key is empty.
    pub fn parse(key: &str) -> Result<Self, KvpError> {
        if key.is_empty() {
            return Err(KvpError::NullParam { name: "key" });
        }
        let segments = key
            .split(['/', '.'])
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned)
            .collect();
        Ok(Self {
            raw: key.to_owned(),
            segments,
        })
    }

    /// Key text as supplied by the caller.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.raw.as_str()
    }

    /// Segments in traversal order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// Number of segments. Zero addresses the document root.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("a/b/c", &["a", "b", "c"])]
    #[case("a.b.c", &["a", "b", "c"])]
    #[case("a.b/c", &["a", "b", "c"])]
    #[case("/a//b/", &["a", "b"])]
    #[case("list/0", &["list", "0"])]
    #[case("/", &[])]
    fn separators_are_interchangeable(#[case] key: &str, #[case] expected: &[&str]) {
        let path = KeyPath::parse(key).expect("key should parse");
        assert_eq!(path.segments().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn empty_key_is_rejected() {
        let error = KeyPath::parse("").expect_err("empty key must fail");
        assert!(matches!(error, KvpError::NullParam { name: "key" }));
    }
}
