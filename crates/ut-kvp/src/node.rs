//! In-memory tree backing a [`crate::Document`].
//!
//! The tokenizer hands back a `serde_yaml::Value`; this module folds it into a
//! [`Node`] tree that keeps mapping order and remembers the YAML kind of every
//! scalar, so the tree can be emitted again without changing field text.

use serde_yaml::Value as YamlValue;
use serde_yaml::value::TaggedValue;

use crate::path::KeyPath;

/// YAML kind a scalar was written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Explicit or implicit null.
    Null,
    /// `true` or `false`.
    Bool,
    /// Integer literal (decimal, hex, octal, or binary in the source).
    Int,
    /// Floating-point literal.
    Float,
    /// Anything else, quoted or plain.
    String,
}

/// Scalar value with its textual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    text: String,
    kind: ScalarKind,
}

impl Scalar {
    /// Builds a string scalar.
    pub fn string(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ScalarKind::String,
        }
    }

    pub(crate) const fn new(kind: ScalarKind, text: String) -> Self {
        Self { text, kind }
    }

    /// Textual form of the scalar.
    #[must_use]
    pub const fn text(&self) -> &str {
        self.text.as_str()
    }

    /// YAML kind the scalar was parsed as.
    #[must_use]
    pub const fn kind(&self) -> ScalarKind {
        self.kind
    }
}

/// Ordered mapping with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    entries: Vec<(String, Node)>,
}

impl Mapping {
    /// Creates an empty mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the mapping has no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    /// Returns `true` when `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Stores `value` under `key`.
    ///
    /// An existing entry keeps its position and has its value replaced; the
    /// previous value is returned. New keys are appended.
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        let owned = key.into();
        if let Some((_, slot)) = self.entries.iter_mut().find(|(candidate, _)| *candidate == owned) {
            return Some(std::mem::replace(slot, value));
        }
        self.entries.push((owned, value));
        None
    }

    /// Removes the entry stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        let index = self.entries.iter().position(|(candidate, _)| candidate == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Inserts every entry of `other`, replacing matching keys in place and
    /// appending the rest.
    pub fn merge(&mut self, other: Self) {
        for (key, value) in other {
            self.insert(key, value);
        }
    }

    /// Iterates over the entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Iterates over the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|(key, _)| keep(key));
    }
}

impl IntoIterator for Mapping {
    type Item = (String, Node);
    type IntoIter = std::vec::IntoIter<(String, Node)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, Node)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (String, Node)>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

/// Node of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Leaf value.
    Scalar(Scalar),
    /// Ordered list of nodes.
    Sequence(Vec<Node>),
    /// Ordered key/value pairs.
    Mapping(Mapping),
}

impl Node {
    /// Returns the scalar when this node is one.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(scalar) => Some(scalar),
            Self::Sequence(_) | Self::Mapping(_) => None,
        }
    }

    /// Returns the items when this node is a sequence.
    #[must_use]
    pub const fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Self::Sequence(items) => Some(items.as_slice()),
            Self::Scalar(_) | Self::Mapping(_) => None,
        }
    }

    /// Returns the mapping when this node is one.
    #[must_use]
    pub const fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(mapping) => Some(mapping),
            Self::Scalar(_) | Self::Sequence(_) => None,
        }
    }

    /// Short name of the node kind, for diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }

    /// Walks `path` from this node.
    ///
    /// Mapping segments match keys exactly; sequence segments must be decimal
    /// indices.
    #[must_use]
    pub fn lookup(&self, path: &KeyPath) -> Option<&Self> {
        path.segments()
            .try_fold(self, |node, segment| node.child(segment))
    }

    fn child(&self, segment: &str) -> Option<&Self> {
        match self {
            Self::Mapping(mapping) => mapping.get(segment),
            Self::Sequence(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            Self::Scalar(_) => None,
        }
    }

    pub(crate) fn from_yaml(value: YamlValue) -> Self {
        match value {
            YamlValue::Null => Self::Scalar(Scalar::new(ScalarKind::Null, String::new())),
            YamlValue::Bool(flag) => Self::Scalar(Scalar::new(ScalarKind::Bool, flag.to_string())),
            YamlValue::Number(number) => {
                let kind = if number.is_f64() {
                    ScalarKind::Float
                } else {
                    ScalarKind::Int
                };
                Self::Scalar(Scalar::new(kind, number.to_string()))
            }
            YamlValue::String(text) => Self::Scalar(Scalar::string(text)),
            YamlValue::Sequence(items) => {
                Self::Sequence(items.into_iter().map(Self::from_yaml).collect())
            }
            YamlValue::Mapping(mapping) => Self::Mapping(
                mapping
                    .into_iter()
                    .map(|(key, value)| (key_text(key), Self::from_yaml(value)))
                    .collect(),
            ),
            YamlValue::Tagged(tagged) => {
                let TaggedValue { value, .. } = *tagged;
                Self::from_yaml(value)
            }
        }
    }

    pub(crate) fn to_yaml(&self) -> YamlValue {
        match self {
            Self::Scalar(scalar) => scalar_to_yaml(scalar),
            Self::Sequence(items) => YamlValue::Sequence(items.iter().map(Self::to_yaml).collect()),
            Self::Mapping(mapping) => YamlValue::Mapping(
                mapping
                    .iter()
                    .map(|(key, value)| (YamlValue::String(key.to_owned()), value.to_yaml()))
                    .collect(),
            ),
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Scalar(scalar) => scalar_to_json(scalar),
            Self::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Mapping(mapping) => serde_json::Value::Object(
                mapping
                    .iter()
                    .map(|(key, value)| (key.to_owned(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Why raw bytes did not yield a tree.
#[derive(Debug)]
pub(crate) enum ParseFailure {
    Syntax(serde_yaml::Error),
    Empty,
}

/// Tokenizes YAML or JSON bytes into a tree.
///
/// A blank or null document is rejected: there is nothing to address.
pub(crate) fn parse(bytes: &[u8]) -> Result<Node, ParseFailure> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseFailure::Empty);
    }
    let value: YamlValue = serde_yaml::from_slice(bytes).map_err(ParseFailure::Syntax)?;
    if value.is_null() {
        return Err(ParseFailure::Empty);
    }
    Ok(Node::from_yaml(value))
}

fn key_text(key: YamlValue) -> String {
    match key {
        YamlValue::String(text) => text,
        YamlValue::Bool(flag) => flag.to_string(),
        YamlValue::Number(number) => number.to_string(),
        YamlValue::Null => "null".to_owned(),
        YamlValue::Tagged(tagged) => key_text(tagged.value),
        complex @ (YamlValue::Sequence(_) | YamlValue::Mapping(_)) => serde_yaml::to_string(&complex)
            .map(|text| text.trim_end().to_owned())
            .unwrap_or_default(),
    }
}

fn scalar_to_yaml(scalar: &Scalar) -> YamlValue {
    let text = scalar.text();
    match scalar.kind() {
        ScalarKind::Null => YamlValue::Null,
        ScalarKind::Bool => text
            .parse::<bool>()
            .map_or_else(|_| YamlValue::String(text.to_owned()), YamlValue::Bool),
        ScalarKind::Int => text
            .parse::<u64>()
            .map(YamlValue::from)
            .or_else(|_| text.parse::<i64>().map(YamlValue::from))
            .unwrap_or_else(|_| YamlValue::String(text.to_owned())),
        ScalarKind::Float => crate::decode::parse_f64(text)
            .map_or_else(|| YamlValue::String(text.to_owned()), YamlValue::from),
        ScalarKind::String => YamlValue::String(text.to_owned()),
    }
}

fn scalar_to_json(scalar: &Scalar) -> serde_json::Value {
    use serde_json::Value;

    let text = scalar.text();
    let as_string = || Value::String(text.to_owned());
    match scalar.kind() {
        ScalarKind::Null => Value::Null,
        ScalarKind::Bool => text.parse::<bool>().map_or_else(|_| as_string(), Value::Bool),
        ScalarKind::Int => text
            .parse::<u64>()
            .map(Value::from)
            .or_else(|_| text.parse::<i64>().map(Value::from))
            .unwrap_or_else(|_| as_string()),
        ScalarKind::Float => crate::decode::parse_f64(text)
            .and_then(serde_json::Number::from_f64)
            .map_or_else(as_string, Value::Number),
        ScalarKind::String => as_string(),
    }
}
