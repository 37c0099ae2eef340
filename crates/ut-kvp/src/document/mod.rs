//! Document handle and typed accessors.
//!
//! A [`Document`] owns at most one parsed tree. Fields are addressed with
//! [`KeyPath`] syntax. Every getter has two forms: `try_get_*` reports why a
//! lookup failed, while `get_*` logs the failure and falls back to the zero
//! value.


use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::decode;
use crate::error::KvpError;
use crate::format::DocumentFormat;
use crate::include::{HttpFetcher, IncludeFetcher, IncludeResolver, MAX_INCLUDE_DEPTH, Origin};
use crate::node::{self, Node, ParseFailure, Scalar};
use crate::path::KeyPath;

const DOCUMENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::document");

fn parse_error(failure: ParseFailure) -> KvpError {
    match failure {
        ParseFailure::Syntax(source) => KvpError::Syntax { source },
        ParseFailure::Empty => KvpError::EmptyDocument,
    }
}

/// Parsed YAML or JSON document.
#[derive(Debug, Clone)]
pub struct Document {
    tree: Option<Node>,
    fetcher: Arc<dyn IncludeFetcher>,
    max_include_depth: usize,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty document that fetches remote includes over HTTP.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fetcher(Arc::new(HttpFetcher::default()))
    }

    /// Creates an empty document that fetches remote includes through
    /// `fetcher`.
    #[must_use]
    pub const fn with_fetcher(fetcher: Arc<dyn IncludeFetcher>) -> Self {
        Self {
            tree: None,
            fetcher,
            max_include_depth: MAX_INCLUDE_DEPTH,
        }
    }

    /// Opens the file at `path`.
    ///
    /// # Errors
    ///
    /// See [`Document::open`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KvpError> {
        let mut document = Self::new();
        document.open(path)?;
        Ok(document)
    }

    /// Parses an in-memory buffer.
    ///
    /// # Errors
    ///
    /// See [`Document::open_memory`].
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self, KvpError> {
        let mut document = Self::new();
        document.open_memory(data)?;
        Ok(document)
    }

    /// Reads and parses the file at `path`, resolving its includes.
    ///
    /// When a tree is already held, the new root is merged into it. On any
    /// failure the document is closed.
    ///
    /// # Errors
    ///
    /// Returns [`KvpError::InvalidParam`] for an empty path,
    /// [`KvpError::FileOpen`] when the file cannot be read, and a parse-family
    /// error when the contents or an include cannot be parsed.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), KvpError> {
        let file = path.as_ref();
        if file.as_os_str().is_empty() {
            return Err(KvpError::InvalidParam {
                message: "file name is empty".to_owned(),
            });
        }
        let bytes = match fs::read(file) {
            Ok(bytes) => bytes,
            Err(source) => {
                error!(
                    target: DOCUMENT_TARGET,
                    path = %file.display(),
                    error = %source,
                    "unable to read document"
                );
                self.close();
                return Err(KvpError::FileOpen {
                    path: file.to_path_buf(),
                    source: Arc::new(source),
                });
            }
        };
        self.load(&bytes, &Origin::File(file.to_path_buf()))
    }

    /// Parses `data`, resolving its includes against the working directory.
    ///
    /// The buffer is consumed. Merge and failure behaviour match
    /// [`Document::open`].
    ///
    /// # Errors
    ///
    /// Returns [`KvpError::InvalidParam`] for an empty buffer and a
    /// parse-family error when the contents or an include cannot be parsed.
    pub fn open_memory(&mut self, data: impl Into<Vec<u8>>) -> Result<(), KvpError> {
        let buffer = data.into();
        if buffer.is_empty() {
            return Err(KvpError::InvalidParam {
                message: "buffer is empty".to_owned(),
            });
        }
        self.load(&buffer, &Origin::Memory)
    }

    fn load(&mut self, bytes: &[u8], origin: &Origin) -> Result<(), KvpError> {
        match self.build(bytes, origin) {
            Ok(tree) => {
                self.tree = Some(match self.tree.take() {
                    Some(existing) => overlay(existing, tree),
                    None => tree,
                });
                Ok(())
            }
            Err(failure) => {
                error!(target: DOCUMENT_TARGET, error = %failure, "unable to load document");
                self.close();
                Err(failure)
            }
        }
    }

    fn build(&self, bytes: &[u8], origin: &Origin) -> Result<Node, KvpError> {
        let tree = node::parse(bytes).map_err(parse_error)?;
        let resolver = IncludeResolver::new(self.fetcher.as_ref(), self.max_include_depth);
        Ok(resolver.resolve(tree, origin)?)
    }

    /// Releases the tree. Closing a closed document is a no-op.
    pub fn close(&mut self) {
        self.tree = None;
    }

    /// Returns `true` while a tree is held.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.tree.is_some()
    }

    /// Root of the held tree.
    #[must_use]
    pub const fn root(&self) -> Option<&Node> {
        self.tree.as_ref()
    }

    /// Returns the node addressed by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`KvpError::NullParam`] for an empty key, [`KvpError::NoData`]
    /// when nothing is loaded, and [`KvpError::KeyNotFound`] when the path
    /// does not resolve.
    pub fn node(&self, key: &str) -> Result<&Node, KvpError> {
        let path = KeyPath::parse(key)?;
        let tree = self.tree.as_ref().ok_or(KvpError::NoData)?;
        tree.lookup(&path).ok_or_else(|| KvpError::KeyNotFound {
            key: key.to_owned(),
        })
    }

    fn scalar(&self, key: &str) -> Result<&Scalar, KvpError> {
        self.node(key)?
            .as_scalar()
            .ok_or_else(|| KvpError::NotScalar {
                key: key.to_owned(),
            })
    }

    /// Returns `true` when `key` addresses a node.
    #[must_use]
    pub fn field_present(&self, key: &str) -> bool {
        match self.node(key) {
            Ok(_) => true,
            Err(failure) => {
                debug!(target: DOCUMENT_TARGET, key, error = %failure, "field not present");
                false
            }
        }
    }

    /// Decodes the boolean under `key`. Only a case-insensitive `true` is
    /// `true`; any other scalar text is `false`.
    ///
    /// # Errors
    ///
    /// Lookup errors from [`Document::node`], or [`KvpError::NotScalar`].
    pub fn try_get_bool(&self, key: &str) -> Result<bool, KvpError> {
        self.scalar(key).map(|scalar| decode::parse_bool(scalar.text()))
    }

    /// Like [`Document::try_get_bool`], falling back to `false`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        or_zero(key, self.try_get_bool(key))
    }

    fn try_get_unsigned(&self, key: &str, max: u64, expected: &'static str) -> Result<u64, KvpError> {
        let scalar = self.scalar(key)?;
        decode::parse_unsigned(scalar.text(), max)
            .ok_or_else(|| KvpError::decode(key, scalar.text(), expected))
    }

    /// Decodes the `u8` under `key`; `0x` selects hexadecimal.
    ///
    /// # Errors
    ///
    /// Lookup errors, or [`KvpError::Decode`] on malformed or out-of-range
    /// text.
    pub fn try_get_u8(&self, key: &str) -> Result<u8, KvpError> {
        let value = self.try_get_unsigned(key, u64::from(u8::MAX), "u8")?;
        u8::try_from(value).map_err(|_| KvpError::decode(key, &value.to_string(), "u8"))
    }

    /// Like [`Document::try_get_u8`], falling back to `0`.
    #[must_use]
    pub fn get_u8(&self, key: &str) -> u8 {
        or_zero(key, self.try_get_u8(key))
    }

    /// Decodes the `u16` under `key`.
    ///
    /// # Errors
    ///
    /// As [`Document::try_get_u8`].
    pub fn try_get_u16(&self, key: &str) -> Result<u16, KvpError> {
        let value = self.try_get_unsigned(key, u64::from(u16::MAX), "u16")?;
        u16::try_from(value).map_err(|_| KvpError::decode(key, &value.to_string(), "u16"))
    }

    /// Like [`Document::try_get_u16`], falling back to `0`.
    #[must_use]
    pub fn get_u16(&self, key: &str) -> u16 {
        or_zero(key, self.try_get_u16(key))
    }

    /// Decodes the `u32` under `key`.
    ///
    /// # Errors
    ///
    /// As [`Document::try_get_u8`].
    pub fn try_get_u32(&self, key: &str) -> Result<u32, KvpError> {
        let value = self.try_get_unsigned(key, u64::from(u32::MAX), "u32")?;
        u32::try_from(value).map_err(|_| KvpError::decode(key, &value.to_string(), "u32"))
    }

    /// Like [`Document::try_get_u32`], falling back to `0`.
    #[must_use]
    pub fn get_u32(&self, key: &str) -> u32 {
        or_zero(key, self.try_get_u32(key))
    }

    /// Decodes the `u64` under `key`.
    ///
    /// # Errors
    ///
    /// As [`Document::try_get_u8`].
    pub fn try_get_u64(&self, key: &str) -> Result<u64, KvpError> {
        self.try_get_unsigned(key, u64::MAX, "u64")
    }

    /// Like [`Document::try_get_u64`], falling back to `0`.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> u64 {
        or_zero(key, self.try_get_u64(key))
    }

    /// Decodes the single-precision float under `key`.
    ///
    /// # Errors
    ///
    /// Lookup errors, or [`KvpError::Decode`] on malformed text.
    pub fn try_get_f32(&self, key: &str) -> Result<f32, KvpError> {
        let scalar = self.scalar(key)?;
        decode::parse_f32(scalar.text()).ok_or_else(|| KvpError::decode(key, scalar.text(), "f32"))
    }

    /// Like [`Document::try_get_f32`], falling back to `0.0`.
    #[must_use]
    pub fn get_f32(&self, key: &str) -> f32 {
        or_zero(key, self.try_get_f32(key))
    }

    /// Decodes the double-precision float under `key`.
    ///
    /// # Errors
    ///
    /// Lookup errors, or [`KvpError::Decode`] on malformed text.
    pub fn try_get_f64(&self, key: &str) -> Result<f64, KvpError> {
        let scalar = self.scalar(key)?;
        decode::parse_f64(scalar.text()).ok_or_else(|| KvpError::decode(key, scalar.text(), "f64"))
    }

    /// Like [`Document::try_get_f64`], falling back to `0.0`.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> f64 {
        or_zero(key, self.try_get_f64(key))
    }

    /// Returns the scalar text under `key`. A null scalar yields an empty
    /// string.
    ///
    /// # Errors
    ///
    /// Lookup errors, or [`KvpError::NotScalar`] when the key addresses a
    /// mapping or sequence.
    pub fn get_string(&self, key: &str) -> Result<String, KvpError> {
        self.scalar(key).map(|scalar| scalar.text().to_owned())
    }

    /// Decodes a comma or space separated list of byte values, each decimal
    /// or `0x` hexadecimal.
    ///
    /// # Errors
    ///
    /// Lookup errors, or [`KvpError::Decode`] naming the first token that is
    /// malformed or above 255.
    pub fn get_data_bytes(&self, key: &str) -> Result<Vec<u8>, KvpError> {
        let scalar = self.scalar(key)?;
        decode::parse_bytes(scalar.text()).map_err(|token| KvpError::decode(key, token, "byte"))
    }

    /// Number of items in the sequence under `key`; zero for anything else.
    #[must_use]
    pub fn list_count(&self, key: &str) -> u32 {
        match self.node(key) {
            Ok(node) => node
                .as_sequence()
                .map_or(0, |items| u32::try_from(items.len()).unwrap_or(u32::MAX)),
            Err(failure) => {
                debug!(target: DOCUMENT_TARGET, key, error = %failure, "list not present");
                0
            }
        }
    }

    /// Emits the tree as YAML, or `None` when nothing is loaded.
    #[must_use]
    pub fn data(&self) -> Option<String> {
        match self.data_as(DocumentFormat::Yaml) {
            Ok(text) => Some(text),
            Err(failure) => {
                debug!(target: DOCUMENT_TARGET, error = %failure, "document not emitted");
                None
            }
        }
    }

    /// Emits the tree in `format`.
    ///
    /// # Errors
    ///
    /// Returns [`KvpError::NoData`] when nothing is loaded and
    /// [`KvpError::Emit`] when the emitter fails.
    pub fn data_as(&self, format: DocumentFormat) -> Result<String, KvpError> {
        let tree = self.tree.as_ref().ok_or(KvpError::NoData)?;
        match format {
            DocumentFormat::Yaml => serde_yaml::to_string(&tree.to_yaml()).map_err(|source| {
                KvpError::Emit {
                    message: source.to_string(),
                }
            }),
            DocumentFormat::Json => {
                serde_json::to_string_pretty(&tree.to_json()).map_err(|source| KvpError::Emit {
                    message: source.to_string(),
                })
            }
        }
    }
}

fn or_zero<T: Default>(key: &str, result: Result<T, KvpError>) -> T {
    result.unwrap_or_else(|failure| {
        warn!(target: DOCUMENT_TARGET, key, error = %failure, "field lookup failed");
        T::default()
    })
}

/// Merges a freshly loaded root into the tree already held.
fn overlay(existing: Node, incoming: Node) -> Node {
    match (existing, incoming) {
        (Node::Mapping(mut base), Node::Mapping(update)) => {
            base.merge(update);
            Node::Mapping(base)
        }
        (_, replacement) => replacement,
    }
}
