//! Status codes and structured errors raised by document operations.
//!
//! Callers that reason in terms of the flat status taxonomy can collapse any
//! [`KvpError`] with [`KvpError::status`]; everyone else matches on the
//! variants directly.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::include::IncludeError;

/// Flat status codes reported by the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvpStatus {
    /// Operation successful.
    Success,
    /// The requested file could not be opened.
    FileOpenError,
    /// A parameter was rejected.
    InvalidParam,
    /// The document, or the value under a key, could not be parsed.
    ParsingError,
    /// The key does not address a node.
    KeyNotFound,
    /// No document is loaded.
    NoData,
    /// A required parameter was empty.
    NullParam,
    /// The instance handle is not usable.
    InvalidInstance,
}

/// Errors raised while loading, querying, or emitting a document.
#[derive(Debug, Error)]
pub enum KvpError {
    /// The file could not be read.
    #[error("failed to open '{path}': {source}")]
    FileOpen {
        /// Path that was opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A parameter was rejected before any work was attempted.
    #[error("invalid parameter: {message}")]
    InvalidParam {
        /// Description of the rejected parameter.
        message: String,
    },

    /// A required parameter was empty.
    #[error("required parameter '{name}' is empty")]
    NullParam {
        /// Name of the parameter.
        name: &'static str,
    },

    /// The bytes are not a well-formed YAML or JSON document.
    #[error("failed to parse document: {source}")]
    Syntax {
        /// Tokenizer error.
        #[source]
        source: serde_yaml::Error,
    },

    /// The document contained no content.
    #[error("document is empty")]
    EmptyDocument,

    /// Include resolution failed.
    #[error("include resolution failed: {0}")]
    Include(#[from] IncludeError),

    /// The key addresses a mapping or sequence where a scalar was expected.
    #[error("value at '{key}' is not a scalar")]
    NotScalar {
        /// Key that was looked up.
        key: String,
    },

    /// The scalar under the key could not be decoded as the requested type.
    #[error("value '{value}' at '{key}' is not a valid {expected}")]
    Decode {
        /// Key that was looked up.
        key: String,
        /// Raw scalar text.
        value: String,
        /// Human-readable target type.
        expected: &'static str,
    },

    /// Emitting the tree as text failed.
    #[error("failed to emit document: {message}")]
    Emit {
        /// Emitter failure description.
        message: String,
    },

    /// The key does not address any node.
    #[error("key '{key}' not found")]
    KeyNotFound {
        /// Key that was looked up.
        key: String,
    },

    /// No document is loaded.
    #[error("no document loaded")]
    NoData,
}

impl KvpError {
    /// Collapses the error into its flat status code.
    #[must_use]
    pub const fn status(&self) -> KvpStatus {
        match self {
            Self::FileOpen { .. } => KvpStatus::FileOpenError,
            Self::InvalidParam { .. } => KvpStatus::InvalidParam,
            Self::NullParam { .. } => KvpStatus::NullParam,
            Self::Syntax { .. }
            | Self::EmptyDocument
            | Self::Include(_)
            | Self::NotScalar { .. }
            | Self::Decode { .. }
            | Self::Emit { .. } => KvpStatus::ParsingError,
            Self::KeyNotFound { .. } => KvpStatus::KeyNotFound,
            Self::NoData => KvpStatus::NoData,
        }
    }

    pub(crate) fn decode(key: &str, value: &str, expected: &'static str) -> Self {
        Self::Decode {
            key: key.to_owned(),
            value: value.to_owned(),
            expected,
        }
    }
}

/// Collapses a result into its flat status code.
#[must_use]
pub fn status_of<T>(result: &Result<T, KvpError>) -> KvpStatus {
    match result {
        Ok(_) => KvpStatus::Success,
        Err(error) => error.status(),
    }
}
