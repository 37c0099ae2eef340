//! Structured document store for the unit-test control plane.
//!
//! Parses YAML or JSON from a file or an in-memory buffer into a [`Document`],
//! resolves nested include directives, and exposes typed accessors addressed
//! by dotted or slashed key paths. The tree can be emitted again as YAML or
//! JSON.

mod decode;
mod document;
mod error;
mod format;
pub mod include;
mod lookup;
mod node;
mod path;

pub use document::Document;
pub use error::{KvpError, KvpStatus, status_of};
pub use format::DocumentFormat;
pub use include::{FetchError, HttpFetcher, IncludeError, IncludeFetcher, MAX_INCLUDE_DEPTH};
pub use lookup::{KeyStringMapping, map_string, map_value};
pub use node::{Mapping, Node, Scalar, ScalarKind};
pub use path::KeyPath;
