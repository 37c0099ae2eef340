//! Include directive resolution.
//!
//! Any mapping key containing `include` whose value is a scalar names a file
//! or URL. The target is parsed, its own includes are resolved one level
//! deeper, and the result is merged into the mapping that declared it. Once
//! the whole tree is resolved every directive key is stripped, so lookups
//! never see them.

mod fetch;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub use self::fetch::{FetchError, HttpFetcher, IncludeFetcher};
use crate::node::{self, Mapping, Node, ParseFailure};

/// Deepest include nesting accepted. The root document sits at depth zero.
pub const MAX_INCLUDE_DEPTH: usize = 5;

const INCLUDE_MARKER: &str = "include";
const INCLUDE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::include");

/// Errors raised while resolving include directives.
#[derive(Debug, Error)]
pub enum IncludeError {
    /// The include chain nests deeper than allowed.
    #[error("including '{reference}' exceeds the maximum include depth of {max_depth}")]
    DepthExceeded {
        /// Reference that would have been loaded.
        reference: String,
        /// Depth limit in force.
        max_depth: usize,
    },

    /// The reference could not be turned into a file path or URL.
    #[error("invalid include reference '{reference}': {message}")]
    InvalidReference {
        /// Reference as written in the document.
        reference: String,
        /// Why it was rejected.
        message: String,
    },

    /// A local include target could not be read.
    #[error("failed to read include '{}': {source}", path.display())]
    Read {
        /// Resolved path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A remote include target could not be fetched.
    #[error("failed to fetch include: {0}")]
    Fetch(#[from] FetchError),

    /// The include target is not valid YAML or JSON.
    #[error("failed to parse include '{reference}': {source}")]
    Parse {
        /// Reference that was loaded.
        reference: String,
        /// Tokenizer error.
        #[source]
        source: serde_yaml::Error,
    },

    /// The include target holds no content.
    #[error("include '{reference}' is empty")]
    Empty {
        /// Reference that was loaded.
        reference: String,
    },
}

/// Where a document came from; relative references resolve against it.
#[derive(Debug, Clone)]
pub(crate) enum Origin {
    /// In-memory buffer. Relative paths resolve against the working directory.
    Memory,
    /// Local file.
    File(PathBuf),
    /// Remote document.
    Url(Url),
}

/// Resolved location of an include target.
#[derive(Debug)]
enum Target {
    File(PathBuf),
    Url(Url),
}

impl Target {
    fn into_origin(self) -> Origin {
        match self {
            Self::File(path) => Origin::File(path),
            Self::Url(url) => Origin::Url(url),
        }
    }
}

impl Origin {
    fn locate(&self, reference: &str) -> Result<Target, IncludeError> {
        let invalid = |message: String| IncludeError::InvalidReference {
            reference: reference.to_owned(),
            message,
        };
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("reference is empty".to_owned()));
        }
        if let Ok(url) = Url::parse(trimmed) {
            match url.scheme() {
                "http" | "https" => return Ok(Target::Url(url)),
                "file" => {
                    return url
                        .to_file_path()
                        .map(Target::File)
                        .map_err(|()| invalid("file URL has no local path".to_owned()));
                }
                // Windows drive letters parse as single-letter schemes.
                _ => {}
            }
        }
        match self {
            Self::Url(base) => base
                .join(trimmed)
                .map(Target::Url)
                .map_err(|error| invalid(error.to_string())),
            Self::File(path) => Ok(Target::File(relative_to(path, trimmed))),
            Self::Memory => Ok(Target::File(PathBuf::from(trimmed))),
        }
    }
}

fn relative_to(including: &Path, reference: &str) -> PathBuf {
    let target = Path::new(reference);
    match including.parent() {
        Some(dir) if !target.is_absolute() => dir.join(target),
        _ => target.to_path_buf(),
    }
}

/// Returns `true` for keys that act as include directives.
pub(crate) fn is_directive(key: &str) -> bool {
    key.contains(INCLUDE_MARKER)
}

/// Resolves every include in a tree.
pub(crate) struct IncludeResolver<'a> {
    fetcher: &'a dyn IncludeFetcher,
    max_depth: usize,
}

impl<'a> IncludeResolver<'a> {
    pub(crate) const fn new(fetcher: &'a dyn IncludeFetcher, max_depth: usize) -> Self {
        Self { fetcher, max_depth }
    }

    /// Expands includes below `root`, then strips leftover directive keys.
    pub(crate) fn resolve(&self, root: Node, origin: &Origin) -> Result<Node, IncludeError> {
        let expanded = self.expand(root, origin, 0)?;
        Ok(strip_directives(expanded))
    }

    fn expand(&self, node: Node, origin: &Origin, depth: usize) -> Result<Node, IncludeError> {
        match node {
            Node::Mapping(mapping) => self.expand_mapping(mapping, origin, depth),
            Node::Sequence(items) => items
                .into_iter()
                .map(|item| self.expand(item, origin, depth))
                .collect::<Result<Vec<_>, _>>()
                .map(Node::Sequence),
            scalar @ Node::Scalar(_) => Ok(scalar),
        }
    }

    fn expand_mapping(
        &self,
        mapping: Mapping,
        origin: &Origin,
        depth: usize,
    ) -> Result<Node, IncludeError> {
        let mut literal = Mapping::new();
        let mut directives = Vec::new();
        for (key, value) in mapping {
            match value {
                Node::Scalar(reference) if is_directive(&key) => {
                    directives.push((key, reference.text().to_owned()));
                }
                other => {
                    literal.insert(key, self.expand(other, origin, depth)?);
                }
            }
        }

        let mut merged = Node::Mapping(literal);
        for (key, reference) in directives {
            let included = self.load(&reference, origin, depth + 1)?;
            debug!(
                target: INCLUDE_TARGET,
                key = key.as_str(),
                reference = reference.as_str(),
                depth = depth + 1,
                "merging include"
            );
            merged = merge_included(merged, included);
        }
        Ok(merged)
    }

    fn load(&self, reference: &str, origin: &Origin, depth: usize) -> Result<Node, IncludeError> {
        if depth > self.max_depth {
            return Err(IncludeError::DepthExceeded {
                reference: reference.to_owned(),
                max_depth: self.max_depth,
            });
        }
        let target = origin.locate(reference)?;
        let bytes = match &target {
            Target::File(path) => fs::read(path).map_err(|source| IncludeError::Read {
                path: path.clone(),
                source: Arc::new(source),
            })?,
            Target::Url(url) => self.fetcher.fetch(url)?,
        };
        let tree = node::parse(&bytes).map_err(|failure| match failure {
            ParseFailure::Syntax(source) => IncludeError::Parse {
                reference: reference.to_owned(),
                source,
            },
            ParseFailure::Empty => IncludeError::Empty {
                reference: reference.to_owned(),
            },
        })?;
        self.expand(tree, &target.into_origin(), depth)
    }
}

/// Merges an included tree into the node that declared it.
///
/// A mapping has its keys inserted into the declaring mapping, replacing
/// matching keys in place and appending the rest. A scalar replaces the
/// declaring node only while that node holds nothing but directives; beside
/// literal keys it is skipped so those keys survive. Sequences are not
/// supported and leave the declaring node untouched.
pub(crate) fn merge_included(declaring: Node, included: Node) -> Node {
    match (declaring, included) {
        (Node::Mapping(mut base), Node::Mapping(sub)) => {
            base.merge(sub);
            Node::Mapping(base)
        }
        (base, Node::Sequence(_)) => {
            warn!(
                target: INCLUDE_TARGET,
                "sequence includes are not supported; include skipped"
            );
            base
        }
        (Node::Mapping(base), Node::Scalar(_)) if !base.is_empty() => {
            warn!(
                target: INCLUDE_TARGET,
                keys = base.len(),
                "scalar include beside literal keys; include skipped"
            );
            Node::Mapping(base)
        }
        (_, replacement) => replacement,
    }
}

/// Removes every directive key, at any depth.
pub(crate) fn strip_directives(node: Node) -> Node {
    match node {
        Node::Mapping(mut mapping) => {
            mapping.retain(|key| !is_directive(key));
            Node::Mapping(
                mapping
                    .into_iter()
                    .map(|(key, value)| (key, strip_directives(value)))
                    .collect(),
            )
        }
        Node::Sequence(items) => Node::Sequence(items.into_iter().map(strip_directives).collect()),
        scalar @ Node::Scalar(_) => scalar,
    }
}
