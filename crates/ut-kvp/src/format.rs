//! Output formats a document can be emitted in.

use std::fmt;

/// Text format for [`crate::Document::data_as`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocumentFormat {
    /// Block-style YAML.
    #[default]
    Yaml,
    /// Pretty-printed JSON.
    Json,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        })
    }
}
