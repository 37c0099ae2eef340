use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Defaults, the file, the environment and the arguments could not be
    /// merged into a [`crate::Config`].
    #[error("failed to load configuration: {0}")]
    Load(#[source] Arc<OrthoError>),

    /// A field holds a value the control plane cannot run with.
    #[error("invalid configuration field '{field}': {message}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

impl From<Arc<OrthoError>> for ConfigError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Load(source)
    }
}
