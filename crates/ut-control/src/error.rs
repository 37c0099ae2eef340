//! Status codes and errors surfaced by control plane operations.

use std::io;

use strum::Display;
use thiserror::Error;
use ut_control_config::ConfigError;

use crate::instance::LifecycleState;
use crate::transport::TransportError;

/// Flat status codes reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPlaneStatus {
    /// Operation successful.
    Ok,
    /// The handler table is at capacity.
    ListFull,
    /// The instance cannot perform the operation.
    InvalidHandle,
    /// A parameter was rejected.
    InvalidParam,
}

/// Kind of handler a registration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum HandlerKind {
    /// Keyed message callback.
    Message,
    /// Method and path endpoint.
    Endpoint,
}

/// Errors raised by control plane operations.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// A parameter was rejected before any work was attempted.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParam {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        message: String,
    },

    /// The handler table is full.
    #[error("{kind} handler table is full ({capacity} entries)")]
    ListFull {
        /// Table that is full.
        kind: HandlerKind,
        /// Table capacity.
        capacity: usize,
    },

    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport could not be set up.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation does not apply in the current lifecycle state.
    #[error("operation is not valid while the control plane is {state}")]
    InvalidState {
        /// State at the time of the call.
        state: LifecycleState,
    },

    /// A worker thread could not be spawned.
    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        /// Thread role.
        thread: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl ControlPlaneError {
    /// Collapses the error into its flat status code.
    #[must_use]
    pub const fn status(&self) -> ControlPlaneStatus {
        match self {
            Self::InvalidParam { .. } | Self::Config(_) => ControlPlaneStatus::InvalidParam,
            Self::ListFull { .. } => ControlPlaneStatus::ListFull,
            Self::Transport(_) | Self::InvalidState { .. } | Self::Spawn { .. } => {
                ControlPlaneStatus::InvalidHandle
            }
        }
    }

    pub(crate) fn invalid_param(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            name,
            message: message.into(),
        }
    }
}
