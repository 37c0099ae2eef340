//! Error types for transport operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while binding the listener or serving a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host and port did not resolve.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Host that was resolved.
        host: String,
        /// Port that was resolved.
        port: u16,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// The host resolved to no usable address.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Host that was resolved.
        host: String,
        /// Port that was resolved.
        port: u16,
    },
    /// The listener could not be bound.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    Bind {
        /// Address that was bound.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The listener could not be switched to non-blocking mode.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Socket I/O failed while serving a connection.
    #[error("failed to {operation}: {source}")]
    Io {
        /// What was being attempted.
        operation: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The WebSocket session failed.
    #[error("websocket session failed: {source}")]
    WebSocket {
        /// Protocol error.
        #[source]
        source: Box<tungstenite::Error>,
    },
}

impl TransportError {
    pub(crate) fn io(operation: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { operation, source }
    }

    pub(crate) fn websocket(source: tungstenite::Error) -> Self {
        Self::WebSocket {
            source: Box::new(source),
        }
    }
}
