//! Single-port HTTP and WebSocket transport.
//!
//! The service thread polls a non-blocking listener and hands each accepted
//! connection to its own thread. A connection either upgrades to WebSocket,
//! where every data frame becomes a queued message, or carries one HTTP
//! request that is routed to an endpoint handler or queued.

mod errors;
mod handler;
mod http;
mod listener;
mod websocket;

pub use self::errors::TransportError;
pub(crate) use self::handler::{ConnectionHandler, ControlConnectionHandler};
pub(crate) use self::http::{Response, Status};
pub(crate) use self::listener::{HandOffError, SocketListener, hand_off, run_service_loop};

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
