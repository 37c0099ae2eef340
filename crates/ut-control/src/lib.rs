//! Control plane for embedded applications.
//!
//! A [`ControlPlane`] listens on one TCP port. Clients either upgrade to
//! WebSocket and stream YAML or JSON payloads, or send single HTTP requests.
//! Every payload is queued, parsed into a [`ut_kvp::Document`] on the
//! dispatch thread, and handed to each [`MessageHandler`] whose key the
//! document contains. HTTP requests matching a registered method and path
//! are answered synchronously by an [`EndpointHandler`], with the reply
//! rendered as YAML or JSON according to the client's `Accept` header.
//!
//! ```no_run
//! use ut_control::{ControlPlane, EndpointRequest, HttpMethod};
//! use ut_control::ut_kvp::Document;
//!
//! # fn main() -> Result<(), ut_control::ControlPlaneError> {
//! let mut plane = ControlPlane::init(8080)?;
//! plane.register_callback_on_message("audio/volume", |key: &str, document: &Document| {
//!     tracing::info!(volume = document.get_u32(key), "volume changed");
//! })?;
//! plane.register_endpoint_handler(HttpMethod::Get, "/status", |_request: &EndpointRequest| {
//!     Some("status: ok\n".to_owned())
//! })?;
//! plane.start()?;
//! // ...
//! plane.exit();
//! # Ok(())
//! # }
//! ```
//!
//! Handlers capture whatever state they need; there is no separate user-data
//! pointer. Both kinds of handler may be registered while the instance runs.

mod dispatch;
mod endpoint;
mod error;
mod instance;
mod message;
mod queue;
mod registry;
mod shared;
pub mod telemetry;
mod transport;

pub use endpoint::EndpointRequest;
pub use error::{ControlPlaneError, ControlPlaneStatus, HandlerKind};
pub use instance::{ControlPlane, LifecycleState};
pub use message::Message;
pub use queue::{EnqueueError, MessageQueue};
pub use registry::{EndpointHandler, HttpMethod, MAX_KEY_SIZE, MessageHandler};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::TransportError;
pub use ut_control_config::Config;
pub use ut_kvp;

#[cfg(test)]
mod tests;
