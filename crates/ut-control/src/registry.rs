//! Handler table shared by the caller and the dispatch thread.
//!
//! Message callbacks are keyed by a document path; endpoint handlers by an
//! HTTP method and request path. Each kind has its own fixed capacity and
//! keeps registration order, which is also dispatch order.

use std::fmt;
use std::sync::Arc;

use strum::{AsRefStr, Display, EnumString};
use tracing::debug;
use ut_kvp::Document;

use crate::endpoint::EndpointRequest;
use crate::error::{ControlPlaneError, HandlerKind};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Keys must be shorter than this many bytes.
pub const MAX_KEY_SIZE: usize = 64;

/// Callback invoked when a received payload contains the registered key.
///
/// The document is only valid for the duration of the call.
pub trait MessageHandler: Send + Sync {
    /// Handles a payload matching `key`.
    fn on_message(&self, key: &str, document: &Document);
}

impl<F> MessageHandler for F
where
    F: Fn(&str, &Document) + Send + Sync,
{
    fn on_message(&self, key: &str, document: &Document) {
        self(key, document);
    }
}

/// Handler producing the body of a REST-style response.
///
/// The returned text must be YAML or JSON; it is re-emitted in the format the
/// client accepts. `None` signals an internal failure.
pub trait EndpointHandler: Send + Sync {
    /// Produces a response for `request`.
    fn on_request(&self, request: &EndpointRequest) -> Option<String>;
}

impl<F> EndpointHandler for F
where
    F: Fn(&EndpointRequest) -> Option<String> + Send + Sync,
{
    fn on_request(&self, request: &EndpointRequest) -> Option<String> {
        self(request)
    }
}

/// HTTP methods an endpoint can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `PATCH`
    Patch,
}

#[derive(Clone)]
struct CallbackEntry {
    key: String,
    handler: Arc<dyn MessageHandler>,
}

#[derive(Clone)]
struct EndpointEntry {
    method: HttpMethod,
    path: String,
    handler: Arc<dyn EndpointHandler>,
}

/// Registered callback handed to the dispatcher.
pub(crate) type CallbackSnapshot = Vec<(String, Arc<dyn MessageHandler>)>;

pub(crate) struct Registry {
    callbacks: Vec<CallbackEntry>,
    endpoints: Vec<EndpointEntry>,
    capacity: usize,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("callbacks", &self.callbacks.len())
            .field("endpoints", &self.endpoints.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Registry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            callbacks: Vec::with_capacity(capacity),
            endpoints: Vec::new(),
            capacity,
        }
    }

    pub(crate) fn register_callback(
        &mut self,
        key: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), ControlPlaneError> {
        validate_key(key)?;
        if self.callbacks.len() >= self.capacity {
            return Err(ControlPlaneError::ListFull {
                kind: HandlerKind::Message,
                capacity: self.capacity,
            });
        }
        self.callbacks.push(CallbackEntry {
            key: key.to_owned(),
            handler,
        });
        debug!(
            target: REGISTRY_TARGET,
            key,
            entries = self.callbacks.len(),
            "message callback registered"
        );
        Ok(())
    }

    pub(crate) fn register_endpoint(
        &mut self,
        method: HttpMethod,
        path: &str,
        handler: Arc<dyn EndpointHandler>,
    ) -> Result<(), ControlPlaneError> {
        if path.trim().is_empty() {
            return Err(ControlPlaneError::invalid_param("path", "must name a resource"));
        }
        let resource = normalise_path(path);
        if self.endpoints.len() >= self.capacity {
            return Err(ControlPlaneError::ListFull {
                kind: HandlerKind::Endpoint,
                capacity: self.capacity,
            });
        }
        self.endpoints.push(EndpointEntry {
            method,
            path: resource.to_owned(),
            handler,
        });
        debug!(
            target: REGISTRY_TARGET,
            %method,
            path = resource,
            entries = self.endpoints.len(),
            "endpoint handler registered"
        );
        Ok(())
    }

    /// Copies the callback table so handlers run without the lock held.
    pub(crate) fn callbacks(&self) -> CallbackSnapshot {
        self.callbacks
            .iter()
            .map(|entry| (entry.key.clone(), Arc::clone(&entry.handler)))
            .collect()
    }

    pub(crate) fn endpoint(&self, method: HttpMethod, path: &str) -> Option<Arc<dyn EndpointHandler>> {
        let resource = normalise_path(path);
        self.endpoints
            .iter()
            .find(|entry| entry.method == method && entry.path == resource)
            .map(|entry| Arc::clone(&entry.handler))
    }
}

fn validate_key(key: &str) -> Result<(), ControlPlaneError> {
    if key.is_empty() {
        return Err(ControlPlaneError::invalid_param("key", "must not be empty"));
    }
    if key.len() >= MAX_KEY_SIZE {
        return Err(ControlPlaneError::invalid_param(
            "key",
            format!("must be shorter than {MAX_KEY_SIZE} bytes"),
        ));
    }
    Ok(())
}

/// Drops a leading separator and any query string. The root path `/`
/// becomes the empty resource.
pub(crate) fn normalise_path(path: &str) -> &str {
    let without_query = path.split_once('?').map_or(path, |(resource, _)| resource);
    without_query.strip_prefix('/').unwrap_or(without_query)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::error::ControlPlaneStatus;

    #[fixture]
    fn registry() -> Registry {
        Registry::new(3)
    }

    fn noop() -> Arc<dyn MessageHandler> {
        Arc::new(|_key: &str, _document: &Document| {})
    }

    fn fixed(body: &'static str) -> Arc<dyn EndpointHandler> {
        Arc::new(move |_request: &EndpointRequest| Some(body.to_owned()))
    }

    #[rstest]
    fn registration_beyond_capacity_reports_a_full_list(mut registry: Registry) {
        for index in 0..3 {
            registry
                .register_callback(&format!("key/{index}"), noop())
                .expect("room");
        }

        let error = registry
            .register_callback("key/overflow", noop())
            .expect_err("table is full");

        assert_eq!(error.status(), ControlPlaneStatus::ListFull);
        assert_eq!(registry.callbacks().len(), 3);
        registry
            .register_endpoint(HttpMethod::Get, "/still/room", fixed("ok: true"))
            .expect("endpoint table is separate");
    }

    #[rstest]
    #[case("")]
    #[case(&"k".repeat(MAX_KEY_SIZE))]
    fn invalid_keys_are_rejected(mut registry: Registry, #[case] key: &str) {
        let error = registry.register_callback(key, noop()).expect_err("invalid");
        assert_eq!(error.status(), ControlPlaneStatus::InvalidParam);
    }

    #[rstest]
    fn callbacks_keep_registration_order(mut registry: Registry) {
        registry.register_callback("b", noop()).expect("room");
        registry.register_callback("a", noop()).expect("room");
        registry.register_callback("b", noop()).expect("room");

        let keys: Vec<String> = registry.callbacks().into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, ["b", "a", "b"]);
    }

    #[rstest]
    #[case(HttpMethod::Get, "/status", true)]
    #[case(HttpMethod::Get, "status", true)]
    #[case(HttpMethod::Get, "/status?verbose=1", true)]
    #[case(HttpMethod::Post, "/status", false)]
    #[case(HttpMethod::Get, "/status/extra", false)]
    fn endpoints_match_on_method_and_path(
        mut registry: Registry,
        #[case] method: HttpMethod,
        #[case] path: &str,
        #[case] expected: bool,
    ) {
        registry
            .register_endpoint(HttpMethod::Get, "/status", fixed("up: true"))
            .expect("room");
        assert_eq!(registry.endpoint(method, path).is_some(), expected);
    }

    #[rstest]
    #[case("/", true)]
    #[case("/?verbose=1", true)]
    #[case("/status", false)]
    fn the_root_path_can_be_registered(
        mut registry: Registry,
        #[case] path: &str,
        #[case] expected: bool,
    ) {
        registry
            .register_endpoint(HttpMethod::Get, "/", fixed("root: true"))
            .expect("root is a valid resource");
        assert_eq!(registry.endpoint(HttpMethod::Get, path).is_some(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("  ")]
    fn blank_paths_are_rejected(mut registry: Registry, #[case] path: &str) {
        let error = registry
            .register_endpoint(HttpMethod::Get, path, fixed("never: true"))
            .expect_err("blank path");
        assert_eq!(error.status(), ControlPlaneStatus::InvalidParam);
    }

    #[rstest]
    #[case("get", HttpMethod::Get)]
    #[case("POST", HttpMethod::Post)]
    #[case("Put", HttpMethod::Put)]
    fn methods_parse_case_insensitively(#[case] text: &str, #[case] expected: HttpMethod) {
        assert_eq!(text.parse::<HttpMethod>().ok(), Some(expected));
        assert_eq!(expected.to_string(), text.to_ascii_uppercase());
    }
}
