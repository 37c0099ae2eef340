//! Per-connection request handling.

use std::net::TcpStream;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::http::{self, HeadRead, RequestHead, Response, Status};
use super::{TRANSPORT_TARGET, TransportError, websocket};
use crate::endpoint;
use crate::registry::HttpMethod;
use crate::shared::Shared;

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream);
}

/// Serves HTTP requests and WebSocket sessions for a control plane.
#[derive(Debug)]
pub(crate) struct ControlConnectionHandler {
    shared: Arc<Shared>,
}

impl ControlConnectionHandler {
    pub(crate) const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn serve(&self, mut stream: TcpStream) -> Result<(), TransportError> {
        let accepted = Instant::now();
        stream
            .set_read_timeout(Some(self.shared.service_interval))
            .map_err(TransportError::io("set read timeout"))?;
        let should_stop = || self.shared.exit_requested();

        let read = http::read_head(&mut stream, accepted, self.shared.head_timeout, &should_stop)
            .map_err(TransportError::io("read request head"))?;
        let (head, raw, leftover) = match read {
            HeadRead::Complete {
                head,
                raw,
                leftover,
            } => (head, raw, leftover),
            HeadRead::Closed => return Ok(()),
            HeadRead::Expired => {
                debug!(
                    target: TRANSPORT_TARGET,
                    timeout_ms = self.shared.head_timeout.as_millis(),
                    "request head deadline passed"
                );
                return send(
                    &mut stream,
                    &Response::plain(Status::RequestTimeout, "request head not received in time\n"),
                );
            }
            HeadRead::TooLarge => {
                return send(
                    &mut stream,
                    &Response::plain(Status::PayloadTooLarge, "request head too large\n"),
                );
            }
            HeadRead::Malformed(error) => {
                debug!(target: TRANSPORT_TARGET, error = %error, "malformed request head");
                return send(
                    &mut stream,
                    &Response::plain(Status::BadRequest, "malformed request\n"),
                );
            }
        };

        if head.is_websocket_upgrade() {
            return websocket::serve(&self.shared, stream, &head, raw, leftover);
        }
        let response = self.route(&mut stream, &head, leftover)?;
        debug!(
            target: TRANSPORT_TARGET,
            method = head.method(),
            path = head.target(),
            status = response.status().code(),
            "request served"
        );
        send(&mut stream, &response)
    }

    fn route(
        &self,
        stream: &mut TcpStream,
        head: &RequestHead,
        leftover: Vec<u8>,
    ) -> Result<Response, TransportError> {
        if head.is_chunked() {
            return Ok(Response::plain(
                Status::BadRequest,
                "chunked request bodies are not supported\n",
            ));
        }
        let Some(length) = head.content_length() else {
            return Ok(Response::plain(Status::BadRequest, "invalid Content-Length\n"));
        };
        if length > self.shared.max_message_bytes {
            return Ok(Response::plain(Status::PayloadTooLarge, "request body too large\n"));
        }
        let should_stop = || self.shared.exit_requested();
        let Some(body) = http::read_body(stream, leftover, length, &should_stop)
            .map_err(TransportError::io("read request body"))?
        else {
            return Ok(Response::plain(Status::BadRequest, "request body truncated\n"));
        };

        let method = HttpMethod::from_str(head.method()).ok();
        let handler =
            method.and_then(|known| self.shared.registry().endpoint(known, head.target()));
        if let (Some(matched), Some(found)) = (method, handler) {
            return Ok(endpoint::respond(
                found.as_ref(),
                matched,
                head.target(),
                head.header("accept"),
                &body,
            ));
        }

        if matches!(method, Some(HttpMethod::Post | HttpMethod::Put)) && !body.is_empty() {
            return Ok(match self.shared.submit(body) {
                Ok(()) => Response::plain(Status::Accepted, "queued\n"),
                Err(error) => Response::plain(Status::ServiceUnavailable, format!("{error}\n")),
            });
        }
        Ok(Response::plain(Status::NotFound, "no handler for this request\n"))
    }
}

impl ConnectionHandler for ControlConnectionHandler {
    fn handle(&self, stream: TcpStream) {
        let peer = stream.peer_addr().ok();
        if let Err(error) = self.serve(stream) {
            warn!(
                target: TRANSPORT_TARGET,
                peer = ?peer,
                error = %error,
                "connection handler error"
            );
        }
    }
}

fn send(stream: &mut TcpStream, response: &Response) -> Result<(), TransportError> {
    response
        .write_to(stream)
        .map_err(TransportError::io("write response"))
}
