//! WebSocket sessions on the shared port.
//!
//! The request head has already been read to route the connection, so the
//! handshake runs over a [`Replay`] stream that hands those bytes back to
//! `tungstenite` first. Every text or binary frame is queued for dispatch and
//! echoed back to the sender. Sessions end when the peer closes or the control
//! plane stops.

use std::io::{self, Cursor, Read, Write};
use std::net::TcpStream;

use tracing::{debug, info, warn};
use tungstenite::handshake::HandshakeError;
use tungstenite::protocol::WebSocketConfig;
use tungstenite::{Error as WsError, Message, WebSocket};

use super::http::{RequestHead, Response, Status};
use super::{TRANSPORT_TARGET, TransportError};
use crate::shared::Shared;

type Session = WebSocket<Replay<TcpStream>>;

/// Yields previously buffered bytes before reading from `inner`.
#[derive(Debug)]
pub(crate) struct Replay<S> {
    buffered: Cursor<Vec<u8>>,
    inner: S,
}

impl<S> Replay<S> {
    pub(crate) const fn new(buffered: Vec<u8>, inner: S) -> Self {
        Self {
            buffered: Cursor::new(buffered),
            inner,
        }
    }
}

impl<S: Read> Read for Replay<S> {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let replayed = self.buffered.read(buffer)?;
        if replayed > 0 || buffer.is_empty() {
            return Ok(replayed);
        }
        self.inner.read(buffer)
    }
}

impl<S: Write> Write for Replay<S> {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        self.inner.write(buffer)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Completes the upgrade and runs the session until it ends.
///
/// `raw` holds the request head as received and `leftover` any bytes the
/// client sent after it.
pub(crate) fn serve(
    shared: &Shared,
    mut stream: TcpStream,
    head: &RequestHead,
    mut raw: Vec<u8>,
    leftover: Vec<u8>,
) -> Result<(), TransportError> {
    if head.header("sec-websocket-key").is_none() {
        return Response::plain(Status::BadRequest, "missing Sec-WebSocket-Key\n")
            .write_to(&mut stream)
            .map_err(TransportError::io("write response"));
    }
    raw.extend(leftover);
    let config = WebSocketConfig {
        max_message_size: Some(shared.max_message_bytes),
        max_frame_size: Some(shared.max_message_bytes),
        ..WebSocketConfig::default()
    };
    let Some(mut socket) = handshake(shared, Replay::new(raw, stream), config)? else {
        return Ok(());
    };
    info!(target: TRANSPORT_TARGET, path = head.target(), "websocket session opened");
    let result = run_session(shared, &mut socket);
    info!(target: TRANSPORT_TARGET, "websocket session closed");
    result
}

/// Runs the server handshake, retrying reads that time out. `None` when
/// shutdown was requested first.
fn handshake(
    shared: &Shared,
    stream: Replay<TcpStream>,
    config: WebSocketConfig,
) -> Result<Option<Session>, TransportError> {
    let mut attempt = tungstenite::accept_with_config(stream, Some(config));
    loop {
        match attempt {
            Ok(socket) => return Ok(Some(socket)),
            Err(HandshakeError::Interrupted(pending)) => {
                if shared.exit_requested() {
                    return Ok(None);
                }
                attempt = pending.handshake();
            }
            Err(HandshakeError::Failure(error)) => return Err(TransportError::websocket(error)),
        }
    }
}

fn run_session(shared: &Shared, socket: &mut Session) -> Result<(), TransportError> {
    loop {
        if shared.exit_requested() {
            close(socket);
            return Ok(());
        }
        match socket.read() {
            Ok(message @ (Message::Text(_) | Message::Binary(_))) => {
                let payload = message.clone().into_data();
                debug!(target: TRANSPORT_TARGET, bytes = payload.len(), "websocket message received");
                if let Err(error) = shared.submit(payload) {
                    debug!(target: TRANSPORT_TARGET, error = %error, "websocket message not queued");
                }
                socket.send(message).map_err(TransportError::websocket)?;
            }
            Ok(_) => {}
            Err(WsError::Io(error))
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return Ok(()),
            Err(WsError::Capacity(error)) => {
                warn!(target: TRANSPORT_TARGET, error = %error, "websocket message too large");
                close(socket);
                return Ok(());
            }
            Err(error) => return Err(TransportError::websocket(error)),
        }
    }
}

fn close(socket: &mut Session) {
    if let Err(error) = socket.close(None).and_then(|()| socket.flush()) {
        debug!(target: TRANSPORT_TARGET, error = %error, "websocket close failed");
    }
}
