//! Listening socket and the service loop that polls it.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::http::{Response, Status};
use super::{ConnectionHandler, ControlConnectionHandler, TRANSPORT_TARGET, TransportError};
use crate::shared::Shared;

const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const REFUSAL_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// A listener that could not be handed to a new thread, with the reason.
pub(crate) type HandOffError = (io::Error, SocketListener);

/// Non-blocking TCP listener bound for the lifetime of a control plane.
#[derive(Debug)]
pub(crate) struct SocketListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl SocketListener {
    pub(crate) fn bind(host: &str, port: u16) -> Result<Self, TransportError> {
        let listener = bind_tcp(host, port)?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::NonBlocking { source })?;
        let local_addr = listener
            .local_addr()
            .map_err(TransportError::io("read listener address"))?;
        info!(target: TRANSPORT_TARGET, address = %local_addr, "socket listener bound");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub(crate) const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn accept(&self) -> io::Result<Option<TcpStream>> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(stream))
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Starts a thread with `spawn`, then sends it `listener`.
///
/// The listener only moves once the thread exists, so a failed spawn hands it
/// back instead of dropping it with the closure.
pub(crate) fn hand_off<T, F>(
    listener: SocketListener,
    spawn: F,
) -> Result<JoinHandle<T>, HandOffError>
where
    F: FnOnce(Receiver<SocketListener>) -> io::Result<JoinHandle<T>>,
{
    let (sender, receiver) = mpsc::channel();
    match spawn(receiver) {
        Ok(handle) => match sender.send(listener) {
            Ok(()) => Ok(handle),
            Err(SendError(returned)) => Err((
                io::Error::other("thread exited before receiving the listener"),
                returned,
            )),
        },
        Err(source) => Err((source, listener)),
    }
}

/// Accepts connections every service interval until exit is requested.
///
/// At most `max_connections` connections are served at once; the rest are
/// answered with 503 and closed. Connection threads are joined before the
/// listener is handed back.
pub(crate) fn run_service_loop(shared: &Arc<Shared>, listener: SocketListener) -> SocketListener {
    let handler: Arc<dyn ConnectionHandler> =
        Arc::new(ControlConnectionHandler::new(Arc::clone(shared)));
    let mut connections: Vec<JoinHandle<()>> = Vec::new();
    let mut last_error = None::<io::ErrorKind>;
    debug!(target: TRANSPORT_TARGET, address = %listener.local_addr, "service loop active");

    while !shared.exit_requested() {
        let backoff = match accept_pending(
            &listener,
            &handler,
            &mut connections,
            shared.max_connections,
        ) {
            Ok(()) => {
                last_error = None;
                shared.service_interval
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(target: TRANSPORT_TARGET, error = %error, "socket accept error");
                }
                last_error = Some(kind);
                ERROR_BACKOFF
            }
        };
        connections.retain(|connection| !connection.is_finished());
        thread::sleep(backoff);
    }

    for connection in connections {
        if connection.join().is_err() {
            warn!(target: TRANSPORT_TARGET, "connection thread panicked");
        }
    }
    debug!(target: TRANSPORT_TARGET, "service loop stopped");
    listener
}

fn accept_pending(
    listener: &SocketListener,
    handler: &Arc<dyn ConnectionHandler>,
    connections: &mut Vec<JoinHandle<()>>,
    max_connections: usize,
) -> io::Result<()> {
    while let Some(stream) = listener.accept()? {
        connections.retain(|connection| !connection.is_finished());
        if connections.len() >= max_connections {
            refuse(stream, max_connections);
            continue;
        }
        let connection_handler = Arc::clone(handler);
        let connection = thread::Builder::new()
            .name("ut-control-conn".to_owned())
            .spawn(move || connection_handler.handle(stream))?;
        connections.push(connection);
    }
    Ok(())
}

fn refuse(mut stream: TcpStream, max_connections: usize) {
    warn!(
        target: TRANSPORT_TARGET,
        max_connections,
        "connection limit reached; connection refused"
    );
    let response = Response::plain(Status::ServiceUnavailable, "too many connections\n");
    let written = stream
        .set_write_timeout(Some(REFUSAL_WRITE_TIMEOUT))
        .and_then(|()| response.write_to(&mut stream));
    if let Err(error) = written {
        debug!(target: TRANSPORT_TARGET, error = %error, "refusal not delivered");
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, TransportError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| TransportError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })?;
    TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })
}
