//! Control-plane instance and its lifecycle.
//!
//! `Created -> Running -> Stopping -> Stopped`, with `Stopped -> Running` on
//! restart. Starting spawns the dispatch thread, which drains the queue, and
//! the dispatch thread spawns the service thread, which polls the transport,
//! so the service thread's whole life sits inside the dispatcher's. A failed
//! start leaves the listener with the instance. Stopping is cooperative through the exit sentinel and
//! bounded by the configured shutdown timeout.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use strum::Display;
use tracing::{debug, error, info, warn};
use ut_control_config::Config;

use crate::dispatch;
use crate::error::ControlPlaneError;
use crate::queue::EnqueueError;
use crate::registry::{EndpointHandler, HttpMethod, MessageHandler};
use crate::shared::Shared;
use crate::transport::{SocketListener, hand_off};

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Lifecycle state of a [`ControlPlane`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    /// Bound and accepting registrations; no threads running.
    Created,
    /// Service and dispatch threads are running.
    Running,
    /// Shutdown is in progress.
    Stopping,
    /// Threads have been stopped; the instance may be started again.
    Stopped,
}

/// A control plane bound to one port.
///
/// Dropping the instance stops it.
#[derive(Debug)]
pub struct ControlPlane {
    config: Config,
    shared: Arc<Shared>,
    listener: Option<SocketListener>,
    dispatch: Option<JoinHandle<Option<SocketListener>>>,
    local_addr: SocketAddr,
    state: LifecycleState,
}

impl ControlPlane {
    /// Binds a control plane to `port` on all interfaces with default
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::InvalidParam`] for port zero and
    /// [`ControlPlaneError::Transport`] when the port cannot be bound.
    pub fn init(port: u16) -> Result<Self, ControlPlaneError> {
        if port == 0 {
            return Err(ControlPlaneError::invalid_param("port", "must be non-zero"));
        }
        Self::with_config(Config::default().with_port(port))
    }

    /// Binds a control plane using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Config`] when the configuration fails
    /// validation and [`ControlPlaneError::Transport`] when binding fails.
    pub fn with_config(config: Config) -> Result<Self, ControlPlaneError> {
        config.validate()?;
        let listener = SocketListener::bind(config.host(), config.port())?;
        let local_addr = listener.local_addr();
        let shared = Arc::new(Shared::new(&config));
        info!(target: LIFECYCLE_TARGET, address = %local_addr, "control plane created");
        Ok(Self {
            config,
            shared,
            listener: Some(listener),
            dispatch: None,
            local_addr,
            state: LifecycleState::Created,
        })
    }

    /// Registers `handler` for payloads containing `key`.
    ///
    /// Handlers registered under the same key all run, in registration order.
    /// Registration is allowed while running.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::InvalidParam`] for an empty or overlong
    /// key and [`ControlPlaneError::ListFull`] at capacity.
    pub fn register_callback_on_message<H>(&self, key: &str, handler: H) -> Result<(), ControlPlaneError>
    where
        H: MessageHandler + 'static,
    {
        self.shared
            .registry_mut()
            .register_callback(key, Arc::new(handler))
    }

    /// Registers `handler` for requests matching `method` and `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::InvalidParam`] for an empty path and
    /// [`ControlPlaneError::ListFull`] at capacity.
    pub fn register_endpoint_handler<H>(
        &self,
        method: HttpMethod,
        path: &str,
        handler: H,
    ) -> Result<(), ControlPlaneError>
    where
        H: EndpointHandler + 'static,
    {
        self.shared
            .registry_mut()
            .register_endpoint(method, path, Arc::new(handler))
    }

    /// Spawns the service and dispatch threads.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::InvalidState`] unless the instance is
    /// created or stopped, [`ControlPlaneError::Transport`] when the port
    /// cannot be bound again, and [`ControlPlaneError::Spawn`] when a thread
    /// cannot be started.
    pub fn start(&mut self) -> Result<(), ControlPlaneError> {
        if !matches!(self.state, LifecycleState::Created | LifecycleState::Stopped) {
            return Err(ControlPlaneError::InvalidState { state: self.state });
        }
        let listener = match self.listener.take() {
            Some(kept) => kept,
            None => SocketListener::bind(self.config.host(), self.local_addr.port())?,
        };
        self.local_addr = listener.local_addr();
        self.shared.clear_exit();
        self.shared.queue.reopen();

        let shared = Arc::clone(&self.shared);
        let (started, start_outcome) = mpsc::sync_channel(1);
        let spawned = hand_off(listener, move |inbox| {
            thread::Builder::new()
                .name("ut-control-dispatch".to_owned())
                .spawn(move || {
                    let received = inbox.recv().ok()?;
                    dispatch::run(&shared, received, &started)
                })
        });
        let dispatch = match spawned {
            Ok(handle) => handle,
            Err((source, returned)) => {
                self.listener = Some(returned);
                return Err(ControlPlaneError::Spawn {
                    thread: "dispatch",
                    source,
                });
            }
        };
        let service_started = start_outcome.recv().unwrap_or_else(|_| {
            Err(io::Error::other("dispatch thread exited before starting the service thread"))
        });
        if let Err(source) = service_started {
            self.listener = dispatch.join().ok().flatten();
            self.shared.clear_exit();
            return Err(ControlPlaneError::Spawn {
                thread: "service",
                source,
            });
        }
        self.dispatch = Some(dispatch);

        self.state = LifecycleState::Running;
        info!(target: LIFECYCLE_TARGET, address = %self.local_addr, "control plane started");
        Ok(())
    }

    /// Stops both threads. Does nothing unless the instance is running.
    ///
    /// Waits up to the shutdown timeout for the dispatcher to reach the exit
    /// sentinel. If it does not, the queue is closed and the wait repeated;
    /// a dispatcher still stuck in a callback after that is detached.
    pub fn stop(&mut self) {
        let Some(dispatch) = self.dispatch.take() else {
            return;
        };
        self.state = LifecycleState::Stopping;
        info!(target: LIFECYCLE_TARGET, "control plane stopping");
        self.shared.queue.push_exit();

        let timeout = self.config.shutdown_timeout();
        let finished = wait_for(dispatch, timeout).or_else(|pending| {
            warn!(
                target: LIFECYCLE_TARGET,
                timeout_ms = timeout.as_millis(),
                "dispatch thread did not stop in time; closing the queue"
            );
            self.shared.request_exit();
            self.shared.queue.close();
            wait_for(pending, timeout)
        });

        match finished {
            Ok(stopped) => match stopped.join() {
                Ok(released) => self.listener = released,
                Err(_) => error!(target: LIFECYCLE_TARGET, "dispatch thread panicked"),
            },
            Err(_detached) => {
                error!(
                    target: LIFECYCLE_TARGET,
                    timeout_ms = timeout.as_millis(),
                    "dispatch thread detached after shutdown timeout"
                );
                self.shared = Arc::new(self.shared.renewed());
            }
        }

        let discarded = self.shared.queue.clear();
        if discarded > 0 {
            debug!(target: LIFECYCLE_TARGET, discarded, "pending messages discarded");
        }
        self.state = LifecycleState::Stopped;
        info!(target: LIFECYCLE_TARGET, "control plane stopped");
    }

    /// Stops the instance if needed and releases it.
    pub fn exit(mut self) {
        self.stop();
        debug!(target: LIFECYCLE_TARGET, address = %self.local_addr, "control plane released");
    }

    /// Queues `payload` for dispatch as if a client had sent it.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError`] when the queue is full or closed.
    pub fn submit(&self, payload: impl Into<Vec<u8>>) -> Result<(), EnqueueError> {
        self.shared.submit(payload.into())
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Address the transport is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Messages rejected by the queue since the last forced shutdown.
    #[must_use]
    pub fn dropped_messages(&self) -> u64 {
        self.shared.queue.dropped()
    }

    /// Configuration the instance was created with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for ControlPlane {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Polls until `handle` finishes or `timeout` passes, handing it back either
/// way.
fn wait_for<T>(handle: JoinHandle<T>, timeout: Duration) -> Result<JoinHandle<T>, JoinHandle<T>> {
    let began = Instant::now();
    while !handle.is_finished() {
        if began.elapsed() >= timeout {
            return Err(handle);
        }
        thread::sleep(JOIN_POLL);
    }
    Ok(handle)
}
