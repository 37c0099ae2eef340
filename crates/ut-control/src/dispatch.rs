//! Dispatch thread: drains the queue and invokes matching callbacks.
//!
//! The dispatch thread starts the service thread and owns its shutdown. Each
//! payload is parsed once. Callbacks run in registration order for every
//! registered key the document contains, so two callbacks sharing a key both
//! run. A panicking callback is logged and does not stop the dispatcher.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};
use ut_kvp::Document;

use crate::message::Message;
use crate::shared::Shared;
use crate::transport::{HandOffError, SocketListener, hand_off, run_service_loop};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Outcome of starting the service thread, reported back to the caller of
/// `start`.
pub(crate) type StartReport = SyncSender<io::Result<()>>;

/// Starts the service thread on `listener`, reports the outcome on `started`,
/// then drains the queue until [`Message::ExitRequested`] arrives or the
/// queue is closed. Stops the service thread and hands its listener back.
///
/// When the service thread cannot be started the listener is returned at
/// once and the queue is left untouched.
pub(crate) fn run(
    shared: &Arc<Shared>,
    listener: SocketListener,
    started: &StartReport,
) -> Option<SocketListener> {
    let service = match spawn_service(shared, listener) {
        Ok(service) => service,
        Err((source, returned)) => {
            error!(target: DISPATCH_TARGET, error = %source, "service thread could not be started");
            shared.request_exit();
            report(started, Err(source));
            return Some(returned);
        }
    };
    report(started, Ok(()));

    debug!(target: DISPATCH_TARGET, "dispatch loop active");
    while let Some(message) = shared.queue.dequeue() {
        match message {
            Message::DataReceived(payload) => {
                dispatch_payload(shared, payload);
            }
            Message::ExitRequested => break,
        }
    }
    shared.request_exit();

    match service.join() {
        Ok(released) => {
            debug!(target: DISPATCH_TARGET, "dispatch loop stopped");
            released
        }
        Err(_) => {
            error!(target: DISPATCH_TARGET, "service thread panicked");
            None
        }
    }
}

fn spawn_service(
    shared: &Arc<Shared>,
    listener: SocketListener,
) -> Result<JoinHandle<Option<SocketListener>>, HandOffError> {
    let loop_shared = Arc::clone(shared);
    hand_off(listener, move |inbox| {
        thread::Builder::new()
            .name("ut-control-service".to_owned())
            .spawn(move || {
                inbox
                    .recv()
                    .ok()
                    .map(|received| run_service_loop(&loop_shared, received))
            })
    })
}

fn report(started: &StartReport, outcome: io::Result<()>) {
    if started.send(outcome).is_err() {
        debug!(target: DISPATCH_TARGET, "start outcome no longer awaited");
    }
}

/// Parses `payload` and runs every callback whose key it contains.
///
/// Returns the number of callbacks invoked.
pub(crate) fn dispatch_payload(shared: &Shared, payload: Vec<u8>) -> usize {
    let bytes = payload.len();
    let document = match Document::from_bytes(payload) {
        Ok(document) => document,
        Err(failure) => {
            warn!(target: DISPATCH_TARGET, bytes, error = %failure, "message discarded");
            return 0;
        }
    };

    let callbacks = shared.registry().callbacks();
    let mut invoked = 0;
    for (key, handler) in callbacks
        .iter()
        .filter(|(key, _)| document.field_present(key))
    {
        invoked += 1;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.on_message(key, &document)));
        if outcome.is_err() {
            error!(target: DISPATCH_TARGET, key = key.as_str(), "message callback panicked");
        }
    }
    debug!(target: DISPATCH_TARGET, bytes, invoked, "message dispatched");
    invoked
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::mpsc;

    use rstest::{fixture, rstest};
    use ut_control_config::Config;

    use super::*;
    use crate::registry::MessageHandler;

    #[fixture]
    fn shared() -> Shared {
        Shared::new(&Config::default())
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Arc<dyn MessageHandler> {
        let sink = Arc::clone(log);
        Arc::new(move |key: &str, document: &Document| {
            let value = document.get_string(key).unwrap_or_default();
            sink.lock().expect("log lock").push(format!("{label}:{key}={value}"));
        })
    }

    #[rstest]
    fn every_matching_callback_runs_in_registration_order(shared: Shared) {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let mut registry = shared.registry_mut();
            registry.register_callback("audio/volume", recorder(&log, "first")).expect("room");
            registry.register_callback("video/mode", recorder(&log, "unused")).expect("room");
            registry.register_callback("audio/volume", recorder(&log, "second")).expect("room");
        }

        let invoked = dispatch_payload(&shared, b"audio:\n  volume: 7\n".to_vec());

        assert_eq!(invoked, 2);
        assert_eq!(
            *log.lock().expect("log lock"),
            ["first:audio/volume=7", "second:audio/volume=7"]
        );
    }

    #[rstest]
    fn malformed_payloads_invoke_nothing(shared: Shared) {
        let log = Arc::new(Mutex::new(Vec::new()));
        shared
            .registry_mut()
            .register_callback("key", recorder(&log, "never"))
            .expect("room");

        assert_eq!(dispatch_payload(&shared, b"key: [unterminated".to_vec()), 0);
        assert_eq!(dispatch_payload(&shared, Vec::new()), 0);
        assert!(log.lock().expect("log lock").is_empty());
    }

    fn explode(_key: &str, _document: &Document) {
        panic!("callback failure");
    }

    #[rstest]
    fn a_panicking_callback_does_not_stop_the_rest(shared: Shared) {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let mut registry = shared.registry_mut();
            registry.register_callback("key", Arc::new(explode)).expect("room");
            registry.register_callback("key", recorder(&log, "after")).expect("room");
        }

        assert_eq!(dispatch_payload(&shared, b"key: value".to_vec()), 2);
        assert_eq!(*log.lock().expect("log lock"), ["after:key=value"]);
    }

    #[rstest]
    fn exit_stops_the_loop_and_the_service_thread(shared: Shared) {
        let handle = Arc::new(shared);
        let listener = SocketListener::bind("127.0.0.1", 0).expect("bind listener");
        let addr = listener.local_addr();
        let (started, outcome) = mpsc::sync_channel(1);
        handle.queue.push_exit();

        let returned = run(&handle, listener, &started);

        assert!(matches!(outcome.try_recv(), Ok(Ok(()))));
        assert_eq!(returned.map(|bound| bound.local_addr()), Some(addr));
        assert!(handle.exit_requested());
    }
}
