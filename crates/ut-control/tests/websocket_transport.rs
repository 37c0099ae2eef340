//! WebSocket sessions against a running control plane.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};
use tungstenite::Message;
use ut_control::ut_kvp::Document;
use ut_control::{Config, ControlPlane, LifecycleState};

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|reserved| reserved.local_addr())
        .expect("reserve a free port")
        .port()
}

#[fixture]
fn plane() -> ControlPlane {
    let config = Config::default()
        .with_host("127.0.0.1")
        .with_port(free_port())
        .with_service_interval(Duration::from_millis(10))
        .with_shutdown_timeout(Duration::from_secs(1))
        .with_max_message_bytes(128);
    ControlPlane::with_config(config).expect("create control plane")
}

fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[rstest]
fn messages_are_dispatched_and_echoed(mut plane: ControlPlane) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    plane
        .register_callback_on_message("test/yamlData", move |key: &str, document: &Document| {
            let value = document.get_string(key).unwrap_or_default();
            sink.lock().expect("sink lock").push(value);
        })
        .expect("register callback");
    plane.start().expect("start");
    let (mut socket, _) =
        tungstenite::connect(format!("ws://{}/", plane.local_addr())).expect("connect websocket");

    let payload = "test:\n  yamlData: first\n";
    socket.send(Message::Text(payload.to_owned())).expect("send text");
    let echo = socket.read().expect("read echo");
    socket
        .send(Message::Binary(b"{\"test\": {\"yamlData\": \"second\"}}".to_vec()))
        .expect("send binary");
    let binary_echo = socket.read().expect("read echo");

    assert_eq!(echo, Message::Text(payload.to_owned()));
    assert!(binary_echo.is_binary());
    assert!(wait_for(|| seen.lock().expect("sink lock").len() == 2));
    assert_eq!(*seen.lock().expect("sink lock"), ["first", "second"]);
    socket.close(None).expect("close websocket");
    plane.exit();
}

#[rstest]
fn oversized_messages_end_the_session(mut plane: ControlPlane) {
    plane.start().expect("start");
    let (mut socket, _) =
        tungstenite::connect(format!("ws://{}/", plane.local_addr())).expect("connect websocket");

    socket
        .send(Message::Text(format!("key: {}", "x".repeat(512))))
        .expect("send oversized text");

    let outcome = socket.read();
    assert!(
        matches!(outcome, Ok(Message::Close(_)) | Err(_)),
        "session should close, got {outcome:?}"
    );
    plane.exit();
}

#[rstest]
fn stopping_closes_open_sessions(mut plane: ControlPlane) {
    plane.start().expect("start");
    let (mut socket, _) =
        tungstenite::connect(format!("ws://{}/", plane.local_addr())).expect("connect websocket");

    plane.stop();

    assert_eq!(plane.state(), LifecycleState::Stopped);
    let outcome = socket.read();
    assert!(
        matches!(outcome, Ok(Message::Close(_)) | Err(_)),
        "session should close, got {outcome:?}"
    );
}
