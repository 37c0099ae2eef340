//! Behavioural tests for the instance lifecycle and dispatch ordering.

use std::cell::RefCell;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use ut_control_config::Config;
use ut_kvp::Document;

use crate::{ControlPlane, ControlPlaneError, ControlPlaneStatus};

struct World {
    plane: Option<ControlPlane>,
    calls: Arc<Mutex<Vec<usize>>>,
    registrations: Vec<Result<(), ControlPlaneError>>,
}

impl World {
    fn new() -> Self {
        Self {
            plane: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            registrations: Vec::new(),
        }
    }

    fn create(&mut self, config: Config) {
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|reserved| reserved.local_addr())
            .expect("reserve a free port")
            .port();
        let local = config
            .with_host("127.0.0.1")
            .with_port(port)
            .with_service_interval(Duration::from_millis(10))
            .with_shutdown_timeout(Duration::from_secs(1));
        self.plane = Some(ControlPlane::with_config(local).expect("create control plane"));
    }

    fn plane(&mut self) -> &mut ControlPlane {
        self.plane.as_mut().expect("control plane should be created")
    }

    fn register(&mut self, count: usize, key: &str) {
        for index in 1..=count {
            let calls = Arc::clone(&self.calls);
            let result = self.plane().register_callback_on_message(
                key,
                move |_key: &str, _document: &Document| {
                    calls.lock().expect("calls lock").push(index);
                },
            );
            self.registrations.push(result);
        }
    }

    fn calls(&self) -> Vec<usize> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn wait_for_calls(&self, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.calls().len() >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

#[fixture]
fn world() -> RefCell<World> {
    RefCell::new(World::new())
}

#[given("a control plane on a free port")]
fn given_control_plane(world: &RefCell<World>) {
    world.borrow_mut().create(Config::default());
}

#[given("a control plane with room for {capacity} callbacks")]
fn given_small_control_plane(world: &RefCell<World>, capacity: usize) {
    world
        .borrow_mut()
        .create(Config::default().with_max_callback_entries(capacity));
}

#[given(r#"{count} message callback for "{key}""#)]
fn given_one_callback(world: &RefCell<World>, count: usize, key: String) {
    world.borrow_mut().register(count, &key);
    assert!(world.borrow().registrations.iter().all(Result::is_ok));
}

#[given(r#"{count} message callbacks for "{key}""#)]
fn given_callbacks(world: &RefCell<World>, count: usize, key: String) {
    given_one_callback(world, count, key);
}

#[when(r#"{count} message callbacks for "{key}" are registered"#)]
fn when_callbacks_registered(world: &RefCell<World>, count: usize, key: String) {
    world.borrow_mut().register(count, &key);
}

#[when("the control plane is started")]
fn when_started(world: &RefCell<World>) {
    world.borrow_mut().plane().start().expect("start control plane");
}

#[when("the control plane is stopped")]
fn when_stopped(world: &RefCell<World>) {
    world.borrow_mut().plane().stop();
}

#[when(r#"a payload containing "{key}" is submitted"#)]
fn when_payload_submitted(world: &RefCell<World>, key: String) {
    let payload = match key.split_once('/') {
        Some((parent, child)) => format!("{parent}:\n  {child}: value\n"),
        None => format!("{key}: value\n"),
    };
    world.borrow_mut().plane().submit(payload).expect("queue payload");
}

#[then("no callback has run")]
fn then_no_callback(world: &RefCell<World>) {
    assert!(world.borrow().calls().is_empty());
}

#[then(r#"the control plane is "{state}""#)]
fn then_state(world: &RefCell<World>, state: String) {
    assert_eq!(world.borrow_mut().plane().state().to_string(), state);
}

#[then("callbacks 1 to {count} ran once each in order")]
fn then_callbacks_in_order(world: &RefCell<World>, count: usize) {
    assert!(world.borrow().wait_for_calls(count), "callbacks did not run");
    let expected: Vec<usize> = (1..=count).collect();
    assert_eq!(world.borrow().calls(), expected);
}

#[then("registration {index} reports a full list")]
fn then_registration_full(world: &RefCell<World>, index: usize) {
    let state = world.borrow();
    let outcome = state
        .registrations
        .get(index - 1)
        .expect("registration should have been attempted");
    let error = outcome.as_ref().expect_err("registration should fail");
    assert_eq!(error.status(), ControlPlaneStatus::ListFull);
    assert!(state.registrations.iter().take(index - 1).all(Result::is_ok));
}

#[scenario(
    path = "tests/features/control_plane.feature",
    name = "Starting and stopping without traffic"
)]
fn start_stop_without_traffic(world: RefCell<World>) {
    drop(world);
}

#[scenario(
    path = "tests/features/control_plane.feature",
    name = "Callbacks sharing a key run in registration order"
)]
fn shared_key_dispatch_order(world: RefCell<World>) {
    drop(world);
}

#[scenario(
    path = "tests/features/control_plane.feature",
    name = "Payloads without a registered key are ignored"
)]
fn unmatched_payloads_ignored(world: RefCell<World>) {
    drop(world);
}

#[scenario(
    path = "tests/features/control_plane.feature",
    name = "Registration beyond capacity is rejected"
)]
fn registration_capacity(world: RefCell<World>) {
    drop(world);
}
