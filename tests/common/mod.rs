#![allow(dead_code)]

use fanctl::execution::{OperationState, Receiver, Sender};
use std::os::unix::process::ExitStatusExt;
use std::pin::Pin;
use std::process::Command;
use std::sync::{Arc, Mutex};

const CHILD_ENV: &str = "FANCTL_ABORT_CHILD";

/// Runs `body` in a copy of the test binary and checks it aborts with `expected` on stderr.
///
/// `test_name` must be the name of the calling test, so the child runs only that test.
pub fn assert_aborts(test_name: &str, expected: &str, body: impl FnOnce()) {
    if std::env::var_os(CHILD_ENV).is_some() {
        body();
        return;
    }

    let output = Command::new(std::env::current_exe().unwrap())
        .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        output.status.signal(),
        Some(libc::SIGABRT),
        "Child should abort, status {:?}, stderr:\n{stderr}",
        output.status
    );
    assert!(
        stderr.contains(expected),
        "Expected {expected:?} on stderr, got:\n{stderr}"
    );
}

pub type Events = Arc<Mutex<Vec<String>>>;

pub fn record(events: &Events, event: impl Into<String>) {
    events.lock().unwrap().push(event.into());
}

/// Sender completing inline that logs its connect, start and drop.
///
/// Every connect gets the next number, so clones of one sender show up as separate states.
#[derive(Clone)]
pub struct Traced {
    label: &'static str,
    connects: Arc<Mutex<usize>>,
    events: Events,
}

impl Traced {
    pub fn new(label: &'static str, events: &Events) -> Self {
        Self {
            label,
            connects: Arc::new(Mutex::new(0)),
            events: events.clone(),
        }
    }
}

pub struct TracedOperation<R> {
    name: String,
    events: Events,
    receiver: Option<R>,
}

impl Sender for Traced {
    type Operation<R: Receiver> = TracedOperation<R>;

    fn connect<R: Receiver>(self, receiver: R) -> Self::Operation<R> {
        let mut connects = self.connects.lock().unwrap();
        *connects += 1;

        let name = format!("{}{}", self.label, *connects);
        record(&self.events, format!("connect {name}"));

        TracedOperation {
            name,
            events: self.events.clone(),
            receiver: Some(receiver),
        }
    }
}

impl<R: Receiver> OperationState for TracedOperation<R> {
    unsafe fn start(self: Pin<&mut Self>) {
        let this = unsafe { self.get_unchecked_mut() };
        record(&this.events, format!("start {}", this.name));

        let receiver = this.receiver.take().unwrap();
        receiver.set_value();
    }
}

impl<R> Drop for TracedOperation<R> {
    fn drop(&mut self) {
        record(&self.events, format!("drop {}", self.name));
    }
}

pub fn events(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}
