mod common;

use common::assert_aborts;
use fanctl::execution::{Error, Receiver, connect, just_from, start, sync_wait, then};
use fanctl::runtime::{SingleThreadContext, schedule};
use std::convert::Infallible;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// Receiver counting down completions.
#[derive(Clone)]
struct Latch {
    state: Arc<(Mutex<usize>, Condvar)>,
}

impl Latch {
    fn new(count: usize) -> Self {
        Self {
            state: Arc::new((Mutex::new(count), Condvar::new())),
        }
    }

    fn wait(&self) {
        let (remaining, released) = &*self.state;
        let remaining = released
            .wait_timeout_while(remaining.lock().unwrap(), Duration::from_secs(5), |n| *n > 0)
            .unwrap()
            .0;
        assert_eq!(*remaining, 0, "Operations should complete");
    }
}

impl Receiver for Latch {
    fn set_value(self) {
        let (remaining, released) = &*self.state;
        *remaining.lock().unwrap() -= 1;
        released.notify_all();
    }

    fn set_error(self, error: Error) {
        panic!("unexpected failure: {error}");
    }

    fn set_done(self) {
        panic!("unexpected cancellation");
    }
}

#[test]
fn test_scheduled_work_runs_in_fifo_order() {
    let mut context = SingleThreadContext::new();
    let scheduler = context.scheduler();

    let sequence = Arc::new(AtomicUsize::new(0));
    let positions = Arc::new(Mutex::new(Vec::new()));
    let leaf = |label: char| {
        let sequence = sequence.clone();
        let positions = positions.clone();
        then(
            schedule(&scheduler),
            just_from(move || {
                let position = sequence.fetch_add(1, Ordering::SeqCst);
                positions.lock().unwrap().push((label, position));
                Ok::<_, Infallible>(())
            }),
        )
    };

    let latch = Latch::new(3);
    let mut a = pin!(connect(leaf('A'), latch.clone()));
    let mut b = pin!(connect(leaf('B'), latch.clone()));
    let mut c = pin!(connect(leaf('C'), latch.clone()));

    // Queued before the worker exists, so all three wait in the queue.
    // SAFETY: the states outlive `latch.wait()`, which returns once all three signalled.
    unsafe {
        start(a.as_mut());
        start(b.as_mut());
        start(c.as_mut());
    }

    context.run().unwrap();
    latch.wait();

    assert_eq!(
        *positions.lock().unwrap(),
        vec![('A', 0), ('B', 1), ('C', 2)]
    );

    context.stop();
}

#[test]
fn test_scheduled_work_runs_on_worker() {
    let mut context = SingleThreadContext::builder().name("worker-test").build();
    context.run().unwrap();

    let worker_name = Arc::new(Mutex::new(None));
    let worker_name_clone = worker_name.clone();

    let result = sync_wait(then(
        schedule(&context.scheduler()),
        just_from(move || {
            *worker_name_clone.lock().unwrap() = thread::current().name().map(str::to_string);
            Ok::<_, Infallible>(())
        }),
    ));

    assert!(result.is_ok());
    assert_eq!(worker_name.lock().unwrap().as_deref(), Some("worker-test"));
    assert_ne!(thread::current().name(), Some("worker-test"));

    context.stop();
}

#[test]
fn test_execute_runs_detached_closure() {
    let mut context = SingleThreadContext::new();
    context.run().unwrap();

    let (sender, receiver) = mpsc::channel();
    for value in 0..3 {
        let sender = sender.clone();
        context.execute(move || sender.send(value).unwrap());
    }

    let received: Vec<i32> = (0..3)
        .map(|_| receiver.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert_eq!(received, vec![0, 1, 2]);
}

#[test]
fn test_context_run_and_stop() {
    let mut context = SingleThreadContext::new();
    assert!(!context.is_running());

    context.run().unwrap();
    assert!(context.is_running());

    context.stop();
    assert!(!context.is_running());

    // Stopping twice is harmless.
    context.stop();
}

#[test]
fn test_context_can_restart() {
    let mut context = SingleThreadContext::new();
    context.run().unwrap();
    context.stop();
    context.run().unwrap();

    let result = sync_wait(then(
        schedule(&context.scheduler()),
        just_from(|| Ok::<_, Infallible>(())),
    ));
    assert!(result.is_ok());
}

#[test]
fn test_context_double_run_is_fatal() {
    assert_aborts(
        "test_context_double_run_is_fatal",
        "runtime assertion failed: context `fanctl-worker` is already running",
        || {
            let mut context = SingleThreadContext::new();
            context.run().unwrap();
            let _ = context.run();
        },
    );
}

/// Receiver recording that it was signalled.
struct Flag(Arc<AtomicUsize>);

impl Receiver for Flag {
    fn set_value(self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn set_error(self, error: Error) {
        panic!("unexpected failure: {error}");
    }

    fn set_done(self) {
        panic!("unexpected cancellation");
    }
}

#[test]
fn test_dropped_schedule_operation_withdraws_its_job() {
    let mut context = SingleThreadContext::new();
    let signalled = Arc::new(AtomicUsize::new(0));

    let mut operation = Box::pin(connect(
        schedule(&context.scheduler()),
        Flag(signalled.clone()),
    ));
    // SAFETY: a started schedule operation may be dropped before the worker resumes it.
    unsafe { start(operation.as_mut()) };
    drop(operation);

    context.run().unwrap();

    // A later job proves the worker went past the withdrawn one.
    let result = sync_wait(then(
        schedule(&context.scheduler()),
        just_from(|| Ok::<_, Infallible>(())),
    ));

    assert!(result.is_ok());
    assert_eq!(signalled.load(Ordering::SeqCst), 0, "Dropped operation must not complete");

    context.stop();
}

#[test]
fn test_dropping_while_worker_is_busy() {
    let mut context = SingleThreadContext::new();
    context.run().unwrap();

    let (release, blocked) = mpsc::channel::<()>();
    context.execute(move || {
        let _ = blocked.recv_timeout(Duration::from_secs(5));
    });

    let signalled = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let mut operation = Box::pin(connect(
            schedule(&context.scheduler()),
            Flag(signalled.clone()),
        ));
        // SAFETY: see `test_dropped_schedule_operation_withdraws_its_job`.
        unsafe { start(operation.as_mut()) };
    }
    release.send(()).unwrap();

    let result = sync_wait(then(
        schedule(&context.scheduler()),
        just_from(|| Ok::<_, Infallible>(())),
    ));

    assert!(result.is_ok());
    assert_eq!(signalled.load(Ordering::SeqCst), 0);

    context.stop();
}

#[test]
fn test_connected_operation_can_start_on_another_thread() {
    let mut context = SingleThreadContext::new();
    context.run().unwrap();

    let latch = Latch::new(1);
    let operation = connect(
        then(
            schedule(&context.scheduler()),
            just_from(|| Ok::<_, Infallible>(())),
        ),
        latch.clone(),
    );

    let starter = {
        let latch = latch.clone();
        thread::spawn(move || {
            let mut operation = pin!(operation);
            // SAFETY: the state stays on this frame until the latch is released.
            unsafe { start(operation.as_mut()) };
            latch.wait();
        })
    };

    starter.join().unwrap();
    context.stop();
}
