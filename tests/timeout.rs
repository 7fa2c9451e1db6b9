use fanctl::execution::{just_from, stop_when, sync_wait, then};
use fanctl::runtime::{SingleThreadContext, schedule};
use fanctl::sleep;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[test]
fn test_timeout_completes_before_deadline() {
    let mut context = SingleThreadContext::new();
    context.run().unwrap();

    let value = Arc::new(Mutex::new(None));
    let value_clone = value.clone();
    let work = then(
        schedule(&context.scheduler()),
        then(
            sleep(Duration::from_millis(10)),
            just_from(move || {
                *value_clone.lock().unwrap() = Some(123);
                Ok::<_, Infallible>(())
            }),
        ),
    );

    let result = sync_wait(stop_when(work, sleep(Duration::from_millis(500))));

    assert!(result.is_ok());
    assert_eq!(*value.lock().unwrap(), Some(123), "Work should finish first");
}

#[test]
fn test_timeout_expires() {
    let mut context = SingleThreadContext::new();
    context.run().unwrap();

    let value = Arc::new(Mutex::new(None));
    let value_clone = value.clone();
    let work = then(
        schedule(&context.scheduler()),
        then(
            sleep(Duration::from_secs(10)),
            just_from(move || {
                *value_clone.lock().unwrap() = Some(456);
                Ok::<_, Infallible>(())
            }),
        ),
    );

    let start = Instant::now();
    let result = sync_wait(stop_when(work, sleep(Duration::from_millis(20))));

    assert!(result.is_ok(), "An expired timeout is not a failure");
    assert_eq!(
        *value.lock().unwrap(),
        None,
        "Work after the cancelled delay should not run"
    );
    assert!(start.elapsed() < Duration::from_secs(1));
}
