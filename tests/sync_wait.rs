use fanctl::execution::{ExecutionError, just_from, repeat_effect_until, sync_wait};
use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_sync_wait_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    let result = sync_wait(just_from(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        Ok::<_, Infallible>(())
    }));

    assert!(result.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Leaf should run exactly once");
}

#[test]
fn test_sync_wait_returns_leaf_error_unchanged() {
    let result = sync_wait(just_from(|| {
        Err::<(), _>(io::Error::new(io::ErrorKind::NotFound, "sensor missing"))
    }));

    let error = result.expect_err("Failure should reach the caller");
    let error = error
        .downcast::<io::Error>()
        .expect("Error should keep its type");

    assert_eq!(error.kind(), io::ErrorKind::NotFound);
    assert_eq!(error.to_string(), "sensor missing");
}

#[test]
fn test_sync_wait_reports_panic_as_error() {
    let result = sync_wait(just_from(|| -> Result<(), Infallible> {
        panic!("leaf exploded");
    }));

    let error = result.expect_err("Panic should become a failure");
    let error = error
        .downcast::<ExecutionError>()
        .expect("Panic should be reported as ExecutionError");

    assert!(matches!(*error, ExecutionError::Panicked(ref message) if message == "leaf exploded"));
}

#[test]
fn test_sync_wait_done_returns_normally() {
    // A satisfied predicate completes the repetition with `set_done`.
    let result = sync_wait(repeat_effect_until(
        just_from(|| Ok::<_, Infallible>(())),
        || true,
    ));

    assert!(result.is_ok());
}
