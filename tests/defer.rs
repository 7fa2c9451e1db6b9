use fanctl::execution::{defer, just_from, sync_wait, then};
use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_defer_builds_sender_at_start() {
    let built = Arc::new(AtomicUsize::new(0));
    let built_clone = built.clone();

    let sender = defer(move || {
        built_clone.fetch_add(1, Ordering::SeqCst);
        just_from(|| Ok::<_, Infallible>(()))
    });

    assert_eq!(built.load(Ordering::SeqCst), 0, "Factory must not run before start");

    assert!(sync_wait(sender).is_ok());
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn test_defer_sees_values_set_by_predecessor() {
    let value = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(AtomicUsize::new(0));

    let writer = value.clone();
    let reader = value.clone();
    let seen_clone = seen.clone();

    let result = sync_wait(then(
        just_from(move || {
            writer.store(7, Ordering::SeqCst);
            Ok::<_, Infallible>(())
        }),
        defer(move || {
            let captured = reader.load(Ordering::SeqCst);
            just_from(move || {
                seen_clone.store(captured, Ordering::SeqCst);
                Ok::<_, Infallible>(())
            })
        }),
    ));

    assert!(result.is_ok());
    assert_eq!(seen.load(Ordering::SeqCst), 7);
}

#[test]
fn test_defer_forwards_failure() {
    let result = sync_wait(defer(|| {
        just_from(|| Err::<(), _>(io::Error::other("deferred failure")))
    }));

    assert_eq!(result.unwrap_err().to_string(), "deferred failure");
}
