mod common;

use common::assert_aborts;
use fanctl::execution::Slot;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_slot_construct_and_destruct() {
    let mut slot = Slot::new();
    assert!(!slot.is_constructed());

    let value = slot.construct_with(|| 41);
    *value += 1;

    assert!(slot.is_constructed());
    assert_eq!(*slot.get(), 42);

    slot.destruct();
    assert!(!slot.is_constructed());
}

#[test]
fn test_slot_reuse_after_destruct() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut slot = Slot::new();

    for round in 1..=3 {
        slot.construct_with(|| DropCounter(drops.clone()));
        slot.destruct();
        assert_eq!(drops.load(Ordering::SeqCst), round);
    }
}

#[test]
fn test_slot_drops_held_value() {
    let drops = Arc::new(AtomicUsize::new(0));

    {
        let mut slot = Slot::new();
        slot.construct_with(|| DropCounter(drops.clone()));
    }

    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_empty_slot_drop_runs_nothing() {
    let slot: Slot<DropCounter> = Slot::default();
    drop(slot);
}

#[test]
fn test_slot_double_construct_is_fatal() {
    assert_aborts(
        "test_slot_double_construct_is_fatal",
        "runtime assertion failed: slot already holds a value",
        || {
            let mut slot = Slot::new();
            slot.construct_with(|| 1);
            slot.construct_with(|| 2);
        },
    );
}

#[test]
fn test_slot_double_destruct_is_fatal() {
    assert_aborts(
        "test_slot_double_destruct_is_fatal",
        "runtime assertion failed: slot is empty, nothing to destruct",
        || {
            let mut slot = Slot::new();
            slot.construct_with(|| 1);
            slot.destruct();
            slot.destruct();
        },
    );
}

#[test]
fn test_empty_slot_access_is_fatal() {
    assert_aborts(
        "test_empty_slot_access_is_fatal",
        "runtime assertion failed: slot is empty",
        || {
            let slot: Slot<u32> = Slot::new();
            let _ = slot.get();
        },
    );
}
