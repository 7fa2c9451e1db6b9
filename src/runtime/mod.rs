//! Schedulers: capabilities producing senders that complete on a particular execution context.

pub(crate) mod queue;
mod single_thread;

pub use single_thread::{
    ScheduleOnThread, ScheduleOperation, SingleThreadContext, SingleThreadScheduler,
};

use crate::execution::Sender;

use std::time::Duration;

/// Produces senders completing on the scheduler's execution context.
pub trait Scheduler {
    type Sender: Sender;

    /// Returns a sender that completes with `set_value` on this scheduler.
    fn schedule(&self) -> Self::Sender;
}

/// Produces senders completing after a delay.
pub trait TimedScheduler {
    type Sender: Sender;

    /// Returns a sender that completes once `duration` has elapsed.
    fn schedule_after(&self, duration: Duration) -> Self::Sender;
}

/// Returns a sender completing on `scheduler`.
pub fn schedule<S: Scheduler + ?Sized>(scheduler: &S) -> S::Sender {
    scheduler.schedule()
}

/// Returns a sender completing on `scheduler` once `duration` has elapsed.
pub fn schedule_after<S: TimedScheduler + ?Sized>(scheduler: &S, duration: Duration) -> S::Sender {
    scheduler.schedule_after(duration)
}
