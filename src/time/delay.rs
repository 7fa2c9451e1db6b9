//! Inline delay scheduler.
//!
//! Waits on the thread that starts the operation. When the receiver can be cancelled the wait
//! is sliced so a stop request is noticed within one slice.

use crate::execution::{OperationState, Receiver, Sender, take_once};
use crate::runtime::TimedScheduler;

use std::pin::Pin;
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep while a stop can still be requested.
pub const TIME_SLICE: Duration = Duration::from_millis(50);

/// Scheduler whose timed senders block the starting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDelayScheduler;

impl TimedScheduler for InlineDelayScheduler {
    type Sender = Delay;

    fn schedule_after(&self, duration: Duration) -> Delay {
        Delay { duration }
    }
}

/// Creates a sender completing after `duration`, on the starting thread.
///
/// # Example
/// ```ignore
/// sync_wait(then(sleep(Duration::from_millis(100)), just_from(tick)))?;
/// ```
pub fn sleep(duration: Duration) -> Delay {
    InlineDelayScheduler.schedule_after(duration)
}

/// Sender produced by [`InlineDelayScheduler`].
#[derive(Debug, Clone, Copy)]
pub struct Delay {
    duration: Duration,
}

impl Delay {
    /// Time the operation waits before completing with `set_value`.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Sender for Delay {
    type Operation<R: Receiver> = DelayOperation<R>;

    fn connect<R: Receiver>(self, receiver: R) -> Self::Operation<R> {
        DelayOperation {
            duration: self.duration,
            receiver: Some(receiver),
        }
    }
}

/// Operation state of [`Delay`]; waits on the starting thread.
///
/// A duration too large to be added to the current instant never elapses: the operation then
/// only completes when a stop is requested.
pub struct DelayOperation<R> {
    duration: Duration,
    receiver: Option<R>,
}

impl<R: Receiver> OperationState for DelayOperation<R> {
    unsafe fn start(self: Pin<&mut Self>) {
        // SAFETY: nothing here is structurally pinned.
        let this = unsafe { self.get_unchecked_mut() };
        let receiver = take_once(&mut this.receiver, "delay operation started twice");

        let token = receiver.stop_token();
        if !token.stop_possible() {
            thread::sleep(this.duration);
            receiver.set_value();
            return;
        }

        let deadline = Instant::now().checked_add(this.duration);
        loop {
            if token.stop_requested() {
                receiver.set_done();
                return;
            }

            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        receiver.set_value();
                        return;
                    }
                    TIME_SLICE.min(deadline - now)
                }
                None => TIME_SLICE,
            };

            thread::sleep(slice);
        }
    }
}
