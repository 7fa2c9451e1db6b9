//! Racing work against a stop condition.

use crate::execution::{
    Error, OperationState, Receiver, Sender, StopSource, StopToken, start_in_place, take_once,
};

use std::marker::PhantomPinned;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

/// Sender racing `work` against `stop_condition`.
///
/// Created by [`stop_when`].
#[derive(Clone)]
pub struct StopWhen<W, C> {
    work: W,
    stop_condition: C,
}

/// Runs `work` and `stop_condition` side by side.
///
/// Whichever side finishes first requests a stop on a source shared by both; the composition
/// completes once both sides have finished. It reports the first failure either side produced,
/// and `set_done` otherwise. Both sides see the shared stop token through their receiver.
///
/// A timeout is expressed as `stop_when(work, schedule_after(&scheduler, limit))`.
///
/// # Arguments
/// * `work` - The main work, expected to honour cancellation
/// * `stop_condition` - Completes when the work should stop
pub fn stop_when<W: Sender, C: Sender>(work: W, stop_condition: C) -> StopWhen<W, C> {
    StopWhen {
        work,
        stop_condition,
    }
}

impl<W: Sender, C: Sender> Sender for StopWhen<W, C> {
    type Operation<R: Receiver> = StopWhenOperation<W, C, R>;

    fn connect<R: Receiver>(self, receiver: R) -> Self::Operation<R> {
        let shared = Arc::new(Shared {
            stop_source: StopSource::new(),
            remaining: AtomicUsize::new(2),
            race: Mutex::new(Race {
                error: None,
                receiver: Some(receiver),
            }),
        });

        StopWhenOperation {
            work_op: self.work.connect(StopWhenReceiver {
                shared: Arc::clone(&shared),
            }),
            stop_op: self.stop_condition.connect(StopWhenReceiver {
                shared: Arc::clone(&shared),
            }),
            started: false,
            _pinned: PhantomPinned,
        }
    }
}

/// State shared between both sides of the race.
struct Shared<R> {
    stop_source: StopSource,
    remaining: AtomicUsize,
    race: Mutex<Race<R>>,
}

struct Race<R> {
    error: Option<Error>,
    receiver: Option<R>,
}

/// Operation state of [`StopWhen`].
///
/// Both sides are connected up front and live as long as the operation. Neither touches its
/// state after signalling, so they stay in place until the parent is dropped.
pub struct StopWhenOperation<W: Sender, C: Sender, R: Receiver> {
    work_op: W::Operation<StopWhenReceiver<R>>,
    stop_op: C::Operation<StopWhenReceiver<R>>,
    started: bool,
    _pinned: PhantomPinned,
}

impl<W: Sender, C: Sender, R: Receiver> OperationState for StopWhenOperation<W, C, R> {
    unsafe fn start(self: Pin<&mut Self>) {
        // SAFETY: both children are only started in place and never moved.
        let this = unsafe { self.get_unchecked_mut() };

        exec_check!(!this.started, "stop_when operation started twice");
        this.started = true;

        // SAFETY: the children are fields of the pinned operation, which the caller keeps alive
        // until the downstream receiver is signalled, after both sides finished.
        unsafe { start_in_place(&mut this.work_op) };
        // SAFETY: as above.
        unsafe { start_in_place(&mut this.stop_op) };
    }
}

/// Receiver both sides of a [`StopWhen`] report to.
pub struct StopWhenReceiver<R> {
    shared: Arc<Shared<R>>,
}

impl<R: Receiver> StopWhenReceiver<R> {
    fn complete(self, error: Option<Error>) {
        let shared = &self.shared;
        shared.stop_source.request_stop();

        let mut race = shared.race.lock().unwrap();
        let previous = shared.remaining.fetch_sub(1, Ordering::AcqRel);
        exec_check!(previous > 0, "stop_when side completed twice");

        if let Some(error) = error {
            if race.error.is_none() {
                race.error = Some(error);
            } else {
                debug!(%error, "discarding failure, an earlier one is already stashed");
            }
        }

        if previous != 1 {
            return;
        }

        let error = race.error.take();
        let receiver = take_once(&mut race.receiver, "stop_when receiver already signalled");
        drop(race);

        match error {
            Some(error) => receiver.set_error(error),
            None => receiver.set_done(),
        }
    }
}

impl<R: Receiver> Receiver for StopWhenReceiver<R> {
    fn set_value(self) {
        self.complete(None);
    }

    fn set_error(self, error: Error) {
        self.complete(Some(error));
    }

    fn set_done(self) {
        self.complete(None);
    }

    fn stop_token(&self) -> StopToken {
        self.shared.stop_source.token()
    }
}
