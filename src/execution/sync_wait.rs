//! Blocking bridge from a composition back to sequential code.

use crate::execution::{Error, OperationState, Receiver, Sender};

use std::pin::pin;
use std::sync::{Arc, Condvar, Mutex};

use tracing::trace;

enum Outcome {
    Value,
    Error(Error),
    Done,
}

struct SyncWaitState {
    outcome: Mutex<Option<Outcome>>,
    completed: Condvar,
}

/// Receiver recording the outcome for [`sync_wait`].
pub struct SyncWaitReceiver {
    state: Arc<SyncWaitState>,
}

impl SyncWaitReceiver {
    fn complete(self, outcome: Outcome) {
        let mut slot = self.state.outcome.lock().unwrap();
        exec_check!(slot.is_none(), "sync_wait receiver signalled twice");

        *slot = Some(outcome);
        self.state.completed.notify_all();
    }
}

impl Receiver for SyncWaitReceiver {
    fn set_value(self) {
        self.complete(Outcome::Value);
    }

    fn set_error(self, error: Error) {
        self.complete(Outcome::Error(error));
    }

    fn set_done(self) {
        self.complete(Outcome::Done);
    }
}

/// Starts `sender` and blocks the calling thread until it completes.
///
/// Both `set_value` and `set_done` return `Ok(())`. A failure is returned unchanged, so callers
/// can downcast it to the type the leaf produced.
///
/// Must not be called from a thread that one of the composition's operations needs in order to
/// make progress, such as the worker of a context it schedules onto.
///
/// # Example
///
/// ```ignore
/// let result = sync_wait(just_from(|| Err::<(), _>(io::Error::other("boom"))));
/// assert!(result.is_err());
/// ```
pub fn sync_wait<S: Sender>(sender: S) -> Result<(), Error> {
    let state = Arc::new(SyncWaitState {
        outcome: Mutex::new(None),
        completed: Condvar::new(),
    });

    let operation = pin!(sender.connect(SyncWaitReceiver {
        state: Arc::clone(&state),
    }));
    // SAFETY: the operation lives on this frame, which does not return before the receiver has
    // been signalled.
    unsafe { operation.start() };

    let mut outcome = state
        .completed
        .wait_while(state.outcome.lock().unwrap(), |outcome| outcome.is_none())
        .unwrap();

    match outcome.take() {
        Some(Outcome::Value) => {
            trace!("sync_wait completed with a value");
            Ok(())
        }
        Some(Outcome::Done) => {
            trace!("sync_wait completed after cancellation");
            Ok(())
        }
        Some(Outcome::Error(error)) => {
            trace!(%error, "sync_wait completed with a failure");
            Err(error)
        }
        None => unreachable!("wait_while returned without an outcome"),
    }
}
