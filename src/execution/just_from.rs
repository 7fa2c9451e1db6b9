//! Leaf sender wrapping a synchronous callable.

use crate::execution::{Error, ExecutionError, OperationState, Receiver, Sender, take_once};

use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;

/// Sender that runs a callable inline when started.
///
/// Created by [`just_from`].
#[derive(Clone)]
pub struct JustFrom<F> {
    callable: F,
}

/// Wraps `callable` into a sender.
///
/// On start, the callable runs on the starting thread. `Ok(())` completes with `set_value`,
/// `Err(e)` with `set_error(e)`. A panic is caught and reported as
/// [`ExecutionError::Panicked`].
///
/// # Example
///
/// ```ignore
/// let greet = just_from(|| { println!("hello"); Ok::<_, std::io::Error>(()) });
/// sync_wait(greet)?;
/// ```
pub fn just_from<F, E>(callable: F) -> JustFrom<F>
where
    F: FnOnce() -> Result<(), E> + Send,
    E: Into<Error>,
{
    JustFrom { callable }
}

impl<F, E> Sender for JustFrom<F>
where
    F: FnOnce() -> Result<(), E> + Send,
    E: Into<Error>,
{
    type Operation<R: Receiver> = JustFromOperation<F, R>;

    fn connect<R: Receiver>(self, receiver: R) -> Self::Operation<R> {
        JustFromOperation {
            callable: Some(self.callable),
            receiver: Some(receiver),
        }
    }
}

/// Operation state of [`JustFrom`]; runs the callable when started.
pub struct JustFromOperation<F, R> {
    callable: Option<F>,
    receiver: Option<R>,
}

impl<F, E, R> OperationState for JustFromOperation<F, R>
where
    F: FnOnce() -> Result<(), E> + Send,
    E: Into<Error>,
    R: Receiver,
{
    unsafe fn start(self: Pin<&mut Self>) {
        // SAFETY: nothing here is structurally pinned.
        let this = unsafe { self.get_unchecked_mut() };

        exec_check!(this.callable.is_some(), "just_from operation started twice");
        let callable = take_once(&mut this.callable, "just_from callable missing");
        let receiver = take_once(&mut this.receiver, "just_from receiver missing");

        match panic::catch_unwind(AssertUnwindSafe(callable)) {
            Ok(Ok(())) => receiver.set_value(),
            Ok(Err(error)) => receiver.set_error(error.into()),
            Err(payload) => receiver.set_error(Box::new(ExecutionError::from_panic(payload))),
        }
    }
}
