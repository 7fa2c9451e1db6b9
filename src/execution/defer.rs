//! Construction of a sender at start time.

use crate::execution::{OperationState, Receiver, Sender, Slot, start_in_place, take_once};

use std::marker::PhantomPinned;
use std::pin::Pin;

/// Sender built lazily by a factory.
///
/// Created by [`defer`].
#[derive(Clone)]
pub struct Defer<F> {
    factory: F,
}

/// Defers building a sender until the operation starts.
///
/// Lets a loop body capture values, such as the current time, that only exist once an
/// iteration begins.
///
/// # Example
///
/// ```ignore
/// let started = Instant::now();
/// let wait = defer(move || schedule_after(&InlineDelayScheduler, remaining(started)));
/// ```
pub fn defer<F, S>(factory: F) -> Defer<F>
where
    F: FnOnce() -> S + Send,
    S: Sender,
{
    Defer { factory }
}

impl<F, S> Sender for Defer<F>
where
    F: FnOnce() -> S + Send,
    S: Sender,
{
    type Operation<R: Receiver> = DeferOperation<F, S, R>;

    fn connect<R: Receiver>(self, receiver: R) -> Self::Operation<R> {
        DeferOperation {
            factory: Some(self.factory),
            receiver: Some(receiver),
            inner: Slot::new(),
            _pinned: PhantomPinned,
        }
    }
}

/// Operation state of [`Defer`]; calls the factory and starts its sender in place.
pub struct DeferOperation<F, S: Sender, R: Receiver> {
    factory: Option<F>,
    receiver: Option<R>,
    inner: Slot<S::Operation<R>>,
    _pinned: PhantomPinned,
}

impl<F, S, R> OperationState for DeferOperation<F, S, R>
where
    F: FnOnce() -> S + Send,
    S: Sender,
    R: Receiver,
{
    unsafe fn start(self: Pin<&mut Self>) {
        // SAFETY: `inner` is only started in place and never moved.
        let this = unsafe { self.get_unchecked_mut() };

        let factory = take_once(&mut this.factory, "defer operation started twice");
        let receiver = take_once(&mut this.receiver, "defer receiver missing");

        let sender = factory();
        let inner = this.inner.construct_with(|| sender.connect(receiver));

        // SAFETY: the slot lives inside the pinned operation.
        unsafe { start_in_place(inner) };
    }
}
