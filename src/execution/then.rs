//! Sequencing of two senders.

use crate::execution::{
    Error, OpRef, OperationState, Receiver, Sender, Slot, StopToken, start_in_place, take_once,
};

use std::marker::PhantomPinned;
use std::pin::Pin;

/// Sender running `successor` after `predecessor` succeeded.
///
/// Created by [`then`].
#[derive(Clone)]
pub struct Then<P, S> {
    predecessor: P,
    successor: S,
}

/// Sequences two senders.
///
/// `successor` is connected only once `predecessor` has signalled `set_value` and its operation
/// state has been destroyed. A failure or cancellation of `predecessor` is forwarded downstream
/// and `successor` never runs.
///
/// # Arguments
/// * `predecessor` - Work to run first
/// * `successor` - Work to run once `predecessor` succeeded
pub fn then<P: Sender, S: Sender>(predecessor: P, successor: S) -> Then<P, S> {
    Then {
        predecessor,
        successor,
    }
}

impl<P: Sender, S: Sender> Sender for Then<P, S> {
    type Operation<R: Receiver> = ThenOperation<P, S, R>;

    fn connect<R: Receiver>(self, receiver: R) -> Self::Operation<R> {
        ThenOperation {
            predecessor: Some(self.predecessor),
            successor: Some(self.successor),
            receiver: Some(receiver),
            predecessor_op: Slot::new(),
            successor_op: Slot::new(),
            _pinned: PhantomPinned,
        }
    }
}

/// Operation state of [`Then`].
///
/// Holds one child at a time: the predecessor until it signals, then the successor.
pub struct ThenOperation<P: Sender, S: Sender, R: Receiver> {
    predecessor: Option<P>,
    successor: Option<S>,
    receiver: Option<R>,
    predecessor_op: Slot<P::Operation<ThenReceiver<P, S, R>>>,
    successor_op: Slot<S::Operation<R>>,
    _pinned: PhantomPinned,
}

impl<P: Sender, S: Sender, R: Receiver> OperationState for ThenOperation<P, S, R> {
    unsafe fn start(self: Pin<&mut Self>) {
        // SAFETY: the operation is pinned and outlives both children.
        let op = unsafe { OpRef::from_pin(self) };
        let this = unsafe { op.get() };

        let predecessor = take_once(&mut this.predecessor, "then operation started twice");
        let predecessor_op = this
            .predecessor_op
            .construct_with(|| predecessor.connect(ThenReceiver { op }));

        // SAFETY: the slot lives inside the pinned operation.
        unsafe { start_in_place(predecessor_op) };
    }
}

/// Receiver the predecessor of a [`Then`] reports to.
pub struct ThenReceiver<P: Sender, S: Sender, R: Receiver> {
    op: OpRef<ThenOperation<P, S, R>>,
}

// SAFETY: the receiver only reaches its parent through `op`, which the caller of `start` keeps
// pinned and alive until the downstream receiver is signalled. From the completing thread it
// touches the predecessor state, the successor sender and the downstream receiver; the last two
// are `Send`, and the predecessor is only dropped there after it stopped running elsewhere.
unsafe impl<P: Sender, S: Sender, R: Receiver> Send for ThenReceiver<P, S, R> {}

impl<P: Sender, S: Sender, R: Receiver> ThenReceiver<P, S, R> {
    /// Destroys the finished predecessor and hands back the downstream receiver.
    fn finish_predecessor(&self) -> R {
        // SAFETY: the parent is pinned and alive until its downstream receiver is signalled.
        let this = unsafe { self.op.get() };
        this.predecessor_op.destruct();

        take_once(&mut this.receiver, "then receiver already signalled")
    }
}

impl<P: Sender, S: Sender, R: Receiver> Receiver for ThenReceiver<P, S, R> {
    fn set_value(self) {
        let receiver = self.finish_predecessor();

        // SAFETY: see `finish_predecessor`.
        let this = unsafe { self.op.get() };
        let successor = take_once(&mut this.successor, "then successor already connected");
        let successor_op = this
            .successor_op
            .construct_with(|| successor.connect(receiver));

        // SAFETY: the slot lives inside the pinned operation.
        unsafe { start_in_place(successor_op) };
    }

    fn set_error(self, error: Error) {
        self.finish_predecessor().set_error(error);
    }

    fn set_done(self) {
        self.finish_predecessor().set_done();
    }

    fn stop_token(&self) -> StopToken {
        // SAFETY: only reads the downstream receiver, which is present while the predecessor runs.
        let this = unsafe { self.op.get() };

        this.receiver
            .as_ref()
            .map_or_else(StopToken::never, Receiver::stop_token)
    }
}
