//! Repetition of a sender until a predicate holds or the work stops.

use crate::execution::{
    Error, OpRef, OperationState, Receiver, Sender, Slot, StopToken, start_in_place, take_once,
};

use std::marker::PhantomPinned;
use std::pin::Pin;

/// Sender re-running its inner sender after every success.
///
/// Created by [`repeat_effect`] or [`repeat_effect_until`].
#[derive(Clone)]
pub struct RepeatEffectUntil<S, P> {
    sender: S,
    predicate: P,
}

/// Repetition without a success exit.
pub type RepeatEffect<S> = RepeatEffectUntil<S, fn() -> bool>;

fn forever() -> bool {
    false
}

/// Repeats `sender` until it fails or is cancelled.
///
/// The composition never completes with `set_value`.
pub fn repeat_effect<S: Sender + Clone>(sender: S) -> RepeatEffect<S> {
    RepeatEffectUntil {
        sender,
        predicate: forever as fn() -> bool,
    }
}

/// Repeats `sender` until `predicate` returns `true`.
///
/// The predicate is evaluated after each successful iteration; `true` completes the composition
/// with `set_done`. Failures and cancellation of an iteration are forwarded without evaluating
/// the predicate.
///
/// # Arguments
/// * `sender` - Work to run once per iteration, cloned for each one
/// * `predicate` - Exit condition checked after every successful iteration
///
/// # Example
///
/// ```ignore
/// let count = Arc::new(AtomicUsize::new(0));
/// let step = { let count = count.clone(); just_from(move || { count.fetch_add(1, SeqCst); Ok::<_, Infallible>(()) }) };
/// sync_wait(repeat_effect_until(step, move || count.load(SeqCst) == 3))?;
/// ```
pub fn repeat_effect_until<S, P>(sender: S, predicate: P) -> RepeatEffectUntil<S, P>
where
    S: Sender + Clone,
    P: FnMut() -> bool + Send,
{
    RepeatEffectUntil { sender, predicate }
}

impl<S, P> Sender for RepeatEffectUntil<S, P>
where
    S: Sender + Clone,
    P: FnMut() -> bool + Send,
{
    type Operation<R: Receiver> = RepeatOperation<S, P, R>;

    fn connect<R: Receiver>(self, receiver: R) -> Self::Operation<R> {
        RepeatOperation {
            sender: self.sender,
            predicate: self.predicate,
            receiver: Some(receiver),
            iteration: Slot::new(),
            _pinned: PhantomPinned,
        }
    }
}

/// Operation state of [`RepeatEffectUntil`].
///
/// Each iteration is a fresh clone of the sender, connected into the same slot once the
/// previous iteration has been destroyed.
pub struct RepeatOperation<S: Sender + Clone, P: FnMut() -> bool + Send, R: Receiver> {
    sender: S,
    predicate: P,
    receiver: Option<R>,
    iteration: Slot<S::Operation<RepeatReceiver<S, P, R>>>,
    _pinned: PhantomPinned,
}

impl<S: Sender + Clone, P: FnMut() -> bool + Send, R: Receiver> RepeatOperation<S, P, R> {
    /// Connects a fresh copy of the sender into the iteration slot and starts it.
    ///
    /// # Safety
    /// `op` must point to a pinned, live operation whose iteration slot is empty.
    unsafe fn start_iteration(op: OpRef<Self>) {
        // SAFETY: upheld by the caller.
        let this = unsafe { op.get() };

        let sender = this.sender.clone();
        let iteration = this
            .iteration
            .construct_with(|| sender.connect(RepeatReceiver { op }));

        // SAFETY: the slot lives inside the pinned operation.
        unsafe { start_in_place(iteration) };
    }
}

impl<S: Sender + Clone, P: FnMut() -> bool + Send, R: Receiver> OperationState
    for RepeatOperation<S, P, R>
{
    unsafe fn start(self: Pin<&mut Self>) {
        exec_check!(
            !self.iteration.is_constructed() && self.receiver.is_some(),
            "repeat operation started twice"
        );

        // SAFETY: the operation is pinned and outlives every iteration.
        unsafe { Self::start_iteration(OpRef::from_pin(self)) };
    }
}

/// Receiver each iteration of a repetition reports to.
pub struct RepeatReceiver<S: Sender + Clone, P: FnMut() -> bool + Send, R: Receiver> {
    op: OpRef<RepeatOperation<S, P, R>>,
}

// SAFETY: the receiver only reaches its parent through `op`, which stays pinned and alive until
// the downstream receiver is signalled. The completing thread touches the sender, the predicate
// and the downstream receiver, all `Send`, and drops the iteration that just finished.
unsafe impl<S: Sender + Clone, P: FnMut() -> bool + Send, R: Receiver> Send
    for RepeatReceiver<S, P, R>
{
}

impl<S: Sender + Clone, P: FnMut() -> bool + Send, R: Receiver> RepeatReceiver<S, P, R> {
    fn finish_iteration(&self) -> &mut RepeatOperation<S, P, R> {
        // SAFETY: the parent is pinned and alive until its downstream receiver is signalled.
        let this = unsafe { self.op.get() };
        this.iteration.destruct();

        this
    }
}

impl<S: Sender + Clone, P: FnMut() -> bool + Send, R: Receiver> Receiver
    for RepeatReceiver<S, P, R>
{
    fn set_value(self) {
        let this = self.finish_iteration();

        if (this.predicate)() {
            take_once(&mut this.receiver, "repeat receiver already signalled").set_done();
        } else {
            // SAFETY: the slot was just emptied and the parent is still pinned.
            unsafe { RepeatOperation::start_iteration(self.op) };
        }
    }

    fn set_error(self, error: Error) {
        let this = self.finish_iteration();
        take_once(&mut this.receiver, "repeat receiver already signalled").set_error(error);
    }

    fn set_done(self) {
        let this = self.finish_iteration();
        take_once(&mut this.receiver, "repeat receiver already signalled").set_done();
    }

    fn stop_token(&self) -> StopToken {
        // SAFETY: only reads the downstream receiver.
        let this = unsafe { self.op.get() };

        this.receiver
            .as_ref()
            .map_or_else(StopToken::never, Receiver::stop_token)
    }
}
