//! Sender/receiver execution substrate.
//!
//! Asynchronous work is described by [`Sender`]s, which are plain values. Connecting a sender to
//! a [`Receiver`] produces an [`OperationState`]; starting that state runs the work, which
//! eventually reports exactly one terminal signal to the receiver:
//!
//! - `set_value()` when the work succeeded,
//! - `set_error(error)` when it failed,
//! - `set_done()` when it was cancelled on purpose.
//!
//! Combinators embed the operation states of their children inline, in [`Slot`]s, so a composed
//! operation never allocates per step. Because children hold pointers back into their parent,
//! operation states are started through `Pin<&mut Self>` and never move once started. Starting
//! is `unsafe`: a started state must stay alive until it has signalled its receiver, which
//! [`sync_wait`] and the combinators guarantee.
//!
//! # Example
//!
//! ```ignore
//! use fanctl::execution::{just_from, sync_wait, then};
//!
//! let work = then(
//!     just_from(|| { print!("Hello "); Ok::<_, std::convert::Infallible>(()) }),
//!     just_from(|| { println!("World!"); Ok::<_, std::convert::Infallible>(()) }),
//! );
//! sync_wait(work)?;
//! ```

/// Fatal check for broken compositions (double start, storage cell misuse).
///
/// A failed check reports the message on stderr and aborts the process.
macro_rules! exec_check {
    ($condition:expr, $($message:tt)+) => {
        if !$condition {
            $crate::execution::assertion_failed(format_args!($($message)+));
        }
    };
}

pub(crate) use exec_check;

mod defer;
mod error;
mod just_from;
mod repeat_effect;
mod slot;
mod stop;
mod stop_when;
mod sync_wait;
mod then;

pub use defer::{Defer, DeferOperation, defer};
pub use error::{Error, ExecutionError, ExecutionResult};
pub use just_from::{JustFrom, JustFromOperation, just_from};
pub use repeat_effect::{
    RepeatEffect, RepeatEffectUntil, RepeatOperation, RepeatReceiver, repeat_effect,
    repeat_effect_until,
};
pub use slot::Slot;
pub use stop::{StopSource, StopToken};
pub use stop_when::{StopWhen, StopWhenOperation, StopWhenReceiver, stop_when};
pub use sync_wait::{SyncWaitReceiver, sync_wait};
pub use then::{Then, ThenOperation, ThenReceiver, then};

use std::fmt;
use std::io::{self, Write};
use std::pin::Pin;
use std::process;
use std::ptr::NonNull;

/// Continuation that receives the outcome of an operation.
///
/// Every method consumes the receiver, so a receiver value can signal at most once. Receivers
/// may be signalled from another thread than the one that connected them, hence `Send`.
pub trait Receiver: Send {
    /// The operation completed successfully.
    fn set_value(self);

    /// The operation failed.
    fn set_error(self, error: Error);

    /// The operation stopped because cancellation was requested.
    fn set_done(self);

    /// Token the operation polls for cancellation requests.
    ///
    /// Receivers that cannot be cancelled keep the default, for which
    /// [`StopToken::stop_possible`] is `false`.
    fn stop_token(&self) -> StopToken {
        StopToken::never()
    }
}

/// In-progress instantiation of a sender bound to a receiver.
pub trait OperationState {
    /// Begins execution. May complete inline or on another thread.
    ///
    /// # Safety
    /// Must be called at most once. The state must not be dropped until it has signalled its
    /// receiver, unless its type documents that dropping a started state is allowed.
    unsafe fn start(self: Pin<&mut Self>);
}

/// Description of asynchronous work that can be connected to one receiver.
///
/// Senders stored in a composition are connected on whichever thread completes the step before
/// them, hence `Send`.
pub trait Sender: Send {
    /// Operation state produced when connecting to a receiver of type `R`.
    type Operation<R: Receiver>: OperationState;

    /// Binds the work to `receiver`. Does not begin executing anything.
    fn connect<R: Receiver>(self, receiver: R) -> Self::Operation<R>;
}

/// Connects `sender` to `receiver`.
pub fn connect<S: Sender, R: Receiver>(sender: S, receiver: R) -> S::Operation<R> {
    sender.connect(receiver)
}

/// Starts a connected operation.
///
/// # Safety
/// See [`OperationState::start`].
pub unsafe fn start<O: OperationState + ?Sized>(operation: Pin<&mut O>) {
    // SAFETY: upheld by the caller.
    unsafe { operation.start() }
}

/// Returns the stop token a receiver exposes to the operation it is connected to.
pub fn get_stop_token<R: Receiver + ?Sized>(receiver: &R) -> StopToken {
    receiver.stop_token()
}

/// Pointer from a child receiver back to its pinned parent operation.
///
/// The parent is pinned before any child is connected and outlives every child it constructs,
/// so the pointee stays valid for as long as a receiver holding it can be signalled. Only the
/// thread currently completing a child dereferences it.
pub(crate) struct OpRef<T>(NonNull<T>);

impl<T> OpRef<T> {
    /// Captures a pointer to a pinned operation.
    ///
    /// # Safety
    /// The operation must never be moved again.
    pub(crate) unsafe fn from_pin(operation: Pin<&mut T>) -> Self {
        // SAFETY: the caller promises the pointee stays where it is.
        let operation = unsafe { operation.get_unchecked_mut() };
        Self(NonNull::from(operation))
    }

    /// Dereferences the pointer.
    ///
    /// # Safety
    /// The operation must still be alive and no other reference to it may be in use.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get<'a>(&self) -> &'a mut T {
        // SAFETY: upheld by the caller.
        unsafe { &mut *self.0.as_ptr() }
    }
}

impl<T> Clone for OpRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for OpRef<T> {}

/// Reports a broken composition and aborts the process.
///
/// Never unwinds, so a failure on a worker thread cannot leave a [`sync_wait`] caller blocked.
#[cold]
pub(crate) fn assertion_failed(message: fmt::Arguments<'_>) -> ! {
    let _ = writeln!(io::stderr(), "runtime assertion failed: {message}");
    process::abort()
}

/// Takes a value that must be present exactly once, aborting on a broken composition.
pub(crate) fn take_once<T>(value: &mut Option<T>, what: &str) -> T {
    match value.take() {
        Some(value) => value,
        None => assertion_failed(format_args!("{what}")),
    }
}

/// Starts an operation held in a [`Slot`] of a pinned parent.
///
/// # Safety
/// The slot must live inside a pinned operation state that stays alive until the child has
/// signalled its receiver.
pub(crate) unsafe fn start_in_place<O: OperationState>(operation: &mut O) {
    // SAFETY: slots of pinned parents are never moved and drop their value in place; the
    // caller keeps the parent alive.
    unsafe { Pin::new_unchecked(operation).start() }
}
