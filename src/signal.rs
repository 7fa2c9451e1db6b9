//! Inline signal scheduler.
//!
//! A [`SignalWait`] installs handlers for a fixed set of signals, polls on the starting thread
//! until one of them arrives or a stop is requested, restores the previous handlers and
//! completes with `set_value`. Handlers are process-wide, so only one wait may be active at a
//! time.
//!
//! Signals that should only be observed by the wait are blocked with [`block_signals`] before any
//! thread is spawned; the wait unblocks them only while it sleeps in `ppoll`.

use crate::execution::{OperationState, Receiver, Sender, exec_check, take_once};
use crate::runtime::Scheduler;

use std::io;
use std::mem::MaybeUninit;
use std::pin::Pin;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use libc::c_int;
use thiserror::Error;
use tracing::debug;

/// Interval between two stop-token checks while waiting.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

// Incremented from signal handler context only.
static SIGNALS_RECEIVED: AtomicUsize = AtomicUsize::new(0);
// Set while a wait owns the process-wide handlers.
static ACTIVE: AtomicBool = AtomicBool::new(false);
// Set once the handlers are installed, cleared before they are restored.
static INSTALLED: AtomicBool = AtomicBool::new(false);

pub type SignalResult<T> = Result<T, SignalError>;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("no signals to wait for")]
    Empty,

    #[error("invalid signal number: {0}")]
    Invalid(c_int),

    #[error("signal {0} cannot be caught")]
    Uncatchable(c_int),

    #[error("failed to change the signal mask: {0}")]
    Mask(#[source] io::Error),
}

extern "C" fn record_signal(_signal: c_int) {
    SIGNALS_RECEIVED.fetch_add(1, Ordering::SeqCst);
}

fn empty_signal_set() -> libc::sigset_t {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();

    // SAFETY: sigemptyset initialises the set.
    unsafe { libc::sigemptyset(set.as_mut_ptr()) };
    // SAFETY: initialised above.
    unsafe { set.assume_init() }
}

/// Builds a signal set from `signals`, rejecting numbers the OS does not know.
fn signal_set(signals: &[c_int]) -> SignalResult<libc::sigset_t> {
    let mut set = empty_signal_set();

    for &signal in signals {
        // SAFETY: `set` is a valid, initialised signal set.
        if unsafe { libc::sigaddset(&mut set, signal) } < 0 {
            return Err(SignalError::Invalid(signal));
        }
    }

    Ok(set)
}

/// Blocks `signals` for the calling thread.
///
/// Threads spawned afterwards inherit the mask, so calling this first thing in `main` leaves the
/// signals pending until a [`SignalWait`] unblocks them.
pub fn block_signals(signals: &[c_int]) -> SignalResult<()> {
    let set = signal_set(signals)?;

    // SAFETY: `set` is initialised; the old mask is not requested.
    let result = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()) };
    if result != 0 {
        return Err(SignalError::Mask(io::Error::from_raw_os_error(result)));
    }

    Ok(())
}

/// Reports whether a [`SignalWait`] currently has its handlers installed.
pub fn is_waiting() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

/// Scheduler whose senders complete once one of its signals arrives.
///
/// # Example
/// ```ignore
/// let signals = InlineSignalScheduler::new(&[libc::SIGINT, libc::SIGTERM])?;
/// sync_wait(then(schedule(&signals), just_from(|| { info!("stopping"); Ok::<_, Infallible>(()) })))?;
/// ```
#[derive(Debug, Clone)]
pub struct InlineSignalScheduler {
    signals: Arc<[c_int]>,
}

impl InlineSignalScheduler {
    /// Creates a scheduler waiting for any of `signals`.
    ///
    /// # Returns
    /// An error if the list is empty, holds a number the OS rejects, or holds SIGKILL or
    /// SIGSTOP
    pub fn new(signals: &[c_int]) -> SignalResult<Self> {
        if signals.is_empty() {
            return Err(SignalError::Empty);
        }

        if let Some(&signal) = signals
            .iter()
            .find(|&&signal| signal == libc::SIGKILL || signal == libc::SIGSTOP)
        {
            return Err(SignalError::Uncatchable(signal));
        }

        signal_set(signals)?;

        Ok(Self {
            signals: signals.into(),
        })
    }

    /// Signals ending a wait, in the order given to [`InlineSignalScheduler::new`].
    pub fn signals(&self) -> &[c_int] {
        &self.signals
    }
}

impl Scheduler for InlineSignalScheduler {
    type Sender = SignalWait;

    fn schedule(&self) -> SignalWait {
        SignalWait {
            signals: self.signals.clone(),
        }
    }
}

/// Sender produced by [`InlineSignalScheduler`].
#[derive(Debug, Clone)]
pub struct SignalWait {
    signals: Arc<[c_int]>,
}

impl Sender for SignalWait {
    type Operation<R: Receiver> = SignalWaitOperation<R>;

    fn connect<R: Receiver>(self, receiver: R) -> Self::Operation<R> {
        SignalWaitOperation {
            signals: self.signals,
            receiver: Some(receiver),
        }
    }
}

/// Operation state of [`SignalWait`]; polls on the starting thread.
pub struct SignalWaitOperation<R> {
    signals: Arc<[c_int]>,
    receiver: Option<R>,
}

/// Handlers installed for the duration of one wait.
struct InstalledHandlers {
    previous: Vec<(c_int, libc::sigaction)>,
}

impl InstalledHandlers {
    fn install(signals: &[c_int]) -> Self {
        let mut previous = Vec::with_capacity(signals.len());

        for &signal in signals {
            // SAFETY: an all-zero sigaction is a valid value to fill in.
            let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
            action.sa_sigaction = record_signal as extern "C" fn(c_int) as libc::sighandler_t;
            // SAFETY: `sa_mask` is a valid signal set inside `action`.
            unsafe { libc::sigemptyset(&mut action.sa_mask) };

            // SAFETY: as above.
            let mut old: libc::sigaction = unsafe { std::mem::zeroed() };
            // SAFETY: both pointers are valid; the signal was validated on construction.
            let result = unsafe { libc::sigaction(signal, &action, &mut old) };
            exec_check!(result == 0, "failed to install handler for signal {signal}");

            previous.push((signal, old));
        }

        INSTALLED.store(true, Ordering::SeqCst);
        Self { previous }
    }
}

impl Drop for InstalledHandlers {
    fn drop(&mut self) {
        INSTALLED.store(false, Ordering::SeqCst);

        for (signal, old) in &self.previous {
            // SAFETY: `old` was filled in by the matching install call.
            unsafe { libc::sigaction(*signal, old, ptr::null_mut()) };
        }
    }
}

impl<R: Receiver> OperationState for SignalWaitOperation<R> {
    unsafe fn start(self: Pin<&mut Self>) {
        // SAFETY: nothing here is structurally pinned.
        let this = unsafe { self.get_unchecked_mut() };
        let receiver = take_once(&mut this.receiver, "signal wait started twice");

        exec_check!(
            ACTIVE
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok(),
            "another signal wait is already active"
        );

        let token = receiver.stop_token();
        let baseline = SIGNALS_RECEIVED.load(Ordering::SeqCst);

        {
            let _handlers = InstalledHandlers::install(&this.signals);
            debug!(signals = ?this.signals, "waiting for signals");

            let timeout = libc::timespec {
                tv_sec: POLL_INTERVAL.as_secs() as libc::time_t,
                tv_nsec: POLL_INTERVAL.subsec_nanos() as libc::c_long,
            };
            // Nothing is masked while sleeping, so blocked signals are delivered here.
            let unblocked = empty_signal_set();

            while SIGNALS_RECEIVED.load(Ordering::SeqCst) == baseline && !token.stop_requested() {
                // SAFETY: no file descriptors are passed; both pointers are valid.
                let result = unsafe { libc::ppoll(ptr::null_mut(), 0, &timeout, &unblocked) };
                if result < 0 {
                    let error = io::Error::last_os_error();
                    exec_check!(
                        error.raw_os_error() == Some(libc::EINTR),
                        "ppoll failed while waiting for signals: {error}"
                    );
                }
            }

            debug!(
                received = SIGNALS_RECEIVED.load(Ordering::SeqCst) != baseline,
                "signal wait finished"
            );
        }

        ACTIVE.store(false, Ordering::SeqCst);
        receiver.set_value();
    }
}
