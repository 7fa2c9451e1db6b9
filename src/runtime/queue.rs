//! Thread-safe job queue feeding a worker thread.
//!
//! Provides a FIFO queue of resumptions and closures. Producers push from any thread; the worker
//! blocks in [`JobQueue::next`] until a job arrives or a stop is requested. An operation that is
//! dropped before its resumption ran takes it back out with [`JobQueue::withdraw`].

use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// Unit of work executed by a worker thread.
pub(crate) enum Job {
    /// Resumes a pinned operation state: `resume(context)`.
    Resume {
        context: NonNull<()>,
        resume: unsafe fn(NonNull<()>),
    },
    /// Runs a detached closure.
    Run(Box<dyn FnOnce() + Send>),
}

// SAFETY: `Resume` jobs are only created by operations that stay pinned and alive until the
// worker has resumed them or they withdrew the job, and whose receivers are `Send`.
unsafe impl Send for Job {}

impl Job {
    /// Executes the job on the current thread.
    pub(crate) fn run(self) {
        match self {
            // SAFETY: the pushing operation guarantees `context` is valid for `resume`.
            Job::Resume { context, resume } => unsafe { resume(context) },
            Job::Run(closure) => closure(),
        }
    }
}

struct Jobs {
    queued: VecDeque<Job>,
    /// Context of the `Resume` job popped by the worker and not yet released.
    resuming: Option<NonNull<()>>,
}

// SAFETY: `resuming` is only compared, never dereferenced.
unsafe impl Send for Jobs {}

/// A thread-safe, FIFO queue of [`Job`]s.
///
/// The mutex is held both to push and to pop, so the worker never observes a partially pushed
/// job. The condition variables only signal that the queue changed.
pub(crate) struct JobQueue {
    jobs: Mutex<Jobs>,
    available: Condvar,
    released: Condvar,
    stop: AtomicBool,
}

impl JobQueue {
    /// Creates a new empty queue.
    pub(crate) fn new() -> Self {
        Self {
            jobs: Mutex::new(Jobs {
                queued: VecDeque::new(),
                resuming: None,
            }),
            available: Condvar::new(),
            released: Condvar::new(),
            stop: AtomicBool::new(false),
        }
    }

    /// Enqueues a job and wakes the worker.
    ///
    /// # Arguments
    /// * `job` - The job to run after every job pushed before it
    pub(crate) fn push(&self, job: Job) {
        self.jobs.lock().unwrap().queued.push_back(job);
        self.available.notify_one();
    }

    /// Blocks until a job is available or a stop has been requested.
    ///
    /// A popped `Resume` job counts as resuming until [`JobQueue::release`] is called for it.
    ///
    /// # Returns
    /// Some(job) for the oldest queued job, None once a stop was requested
    pub(crate) fn next(&self) -> Option<Job> {
        let mut jobs = self
            .available
            .wait_while(self.jobs.lock().unwrap(), |jobs| {
                jobs.queued.is_empty() && !self.stop.load(Ordering::SeqCst)
            })
            .unwrap();

        if self.stop.load(Ordering::SeqCst) {
            return None;
        }

        let job = jobs.queued.pop_front()?;
        if let Job::Resume { context, .. } = &job {
            jobs.resuming = Some(*context);
        }

        Some(job)
    }

    /// Marks the resumption of `context` as no longer touching its operation.
    pub(crate) fn release(&self, context: NonNull<()>) {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.resuming == Some(context) {
            jobs.resuming = None;
            self.released.notify_all();
        }
    }

    /// Removes the queued resumption of `context`, or waits until its running resumption has
    /// released the operation.
    ///
    /// After this returns the worker no longer dereferences `context`.
    pub(crate) fn withdraw(&self, context: NonNull<()>) {
        let mut jobs = self.jobs.lock().unwrap();

        let position = jobs.queued.iter().position(
            |job| matches!(job, Job::Resume { context: queued, .. } if *queued == context),
        );
        if let Some(position) = position {
            jobs.queued.remove(position);
            return;
        }

        let _jobs = self
            .released
            .wait_while(jobs, |jobs| jobs.resuming == Some(context))
            .unwrap();
    }

    /// Makes [`JobQueue::next`] return None and wakes the worker.
    ///
    /// Jobs still queued are left in place and run if the worker is started again.
    pub(crate) fn request_stop(&self) {
        let _jobs = self.jobs.lock().unwrap();
        self.stop.store(true, Ordering::SeqCst);
        self.available.notify_all();
    }

    /// Clears a previous stop request so the queue can feed a new worker.
    pub(crate) fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    /// Number of jobs waiting to run.
    pub(crate) fn len(&self) -> usize {
        self.jobs.lock().unwrap().queued.len()
    }
}
