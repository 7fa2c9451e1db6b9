//! Scheduler backed by one dedicated worker thread.
//!
//! Operations produced by [`SingleThreadScheduler::schedule`] enqueue a resumption of
//! themselves when started and complete on the worker, in the order they were started.

use crate::builder::ContextBuilder;
use crate::execution::{
    ExecutionError, ExecutionResult, OperationState, Receiver, Sender, exec_check, take_once,
};
use crate::runtime::Scheduler;
use crate::runtime::queue::{Job, JobQueue};

use std::marker::PhantomPinned;
use std::pin::Pin;
use std::ptr::NonNull;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

/// Execution context owning a worker thread and its job queue.
///
/// The worker is spawned by [`SingleThreadContext::run`] and joined by
/// [`SingleThreadContext::stop`] or on drop.
///
/// # Example
/// ```ignore
/// let mut context = SingleThreadContext::new();
/// context.run()?;
/// sync_wait(then(schedule(&context.scheduler()), just_from(work)))?;
/// context.stop();
/// ```
pub struct SingleThreadContext {
    queue: Arc<JobQueue>,
    worker: Option<JoinHandle<()>>,
    name: String,
    stack_size: Option<usize>,
}

impl Default for SingleThreadContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleThreadContext {
    /// Creates a stopped context with default settings.
    pub fn new() -> Self {
        ContextBuilder::new().build()
    }

    /// Returns a builder to configure the worker thread.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub(crate) fn with_config(name: String, stack_size: Option<usize>) -> Self {
        Self {
            queue: Arc::new(JobQueue::new()),
            worker: None,
            name,
            stack_size,
        }
    }

    /// Name given to the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawns the worker thread.
    ///
    /// # Returns
    /// An error if the OS refuses to create the thread
    ///
    /// # Aborts
    /// If the context is already running.
    pub fn run(&mut self) -> ExecutionResult<()> {
        exec_check!(
            self.worker.is_none(),
            "context `{}` is already running",
            self.name
        );

        self.queue.reset();

        let mut builder = thread::Builder::new().name(self.name.clone());
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let queue = self.queue.clone();
        let name = self.name.clone();
        let worker = builder
            .spawn(move || work_loop(&queue, &name))
            .map_err(ExecutionError::Spawn)?;

        self.worker = Some(worker);
        Ok(())
    }

    /// Stops the worker thread and waits for it to exit.
    ///
    /// The job being executed finishes first; jobs still queued stay queued. Does nothing when
    /// the context is not running.
    ///
    /// # Aborts
    /// When called from the worker thread itself.
    pub fn stop(&mut self) {
        if let Some(worker) = &self.worker {
            exec_check!(
                worker.thread().id() != thread::current().id(),
                "context `{}` stopped from its own worker thread",
                self.name
            );
        }

        let Some(worker) = self.worker.take() else {
            return;
        };

        self.queue.request_stop();

        if worker.join().is_err() {
            error!(name = %self.name, "worker thread panicked");
        }
    }

    /// Reports whether the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Returns a scheduler enqueuing onto this context.
    pub fn scheduler(&self) -> SingleThreadScheduler {
        SingleThreadScheduler {
            queue: self.queue.clone(),
        }
    }

    /// Runs `job` on the worker thread after everything queued before it.
    ///
    /// # Arguments
    /// * `job` - Detached closure, its completion is not reported anywhere
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.push(Job::Run(Box::new(job)));
    }
}

impl Drop for SingleThreadContext {
    fn drop(&mut self) {
        self.stop();
    }
}

fn work_loop(queue: &JobQueue, name: &str) {
    debug!(name, "worker thread started");

    while let Some(job) = queue.next() {
        job.run();
    }

    debug!(name, pending = queue.len(), "worker thread stopped");
}

/// Handle scheduling work onto a [`SingleThreadContext`].
#[derive(Clone)]
pub struct SingleThreadScheduler {
    queue: Arc<JobQueue>,
}

impl Scheduler for SingleThreadScheduler {
    type Sender = ScheduleOnThread;

    fn schedule(&self) -> ScheduleOnThread {
        ScheduleOnThread {
            queue: self.queue.clone(),
        }
    }
}

/// Sender completing with `set_value` on the worker thread.
#[derive(Clone)]
pub struct ScheduleOnThread {
    queue: Arc<JobQueue>,
}

impl Sender for ScheduleOnThread {
    type Operation<R: Receiver> = ScheduleOperation<R>;

    fn connect<R: Receiver>(self, receiver: R) -> Self::Operation<R> {
        ScheduleOperation {
            queue: self.queue,
            receiver: Some(receiver),
            queued: false,
            _pinned: PhantomPinned,
        }
    }
}

/// Operation state of [`ScheduleOnThread`].
///
/// Starting it queues a resumption on the worker, which completes the receiver with
/// `set_value`. Unlike other operation states, a started `ScheduleOperation` may be dropped
/// before the worker got to it: the drop withdraws the queued resumption, or waits until a
/// running one has taken the receiver.
pub struct ScheduleOperation<R> {
    queue: Arc<JobQueue>,
    receiver: Option<R>,
    queued: bool,
    _pinned: PhantomPinned,
}

impl<R: Receiver> ScheduleOperation<R> {
    /// Completes the operation on the worker thread.
    ///
    /// # Safety
    /// `context` must be the address of a pinned, live `ScheduleOperation<R>`.
    unsafe fn resume(context: NonNull<()>) {
        // SAFETY: upheld by the caller.
        let this = unsafe { context.cast::<Self>().as_mut() };

        let queue = Arc::clone(&this.queue);
        let receiver = take_once(&mut this.receiver, "scheduled operation resumed twice");

        // The operation may be freed from here on.
        queue.release(context);
        receiver.set_value();
    }
}

impl<R: Receiver> OperationState for ScheduleOperation<R> {
    unsafe fn start(self: Pin<&mut Self>) {
        // SAFETY: the operation stays pinned until the worker resumes it or it is dropped.
        let this = unsafe { self.get_unchecked_mut() };

        exec_check!(!this.queued, "scheduled operation started twice");
        this.queued = true;

        // The worker may complete and free this operation as soon as the job is visible.
        let queue = this.queue.clone();
        queue.push(Job::Resume {
            context: NonNull::from(this).cast(),
            resume: Self::resume,
        });
    }
}

impl<R> Drop for ScheduleOperation<R> {
    fn drop(&mut self) {
        if self.queued {
            let context = NonNull::from(&mut *self).cast();
            self.queue.withdraw(context);
        }
    }
}
