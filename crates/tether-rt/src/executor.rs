use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use async_task::{Runnable, Task};
use concurrent_queue::ConcurrentQueue;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::config::ExecutorConfig;
use crate::error::RuntimeError;
use crate::reactor::Reactor;
use crate::registry;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique executor identifier, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutorId(u64);

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "executor-{}", self.0)
    }
}

/// A single-threaded cooperative task executor.
///
/// Tasks run on whichever thread is currently driving the executor through
/// [`Executor::block_on`] or [`Executor::run_forever`]; that thread becomes
/// the owner. Spawning is thread-safe: the ready queue is lock-free and the
/// scheduler wakes a parked owner through the reactor.
pub struct Executor {
    id: ExecutorId,
    config: ExecutorConfig,
    /// Ready queue: tasks whose wakers have fired.
    queue: ConcurrentQueue<Runnable>,
    reactor: Reactor,
    running: AtomicBool,
    stopping: AtomicBool,
    owner: Mutex<ThreadId>,
}

impl Executor {
    /// Create an idle executor owned by the calling thread.
    pub fn new() -> Result<Arc<Self>, RuntimeError> {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Result<Arc<Self>, RuntimeError> {
        let reactor = Reactor::new()?;
        let executor = Arc::new(Executor {
            id: ExecutorId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            config,
            queue: ConcurrentQueue::unbounded(),
            reactor,
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            owner: Mutex::new(thread::current().id()),
        });
        tracing::debug!(
            executor = %executor.id,
            name = ?executor.name(),
            "executor created"
        );
        Ok(executor)
    }

    pub fn id(&self) -> ExecutorId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Whether some thread is driving this executor right now.
    ///
    /// Read without synchronizing against the driver: the answer may be
    /// stale by the time the caller acts on it. A stale `false` is caught
    /// by `block_on`, which refuses to re-enter.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Whether the calling thread is the one this executor is bound to.
    pub fn is_owned_by_current_thread(&self) -> bool {
        *self.owner.lock() == thread::current().id()
    }

    pub(crate) fn bind_to_current_thread(&self) {
        *self.owner.lock() = thread::current().id();
    }

    pub(crate) fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// Spawn a future onto the executor. Callable from any thread.
    ///
    /// The future is polled by whichever thread drives the executor. Dropping
    /// the returned [`Task`] cancels it; call `detach()` to let it run on.
    pub fn spawn<F>(self: &Arc<Self>, future: F) -> Result<Task<F::Output>, RuntimeError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.queue.is_closed() {
            return Err(RuntimeError::Closed);
        }
        let (runnable, task) = async_task::spawn(future, self.scheduler());
        runnable.schedule(); // Push to queue for first poll.
        Ok(task)
    }

    /// Pop one ready task and run it. Returns true if a task was polled.
    pub fn try_tick(&self) -> bool {
        match self.queue.pop() {
            Ok(runnable) => {
                runnable.run();
                true
            }
            Err(_) => false,
        }
    }

    /// Drive the executor on the calling thread until `future` completes.
    ///
    /// Fails with [`RuntimeError::AlreadyRunning`] instead of deadlocking
    /// when the executor is already being driven, including from inside one
    /// of its own tasks.
    pub fn block_on<F>(self: &Arc<Self>, future: F) -> Result<F::Output, RuntimeError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let _guard = self.enter()?;
        let task = self.spawn(future)?;

        loop {
            if task.is_finished() {
                break;
            }
            if self.queue.is_closed() {
                return Err(RuntimeError::Closed);
            }

            let mut did_work = false;
            while self.try_tick() {
                did_work = true;
                // The future may have finished during the tick.
                if task.is_finished() {
                    break;
                }
            }
            if task.is_finished() {
                break;
            }

            self.reactor.react(Some(self.park_timeout(did_work)))?;
        }

        // Finished tasks resolve on the first poll; `None` means it was
        // cancelled instead of completed.
        task.fallible()
            .now_or_never()
            .flatten()
            .ok_or(RuntimeError::Cancelled)
    }

    /// Drive the executor on the calling thread until [`Executor::stop`] or
    /// [`Executor::close`] is called.
    pub fn run_forever(self: &Arc<Self>) -> Result<(), RuntimeError> {
        let _guard = self.enter()?;
        tracing::debug!(executor = %self.id, name = ?self.name(), "run loop started");

        while !self.stopping.swap(false, Ordering::AcqRel) && !self.queue.is_closed() {
            let mut did_work = false;
            while self.try_tick() {
                did_work = true;
                if self.stopping.load(Ordering::Acquire) {
                    break;
                }
            }
            self.reactor.react(Some(self.park_timeout(did_work)))?;
        }
        if self.queue.is_closed() {
            // A task polled concurrently with close() may have armed a timer
            // after close() fired them all.
            self.reactor.fire_all_timers();
        }

        tracing::debug!(executor = %self.id, name = ?self.name(), "run loop exited");
        Ok(())
    }

    /// Ask a `run_forever` loop to return after its current iteration.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.wake();
    }

    /// Reject further submissions and cancel every task still queued.
    ///
    /// Waiters on cancelled tasks observe [`RuntimeError::Cancelled`].
    pub fn close(&self) {
        if self.queue.close() {
            tracing::debug!(executor = %self.id, name = ?self.name(), "executor closed");
        }
        // Dropping a runnable cancels its task and wakes whoever awaits it.
        while let Ok(runnable) = self.queue.pop() {
            drop(runnable);
        }
        // Tasks parked on timers get rescheduled, fail to enqueue and drop.
        self.reactor.fire_all_timers();
        self.wake();
    }

    /// Schedule function for async-task. Holds the executor weakly so queued
    /// runnables don't keep it alive; once it is gone they are dropped.
    fn scheduler(self: &Arc<Self>) -> impl Fn(Runnable) + Send + Sync + 'static {
        let executor = Arc::downgrade(self);
        move |runnable| {
            if let Some(executor) = executor.upgrade() {
                executor.schedule(runnable);
            }
        }
    }

    fn schedule(&self, runnable: Runnable) {
        if self.queue.push(runnable).is_err() {
            tracing::trace!(executor = %self.id, "dropping task scheduled on closed executor");
            return;
        }
        self.wake();
    }

    fn wake(&self) {
        if let Err(err) = self.reactor.notify() {
            tracing::warn!(executor = %self.id, error = %err, "failed to wake executor");
        }
    }

    /// Non-blocking if we just did work (there might be more tasks after
    /// wakers fire), the configured idle interval otherwise.
    fn park_timeout(&self, did_work: bool) -> Duration {
        if did_work {
            Duration::ZERO
        } else {
            self.config.idle_timeout
        }
    }

    fn enter(self: &Arc<Self>) -> Result<RunGuard, RuntimeError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RuntimeError::AlreadyRunning);
        }
        self.bind_to_current_thread();
        registry::enter(self.clone());
        Ok(RunGuard {
            executor: self.clone(),
        })
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("running", &self.is_running())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Marks an executor as driven by this thread; restores idle state on drop,
/// including when a task panics.
struct RunGuard {
    executor: Arc<Executor>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        registry::leave(&self.executor);
        self.executor.running.store(false, Ordering::Release);
    }
}
