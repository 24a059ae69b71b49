//! # Thread Pool
//!
//! A fixed set of worker threads consuming tasks from one bounded
//! [`Queue`](crate::queue::Queue).
//!
//! ## Task classes
//! - **required** tasks run even when enqueued before a stop request that
//!   overtakes them; every required task enqueued before `stop()` returns
//!   runs exactly once
//! - **best-effort** tasks are skipped once the pool is stopping
//!
//! ## Lifecycle
//! `start` spawns the workers, `stop` closes the queue and wakes blocked
//! workers, `wait` joins them and reopens the queue with the configured
//! capacity so the pool can be started again.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use elements::config::ThreadPoolConfig;
//! use elements::queue::EnqueueStrategy;
//! use elements::service::thread_pool::{TaskBase, ThreadPool};
//! use elements_api::callback::LoggingCallback;
//! use elements_api::service::Service;
//!
//! let pool = ThreadPool::new(Arc::new(LoggingCallback), ThreadPoolConfig::new("doc").with_threads(2))?;
//! let done = Arc::new(AtomicUsize::new(0));
//!
//! pool.start()?;
//! for _ in 0..4 {
//!     let done = Arc::clone(&done);
//!     let task = TaskBase::required(move || {
//!         done.fetch_add(1, Ordering::SeqCst);
//!     });
//!     pool.execute(Arc::new(task), None, EnqueueStrategy::Default)?;
//! }
//! pool.stop()?;
//! pool.wait()?;
//!
//! assert_eq!(done.load(Ordering::SeqCst), 4);
//! # Ok::<(), elements_api::errors::ServiceError>(())
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use elements_api::message::Event;
use elements_api::service::Service;
use elements_api::types::{CallbackVar, ServiceResult};
use tracing::{debug, trace};

use crate::config::{service_name, ThreadPoolConfig};
use crate::logging;
use crate::queue::{EnqueueStrategy, Queue};
use crate::service::base::ServiceBase;
use crate::service::timer::TimerEvent;
use crate::task_span;

/// A unit of work for a [`ThreadPool`].
pub trait Task: Send + Sync {
    fn execute(&self);

    /// Whether the task must run even if the pool is stopping.
    fn execution_required(&self) -> bool {
        false
    }
}

pub type TaskVar = Arc<dyn Task>;

/// A closure-backed task with a fixed execution-required flag.
pub struct TaskBase<F> {
    body: F,
    execution_required: bool,
}

impl<F> TaskBase<F>
where
    F: Fn() + Send + Sync,
{
    pub fn new(body: F, execution_required: bool) -> Self {
        Self {
            body,
            execution_required,
        }
    }

    /// A task skipped once the pool is stopping.
    pub fn best_effort(body: F) -> Self {
        Self::new(body, false)
    }

    /// A task that runs even after the pool started stopping.
    pub fn required(body: F) -> Self {
        Self::new(body, true)
    }
}

impl<F> Task for TaskBase<F>
where
    F: Fn() + Send + Sync,
{
    fn execute(&self) {
        (self.body)()
    }

    fn execution_required(&self) -> bool {
        self.execution_required
    }
}

impl<F> fmt::Debug for TaskBase<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBase")
            .field("execution_required", &self.execution_required)
            .finish()
    }
}

/// Delivers an [`Event`] to a callback from a pool worker (or when fired by
/// a timer).
///
/// An error the callback does not handle is written to the log rather than
/// dropped.
pub struct ServiceEvent {
    callback: CallbackVar,
    event: Event,
    execution_required: bool,
}

impl ServiceEvent {
    pub fn new(callback: CallbackVar, event: Event, execution_required: bool) -> Self {
        Self {
            callback,
            event,
            execution_required,
        }
    }

    /// Required shutdown notification from `source`: enqueued before
    /// `stop()`, it is guaranteed to reach the callback.
    pub fn shutdown(callback: CallbackVar, source: impl Into<String>) -> Self {
        Self::new(callback, Event::shutdown(source), true)
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    fn deliver(&self) {
        if !self.callback.notify(&self.event) && self.event.is_error() {
            logging::log_event(&self.event, Some("ServiceEvent::deliver: unhandled "));
        }
    }
}

impl Task for ServiceEvent {
    fn execute(&self) {
        self.deliver();
    }

    fn execution_required(&self) -> bool {
        self.execution_required
    }
}

impl TimerEvent for ServiceEvent {
    fn trigger(&self) {
        self.deliver();
    }
}

impl fmt::Debug for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEvent")
            .field("event", &self.event)
            .field("execution_required", &self.execution_required)
            .finish()
    }
}

struct PoolInner {
    base: ServiceBase,
    queue: Queue<TaskVar>,
    config: ThreadPoolConfig,
}

impl PoolInner {
    fn run(&self) -> ServiceResult<()> {
        loop {
            let task = match self.queue.dequeue(None)? {
                Some(task) => task,
                // Woken by stop; whatever is still queued gets drained.
                None if !self.queue.is_empty() => continue,
                None => break,
            };

            let required = task.execution_required();

            if required || !self.base.stopping() {
                let span = task_span!(self.base.name(), required);
                let _enter = span.enter();
                task.execute();
            } else {
                trace!(service = %self.base.name(), "skipping best-effort task, pool is stopping");
            }
        }

        Ok(())
    }
}

/// Fixed-size pool of worker threads fed by a bounded task queue.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl ThreadPool {
    /// # Errors
    /// `InvalidArg` when the configuration asks for zero threads or a zero
    /// capacity queue.
    pub fn new(callback: CallbackVar, mut config: ThreadPoolConfig) -> ServiceResult<Self> {
        config.validate()?;
        config.name = service_name("ThreadPool", &config.name);

        let base = ServiceBase::new(
            "ThreadPool",
            config.name.clone(),
            callback,
            config.threads,
            config.stack_size,
        )?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                base,
                queue: Queue::new(config.queue_size),
                config,
            }),
        })
    }

    /// Enqueues `task`.
    ///
    /// `EnqueueStrategy::Default` uses the strategy the pool was configured
    /// with.
    ///
    /// # Returns
    /// * `Ok(true)` - the task was queued
    /// * `Ok(false)` - the pool is stopping, the queue stayed full for
    ///   `wait_time`, or the wait was cancelled by `stop()`
    pub fn execute(
        &self,
        task: TaskVar,
        wait_time: Option<Duration>,
        strategy: EnqueueStrategy,
    ) -> ServiceResult<bool> {
        if self.inner.base.draining() {
            debug!(service = %self.name(), "task rejected, pool is stopping");
            return Ok(false);
        }

        let strategy = self.inner.config.resolve_strategy(strategy);
        Ok(self.inner.queue.enqueue(task, wait_time, strategy)?)
    }

    /// Number of tasks waiting in the queue.
    pub fn queue_size(&self) -> usize {
        self.inner.queue.size()
    }

    /// Callback the pool reports its faults to.
    pub fn callback(&self) -> &CallbackVar {
        self.inner.base.callback()
    }

    pub fn config(&self) -> &ThreadPoolConfig {
        &self.inner.config
    }

    pub fn stopping(&self) -> bool {
        self.inner.base.stopping()
    }
}

impl Service for ThreadPool {
    fn name(&self) -> &str {
        self.inner.base.name()
    }

    fn start(&self) -> ServiceResult<bool> {
        let inner = Arc::clone(&self.inner);
        self.inner.base.start(Arc::new(move || inner.run()))
    }

    fn stop(&self) -> ServiceResult<bool> {
        if !self.inner.base.stop() {
            return Ok(false);
        }

        self.inner.queue.set_max_size(0);
        self.inner.queue.awake()?;

        Ok(true)
    }

    fn wait(&self) -> ServiceResult<()> {
        self.inner.base.wait()?;
        self.inner.queue.set_max_size(self.inner.config.queue_size);
        Ok(())
    }

    fn started(&self) -> bool {
        self.inner.base.started()
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("base", &self.inner.base)
            .field("queue", &self.inner.queue)
            .finish()
    }
}
