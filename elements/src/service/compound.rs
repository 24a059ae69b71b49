//! # Compound Service
//!
//! A service built from one [`ThreadPool`] and one [`Timer`]: work is
//! delivered to the pool either right away or once a deadline passes.
//!
//! Both parts report to an internal callback that forwards to the outer
//! one. Errors are re-raised under the compound service's own name so the
//! outer callback sees a single source; other events pass through as they
//! are.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use elements_api::callback::Callback;
use elements_api::message::{Error, Event};
use elements_api::service::Service;
use elements_api::types::{CallbackVar, ServiceResult};
use tracing::debug;

use crate::config::CompoundServiceConfig;
use crate::log_error;
use crate::queue::EnqueueStrategy;
use crate::service::thread_pool::{TaskVar, ThreadPool};
use crate::service::timer::{TimerEvent, Timer};

/// Callback shared by the owned pool and timer.
struct Forwarder {
    name: String,
    outer: CallbackVar,
}

impl Callback for Forwarder {
    fn notify(&self, event: &Event) -> bool {
        match event {
            Event::Error(error) => {
                let forwarded = Error::new(
                    format!("CompoundService::notify: forwarding {}", error),
                    self.name.as_str(),
                    error.severity(),
                );
                self.outer.notify(&Event::from(forwarded));
                true
            }
            other => self.outer.notify(other),
        }
    }
}

/// Hands a task to the pool when the timer fires.
struct Deferred {
    pool: ThreadPool,
    task: TaskVar,
    callback: CallbackVar,
}

impl TimerEvent for Deferred {
    fn trigger(&self) {
        match self.pool.execute(Arc::clone(&self.task), None, EnqueueStrategy::Default) {
            Ok(true) => {}
            Ok(false) => debug!(service = %self.pool.name(), "deferred task dropped, pool is stopping"),
            Err(err) => {
                log_error!(err, service = %self.pool.name(), operation = "deliver_at_time");
                let error = Error::critical(
                    format!("CompoundService::deliver_at_time: {}", err),
                    self.pool.name(),
                );
                self.callback.notify(&Event::from(error));
            }
        }
    }
}

/// A [`ThreadPool`] and a [`Timer`] managed as one service.
pub struct CompoundService {
    name: String,
    pool: ThreadPool,
    timer: Timer,
}

impl CompoundService {
    pub fn new(callback: CallbackVar, config: CompoundServiceConfig) -> ServiceResult<Self> {
        let forwarder: CallbackVar = Arc::new(Forwarder {
            name: config.name.clone(),
            outer: callback,
        });

        let pool = ThreadPool::new(Arc::clone(&forwarder), config.pool)?;
        let timer = Timer::new(forwarder, config.timer)?;

        Ok(Self {
            name: config.name,
            pool,
            timer,
        })
    }

    /// Enqueues `task` on the pool now.
    pub fn deliver_now(
        &self,
        task: TaskVar,
        wait_time: Option<Duration>,
        strategy: EnqueueStrategy,
    ) -> ServiceResult<bool> {
        self.pool.execute(task, wait_time, strategy)
    }

    /// Enqueues `task` on the pool at `at`, or now when `at` is `None`.
    ///
    /// A delayed task is queued with the pool's default strategy when its
    /// deadline passes; `Ok(true)` then only means it was scheduled.
    pub fn deliver_at_time(&self, task: TaskVar, at: Option<Instant>) -> ServiceResult<bool> {
        match at {
            None => self.pool.execute(task, None, EnqueueStrategy::Default),
            Some(at) => {
                let deferred = Deferred {
                    pool: self.pool.clone(),
                    task,
                    callback: Arc::clone(self.pool.callback()),
                };
                self.timer.set(Arc::new(deferred), at);
                Ok(true)
            }
        }
    }

    /// Number of tasks waiting in the pool queue.
    pub fn task_queue_size(&self) -> usize {
        self.pool.queue_size()
    }

    /// Number of deliveries waiting for their deadline.
    pub fn pending_deliveries(&self) -> usize {
        self.timer.pending()
    }

    pub fn thread_pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }
}

impl Service for CompoundService {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> ServiceResult<bool> {
        if !self.pool.start()? {
            return Ok(false);
        }

        if let Err(err) = self.timer.start() {
            self.pool.stop()?;
            self.pool.wait()?;
            return Err(err);
        }

        Ok(true)
    }

    fn stop(&self) -> ServiceResult<bool> {
        let timer = self.timer.stop()?;
        let pool = self.pool.stop()?;
        Ok(timer || pool)
    }

    fn wait(&self) -> ServiceResult<()> {
        self.timer.wait()?;
        self.timer.clear();
        self.pool.wait()
    }

    fn started(&self) -> bool {
        self.pool.started()
    }
}

impl fmt::Debug for CompoundService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompoundService")
            .field("name", &self.name)
            .field("pool", &self.pool)
            .field("timer", &self.timer)
            .finish()
    }
}
