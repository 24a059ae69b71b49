//! # Timer
//!
//! A single-thread service that fires events at absolute instants.
//!
//! Events are kept in deadline order; events with the same deadline fire in
//! the order they were set. The worker sleeps until the earliest deadline,
//! fires everything that is due outside the schedule lock, and exits on
//! stop, leaving whatever was not due yet in the schedule (see
//! [`Timer::clear`]).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use elements_api::service::Service;
use elements_api::types::{CallbackVar, ServiceResult};
use tracing::trace;

use crate::config::{service_name, TimerConfig};
use crate::service::base::ServiceBase;

/// Something that happens at a point in time.
pub trait TimerEvent: Send + Sync {
    fn trigger(&self);
}

pub type TimerEventVar = Arc<dyn TimerEvent>;

#[derive(Default)]
struct Schedule {
    // (deadline, insertion sequence)
    events: BTreeMap<(Instant, u64), TimerEventVar>,
    next_seq: u64,
}

impl Schedule {
    fn pop_due(&mut self, now: Instant) -> Vec<TimerEventVar> {
        let mut due = Vec::new();

        while let Some(entry) = self.events.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }

        due
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.events.keys().next().map(|(at, _)| *at)
    }
}

struct TimerInner {
    base: ServiceBase,
    schedule: Mutex<Schedule>,
    wakeup: Condvar,
}

impl TimerInner {
    // Events fire outside the lock, so a panicking event can't poison it
    // while the schedule is half-updated.
    fn lock(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) -> ServiceResult<()> {
        let mut schedule = self.lock();

        loop {
            if self.base.stopping() {
                break;
            }

            let now = Instant::now();
            let due = schedule.pop_due(now);

            if !due.is_empty() {
                drop(schedule);

                trace!(service = %self.base.name(), count = due.len(), "firing timer events");
                for event in due {
                    event.trigger();
                }

                schedule = self.lock();
                continue;
            }

            schedule = match schedule.next_deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(now);
                    self.wakeup
                        .wait_timeout(schedule, timeout)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0)
                }
                None => self
                    .wakeup
                    .wait(schedule)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }

        Ok(())
    }
}

/// Single-thread service firing [`TimerEvent`]s at their deadlines.
///
/// Cloning yields another handle to the same timer.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    pub fn new(callback: CallbackVar, config: TimerConfig) -> ServiceResult<Self> {
        let name = service_name("Timer", &config.name);
        let base = ServiceBase::new("Timer", name, callback, 1, config.stack_size)?;

        Ok(Self {
            inner: Arc::new(TimerInner {
                base,
                schedule: Mutex::new(Schedule::default()),
                wakeup: Condvar::new(),
            }),
        })
    }

    /// Schedules `event` to fire at `at`.
    ///
    /// An instant that has already passed fires the event right away, on
    /// the calling thread.
    pub fn set(&self, event: TimerEventVar, at: Instant) {
        if at <= Instant::now() {
            event.trigger();
            return;
        }

        let mut schedule = self.inner.lock();
        let seq = schedule.next_seq;
        schedule.next_seq += 1;

        let earliest = schedule.next_deadline().map_or(true, |next| at < next);
        schedule.events.insert((at, seq), event);

        if earliest {
            self.inner.wakeup.notify_one();
        }
    }

    /// Number of events waiting for their deadline.
    pub fn pending(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Drops every pending event without firing it.
    pub fn clear(&self) {
        let events = std::mem::take(&mut self.inner.lock().events);
        // Released outside the lock: an event's drop may touch other services.
        drop(events);
    }
}

impl Service for Timer {
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

        let _schedule = self.inner.lock();
        self.inner.wakeup.notify_all();

        Ok(true)
    }

    fn wait(&self) -> ServiceResult<()> {
        self.inner.base.wait()
    }

    fn started(&self) -> bool {
        self.inner.base.started()
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("base", &self.inner.base)
            .field("pending", &self.pending())
            .finish()
    }
}
