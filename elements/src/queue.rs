use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::QueueError;

/// Where `enqueue` puts a new element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnqueueStrategy {
    /// Whatever the owner of the queue configured; the queue itself treats
    /// it as `Back`.
    #[default]
    Default,
    /// Append; successive `Back` enqueues from one thread keep their order.
    Back,
    /// Prepend, for priority-like admission.
    Front,
    /// Insert at an index chosen uniformly over `[0, size]`.
    Random,
}

/// A bounded, blocking, multi-producer multi-consumer queue.
///
/// All state lives behind one mutex. Two condition variables share it so that
/// a freed slot always wakes a producer and a new element always wakes a
/// consumer.
///
/// # Capacity
/// - `max_size == usize::MAX` is effectively unbounded
/// - `max_size == 0` is the "closed" sentinel: nothing more can be enqueued,
///   remaining elements can still be dequeued but nobody blocks for new ones
///
/// # Waiting
/// `wait_time` of `None` blocks until the operation can complete, the queue
/// is closed, or [`awake`](Queue::awake) is called. `Some(Duration::ZERO)`
/// never blocks. Any other duration bounds the wait. Blocked threads are not
/// served in any particular order.
pub struct Queue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

struct State<T> {
    items: VecDeque<T>,
    max_size: usize,
    /// Threads currently blocked in enqueue or dequeue.
    waiting: usize,
    /// Non-zero while an awake() broadcast is in progress.
    awaking: usize,
}

impl<T> State<T> {
    fn has_room(&self) -> bool {
        self.items.len() < self.max_size
    }

    fn insert(&mut self, element: T, strategy: EnqueueStrategy) {
        match strategy {
            EnqueueStrategy::Default | EnqueueStrategy::Back => self.items.push_back(element),
            EnqueueStrategy::Front => self.items.push_front(element),
            EnqueueStrategy::Random => {
                let index = rand::thread_rng().gen_range(0..=self.items.len());
                self.items.insert(index, element);
            }
        }
    }
}

/// Outcome of one condition wait.
enum Wake<'a, T> {
    Signalled(MutexGuard<'a, State<T>>),
    TimedOut(MutexGuard<'a, State<T>>),
}

impl<T> Queue<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                max_size,
                waiting: 0,
                awaking: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Inserts `element` according to `strategy`.
    ///
    /// # Returns
    /// * `Ok(true)` - the element was inserted
    /// * `Ok(false)` - the queue is closed, stayed full for `wait_time`, or
    ///   the wait was cancelled by [`awake`](Queue::awake); the element is
    ///   dropped
    /// * `Err(QueueError)` - waiting on the queue condition failed
    pub fn enqueue(
        &self,
        element: T,
        wait_time: Option<Duration>,
        strategy: EnqueueStrategy,
    ) -> Result<bool, QueueError> {
        let mut state = self.lock("enqueue")?;

        if state.has_room() {
            state.insert(element, strategy);
            self.not_empty.notify_one();
            return Ok(true);
        }

        if state.max_size == 0 || wait_time == Some(Duration::ZERO) {
            return Ok(false);
        }

        let deadline = deadline_after(wait_time);
        state.waiting += 1;

        loop {
            if state.awaking > 0 {
                state.waiting -= 1;
                return Ok(false);
            }

            state = match self.wait(&self.not_full, state, deadline, "enqueue")? {
                Wake::Signalled(state) => state,
                Wake::TimedOut(mut state) => {
                    state.waiting -= 1;
                    // Pass on a wakeup this thread may have absorbed.
                    if state.has_room() {
                        self.not_full.notify_one();
                    }
                    return Ok(false);
                }
            };

            if state.awaking > 0 {
                state.waiting -= 1;
                return Ok(false);
            }

            if state.max_size == 0 || state.has_room() {
                break;
            }
        }

        state.waiting -= 1;

        if state.max_size == 0 {
            return Ok(false);
        }

        state.insert(element, strategy);
        self.not_empty.notify_one();
        Ok(true)
    }

    /// Removes the front element.
    ///
    /// # Returns
    /// * `Ok(Some(element))` - an element was dequeued
    /// * `Ok(None)` - the queue is closed and drained, stayed empty for
    ///   `wait_time`, or the wait was cancelled by [`awake`](Queue::awake)
    /// * `Err(QueueError)` - waiting on the queue condition failed
    pub fn dequeue(&self, wait_time: Option<Duration>) -> Result<Option<T>, QueueError> {
        let mut state = self.lock("dequeue")?;

        if let Some(element) = state.items.pop_front() {
            self.not_full.notify_one();
            return Ok(Some(element));
        }

        if state.max_size == 0 || wait_time == Some(Duration::ZERO) {
            return Ok(None);
        }

        let deadline = deadline_after(wait_time);
        state.waiting += 1;

        loop {
            if state.awaking > 0 {
                state.waiting -= 1;
                return Ok(None);
            }

            state = match self.wait(&self.not_empty, state, deadline, "dequeue")? {
                Wake::Signalled(state) => state,
                Wake::TimedOut(mut state) => {
                    state.waiting -= 1;
                    if !state.items.is_empty() {
                        self.not_empty.notify_one();
                    }
                    return Ok(None);
                }
            };

            if state.awaking > 0 {
                state.waiting -= 1;
                return Ok(None);
            }

            if state.max_size == 0 || !state.items.is_empty() {
                break;
            }
        }

        state.waiting -= 1;

        let element = state.items.pop_front();
        if element.is_some() {
            self.not_full.notify_one();
        }

        Ok(element)
    }

    /// Makes every thread currently blocked in `enqueue`/`dequeue` give up
    /// and return `false`/`None`. Neither contents nor capacity change.
    ///
    /// Blocks until no thread is left waiting, so a waiter arriving during
    /// the broadcast cannot be missed: it gives up as well.
    pub fn awake(&self) -> Result<(), QueueError> {
        {
            let mut state = self.lock("awake")?;

            if state.waiting == 0 {
                return Ok(());
            }

            state.awaking += 1;
        }

        loop {
            self.not_empty.notify_all();
            self.not_full.notify_all();

            thread::yield_now();

            let mut state = self.lock("awake")?;

            if state.waiting == 0 {
                state.awaking -= 1;
                return Ok(());
            }
        }
    }

    pub fn max_size(&self) -> usize {
        self.lock_recover().max_size
    }

    /// Changes the capacity and wakes every waiter so the new limit is
    /// observed promptly. Setting 0 closes the queue.
    pub fn set_max_size(&self, max_size: usize) {
        let mut state = self.lock_recover();
        state.max_size = max_size;

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn size(&self) -> usize {
        self.lock_recover().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, State<T>>, QueueError> {
        self.state.lock().map_err(|_| QueueError::WaitFailed {
            operation,
            reason: "queue mutex is poisoned".to_string(),
        })
    }

    // Counters and capacity stay consistent even if a holder panicked.
    fn lock_recover(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(
        &self,
        condition: &Condvar,
        state: MutexGuard<'a, State<T>>,
        deadline: Option<Instant>,
        operation: &'static str,
    ) -> Result<Wake<'a, T>, QueueError> {
        let failed = || QueueError::WaitFailed {
            operation,
            reason: "condition wait on a poisoned mutex".to_string(),
        };

        match deadline {
            None => match condition.wait(state) {
                Ok(state) => Ok(Wake::Signalled(state)),
                Err(poisoned) => {
                    poisoned.into_inner().waiting -= 1;
                    Err(failed())
                }
            },
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(Wake::TimedOut(state));
                }

                match condition.wait_timeout(state, deadline - now) {
                    Ok((state, result)) if result.timed_out() => Ok(Wake::TimedOut(state)),
                    Ok((state, _)) => Ok(Wake::Signalled(state)),
                    Err(poisoned) => {
                        poisoned.into_inner().0.waiting -= 1;
                        Err(failed())
                    }
                }
            }
        }
    }
}

/// `None` (wait forever) when the wait time is unset or too large to
/// represent as an instant.
fn deadline_after(wait_time: Option<Duration>) -> Option<Instant> {
    wait_time.and_then(|wait_time| Instant::now().checked_add(wait_time))
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_recover();
        f.debug_struct("Queue")
            .field("size", &state.items.len())
            .field("max_size", &state.max_size)
            .field("waiting", &state.waiting)
            .finish()
    }
}
