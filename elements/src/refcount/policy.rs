//! Synchronization policies for reference counters.

use std::cell::Cell;
use std::fmt;
use std::sync::{Mutex, PoisonError};

pub type Count = usize;

/// Storage and update discipline of a reference count.
///
/// `decrement` returns `None` when the count is already zero; the counter is
/// left untouched in that case.
///
/// # Safety
/// [`RefCount`](super::RefCount) destroys its object when `decrement`
/// returns `Some(0)`, so each update must be atomic with respect to every
/// other thread that can reach the count, and `Some(0)` may be returned
/// only once per count reaching zero.
pub unsafe trait SyncPolicy {
    fn new(initial: Count) -> Self;

    fn increment(&self) -> Count;

    fn decrement(&self) -> Option<Count>;

    fn value(&self) -> Count;
}

/// No synchronization at all.
///
/// Holds the count in a `Cell`, which keeps the owning object `!Sync`: the
/// compiler refuses to share it between threads.
pub struct NullSync {
    count: Cell<Count>,
}

// SAFETY: `Cell` makes the policy `!Sync`, so only one thread updates it.
unsafe impl SyncPolicy for NullSync {
    fn new(initial: Count) -> Self {
        Self {
            count: Cell::new(initial),
        }
    }

    #[inline]
    fn increment(&self) -> Count {
        let value = self.count.get() + 1;
        self.count.set(value);
        value
    }

    #[inline]
    fn decrement(&self) -> Option<Count> {
        let value = self.count.get().checked_sub(1)?;
        self.count.set(value);
        Some(value)
    }

    #[inline]
    fn value(&self) -> Count {
        self.count.get()
    }
}

impl fmt::Debug for NullSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NullSync").field("count", &self.value()).finish()
    }
}

/// A mutex-guarded count, safe to update from any thread.
pub struct ThreadSync {
    count: Mutex<Count>,
}

// SAFETY: every update happens under the mutex.
unsafe impl SyncPolicy for ThreadSync {
    fn new(initial: Count) -> Self {
        Self {
            count: Mutex::new(initial),
        }
    }

    fn increment(&self) -> Count {
        // Nothing panics while the guard is held, so a poisoned count is still valid.
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        *count
    }

    fn decrement(&self) -> Option<Count> {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.checked_sub(1)?;
        Some(*count)
    }

    fn value(&self) -> Count {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ThreadSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadSync").field("count", &self.value()).finish()
    }
}
