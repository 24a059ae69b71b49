//! # Reference Counting
//!
//! Intrusive reference counting: the count lives inside the object, and a
//! [`SmartPtr`] handle adds and removes references to it.
//!
//! In-process sharing inside the service core uses `Arc`. This module is the
//! explicit primitive for objects whose lifetime must be counted by hand,
//! for example objects whose ownership is handed across a foreign runtime
//! boundary as a raw pointer and adopted back later.
//!
//! ## Key Concepts
//! - The count starts at 1 for the first owner
//! - It grows only through `add_ref` and shrinks only through `remove_ref`
//! - The object is destroyed exactly once, by the owner that drops the count
//!   to zero
//! - The synchronization policy is chosen per type: [`NullSync`] for objects
//!   that never leave one thread, [`ThreadSync`] for shared ones
//!
//! ## Usage Example
//!
//! ```rust
//! use elements::impl_ref_counted;
//! use elements::refcount::{RefCount, SmartPtr, ThreadSync};
//!
//! struct Session {
//!     id: u32,
//!     refs: RefCount<ThreadSync>,
//! }
//!
//! impl_ref_counted!(Session, refs);
//!
//! let first = SmartPtr::new(Session { id: 7, refs: RefCount::new() });
//! let second = first.clone();
//! assert_eq!(second.refcount_value(), 2);
//! assert_eq!(second.id, 7);
//! ```

mod policy;
mod smart_ptr;

pub use policy::{Count, NullSync, SyncPolicy, ThreadSync};
pub use smart_ptr::SmartPtr;

use std::fmt;

/// Interface of a reference-countable object.
///
/// # Safety
/// [`SmartPtr`] frees the object when `remove_ref` returns `true`, so an
/// implementation must return `true` exactly once, on the 1 to 0 transition,
/// and never while another owner still holds a reference. Implement it with
/// [`impl_ref_counted!`](crate::impl_ref_counted) over a [`RefCount`] field;
/// implementing it by hand is unsafe.
///
/// ```compile_fail
/// use elements::refcount::{Count, RefCounted};
///
/// struct Liar;
///
/// impl RefCounted for Liar {
///     fn add_ref(&self) {}
///     fn remove_ref(&self) -> bool { true }
///     fn refcount_value(&self) -> Count { 1 }
/// }
/// ```
pub unsafe trait RefCounted {
    /// Registers one more owner.
    fn add_ref(&self);

    /// Releases one owner.
    ///
    /// Returns `true` exactly once, when the count drops from 1 to 0. The
    /// caller observing `true` is responsible for destroying the object.
    /// Never panics, since it runs on cleanup paths.
    fn remove_ref(&self) -> bool;

    /// Current count. Diagnostic only: stale as soon as it is returned.
    fn refcount_value(&self) -> Count;
}

/// Default reference counter with a parameterized synchronization policy.
pub struct RefCount<P: SyncPolicy = NullSync> {
    policy: P,
}

impl<P: SyncPolicy> RefCount<P> {
    pub fn new() -> Self {
        Self { policy: P::new(1) }
    }

    #[inline]
    pub fn add_ref(&self) {
        self.policy.increment();
    }

    #[inline]
    pub fn remove_ref(&self) -> bool {
        match self.policy.decrement() {
            Some(0) => true,
            Some(_) => false,
            None => {
                tracing::error!("RefCount::remove_ref: reference count is already zero");
                false
            }
        }
    }

    #[inline]
    pub fn value(&self) -> Count {
        self.policy.value()
    }
}

impl<P: SyncPolicy> Default for RefCount<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: SyncPolicy> fmt::Debug for RefCount<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCount").field("value", &self.value()).finish()
    }
}

/// Implements [`RefCounted`] for a type by delegating to one of its
/// [`RefCount`] fields.
#[macro_export]
macro_rules! impl_ref_counted {
    ($ty:ty, $field:ident) => {
        // SAFETY: RefCount::remove_ref reports true only on the 1 to 0
        // transition and refuses to go below zero.
        unsafe impl $crate::refcount::RefCounted for $ty {
            #[inline]
            fn add_ref(&self) {
                let counter: &$crate::refcount::RefCount<_> = &self.$field;
                counter.add_ref()
            }

            #[inline]
            fn remove_ref(&self) -> bool {
                self.$field.remove_ref()
            }

            #[inline]
            fn refcount_value(&self) -> $crate::refcount::Count {
                self.$field.value()
            }
        }
    };
}

/// Converts a `SmartPtr<Derived>` into a `SmartPtr<dyn Trait>` (or any other
/// unsized target the pointee coerces to) without touching the count.
///
/// ```rust
/// use elements::{impl_ref_counted, upcast};
/// use elements::refcount::{RefCount, RefCounted, SmartPtr, ThreadSync};
///
/// trait Shape: RefCounted {
///     fn area(&self) -> f64;
/// }
///
/// struct Square {
///     side: f64,
///     refs: RefCount<ThreadSync>,
/// }
///
/// impl_ref_counted!(Square, refs);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.side * self.side
///     }
/// }
///
/// let square = SmartPtr::new(Square { side: 2.0, refs: RefCount::new() });
/// let shape: SmartPtr<dyn Shape> = upcast!(square.clone() => dyn Shape);
/// assert_eq!(shape.area(), 4.0);
/// assert_eq!(square.refcount_value(), 2);
/// ```
#[macro_export]
macro_rules! upcast {
    ($ptr:expr => $target:ty) => {
        // SAFETY: the closure is restricted to an implicit coercion, which can
        // only unsize the pointer; address and allocation stay the same.
        unsafe {
            $crate::refcount::SmartPtr::map_ptr($ptr, |p| -> ::core::ptr::NonNull<$target> { p })
        }
    };
}
