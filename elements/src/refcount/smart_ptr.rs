use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use super::{Count, RefCounted};
use crate::error::RefCountError;

/// Handle to a heap-allocated, intrusively reference-counted object.
///
/// - `Clone` adds a reference
/// - `Drop` removes one and destroys the object when it was the last
/// - [`into_raw`](Self::into_raw) hands the reference to the caller without
///   removing it, [`from_raw`](Self::from_raw) adopts such a reference back
///   without adding one
///
/// A `SmartPtr` may be null (see [`SmartPtr::null`]); dereferencing a null
/// pointer through `Deref` panics, [`try_deref`](Self::try_deref) reports it.
pub struct SmartPtr<T: ?Sized + RefCounted> {
    ptr: Option<NonNull<T>>,
    _owned: PhantomData<T>,
}

// Same rules as Arc: the pointee is shared between every handle.
unsafe impl<T: ?Sized + RefCounted + Send + Sync> Send for SmartPtr<T> {}
unsafe impl<T: ?Sized + RefCounted + Send + Sync> Sync for SmartPtr<T> {}

impl<T: RefCounted> SmartPtr<T> {
    /// Moves `value` to the heap and adopts its initial reference.
    ///
    /// `value` must be freshly constructed, holding exactly the one reference
    /// of its first owner.
    pub fn new(value: T) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        Self {
            ptr: Some(ptr),
            _owned: PhantomData,
        }
    }
}

impl<T: ?Sized + RefCounted> SmartPtr<T> {
    /// A pointer that owns nothing.
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _owned: PhantomData,
        }
    }

    /// Adopts a reference without adding one.
    ///
    /// # Safety
    /// `ptr` must come from [`SmartPtr::into_raw`] (or point to an object
    /// allocated by [`SmartPtr::new`]) and the caller must own the reference
    /// being adopted.
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Self {
            ptr: Some(ptr),
            _owned: PhantomData,
        }
    }

    /// Adds a reference to an object that is already owned elsewhere and
    /// wraps it.
    ///
    /// # Safety
    /// `obj` must live in an allocation made by [`SmartPtr::new`].
    pub unsafe fn acquire(obj: &T) -> Self {
        obj.add_ref();
        // SAFETY: the reference just added is the one adopted.
        unsafe { Self::from_raw(NonNull::from(obj)) }
    }

    /// Releases ownership to the caller without removing the reference.
    pub fn into_raw(self) -> Option<NonNull<T>> {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        // SAFETY: while this handle exists its reference keeps the object alive.
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    pub fn try_deref(&self) -> Result<&T, RefCountError> {
        self.get().ok_or(RefCountError::NotInitialized)
    }

    /// Current count of the pointee, 0 for a null pointer.
    pub fn refcount_value(&self) -> Count {
        self.get().map_or(0, RefCounted::refcount_value)
    }

    /// Whether both handles point to the same object (two nulls are equal).
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self.ptr, other.ptr) {
            (Some(a), Some(b)) => std::ptr::addr_eq(a.as_ptr(), b.as_ptr()),
            (None, None) => true,
            _ => false,
        }
    }

    /// Releases the held reference, leaving the pointer null.
    pub fn reset(&mut self) {
        *self = Self::null();
    }

    /// Re-types the pointer without touching the count. Use [`upcast!`]
    /// instead of calling this directly.
    ///
    /// # Safety
    /// `f` must return a pointer to the same object, e.g. the result of an
    /// unsizing coercion.
    ///
    /// [`upcast!`]: crate::upcast
    #[doc(hidden)]
    pub unsafe fn map_ptr<U, F>(self, f: F) -> SmartPtr<U>
    where
        U: ?Sized + RefCounted,
        F: FnOnce(NonNull<T>) -> NonNull<U>,
    {
        match self.into_raw() {
            // SAFETY: `f` keeps the address, the reference moves over.
            Some(ptr) => unsafe { SmartPtr::from_raw(f(ptr)) },
            None => SmartPtr::null(),
        }
    }
}

impl<T: ?Sized + RefCounted> Clone for SmartPtr<T> {
    fn clone(&self) -> Self {
        if let Some(obj) = self.get() {
            obj.add_ref();
        }

        Self {
            ptr: self.ptr,
            _owned: PhantomData,
        }
    }
}

impl<T: ?Sized + RefCounted> Drop for SmartPtr<T> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: this handle owns one reference, so the object is alive
            // until remove_ref reports the last one gone; only then is the
            // allocation made by `new` reclaimed, exactly once.
            unsafe {
                if ptr.as_ref().remove_ref() {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
        }
    }
}

impl<T: ?Sized + RefCounted> Deref for SmartPtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(obj) => obj,
            None => panic!("SmartPtr: dereferencing a null pointer"),
        }
    }
}

impl<T: ?Sized + RefCounted> Default for SmartPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + RefCounted> fmt::Debug for SmartPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartPtr")
            .field("ptr", &self.ptr.map(|p| p.as_ptr() as *const ()))
            .field("refcount", &self.refcount_value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::refcount::{NullSync, RefCount};

    struct Tracked {
        drops: Rc<Cell<usize>>,
        refs: RefCount<NullSync>,
    }

    crate::impl_ref_counted!(Tracked, refs);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    fn tracked(drops: &Rc<Cell<usize>>) -> SmartPtr<Tracked> {
        SmartPtr::new(Tracked {
            drops: Rc::clone(drops),
            refs: RefCount::new(),
        })
    }

    #[test]
    fn test_last_release_destroys_once() {
        let drops = Rc::new(Cell::new(0));
        let first = tracked(&drops);
        let second = first.clone();
        assert_eq!(first.refcount_value(), 2);

        drop(first);
        assert_eq!(drops.get(), 0);
        assert_eq!(second.refcount_value(), 1);

        drop(second);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_into_raw_and_from_raw_keep_the_count() {
        let drops = Rc::new(Cell::new(0));
        let ptr = tracked(&drops);

        let raw = ptr.into_raw().unwrap();
        assert_eq!(drops.get(), 0);

        let adopted = unsafe { SmartPtr::from_raw(raw) };
        assert_eq!(adopted.refcount_value(), 1);

        drop(adopted);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_acquire_adds_a_reference() {
        let drops = Rc::new(Cell::new(0));
        let owner = tracked(&drops);

        let acquired = unsafe { SmartPtr::acquire(&*owner) };
        assert_eq!(owner.refcount_value(), 2);
        assert!(acquired.ptr_eq(&owner));

        drop(owner);
        drop(acquired);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_null_pointer() {
        let mut ptr: SmartPtr<Tracked> = SmartPtr::null();
        assert!(ptr.is_null());
        assert_eq!(ptr.refcount_value(), 0);
        assert_eq!(ptr.try_deref().err(), Some(RefCountError::NotInitialized));

        let drops = Rc::new(Cell::new(0));
        ptr = tracked(&drops);
        assert!(!ptr.is_null());

        ptr.reset();
        assert!(ptr.is_null());
        assert_eq!(drops.get(), 1);
    }
}
