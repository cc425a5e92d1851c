//! Reference counting for types that embed their own counter.
//!
//! An [`Intrusive`] handle stores nothing but the object pointer; the count
//! lives inside the pointee as a [`RefCount`] exposed through the
//! [`RefCounted`] trait. This costs one counter field per type in exchange
//! for pointer-sized handles and no separate bookkeeping allocation. There
//! are no weak handles here; that needs a second counter.
//!
//! # Example
//! ```
//! use retained::intrusive::{Intrusive, RefCount, RefCounted};
//!
//! struct Session {
//!     refs: RefCount,
//!     user: String,
//! }
//!
//! impl RefCounted for Session {
//!     fn ref_count(&self) -> &RefCount {
//!         &self.refs
//!     }
//! }
//!
//! let session = Intrusive::new(Session {
//!     refs: RefCount::new(),
//!     user: String::from("alice"),
//! });
//! let same = session.clone();
//! assert_eq!(Intrusive::use_count(&session), 2);
//! assert_eq!(same.user, "alice");
//!
//! drop(session);
//! assert_eq!(Intrusive::use_count(&same), 1);
//! ```

use std::{cell::Cell, ops::Deref, ptr::NonNull};

/// Reference counter to embed in a [`RefCounted`] type.
///
/// Starts at zero; handles drive it. A freshly constructed value that no
/// handle owns yet reads zero.
pub struct RefCount {
    count: Cell<usize>,
}

impl RefCount {
    /// Constructs a counter reading zero.
    #[inline]
    pub const fn new() -> RefCount {
        RefCount {
            count: Cell::new(0),
        }
    }

    /// Returns the number of handles currently owning the containing
    /// value.
    #[inline]
    pub fn get(&self) -> usize {
        self.count.get()
    }

    #[inline]
    pub(crate) fn increment(&self) {
        self.count.set(self.count.get() + 1);
    }

    /// Returns the count remaining after the decrement.
    #[inline]
    pub(crate) fn decrement(&self) -> usize {
        let count = self.count.get();
        debug_assert!(count > 0, "intrusive count underflow");
        let count = count - 1;
        self.count.set(count);
        count
    }
}

impl Default for RefCount {
    /// Constructs a counter reading zero.
    #[inline]
    fn default() -> Self {
        RefCount::new()
    }
}

impl std::fmt::Debug for RefCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RefCount").field(&self.count.get()).finish()
    }
}

/// Types that carry their own reference count.
pub trait RefCounted {
    /// Returns the embedded counter.
    fn ref_count(&self) -> &RefCount;

    /// Destroys an object whose count reached zero.
    ///
    /// The default reclaims the allocation as a [`Box`]; types allocated
    /// some other way override this.
    ///
    /// # Safety
    /// `object` must be a pointer previously handed to the handles managing
    /// it (for the default implementation, one produced by
    /// [`Box::into_raw`]), its count must have reached zero, and the object
    /// must not be accessed afterwards.
    unsafe fn destroy(object: *mut Self)
    where
        Self: Sized,
    {
        drop(Box::from_raw(object));
    }
}

/// Single-threaded reference-counted pointer to a [`RefCounted`] value,
/// with an empty state.
///
/// Handles share ownership by incrementing the pointee's embedded counter;
/// when the last handle goes away the object is destroyed through
/// [`RefCounted::destroy`]. Dereferencing an empty handle panics; use
/// [`Intrusive::get`] when a handle may be empty.
///
/// Associated functions take `this: &Intrusive<T>` so they never shadow
/// methods of `T` reachable through `Deref`.
pub struct Intrusive<T: RefCounted> {
    ptr: Option<NonNull<T>>,
}

impl<T: RefCounted> Intrusive<T> {
    /// Constructs a new `Intrusive<T>`, boxing the value.
    ///
    /// # Example
    /// ```
    /// use retained::intrusive::{Intrusive, RefCount, RefCounted};
    ///
    /// struct Counted(RefCount);
    /// impl RefCounted for Counted {
    ///     fn ref_count(&self) -> &RefCount {
    ///         &self.0
    ///     }
    /// }
    ///
    /// let counted = Intrusive::new(Counted(RefCount::new()));
    /// assert_eq!(Intrusive::use_count(&counted), 1);
    /// ```
    #[inline]
    pub fn new(value: T) -> Intrusive<T> {
        Intrusive::adopt(Box::new(value))
    }

    /// Takes ownership of an already boxed value, whose count must still
    /// read zero.
    pub fn adopt(object: Box<T>) -> Intrusive<T> {
        object.ref_count().increment();
        // SAFETY: Box::into_raw never returns null
        let ptr = unsafe { NonNull::new_unchecked(Box::into_raw(object)) };
        Intrusive { ptr: Some(ptr) }
    }

    /// Constructs an additional handle from a raw pointer to a live
    /// managed object, incrementing its count.
    ///
    /// # Safety
    /// `object` must point to a live value owned by `Intrusive` handles (or
    /// one being handed over to them), allocated the way the value's
    /// [`RefCounted::destroy`] expects.
    pub unsafe fn from_raw(object: *mut T) -> Intrusive<T> {
        let ptr = NonNull::new_unchecked(object);
        ptr.as_ref().ref_count().increment();
        Intrusive { ptr: Some(ptr) }
    }

    /// Constructs a handle that owns nothing.
    #[inline]
    pub const fn empty() -> Intrusive<T> {
        Intrusive { ptr: None }
    }

    /// Returns a reference to the value, or `None` when the handle is
    /// empty.
    #[inline]
    pub fn get(this: &Intrusive<T>) -> Option<&T> {
        // SAFETY: a non-empty handle keeps its object alive
        this.ptr.as_ref().map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Provides a raw pointer to the value, or a null pointer when the
    /// handle is empty.
    #[must_use]
    pub fn as_ptr(this: &Intrusive<T>) -> *const T {
        match this.ptr {
            Some(ptr) => ptr.as_ptr(),
            None => std::ptr::null(),
        }
    }

    /// Returns the number of handles owning this object, or 0 for an empty
    /// handle.
    #[inline]
    pub fn use_count(this: &Intrusive<T>) -> usize {
        match this.ptr {
            // SAFETY: a non-empty handle keeps its object alive
            Some(ptr) => unsafe { ptr.as_ref() }.ref_count().get(),
            None => 0,
        }
    }

    /// Returns `true` if this handle owns nothing.
    #[inline]
    pub fn is_empty(this: &Intrusive<T>) -> bool {
        this.ptr.is_none()
    }

    /// Returns `true` if the two handles point to the same object. Two
    /// empty handles compare equal.
    pub fn ptr_eq(this: &Intrusive<T>, other: &Intrusive<T>) -> bool {
        match (this.ptr, other.ptr) {
            (Some(a), Some(b)) => std::ptr::eq(a.as_ptr(), b.as_ptr()),
            (None, None) => true,
            _ => false,
        }
    }

    /// Releases this handle's ownership and leaves it empty.
    #[inline]
    pub fn reset(this: &mut Intrusive<T>) {
        *this = Intrusive::empty();
    }

    /// Moves this handle's ownership into the returned handle, leaving
    /// this one empty.
    #[inline]
    #[must_use]
    pub fn take(this: &mut Intrusive<T>) -> Intrusive<T> {
        std::mem::take(this)
    }
}

impl<T: RefCounted> Clone for Intrusive<T> {
    #[inline]
    fn clone(&self) -> Self {
        if let Some(ptr) = self.ptr {
            // SAFETY: a non-empty handle keeps its object alive
            unsafe { ptr.as_ref() }.ref_count().increment();
        }
        Self { ptr: self.ptr }
    }
}

impl<T: RefCounted> Drop for Intrusive<T> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr {
            // SAFETY: a non-empty handle keeps its object alive; destroy
            // runs only for the last handle
            unsafe {
                if ptr.as_ref().ref_count().decrement() == 0 {
                    T::destroy(ptr.as_ptr());
                }
            }
        }
    }
}

impl<T: RefCounted> Default for Intrusive<T> {
    /// Constructs an empty handle.
    #[inline]
    fn default() -> Self {
        Intrusive::empty()
    }
}

impl<T: RefCounted> Deref for Intrusive<T> {
    type Target = T;

    /// # Panics
    /// Panics if the handle is empty.
    #[inline]
    fn deref(&self) -> &Self::Target {
        match self.ptr {
            // SAFETY: a non-empty handle keeps its object alive
            Some(ptr) => unsafe { ptr.as_ref() },
            None => panic!("dereferenced an empty Intrusive"),
        }
    }
}

impl<T: RefCounted + std::fmt::Debug> std::fmt::Debug for Intrusive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Intrusive::get(self) {
            Some(value) => f.debug_struct("Intrusive").field("value", &value).finish(),
            None => f.write_str("Intrusive(empty)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counted {
        refs: RefCount,
    }

    impl RefCounted for Counted {
        fn ref_count(&self) -> &RefCount {
            &self.refs
        }
    }

    static_assertions::assert_not_impl_any!(Intrusive<Counted>: Send, Sync);
    static_assertions::assert_not_impl_any!(RefCount: Sync);

    #[test]
    fn empty_handle_owns_nothing() {
        let empty = Intrusive::<Counted>::empty();
        assert!(Intrusive::is_empty(&empty));
        assert_eq!(Intrusive::use_count(&empty), 0);
        assert!(Intrusive::get(&empty).is_none());
        assert!(Intrusive::as_ptr(&empty).is_null());
    }

    #[test]
    fn adopt_counts_the_first_handle() {
        let counted = Intrusive::adopt(Box::new(Counted {
            refs: RefCount::new(),
        }));
        assert_eq!(Intrusive::use_count(&counted), 1);
    }
}
