//! Single-owner pointers with a customizable destroy action.
//!
//! [`Owned`] is to this crate what [`Box`] is to std, with two differences:
//! it can be empty, and disposing of the object goes through a [`Destroy`]
//! action chosen at construction. The default action, [`BoxDestroy`],
//! reclaims the allocation as a `Box`; closures work as actions too, for
//! objects that need bespoke cleanup. A zero-sized action adds nothing to
//! the handle's size.
//!
//! # Example
//! ```
//! use retained::owned::Owned;
//!
//! let mut report = Owned::new(String::from("draft"));
//! report.push_str(" v2");
//! assert_eq!(*report, "draft v2");
//! ```

use std::{
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

/// Disposal strategy for the object an [`Owned`] holds.
pub trait Destroy<T: ?Sized> {
    /// Disposes of `object`.
    ///
    /// # Safety
    /// `object` must have been produced the way this action expects (for
    /// [`BoxDestroy`], by [`Box::into_raw`]), the call must happen at most
    /// once per object, and the object must not be accessed afterwards.
    unsafe fn destroy(&mut self, object: *mut T);
}

/// Default destroy action: the object came from a [`Box`] and is dropped
/// as one.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoxDestroy;

impl<T: ?Sized> Destroy<T> for BoxDestroy {
    unsafe fn destroy(&mut self, object: *mut T) {
        drop(Box::from_raw(object));
    }
}

/// Any `FnMut(*mut T)` is a destroy action.
impl<T: ?Sized, F: FnMut(*mut T)> Destroy<T> for F {
    unsafe fn destroy(&mut self, object: *mut T) {
        self(object)
    }
}

/// Single-owner pointer with an empty state and a destroy action run at
/// most once.
///
/// `Owned` is not `Clone`; ownership moves. [`Owned::release`] hands the
/// object back as a raw pointer without running the action. Dereferencing
/// an empty handle panics; use [`Owned::get`] when a handle may be empty.
///
/// Associated functions take `this: &Owned<T, D>` so they never shadow
/// methods of `T` reachable through `Deref`.
pub struct Owned<T: ?Sized, D: Destroy<T> = BoxDestroy> {
    ptr: Option<NonNull<T>>,
    action: D,
}

// A zero-sized destroy action adds nothing next to the pointer.
static_assertions::assert_eq_size!(Owned<u8>, *mut u8);
static_assertions::assert_not_impl_any!(Owned<u8>: Send, Sync);

impl<T> Owned<T> {
    /// Constructs a new `Owned<T>`, boxing the value.
    ///
    /// # Example
    /// ```
    /// use retained::owned::Owned;
    /// let owned = Owned::new(5);
    /// assert_eq!(*owned, 5);
    /// ```
    #[inline]
    pub fn new(value: T) -> Owned<T> {
        Owned::from_box(Box::new(value))
    }
}

impl<T: ?Sized> Owned<T> {
    /// Takes ownership of an already boxed value, to be dropped as a
    /// [`Box`].
    ///
    /// # Example
    /// ```
    /// use retained::owned::Owned;
    ///
    /// let boxed: Box<[i32]> = Box::new([1, 2, 3]);
    /// let slice: Owned<[i32]> = Owned::from_box(boxed);
    /// assert_eq!(slice.len(), 3);
    /// ```
    pub fn from_box(object: Box<T>) -> Owned<T> {
        // SAFETY: Box::into_raw never returns null
        let ptr = unsafe { NonNull::new_unchecked(Box::into_raw(object)) };
        Owned {
            ptr: Some(ptr),
            action: BoxDestroy,
        }
    }

    /// Takes ownership of a raw pointer previously produced by
    /// [`Box::into_raw`]. A null pointer yields an empty handle.
    ///
    /// # Safety
    /// Unless null, `object` must come from [`Box::into_raw`], and
    /// ownership of the allocation transfers to the returned handle.
    pub unsafe fn from_raw(object: *mut T) -> Owned<T> {
        Owned {
            ptr: NonNull::new(object),
            action: BoxDestroy,
        }
    }
}

impl<T: ?Sized, D: Destroy<T>> Owned<T, D> {
    /// Takes ownership of a raw pointer, to be disposed of with `action`.
    /// A null pointer yields an empty handle that still carries the
    /// action.
    ///
    /// # Safety
    /// Unless null, `object` must have been produced the way `action`
    /// expects, and ownership transfers to the returned handle.
    ///
    /// # Example
    /// ```
    /// use retained::owned::Owned;
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let destroyed = Rc::new(Cell::new(false));
    /// let flag = destroyed.clone();
    /// let value = Box::into_raw(Box::new(5));
    /// // SAFETY: `value` came from Box::into_raw and the action reclaims it
    /// let owned = unsafe {
    ///     Owned::from_raw_with(value, move |object: *mut i32| {
    ///         flag.set(true);
    ///         unsafe { drop(Box::from_raw(object)) };
    ///     })
    /// };
    /// drop(owned);
    /// assert!(destroyed.get());
    /// ```
    pub unsafe fn from_raw_with(object: *mut T, action: D) -> Owned<T, D> {
        Owned {
            ptr: NonNull::new(object),
            action,
        }
    }

    /// Returns a reference to the object, or `None` when the handle is
    /// empty.
    #[inline]
    pub fn get(this: &Owned<T, D>) -> Option<&T> {
        // SAFETY: a non-empty handle owns its object
        this.ptr.as_ref().map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Returns a mutable reference to the object, or `None` when the
    /// handle is empty.
    #[inline]
    pub fn get_mut(this: &mut Owned<T, D>) -> Option<&mut T> {
        // SAFETY: a non-empty handle owns its object exclusively
        this.ptr.as_mut().map(|ptr| unsafe { ptr.as_mut() })
    }

    /// Returns `true` if this handle owns nothing.
    #[inline]
    pub fn is_empty(this: &Owned<T, D>) -> bool {
        this.ptr.is_none()
    }

    /// Returns a reference to the destroy action.
    #[inline]
    pub fn destroy_action(this: &Owned<T, D>) -> &D {
        &this.action
    }

    /// Returns a mutable reference to the destroy action.
    #[inline]
    pub fn destroy_action_mut(this: &mut Owned<T, D>) -> &mut D {
        &mut this.action
    }

    /// Disposes of the object through the destroy action and leaves the
    /// handle empty. The action stays in place for later re-use.
    pub fn reset(this: &mut Owned<T, D>) {
        if let Some(ptr) = this.ptr.take() {
            // SAFETY: the handle owned `ptr`; it is disposed of exactly once
            unsafe { this.action.destroy(ptr.as_ptr()) };
        }
    }

    /// Disposes of the current object, then takes ownership of `object`,
    /// keeping the destroy action. A null `object` leaves the handle
    /// empty.
    ///
    /// # Safety
    /// Unless null, `object` must have been produced the way the handle's
    /// action expects, and ownership transfers to the handle.
    pub unsafe fn reset_raw(this: &mut Owned<T, D>, object: *mut T) {
        let old = this.ptr.take();
        this.ptr = NonNull::new(object);
        if let Some(old) = old {
            this.action.destroy(old.as_ptr());
        }
    }
}

impl<T, D: Destroy<T>> Owned<T, D> {
    /// Forfeits ownership without running the destroy action and leaves
    /// the handle empty. Returns the raw object pointer, or null when the
    /// handle was already empty.
    ///
    /// # Example
    /// ```
    /// use retained::owned::Owned;
    ///
    /// let mut owned = Owned::new(String::from("kept"));
    /// let raw = Owned::release(&mut owned);
    /// assert!(Owned::is_empty(&owned));
    /// // SAFETY: `raw` came out of an Owned built over a Box
    /// let back = unsafe { Box::from_raw(raw) };
    /// assert_eq!(*back, "kept");
    /// ```
    #[must_use]
    pub fn release(this: &mut Owned<T, D>) -> *mut T {
        match this.ptr.take() {
            Some(ptr) => ptr.as_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    /// Provides a raw pointer to the object, or a null pointer when the
    /// handle is empty. The handle keeps ownership.
    #[must_use]
    pub fn as_ptr(this: &Owned<T, D>) -> *mut T {
        match this.ptr {
            Some(ptr) => ptr.as_ptr(),
            None => std::ptr::null_mut(),
        }
    }
}

impl<T: ?Sized, D: Destroy<T> + Default> Owned<T, D> {
    /// Constructs a handle that owns nothing, with a default destroy
    /// action.
    #[inline]
    pub fn empty() -> Owned<T, D> {
        Owned {
            ptr: None,
            action: D::default(),
        }
    }
}

impl<T: ?Sized, D: Destroy<T>> Drop for Owned<T, D> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: the handle owned `ptr`; it is disposed of exactly once
            unsafe { self.action.destroy(ptr.as_ptr()) };
        }
    }
}

impl<T: ?Sized, D: Destroy<T> + Default> Default for Owned<T, D> {
    /// Constructs an empty handle.
    #[inline]
    fn default() -> Self {
        Owned::empty()
    }
}

impl<T: ?Sized, D: Destroy<T>> Deref for Owned<T, D> {
    type Target = T;

    /// # Panics
    /// Panics if the handle is empty.
    #[inline]
    fn deref(&self) -> &Self::Target {
        match self.ptr {
            // SAFETY: a non-empty handle owns its object
            Some(ptr) => unsafe { ptr.as_ref() },
            None => panic!("dereferenced an empty Owned"),
        }
    }
}

impl<T: ?Sized, D: Destroy<T>> DerefMut for Owned<T, D> {
    /// # Panics
    /// Panics if the handle is empty.
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.ptr {
            // SAFETY: a non-empty handle owns its object exclusively
            Some(mut ptr) => unsafe { ptr.as_mut() },
            None => panic!("dereferenced an empty Owned"),
        }
    }
}

impl<T: ?Sized + std::fmt::Debug, D: Destroy<T>> std::fmt::Debug for Owned<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Owned::get(self) {
            Some(value) => f.debug_struct("Owned").field("value", &value).finish(),
            None => f.write_str("Owned(empty)"),
        }
    }
}

impl<T: ?Sized> From<Box<T>> for Owned<T> {
    #[inline]
    fn from(object: Box<T>) -> Self {
        Owned::from_box(object)
    }
}
