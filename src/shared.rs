//! Reference-counted pointers with shared ownership, weak handles, and
//! self-observation.
//!
//! Available pointer types:
//! - [`Shared`]
//! - [`Weak`]
//!
//! plus the self-observation pieces [`SelfObserving`] and [`SelfRef`], and
//! the promotion error [`Expired`].
//!
//! # Example
//! ```
//! use retained::shared::{Shared, Weak};
//!
//! let config = Shared::new((String::from("listen"), 8080u16));
//! let port: Shared<u16> = config.project(|pair| &pair.1);
//!
//! let observer: Weak<(String, u16)> = Shared::downgrade(&config);
//! drop(config);
//!
//! // The projection keeps the allocation alive.
//! assert_eq!(*port, 8080);
//! assert_eq!(observer.upgrade().map(|cfg| cfg.1), Some(8080));
//!
//! drop(port);
//! assert!(observer.expired());
//! ```
//!
//! Counting uses plain cells, so none of these types can leave the thread
//! they were created on:
//!
//! ```compile_fail,E0277
//! use retained::shared::Shared;
//!
//! let counted = Shared::new(5);
//! // Error: Shared<i32> cannot be sent between threads safely
//! std::thread::spawn(move || drop(counted));
//! ```
//!
//! # Soundness
//! Projections take plain `fn` pointers, so they cannot smuggle references
//! to locals into a handle. None of the following should compile:
//!
//! ```compile_fail,E0308
//! use retained::shared::Shared;
//!
//! let shared: Shared<()> = Shared::new(());
//! let escaped: Shared<str>;
//! {
//!     let local = String::from("escapes?");
//!     // Error: the closure captures `local` and cannot become a fn pointer
//!     escaped = shared.project(|_| local.as_str());
//! }
//! println!("{}", &*escaped);
//! ```
//!
//! ```compile_fail,E0308
//! use retained::shared::Shared;
//!
//! let shared: Shared<u8> = Shared::new(1);
//! let local = 5u32;
//! // Error: the closure captures `local` and cannot become a fn pointer
//! let escaped: Shared<u32> = shared.project(|_| &local);
//! ```

mod block;

use std::{cell::Cell, hash::Hash, ops::Deref, ptr::NonNull};

use block::{AdoptingBlock, ControlBlock, InlineBlock};

/// Error returned when promoting a [`Weak`] whose value no longer exists.
///
/// Empty weak handles promote to this error as well; there is no value for
/// them to observe either.
///
/// # Example
/// ```
/// use retained::shared::{Expired, Shared};
///
/// let counted = Shared::new(5);
/// let weak = Shared::downgrade(&counted);
/// drop(counted);
/// assert_eq!(Shared::try_from_weak(&weak), Err(Expired));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("the observed value no longer exists")]
pub struct Expired;

/// Single-threaded reference-counted pointer with an empty state.
///
/// Cloning a `Shared` shares ownership of the same value; the value is
/// destroyed when the last owning handle goes away, and the bookkeeping
/// allocation lives on until outstanding [`Weak`] handles are gone too.
/// [`project`](Shared::project) produces handles that borrow from the same
/// allocation but point at a part of the value.
///
/// Unlike [`std::rc::Rc`], a `Shared` can be empty: [`Shared::empty`] and
/// [`Default`] produce a handle that owns nothing, and
/// [`Shared::reset`]/[`Shared::take`] return a handle to that state.
/// Dereferencing an empty handle panics; use [`Shared::get`] when a handle
/// may be empty.
///
/// Most associated functions take `this: &Shared<T>` instead of `&self` so
/// they never shadow methods of `T` reachable through `Deref`.
///
/// # Example
/// ```
/// use retained::shared::Shared;
///
/// let first = Shared::new(vec![1, 2, 3]);
/// let second = first.clone();
/// assert_eq!(Shared::strong_count(&first), 2);
/// assert!(Shared::ptr_eq(&first, &second));
/// assert_eq!(*second, [1, 2, 3]);
/// ```
pub struct Shared<T: ?Sized> {
    block: Option<NonNull<dyn ControlBlock>>,
    ptr: Option<NonNull<T>>,
}

static_assertions::assert_not_impl_any!(Shared<u8>: Send, Sync);

impl<T: 'static> Shared<T> {
    /// Constructs a new `Shared<T>`, storing the value and the reference
    /// counts in a single allocation.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    /// let counted = Shared::new(6);
    /// assert_eq!(*counted, 6);
    /// ```
    #[inline]
    pub fn new(value: T) -> Shared<T> {
        Shared::new_inline(value, None)
    }

    fn new_inline(value: T, detach: Option<unsafe fn(*const T)>) -> Shared<T> {
        let block = Box::into_raw(Box::new(InlineBlock::new(value, detach)));
        // SAFETY: Box::into_raw never returns null, and value_ptr points
        // into the block's own allocation
        unsafe {
            Shared {
                ptr: Some(NonNull::new_unchecked((*block).value_ptr())),
                block: Some(NonNull::new_unchecked(block as *mut dyn ControlBlock)),
            }
        }
    }
}

impl<T: SelfObserving + 'static> Shared<T> {
    /// Constructs a new `Shared<T>` like [`Shared::new`] and seeds the
    /// value's [`SelfRef`] slot, so the value can mint handles to itself
    /// with [`SelfObserving::shared_from_self`].
    ///
    /// The plain constructors leave the slot empty; self-observation only
    /// works for values created through `new_observing` or
    /// [`Shared::adopt_observing`].
    ///
    /// # Example
    /// ```
    /// use retained::shared::{SelfObserving, SelfRef, Shared};
    ///
    /// struct Task {
    ///     this: SelfRef<Task>,
    /// }
    /// impl SelfObserving for Task {
    ///     fn self_ref(&self) -> &SelfRef<Task> {
    ///         &self.this
    ///     }
    /// }
    ///
    /// let task = Shared::new_observing(Task { this: SelfRef::new() });
    /// let again = task.shared_from_self();
    /// assert!(Shared::ptr_eq(&task, &again));
    /// assert_eq!(Shared::strong_count(&task), 2);
    /// ```
    pub fn new_observing(value: T) -> Shared<T> {
        let this = Shared::new_inline(value, Some(detach_self_ref::<T>));
        this.self_ref().set(Shared::downgrade(&this));
        this
    }
}

impl<T: ?Sized + 'static> Shared<T> {
    /// Takes ownership of an already boxed value. The counts live in a
    /// second allocation, but the value can be unsized.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let boxed: Box<[u8]> = Box::new([1, 2, 3]);
    /// let slice: Shared<[u8]> = Shared::adopt(boxed);
    /// assert_eq!(slice.len(), 3);
    /// ```
    #[inline]
    pub fn adopt(object: Box<T>) -> Shared<T> {
        Shared::new_adopting(Box::into_raw(object), None)
    }

    /// Takes ownership of a raw pointer previously produced by
    /// [`Box::into_raw`].
    ///
    /// # Safety
    /// `object` must come from [`Box::into_raw`], and ownership of the
    /// allocation transfers to the returned handle; it must not be used or
    /// freed through any other path afterwards.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let raw = Box::into_raw(Box::new(String::from("owned")));
    /// // SAFETY: `raw` came from Box::into_raw and is not reused
    /// let counted = unsafe { Shared::from_raw(raw) };
    /// assert_eq!(*counted, "owned");
    /// ```
    pub unsafe fn from_raw(object: *mut T) -> Shared<T> {
        Shared::adopt(Box::from_raw(object))
    }

    fn new_adopting(object: *mut T, detach: Option<unsafe fn(*const T)>) -> Shared<T> {
        let block: Box<dyn ControlBlock> = Box::new(AdoptingBlock::new(object, detach));
        // SAFETY: `object` came from Box::into_raw in the callers, and
        // Box::into_raw never returns null
        unsafe {
            Shared {
                ptr: Some(NonNull::new_unchecked(object)),
                block: Some(NonNull::new_unchecked(Box::into_raw(block))),
            }
        }
    }
}

impl<T: SelfObserving + ?Sized + 'static> Shared<T> {
    /// [`Shared::adopt`] with the value's [`SelfRef`] slot seeded, like
    /// [`Shared::new_observing`].
    pub fn adopt_observing(object: Box<T>) -> Shared<T> {
        let this = Shared::new_adopting(Box::into_raw(object), Some(detach_self_ref::<T>));
        this.self_ref().set(Shared::downgrade(&this));
        this
    }
}

impl<T: ?Sized> Shared<T> {
    /// Constructs a handle that owns nothing.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let empty = Shared::<u8>::empty();
    /// assert!(Shared::is_empty(&empty));
    /// assert_eq!(Shared::strong_count(&empty), 0);
    /// ```
    #[inline]
    pub const fn empty() -> Shared<T> {
        Shared {
            block: None,
            ptr: None,
        }
    }

    /// Constructs a new `Shared<U>` pointing at a part of this handle's
    /// value, sharing ownership of the whole allocation.
    ///
    /// Projecting an empty handle yields an empty handle.
    ///
    /// # Panics
    /// If `f` panics, the panic is propagated to the caller and the counts
    /// are left untouched.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let pair = Shared::new((5u64, String::from("five")));
    /// let name = pair.project(|pair| &pair.1);
    /// assert_eq!(*name, "five");
    /// ```
    ///
    /// Note that references to local variables cannot be returned from the
    /// `f` function:
    /// ```compile_fail,E0308
    /// use retained::shared::Shared;
    /// let pair = Shared::new((5u64,));
    /// let local = 5;
    /// let projected = pair.project(|_| &local);
    /// ```
    pub fn project<'a, U: ?Sized>(&'a self, f: fn(&'a T) -> &'a U) -> Shared<U> {
        match (self.block, self.ptr) {
            (Some(block), Some(ptr)) => {
                // SAFETY: a non-empty handle keeps its pointee alive
                let projected = f(unsafe { ptr.as_ref() });
                // SAFETY: references always convert to non-null pointers
                let projected = unsafe { NonNull::new_unchecked(projected as *const U as *mut U) };
                // SAFETY: a non-empty handle keeps its block allocated
                unsafe { block.as_ref() }.counters().acquire_strong();
                Shared {
                    block: Some(block),
                    ptr: Some(projected),
                }
            }
            _ => Shared::empty(),
        }
    }

    /// Constructs a new `Shared<U>` from this handle by trying to project
    /// a part of its value.
    ///
    /// Returns `None` if `f` returns `None` or if this handle is empty.
    ///
    /// # Panics
    /// If `f` panics, the panic is propagated to the caller and the counts
    /// are left untouched.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// enum Setting {
    ///     Text(String),
    ///     Number(isize),
    /// }
    ///
    /// let setting = Shared::new(Setting::Number(5));
    /// let number = setting.try_project(|s| match s {
    ///     Setting::Text(_) => None,
    ///     Setting::Number(n) => Some(n),
    /// });
    ///
    /// assert!(matches!(number, Some(n) if *n == 5));
    /// ```
    pub fn try_project<'a, U: ?Sized>(
        &'a self,
        f: fn(&'a T) -> Option<&'a U>,
    ) -> Option<Shared<U>> {
        let block = self.block?;
        let ptr = self.ptr?;
        // SAFETY: a non-empty handle keeps its pointee alive
        let projected = f(unsafe { ptr.as_ref() })?;
        // SAFETY: references always convert to non-null pointers
        let projected = unsafe { NonNull::new_unchecked(projected as *const U as *mut U) };
        // SAFETY: a non-empty handle keeps its block allocated
        unsafe { block.as_ref() }.counters().acquire_strong();
        Some(Shared {
            block: Some(block),
            ptr: Some(projected),
        })
    }

    /// Returns a reference to the value, or `None` when the handle is
    /// empty.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let counted = Shared::new(7);
    /// assert_eq!(Shared::get(&counted), Some(&7));
    /// assert_eq!(Shared::get(&Shared::<i32>::empty()), None);
    /// ```
    #[inline]
    pub fn get(this: &Shared<T>) -> Option<&T> {
        // SAFETY: a non-empty handle keeps its pointee alive for as long as
        // it holds a strong unit
        this.ptr.as_ref().map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Creates a new [`Weak`] handle to this allocation.
    ///
    /// Downgrading an empty handle yields an empty `Weak`.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let counted = Shared::new(42);
    /// let weak = Shared::downgrade(&counted);
    /// drop(counted);
    /// assert!(weak.upgrade().is_none());
    /// ```
    pub fn downgrade(this: &Shared<T>) -> Weak<T> {
        if let Some(block) = this.block {
            // SAFETY: a non-empty handle keeps its block allocated
            unsafe { block.as_ref() }.counters().acquire_weak();
        }
        Weak {
            block: this.block,
            ptr: this.ptr,
        }
    }

    /// Promotes a weak handle into an owning one, or fails with [`Expired`]
    /// when the value is already gone.
    ///
    /// This is the fallible counterpart of [`Weak::upgrade`]; empty weak
    /// handles fail the same way. The [`TryFrom`] impl performs the same
    /// conversion, but at most call sites its result type needs an
    /// annotation before type inference accepts it.
    ///
    /// # Example
    /// ```
    /// use retained::shared::{Expired, Shared};
    ///
    /// let counted = Shared::new(3);
    /// let weak = Shared::downgrade(&counted);
    /// assert!(Shared::try_from_weak(&weak).is_ok());
    ///
    /// drop(counted);
    /// assert_eq!(Shared::try_from_weak(&weak), Err(Expired));
    /// ```
    #[inline]
    pub fn try_from_weak(weak: &Weak<T>) -> Result<Shared<T>, Expired> {
        weak.upgrade().ok_or(Expired)
    }

    /// Returns the number of owning handles sharing this allocation, or 0
    /// for an empty handle.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let six = Shared::new(6);
    /// let _also_six = six.clone();
    /// assert_eq!(Shared::strong_count(&six), 2);
    /// ```
    #[inline]
    pub fn strong_count(this: &Shared<T>) -> usize {
        match this.block {
            // SAFETY: a non-empty handle keeps its block allocated
            Some(block) => unsafe { block.as_ref() }.counters().strong(),
            None => 0,
        }
    }

    /// Returns the number of [`Weak`] handles to this allocation, or 0 for
    /// an empty handle.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let six = Shared::new(6);
    /// let _weak_six = Shared::downgrade(&six);
    /// assert_eq!(Shared::weak_count(&six), 1);
    /// ```
    #[inline]
    pub fn weak_count(this: &Shared<T>) -> usize {
        match this.block {
            // SAFETY: a non-empty handle keeps its block allocated
            Some(block) => unsafe { block.as_ref() }.counters().weak() - 1,
            None => 0,
        }
    }

    /// Returns `true` if this handle owns nothing.
    #[inline]
    pub fn is_empty(this: &Shared<T>) -> bool {
        this.block.is_none()
    }

    /// Returns `true` if the two handles point to the same value, using
    /// [`std::ptr::eq`]. See that function for caveats when comparing
    /// `dyn Trait` pointers.
    ///
    /// Two empty handles compare equal.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let five = Shared::new(5);
    /// let same_five = five.clone();
    /// let other_five = Shared::new(5);
    ///
    /// assert!(Shared::ptr_eq(&five, &same_five));
    /// assert!(!Shared::ptr_eq(&five, &other_five));
    /// ```
    pub fn ptr_eq(this: &Shared<T>, other: &Shared<T>) -> bool {
        match (this.ptr, other.ptr) {
            (Some(a), Some(b)) => std::ptr::eq(a.as_ptr(), b.as_ptr()),
            (None, None) => true,
            _ => false,
        }
    }

    /// Releases this handle's ownership and leaves it empty.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let mut counted = Shared::new(5);
    /// let other = counted.clone();
    /// Shared::reset(&mut counted);
    /// assert!(Shared::is_empty(&counted));
    /// assert_eq!(Shared::strong_count(&other), 1);
    /// ```
    #[inline]
    pub fn reset(this: &mut Shared<T>) {
        *this = Shared::empty();
    }

    /// Moves this handle's ownership into the returned handle, leaving this
    /// one empty.
    #[inline]
    #[must_use]
    pub fn take(this: &mut Shared<T>) -> Shared<T> {
        std::mem::take(this)
    }
}

impl<T> Shared<T> {
    /// Provides a raw pointer to the value, or a null pointer when the
    /// handle is empty.
    ///
    /// The counts are not affected in any way and the `Shared` is not
    /// consumed. The pointer is valid for as long as the allocation has
    /// strong counts.
    #[must_use]
    pub fn as_ptr(this: &Shared<T>) -> *const T {
        match this.ptr {
            Some(ptr) => ptr.as_ptr(),
            None => std::ptr::null(),
        }
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    #[inline]
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            // SAFETY: a non-empty handle keeps its block allocated
            unsafe { block.as_ref() }.counters().acquire_strong();
        }
        Self {
            block: self.block,
            ptr: self.ptr,
        }
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block {
            // SAFETY: a non-empty handle keeps its block allocated
            let free_block = unsafe {
                let block = block.as_ref();
                if !block.counters().release_strong() {
                    return;
                }
                // Last owner: destroy the object first, then give up the
                // weak unit held collectively by the strong handles. Weak
                // handles stored inside the object die while release_object
                // runs, so the block must outlive it.
                block.release_object();
                block.counters().release_weak()
            };
            if free_block {
                // SAFETY: both counts are zero, nothing can reach the block
                unsafe { drop(Box::from_raw(block.as_ptr())) };
            }
        }
    }
}

impl<T: ?Sized> Default for Shared<T> {
    /// Constructs an empty handle.
    #[inline]
    fn default() -> Self {
        Shared::empty()
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    /// Panics if the handle is empty.
    #[inline]
    fn deref(&self) -> &Self::Target {
        match self.ptr {
            // SAFETY: a non-empty handle keeps its pointee alive
            Some(ptr) => unsafe { ptr.as_ref() },
            None => panic!("dereferenced an empty Shared"),
        }
    }
}

impl<T: ?Sized + std::fmt::Debug> std::fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Shared::get(self) {
            Some(value) => f.debug_struct("Shared").field("value", &value).finish(),
            None => f.write_str("Shared(empty)"),
        }
    }
}

impl<T: ?Sized> std::fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ptr {
            Some(ptr) => std::fmt::Pointer::fmt(&ptr, f),
            None => std::fmt::Pointer::fmt(&std::ptr::null::<()>(), f),
        }
    }
}

impl<T: 'static> From<T> for Shared<T> {
    #[inline]
    fn from(value: T) -> Self {
        Shared::new(value)
    }
}

impl<T: ?Sized + 'static> From<Box<T>> for Shared<T> {
    #[inline]
    fn from(object: Box<T>) -> Self {
        Shared::adopt(object)
    }
}

impl<T: ?Sized> TryFrom<&Weak<T>> for Shared<T> {
    type Error = Expired;

    /// Promotes a weak handle, or fails with [`Expired`] when the value is
    /// already gone. See [`Shared::try_from_weak`].
    fn try_from(weak: &Weak<T>) -> Result<Self, Self::Error> {
        Shared::try_from_weak(weak)
    }
}

impl<T> Hash for Shared<T>
where
    T: Hash + ?Sized,
{
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Shared::get(self).hash(state)
    }
}

impl<T> PartialEq<Shared<T>> for Shared<T>
where
    T: PartialEq<T> + ?Sized,
{
    /// Empty handles are equal to each other and unequal to any non-empty
    /// handle; non-empty handles compare their values.
    #[inline]
    fn eq(&self, other: &Shared<T>) -> bool {
        Shared::get(self).eq(&Shared::get(other))
    }
}

impl<T> Eq for Shared<T> where T: Eq + ?Sized {}

impl<T> Ord for Shared<T>
where
    T: Ord + ?Sized,
{
    /// Empty handles order before non-empty ones.
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        Shared::get(self).cmp(&Shared::get(other))
    }
}

impl<T> PartialOrd<Shared<T>> for Shared<T>
where
    T: PartialOrd<T> + ?Sized,
{
    #[inline]
    fn partial_cmp(&self, other: &Shared<T>) -> Option<std::cmp::Ordering> {
        Shared::get(self).partial_cmp(&Shared::get(other))
    }
}

impl<T> Unpin for Shared<T> where T: ?Sized {}
impl<T> std::panic::UnwindSafe for Shared<T> where T: std::panic::RefUnwindSafe + ?Sized {}

/// Weak is a non-owning handle to an allocation managed by [`Shared`]. It
/// never keeps the value alive; the value is accessed by calling
/// [`upgrade`], which returns `Option<Shared<T>>`.
///
/// A `Weak` can also be empty ([`Weak::new`]), in which case there is no
/// allocation behind it at all.
///
/// # Example
/// ```
/// use retained::shared::{Shared, Weak};
///
/// let tuple = Shared::new((7, 8));
/// let weak: Weak<(i32, i32)> = Shared::downgrade(&tuple);
///
/// // Whether the value is alive is observable without owning it.
/// assert!(!weak.expired());
/// assert_eq!(weak.upgrade().map(|t| t.1), Some(8));
///
/// drop(tuple);
/// assert!(weak.expired());
/// assert!(weak.upgrade().is_none());
/// ```
///
/// [`upgrade`]: Weak::upgrade
pub struct Weak<T: ?Sized> {
    block: Option<NonNull<dyn ControlBlock>>,
    ptr: Option<NonNull<T>>,
}

static_assertions::assert_not_impl_any!(Weak<u8>: Send, Sync);

impl<T: ?Sized> Weak<T> {
    /// Constructs an empty `Weak`, observing nothing. Calling
    /// [`upgrade`](Weak::upgrade) on it returns `None`.
    #[inline]
    pub const fn new() -> Weak<T> {
        Weak {
            block: None,
            ptr: None,
        }
    }

    /// Attempts to promote this handle to a [`Shared`], delaying the drop
    /// of the value for the lifetime of the result if successful.
    ///
    /// Returns `None` if the value has since been dropped, or if this
    /// handle is empty.
    ///
    /// # Example
    /// ```
    /// use retained::shared::Shared;
    ///
    /// let five = Shared::new(5);
    /// let weak_five = Shared::downgrade(&five);
    ///
    /// let strong_five = weak_five.upgrade();
    /// assert!(strong_five.is_some());
    ///
    /// drop(strong_five);
    /// drop(five);
    /// assert!(weak_five.upgrade().is_none());
    /// ```
    pub fn upgrade(&self) -> Option<Shared<T>> {
        let block = self.block?;
        // SAFETY: a non-empty handle keeps its block allocated
        if unsafe { block.as_ref() }.counters().try_acquire_strong() {
            Some(Shared {
                block: self.block,
                ptr: self.ptr,
            })
        } else {
            None
        }
    }

    /// Returns `true` if the observed value has been dropped, or if this
    /// handle is empty.
    #[inline]
    pub fn expired(&self) -> bool {
        self.strong_count() == 0
    }

    /// Returns the number of owning handles to this allocation, or 0 when
    /// the value is gone or this handle is empty.
    #[inline]
    pub fn strong_count(&self) -> usize {
        match self.block {
            // SAFETY: a non-empty handle keeps its block allocated
            Some(block) => unsafe { block.as_ref() }.counters().strong(),
            None => 0,
        }
    }

    /// Returns the number of `Weak` handles to this allocation, or 0 if
    /// there are no owning handles left.
    #[inline]
    pub fn weak_count(&self) -> usize {
        match self.block {
            Some(block) => {
                // SAFETY: a non-empty handle keeps its block allocated
                let counters = unsafe { block.as_ref() }.counters();
                if counters.strong() == 0 {
                    0
                } else {
                    counters.weak() - 1
                }
            }
            None => 0,
        }
    }

    /// Returns `true` if the two handles observe the same value, using
    /// [`std::ptr::eq`]. Works even when either handle can no longer
    /// [`upgrade`](Weak::upgrade); two empty handles compare equal.
    pub fn ptr_eq(&self, other: &Weak<T>) -> bool {
        match (self.ptr, other.ptr) {
            (Some(a), Some(b)) => std::ptr::eq(a.as_ptr(), b.as_ptr()),
            (None, None) => true,
            _ => false,
        }
    }

    /// Stops observing and leaves this handle empty.
    #[inline]
    pub fn reset(&mut self) {
        *self = Weak::new();
    }
}

impl<T> Weak<T> {
    /// Returns a raw pointer to the observed value, or a null pointer when
    /// this handle is empty.
    ///
    /// The pointer is only valid for as long as the allocation has strong
    /// counts.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        match self.ptr {
            Some(ptr) => ptr.as_ptr(),
            None => std::ptr::null(),
        }
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    #[inline]
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            // SAFETY: a non-empty handle keeps its block allocated
            unsafe { block.as_ref() }.counters().acquire_weak();
        }
        Self {
            block: self.block,
            ptr: self.ptr,
        }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block {
            // SAFETY: a non-empty handle keeps its block allocated
            let free_block = unsafe { block.as_ref().counters().release_weak() };
            if free_block {
                // SAFETY: the weak count only reaches zero after the strong
                // count does, so nothing can reach the block anymore
                unsafe { drop(Box::from_raw(block.as_ptr())) };
            }
        }
    }
}

impl<T: ?Sized> Default for Weak<T> {
    /// Constructs an empty handle.
    #[inline]
    fn default() -> Self {
        Weak::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(Weak)")
    }
}

/// Slot through which a value mints handles to itself.
///
/// Embed one in a type and point [`SelfObserving::self_ref`] at it. The
/// observing constructors ([`Shared::new_observing`],
/// [`Shared::adopt_observing`]) seed the slot with a weak handle to the new
/// allocation, and the teardown of the last owning handle clears it again
/// before the value's destructor runs.
///
/// Cloning a `SelfRef` yields an empty slot: a copy of the value is not
/// owned by the original's handles.
pub struct SelfRef<T: ?Sized> {
    slot: Cell<Option<Weak<T>>>,
}

static_assertions::assert_not_impl_any!(SelfRef<u8>: Send, Sync);

impl<T: ?Sized> SelfRef<T> {
    /// Constructs an empty slot.
    #[inline]
    pub const fn new() -> SelfRef<T> {
        SelfRef {
            slot: Cell::new(None),
        }
    }

    pub(crate) fn set(&self, weak: Weak<T>) {
        self.slot.set(Some(weak));
    }

    pub(crate) fn clear(&self) {
        self.slot.set(None);
    }

    /// Clones the stored weak handle, or returns an empty one when the
    /// slot was never seeded or has been cleared.
    pub(crate) fn get_weak(&self) -> Weak<T> {
        let stored = self.slot.take();
        let observed = match &stored {
            Some(weak) => weak.clone(),
            None => Weak::new(),
        };
        self.slot.set(stored);
        observed
    }
}

impl<T: ?Sized> Clone for SelfRef<T> {
    /// Clones to an empty slot; ownership of the original does not extend
    /// to copies of the value.
    fn clone(&self) -> Self {
        SelfRef::new()
    }
}

impl<T: ?Sized> Default for SelfRef<T> {
    /// Constructs an empty slot.
    #[inline]
    fn default() -> Self {
        SelfRef::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for SelfRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(SelfRef)")
    }
}

/// Capability for values that need to hand out [`Shared`]/[`Weak`] handles
/// to themselves, e.g. to register themselves with other components.
///
/// Implementors embed a [`SelfRef`] and return it from
/// [`self_ref`](SelfObserving::self_ref); the provided methods do the rest.
/// The capability is only live while the value is owned through one of the
/// observing constructors; otherwise the provided methods return empty
/// handles.
///
/// # Example
/// ```
/// use retained::shared::{SelfObserving, SelfRef, Shared};
///
/// struct Node {
///     this: SelfRef<Node>,
///     label: String,
/// }
///
/// impl Node {
///     fn handle(&self) -> Shared<Node> {
///         self.shared_from_self()
///     }
/// }
///
/// impl SelfObserving for Node {
///     fn self_ref(&self) -> &SelfRef<Node> {
///         &self.this
///     }
/// }
///
/// let node = Shared::new_observing(Node {
///     this: SelfRef::new(),
///     label: String::from("root"),
/// });
/// let again = node.handle();
/// assert!(Shared::ptr_eq(&node, &again));
/// assert_eq!(again.label, "root");
///
/// // Without an observing owner the capability is off.
/// let unowned = Node {
///     this: SelfRef::new(),
///     label: String::from("floating"),
/// };
/// assert!(Shared::is_empty(&unowned.shared_from_self()));
/// ```
pub trait SelfObserving {
    /// Returns the slot the observing constructors seed.
    fn self_ref(&self) -> &SelfRef<Self>;

    /// Returns an owning handle to this value, or an empty handle when the
    /// value is not currently owned through an observing constructor.
    fn shared_from_self(&self) -> Shared<Self> {
        self.self_ref().get_weak().upgrade().unwrap_or_default()
    }

    /// Returns a weak handle to this value, or an empty handle when the
    /// value is not currently owned through an observing constructor.
    fn weak_from_self(&self) -> Weak<Self> {
        self.self_ref().get_weak()
    }
}

// Registered with the control block by the observing constructors; runs
// before the value is destroyed, so destructors observe an empty slot.
unsafe fn detach_self_ref<T: SelfObserving + ?Sized>(object: *const T) {
    (*object).self_ref().clear();
}
