use std::cell::{Cell, UnsafeCell};
use std::mem::ManuallyDrop;

/// Strong and weak counts for one managed allocation.
///
/// All strong handles together hold one weak unit on top of the units held
/// by weak handles. It is released only after the object has been destroyed,
/// so the block stays allocated while the object's destructor runs, even if
/// the object drops weak handles to its own allocation from there.
pub(crate) struct Counters {
    strong: Cell<usize>,
    weak: Cell<usize>,
}

impl Counters {
    /// Counters for a freshly created owning handle: one strong unit plus
    /// the collective weak unit.
    pub(crate) fn new_owned() -> Self {
        Self {
            strong: Cell::new(1),
            weak: Cell::new(1),
        }
    }

    #[inline]
    pub(crate) fn strong(&self) -> usize {
        self.strong.get()
    }

    #[inline]
    pub(crate) fn weak(&self) -> usize {
        self.weak.get()
    }

    #[inline]
    pub(crate) fn acquire_strong(&self) {
        self.strong.set(self.strong.get() + 1);
    }

    /// Releases one strong unit. Returns `true` when it was the last one,
    /// in which case the caller must destroy the object and then release
    /// the collective weak unit.
    #[inline]
    pub(crate) fn release_strong(&self) -> bool {
        let count = self.strong.get();
        debug_assert!(count > 0, "strong count underflow");
        self.strong.set(count - 1);
        count == 1
    }

    /// Acquires a strong unit unless the object is already gone.
    #[inline]
    pub(crate) fn try_acquire_strong(&self) -> bool {
        let count = self.strong.get();
        if count == 0 {
            false
        } else {
            self.strong.set(count + 1);
            true
        }
    }

    #[inline]
    pub(crate) fn acquire_weak(&self) {
        self.weak.set(self.weak.get() + 1);
    }

    /// Releases one weak unit. Returns `true` when it was the last one,
    /// in which case the caller must free the block.
    #[inline]
    pub(crate) fn release_weak(&self) -> bool {
        let count = self.weak.get();
        debug_assert!(count > 0, "weak count underflow");
        self.weak.set(count - 1);
        count == 1
    }
}

/// One allocation's bookkeeping: the counts plus an erased way to destroy
/// the managed object.
///
/// Freeing the block itself is not part of this trait; handles do that by
/// reconstructing the `Box<dyn ControlBlock>` the block was allocated as,
/// once the weak count reaches zero.
pub(crate) trait ControlBlock {
    fn counters(&self) -> &Counters;

    /// Destroys the managed object without freeing the block. Runs the
    /// detach hook first when one was registered at construction.
    ///
    /// # Safety
    /// Must be called exactly once, after the strong count reaches zero,
    /// and the object must not be accessed afterwards.
    unsafe fn release_object(&self);
}

/// Control block adopting an object that was allocated separately.
pub(crate) struct AdoptingBlock<T: ?Sized> {
    counters: Counters,
    detach: Option<unsafe fn(*const T)>,
    object: *mut T,
}

impl<T: ?Sized> AdoptingBlock<T> {
    /// `object` must come from `Box::into_raw` and is owned by the block
    /// from this point on.
    pub(crate) fn new(object: *mut T, detach: Option<unsafe fn(*const T)>) -> Self {
        Self {
            counters: Counters::new_owned(),
            detach,
            object,
        }
    }
}

impl<T: ?Sized> ControlBlock for AdoptingBlock<T> {
    #[inline]
    fn counters(&self) -> &Counters {
        &self.counters
    }

    unsafe fn release_object(&self) {
        if let Some(detach) = self.detach {
            detach(self.object);
        }
        drop(Box::from_raw(self.object));
    }
}

/// Control block that stores the object inline, so one allocation serves
/// both the counts and the value.
pub(crate) struct InlineBlock<T> {
    counters: Counters,
    detach: Option<unsafe fn(*const T)>,
    value: UnsafeCell<ManuallyDrop<T>>,
}

impl<T> InlineBlock<T> {
    pub(crate) fn new(value: T, detach: Option<unsafe fn(*const T)>) -> Self {
        Self {
            counters: Counters::new_owned(),
            detach,
            value: UnsafeCell::new(ManuallyDrop::new(value)),
        }
    }

    /// Pointer to the stored value, valid until `release_object` runs.
    #[inline]
    pub(crate) fn value_ptr(&self) -> *mut T {
        // ManuallyDrop<T> is repr(transparent) over T
        self.value.get().cast::<T>()
    }
}

impl<T> ControlBlock for InlineBlock<T> {
    #[inline]
    fn counters(&self) -> &Counters {
        &self.counters
    }

    unsafe fn release_object(&self) {
        if let Some(detach) = self.detach {
            detach(self.value_ptr());
        }
        std::ptr::drop_in_place(self.value_ptr());
    }
}
