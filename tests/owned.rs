#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use retained::owned::{BoxDestroy, Destroy, Owned};
use std::cell::Cell;
use std::rc::Rc;

struct Probe {
    dropped: Rc<Cell<u32>>,
}

impl Probe {
    fn new(dropped: &Rc<Cell<u32>>) -> Probe {
        Probe {
            dropped: dropped.clone(),
        }
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.dropped.set(self.dropped.get() + 1);
    }
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn new_and_deref() {
    let mut report = Owned::new(String::from("draft"));
    report.push_str(" v2");
    assert_eq!(*report, "draft v2");
    assert!(!Owned::is_empty(&report));

    let _: &BoxDestroy = Owned::destroy_action(&report);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn drop_disposes_once() {
    let dropped = Rc::new(Cell::new(0));
    let owned = Owned::new(Probe::new(&dropped));

    assert_eq!(dropped.get(), 0);
    drop(owned);
    assert_eq!(dropped.get(), 1);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn release_forfeits_ownership() {
    let dropped = Rc::new(Cell::new(0));
    let mut owned = Owned::new(Probe::new(&dropped));

    let raw = Owned::release(&mut owned);
    assert!(!raw.is_null());
    assert!(Owned::is_empty(&owned));

    drop(owned);
    assert_eq!(dropped.get(), 0);

    // SAFETY: raw came out of an Owned built over a Box
    let back = unsafe { Box::from_raw(raw) };
    drop(back);
    assert_eq!(dropped.get(), 1);

    let mut empty: Owned<Probe> = Owned::empty();
    assert!(Owned::release(&mut empty).is_null());
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn reset_disposes() {
    let dropped = Rc::new(Cell::new(0));
    let mut owned = Owned::new(Probe::new(&dropped));

    Owned::reset(&mut owned);
    assert!(Owned::is_empty(&owned));
    assert_eq!(dropped.get(), 1);

    // Resetting an empty handle does nothing.
    Owned::reset(&mut owned);
    assert_eq!(dropped.get(), 1);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn reset_raw_replaces() {
    let dropped = Rc::new(Cell::new(0));
    let mut owned = Owned::new(Probe::new(&dropped));
    let replacement = Box::into_raw(Box::new(Probe::new(&dropped)));

    // SAFETY: replacement came from Box::into_raw and is adopted once
    unsafe { Owned::reset_raw(&mut owned, replacement) };
    assert_eq!(dropped.get(), 1);
    assert!(!Owned::is_empty(&owned));

    drop(owned);
    assert_eq!(dropped.get(), 2);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn custom_action() {
    let calls = Rc::new(Cell::new(0));
    let count = calls.clone();
    let raw = Box::into_raw(Box::new(5));

    // SAFETY: raw came from Box::into_raw and the action reclaims it
    let owned = unsafe {
        Owned::from_raw_with(raw, move |object: *mut i32| {
            count.set(count.get() + 1);
            unsafe { drop(Box::from_raw(object)) };
        })
    };
    assert_eq!(*owned, 5);

    drop(owned);
    assert_eq!(calls.get(), 1);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn unit_struct_action() {
    #[derive(Default)]
    struct Leak;
    impl Destroy<i32> for Leak {
        unsafe fn destroy(&mut self, _object: *mut i32) {}
    }

    let raw = Box::into_raw(Box::new(7));
    // SAFETY: the action never frees, so the box stays valid past the handle
    let owned = unsafe { Owned::from_raw_with(raw, Leak) };
    assert_eq!(*owned, 7);
    drop(owned);

    // SAFETY: still owned by the box after the no-op action ran
    let back = unsafe { Box::from_raw(raw) };
    assert_eq!(*back, 7);

    let empty: Owned<i32, Leak> = Owned::empty();
    assert!(Owned::is_empty(&empty));
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn unsized_values() {
    let boxed: Box<[i32]> = Box::new([1, 2, 3]);
    let slice: Owned<[i32]> = Owned::from_box(boxed);
    assert_eq!(slice.len(), 3);
    assert_eq!(slice[0], 1);

    let display: Owned<dyn std::fmt::Display> = Owned::from_box(Box::new(12));
    assert_eq!(format!("{}", &*display), "12");
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn get_mut() {
    let mut owned = Owned::new(vec![1, 2]);
    if let Some(v) = Owned::get_mut(&mut owned) {
        v.push(3);
    }
    assert_eq!(owned.len(), 3);

    let mut empty: Owned<i32> = Owned::empty();
    assert!(Owned::get_mut(&mut empty).is_none());
    assert!(Owned::get(&empty).is_none());
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn null_raw_is_empty() {
    // SAFETY: null is explicitly allowed and yields an empty handle
    let owned = unsafe { Owned::from_raw(std::ptr::null_mut::<i32>()) };
    assert!(Owned::is_empty(&owned));
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
#[should_panic(expected = "dereferenced an empty Owned")]
fn deref_empty() {
    let empty: Owned<i32> = Owned::empty();
    let _ = *empty;
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn fmt() {
    let owned = Owned::new(5);
    format!("{:?}", owned);
    assert_eq!(format!("{:?}", Owned::<i32>::empty()), "Owned(empty)");
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn from_box() {
    let owned: Owned<String> = Box::new(String::from("converted")).into();
    assert_eq!(*owned, "converted");
}
