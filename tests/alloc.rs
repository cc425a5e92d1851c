#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Allocation accounting, kept in its own binary so the counting allocator
//! only sees this test's traffic.

use retained::shared::Shared;
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

struct CountingAlloc;

static LIVE_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        LIVE_ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        LIVE_ALLOCATIONS.fetch_sub(1, Ordering::SeqCst);
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc;

fn live() -> usize {
    LIVE_ALLOCATIONS.load(Ordering::SeqCst)
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn allocation_profile() {
    let before = live();

    // In-place construction uses a single allocation for block and value.
    let inline = Shared::new([0u8; 64]);
    assert_eq!(live(), before + 1);

    // Clones and weak handles allocate nothing.
    let second = inline.clone();
    let weak = Shared::downgrade(&inline);
    assert_eq!(live(), before + 1);

    drop(second);
    drop(inline);
    // The weak handle keeps the block allocation alive past the value.
    assert_eq!(live(), before + 1);
    drop(weak);
    assert_eq!(live(), before);

    // Adopting an existing box adds a block allocation next to it.
    let boxed = Box::new([0u8; 64]);
    assert_eq!(live(), before + 1);
    let adopted = Shared::adopt(boxed);
    assert_eq!(live(), before + 2);
    drop(adopted);
    assert_eq!(live(), before);
}
