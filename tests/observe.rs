#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use retained::shared::{SelfObserving, SelfRef, Shared, Weak};
use std::cell::Cell;
use std::rc::Rc;

struct Service {
    name: String,
    self_ref: SelfRef<Service>,
}

impl Service {
    fn new(name: &str) -> Service {
        Service {
            name: name.to_owned(),
            self_ref: SelfRef::new(),
        }
    }
}

impl SelfObserving for Service {
    fn self_ref(&self) -> &SelfRef<Service> {
        &self.self_ref
    }
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn shared_from_self() {
    let service = Shared::new_observing(Service::new("indexer"));
    let same = service.shared_from_self();

    assert!(Shared::ptr_eq(&service, &same));
    assert_eq!(same.name, "indexer");
    assert_eq!(Shared::strong_count(&service), 2);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn adopted_values_observe_themselves() {
    let service = Shared::adopt_observing(Box::new(Service::new("resolver")));
    let weak = service.weak_from_self();

    assert!(weak.ptr_eq(&Shared::downgrade(&service)));
    assert!(weak.upgrade().is_some());
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn self_ref_counts_as_one_weak() {
    let service = Shared::new_observing(Service::new("cache"));
    assert_eq!(Shared::weak_count(&service), 1);

    let _weak = service.weak_from_self();
    assert_eq!(Shared::weak_count(&service), 2);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn unmanaged_value_has_no_self() {
    let service = Service::new("loose");

    assert!(Shared::is_empty(&service.shared_from_self()));
    assert!(service.weak_from_self().expired());
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn plain_construction_leaves_the_slot_empty() {
    // Shared::new does not fill the slot; only the observing constructors do.
    let service = Shared::new(Service::new("plain"));

    assert!(Shared::is_empty(&service.shared_from_self()));
    assert_eq!(Shared::weak_count(&service), 0);
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn slot_is_cleared_before_the_value_drops() {
    struct Tracker {
        cleared: Rc<Cell<bool>>,
        self_ref: SelfRef<Tracker>,
    }
    impl SelfObserving for Tracker {
        fn self_ref(&self) -> &SelfRef<Tracker> {
            &self.self_ref
        }
    }
    impl Drop for Tracker {
        fn drop(&mut self) {
            let slot_empty = self.weak_from_self().ptr_eq(&Weak::new());
            let promoted_empty = Shared::is_empty(&self.shared_from_self());
            self.cleared.set(slot_empty && promoted_empty);
        }
    }

    let cleared = Rc::new(Cell::new(false));
    let tracker = Shared::new_observing(Tracker {
        cleared: cleared.clone(),
        self_ref: SelfRef::new(),
    });

    drop(tracker);
    assert!(cleared.get());
}

#[test]
#[cfg_attr(coverage_nightly, coverage(off))]
fn observing_handles_expire_like_any_other() {
    let service = Shared::new_observing(Service::new("short-lived"));
    let weak = service.weak_from_self();

    drop(service);
    assert!(weak.expired());
    assert!(weak.upgrade().is_none());
}
