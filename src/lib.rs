//! # `retained`
//! Single-threaded smart pointers: shared ownership with weak handles and
//! aliasing, intrusive reference counting, and single ownership with a
//! customizable destroy action.
//!
//! [`shared::Shared`] is the centerpiece. It owns its value jointly with all
//! of its clones, hands out non-owning [`shared::Weak`] observers, and can
//! alias a part of its value through [`shared::Shared::project`] while the
//! projection keeps the whole value alive. Types that opt into
//! [`shared::SelfObserving`] can mint handles to themselves from plain `&self`.
//!
//! [`intrusive::Intrusive`] counts references inside the object itself, so a
//! handle is a single pointer. [`owned::Owned`] is a movable single owner
//! whose cleanup can be swapped out per object.
//!
//! All pointers in this crate are deliberately single-threaded; none of them
//! implement [`Send`] or [`Sync`].
//!
//! # Example
//! ```
//! use retained::shared::{Shared, Weak};
//!
//! struct Account {
//!     holder: String,
//!     balance: i64,
//! }
//!
//! let account = Shared::new(Account {
//!     holder: String::from("ada"),
//!     balance: 1200,
//! });
//!
//! // Hand out just the holder name while sharing ownership of the account.
//! let holder: Shared<String> = account.project(|account| &account.holder);
//! assert_eq!(*holder, "ada");
//!
//! // Weak handles observe the account without keeping it alive; the
//! // projection still counts as an owner here.
//! let watcher: Weak<Account> = Shared::downgrade(&account);
//! drop(account);
//! assert_eq!(watcher.upgrade().unwrap().balance, 1200);
//!
//! drop(holder);
//! assert!(watcher.expired());
//! ```

#![deny(missing_docs)]

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

pub mod intrusive;
pub mod owned;
pub mod shared;
