#![forbid(unsafe_code)]

//! Change notification primitives for the form tree.
//!
//! - [`Notifier`]: a list of subscriber callbacks for one event stream.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`DistinctUntilChanged`]: gate that suppresses a value whose serialized
//!   form equals the last one admitted.
//!
//! # Architecture
//!
//! `Notifier<E>` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Subscribers are stored as `Weak` function pointers and cleaned up lazily
//! during notification; the strong side lives in the [`Subscription`].
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 3. No borrow of the subscriber list is held while callbacks run, so a
//!    callback may subscribe, unsubscribe, or notify re-entrantly.
//! 4. The gate compares serialized forms, never identity: two structurally
//!    equal values are the same value.

pub mod distinct;
pub mod notifier;

pub use distinct::DistinctUntilChanged;
pub use notifier::{Notifier, Subscription};
