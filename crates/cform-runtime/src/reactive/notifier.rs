#![forbid(unsafe_code)]

//! Subscriber lists with RAII unsubscription.
//!
//! # Usage
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use cform_runtime::reactive::Notifier;
//!
//! let changes: Notifier<u32> = Notifier::new();
//! let seen = Rc::new(Cell::new(0));
//! let s = Rc::clone(&seen);
//! let sub = changes.subscribe(move |v| s.set(*v));
//!
//! changes.notify(&7);
//! assert_eq!(seen.get(), 7);
//!
//! drop(sub);
//! changes.notify(&9);
//! assert_eq!(seen.get(), 7);
//! ```
//!
//! # Failure Modes
//!
//! - Callback panic: propagates to the caller of `notify()`. Callbacks after
//!   the panicking one are not run for that event.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<E> = dyn Fn(&E);

struct NotifierInner<E> {
    next_id: u64,
    subscribers: Vec<(u64, Weak<Callback<E>>)>,
}

/// A single-threaded event stream with an ordered subscriber list.
///
/// Cloning a `Notifier` creates a new handle to the **same** subscriber list.
pub struct Notifier<E> {
    inner: Rc<RefCell<NotifierInner<E>>>,
}

impl<E> Clone for Notifier<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: 'static> std::fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<E: 'static> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Notifier<E> {
    /// Create a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(NotifierInner {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Register `callback`. It stays registered until the returned
    /// [`Subscription`] is dropped.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&E) + 'static) -> Subscription {
        let strong: Rc<Callback<E>> = Rc::new(callback);
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Rc::downgrade(&strong)));
        Subscription {
            id,
            _callback: Box::new(strong),
        }
    }

    /// Deliver `event` to every live subscriber in registration order.
    ///
    /// Dead subscribers are pruned first. Returns the number of callbacks run.
    pub fn notify(&self, event: &E) -> usize {
        let live: Vec<Rc<Callback<E>>> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|(_, w)| w.strong_count() > 0);
            inner
                .subscribers
                .iter()
                .filter_map(|(_, w)| w.upgrade())
                .collect()
        };
        for callback in &live {
            callback(event);
        }
        live.len()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|(_, w)| w.strong_count() > 0)
            .count()
    }
}

/// RAII guard for a [`Notifier`] registration.
///
/// The notifier only holds a `Weak` pointer to the callback; this guard holds
/// the strong side. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    _callback: Box<dyn Any>,
}

impl Subscription {
    /// Registration id, unique per notifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
