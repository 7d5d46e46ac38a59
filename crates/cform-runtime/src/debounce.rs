#![forbid(unsafe_code)]

//! Trailing-edge debounce on top of [`TimerQueue`].
//!
//! Every [`Debouncer::trigger`] cancels the pending timer (if any) and
//! schedules a new one `quiet` from now, so only the last trigger inside a
//! quiet window fires. At most one timer per debouncer is ever live.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use cform_core::cx::{Cx, LabClock};
//! use cform_runtime::{Debouncer, TimerQueue};
//! use web_time::Duration;
//!
//! let clock = LabClock::new();
//! let (cx, _ctrl) = Cx::lab(&clock);
//! let timers = TimerQueue::new(cx);
//! let debounce = Debouncer::new(&timers, Duration::from_millis(2000));
//!
//! let fired = Rc::new(Cell::new(0));
//! for _ in 0..3 {
//!     let f = Rc::clone(&fired);
//!     debounce.trigger(move || f.set(f.get() + 1));
//!     timers.advance(Duration::from_millis(500));
//! }
//! assert_eq!(fired.get(), 0);
//! timers.advance(Duration::from_millis(1500));
//! assert_eq!(fired.get(), 1);
//! ```

use std::cell::Cell;
use std::rc::Rc;

use web_time::Duration;

use crate::timer::{TimerId, TimerQueue};

/// Cancel-and-replace debounce owned by one rule instance.
///
/// Dropping the debouncer cancels its pending timer.
pub struct Debouncer {
    timers: TimerQueue,
    quiet: Duration,
    pending: Rc<Cell<Option<TimerId>>>,
    resets: Cell<u64>,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("quiet", &self.quiet)
            .field("pending", &self.pending.get())
            .field("resets", &self.resets.get())
            .finish()
    }
}

impl Debouncer {
    /// Create a debouncer with the given quiet period.
    #[must_use]
    pub fn new(timers: &TimerQueue, quiet: Duration) -> Self {
        Self {
            timers: timers.clone(),
            quiet,
            pending: Rc::new(Cell::new(None)),
            resets: Cell::new(0),
        }
    }

    /// Quiet period that must elapse without a new trigger.
    #[must_use]
    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// (Re)start the quiet window; `action` runs if it elapses undisturbed.
    pub fn trigger(&self, action: impl FnOnce() + 'static) {
        if let Some(id) = self.pending.take() {
            self.timers.cancel(id);
            self.resets.set(self.resets.get() + 1);
        }
        let slot = Rc::clone(&self.pending);
        let id = self.timers.schedule(self.quiet, move || {
            slot.set(None);
            action();
        });
        if self.timers.is_pending(id) {
            self.pending.set(Some(id));
        }
    }

    /// Drop the pending action, if any. Returns `true` if one was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.take() {
            Some(id) => self.timers.cancel(id),
            None => false,
        }
    }

    /// Whether an action is waiting for its quiet window.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }

    /// How many times a pending action was replaced by a newer trigger.
    #[must_use]
    pub fn resets(&self) -> u64 {
        self.resets.get()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
