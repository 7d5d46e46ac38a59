#![forbid(unsafe_code)]

//! Cancellable one-shot timers driven cooperatively.
//!
//! A [`TimerQueue`] stores scheduled callbacks with their due instant. Nothing
//! runs in the background: the owner calls [`TimerQueue::run_due`] (typically
//! once per input event or frame) and every callback whose deadline has passed
//! runs on the caller's thread, earliest first.
//!
//! Time comes from the queue's [`Cx`], so a lab clock makes tests exact:
//! [`TimerQueue::advance`] steps the lab clock deadline by deadline, firing
//! each timer at precisely its due instant.
//!
//! # Invariants
//!
//! 1. Timers fire in `(due, id)` order; ties fire in scheduling order.
//! 2. A cancelled timer never fires.
//! 3. Once the queue's context is cancelled, no callback fires and new
//!    schedules are dropped.
//! 4. No borrow of the queue is held while a callback runs, so callbacks may
//!    schedule or cancel timers.

use std::cell::RefCell;
use std::rc::Rc;

use cform_core::cx::Cx;
use web_time::{Duration, Instant};

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

struct TimerEntry {
    id: TimerId,
    due: Instant,
    callback: Box<dyn FnOnce()>,
}

struct TimerInner {
    cx: Cx,
    next_id: u64,
    entries: Vec<TimerEntry>,
    fired: u64,
    cancelled: u64,
}

/// Single-threaded cancellable timer queue.
///
/// Cloning a `TimerQueue` creates a new handle to the **same** queue.
#[derive(Clone)]
pub struct TimerQueue {
    inner: Rc<RefCell<TimerInner>>,
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("TimerQueue")
            .field("cx_id", &inner.cx.id())
            .field("pending", &inner.entries.len())
            .field("fired", &inner.fired)
            .field("cancelled", &inner.cancelled)
            .finish()
    }
}

impl TimerQueue {
    /// Create an empty queue reading time from (and cancelled with) `cx`.
    #[must_use]
    pub fn new(cx: Cx) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TimerInner {
                cx,
                next_id: 1,
                entries: Vec::new(),
                fired: 0,
                cancelled: 0,
            })),
        }
    }

    /// The context this queue reads time from.
    #[must_use]
    pub fn cx(&self) -> Cx {
        self.inner.borrow().cx.clone()
    }

    /// Current time on the queue's clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.inner.borrow().cx.now()
    }

    /// Schedule `callback` to run once `delay` has elapsed.
    ///
    /// If the queue's context is already cancelled the callback is dropped
    /// and the returned id never fires.
    pub fn schedule(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        let id = TimerId(inner.next_id);
        inner.next_id += 1;
        if inner.cx.is_cancelled() {
            tracing::warn!(
                timer = id.raw(),
                cx_id = inner.cx.id(),
                "timer scheduled after cancellation; dropped"
            );
            return id;
        }
        let due = inner.cx.now() + delay;
        tracing::trace!(
            timer = id.raw(),
            delay_ms = delay.as_millis() as u64,
            "timer scheduled"
        );
        inner.entries.push(TimerEntry {
            id,
            due,
            callback: Box::new(callback),
        });
        id
    }

    /// Cancel a pending timer. Returns `true` if it was pending.
    pub fn cancel(&self, id: TimerId) -> bool {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let before = inner.entries.len();
            inner.entries.retain(|e| e.id != id);
            let removed = inner.entries.len() < before;
            if removed {
                inner.cancelled += 1;
            }
            removed
        };
        if removed {
            tracing::trace!(timer = id.raw(), "timer cancelled");
        }
        removed
    }

    /// Cancel every pending timer. Returns how many were dropped.
    pub fn cancel_all(&self) -> usize {
        let dropped: Vec<TimerEntry> = {
            let mut inner = self.inner.borrow_mut();
            let dropped = std::mem::take(&mut inner.entries);
            inner.cancelled += dropped.len() as u64;
            dropped
        };
        // Callbacks (and whatever they captured) drop outside the borrow.
        let n = dropped.len();
        drop(dropped);
        if n > 0 {
            tracing::debug!(count = n, "timers cancelled");
        }
        n
    }

    /// Whether `id` is still waiting to fire.
    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.inner.borrow().entries.iter().any(|e| e.id == id)
    }

    /// Number of timers waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Total callbacks fired over the queue's lifetime.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.inner.borrow().fired
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.borrow().entries.iter().map(|e| e.due).min()
    }

    /// Run every timer whose deadline is at or before the current time.
    ///
    /// Returns the number of callbacks run. Timers scheduled by a callback
    /// with a zero delay run in the same call.
    pub fn run_due(&self) -> usize {
        let mut ran = 0;
        while let Some(entry) = self.pop_due() {
            tracing::trace!(timer = entry.id.raw(), "timer fired");
            (entry.callback)();
            ran += 1;
        }
        ran
    }

    /// Advance a lab clock by `by`, firing timers at their exact deadlines.
    ///
    /// On a real clock time cannot be moved; this only runs timers already due.
    pub fn advance(&self, by: Duration) -> usize {
        let cx = self.cx();
        let Some(lab) = cx.clock().as_lab() else {
            return self.run_due();
        };
        let target = cx.now() + by;
        let mut ran = self.run_due();
        while let Some(due) = self.next_deadline() {
            if due > target || cx.is_cancelled() {
                break;
            }
            let now = cx.now();
            if due > now {
                lab.advance(due - now);
            }
            ran += self.run_due();
        }
        let now = cx.now();
        if target > now {
            lab.advance(target - now);
        }
        ran + self.run_due()
    }

    fn pop_due(&self) -> Option<TimerEntry> {
        let mut inner = self.inner.borrow_mut();
        if inner.cx.is_cancelled() {
            if !inner.entries.is_empty() {
                let n = inner.entries.len() as u64;
                inner.entries.clear();
                inner.cancelled += n;
            }
            return None;
        }
        let now = inner.cx.now();
        let idx = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due <= now)
            .min_by_key(|(_, e)| (e.due, e.id))
            .map(|(i, _)| i)?;
        inner.fired += 1;
        Some(inner.entries.remove(idx))
    }
}
