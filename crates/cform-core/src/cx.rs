//! Session context (`Cx`) for cooperative cancellation and a swappable time
//! source.
//!
//! Every edit session owns one root `Cx`. Timers and conditional rules hold
//! clones (or children) of it and consult `is_cancelled()` before touching the
//! form tree, so ending the session can never let a late callback fire
//! against a torn-down tree.
//!
//! - **Cooperative cancellation**: any holder can check `cx.is_cancelled()` and
//!   bail out early. Cancelling a parent cancels every child.
//! - **Deterministic testing via Lab**: with a [`LabClock`], time only moves
//!   when the test advances it, which makes debounce windows exact.
//!
//! # Design
//!
//! `Cx` is cheaply cloneable (`Arc` inside) and immutable from the outside.
//! To cancel, hold the companion [`CxController`].
//!
//! # Example
//!
//! ```
//! use cform_core::cx::{Clock, Cx, LabClock};
//! use web_time::Duration;
//!
//! let clock = LabClock::new();
//! let (cx, ctrl) = Cx::new(Clock::Lab(clock.clone()));
//! let t0 = cx.now();
//! clock.advance(Duration::from_millis(250));
//! assert_eq!(cx.now() - t0, Duration::from_millis(250));
//!
//! ctrl.cancel();
//! assert!(cx.is_cancelled());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use web_time::{Duration, Instant};

// ─── Cx ID generation ────────────────────────────────────────────────────────

static NEXT_CX_ID: AtomicU64 = AtomicU64::new(1);

fn next_cx_id() -> u64 {
    NEXT_CX_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Metrics counters ────────────────────────────────────────────────────────

/// Total number of Cx cancellations observed.
static CX_CANCELLATIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total cancellation count (for diagnostics).
#[must_use]
pub fn cx_cancellations_total() -> u64 {
    CX_CANCELLATIONS_TOTAL.load(Ordering::Relaxed)
}

// ─── Time source ─────────────────────────────────────────────────────────────

/// Time source for sessions and timers.
///
/// In production this is wall-clock time via `web_time::Instant::now()`.
/// Tests use [`Clock::Lab`] so that time only moves when advanced.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Real wall-clock time.
    #[default]
    Real,
    /// Deterministic lab clock for testing.
    Lab(LabClock),
}

impl Clock {
    /// Current time according to this source.
    #[must_use]
    pub fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(c) => c.now(),
        }
    }

    /// The lab clock, if this is one.
    #[must_use]
    pub fn as_lab(&self) -> Option<&LabClock> {
        match self {
            Self::Real => None,
            Self::Lab(c) => Some(c),
        }
    }
}

/// A manually-advanceable clock for deterministic tests.
///
/// All clones share the same offset, so every `Cx` and timer queue built on
/// the same `LabClock` sees the same time.
#[derive(Debug, Clone)]
pub struct LabClock {
    epoch: Instant,
    offset_us: Arc<AtomicU64>,
}

impl LabClock {
    /// Create a new lab clock starting at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the lab clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.fetch_add(us, Ordering::Release);
    }

    /// Time elapsed since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.load(Ordering::Acquire))
    }

    /// Current lab time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.epoch + self.elapsed()
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner shared state ──────────────────────────────────────────────────────

#[derive(Debug)]
struct CxInner {
    id: u64,
    cancelled: AtomicBool,
    clock: Clock,
    parent: Option<Arc<CxInner>>,
}

impl CxInner {
    fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
}

// ─── Cx ──────────────────────────────────────────────────────────────────────

/// Session context handle.
///
/// Cheaply cloneable. Check `is_cancelled()` before running deferred work.
#[derive(Clone, Debug)]
pub struct Cx {
    inner: Arc<CxInner>,
}

impl Cx {
    /// Create a root context on the given clock.
    #[must_use]
    pub fn new(clock: Clock) -> (Self, CxController) {
        Self::new_inner(clock, None)
    }

    /// Create a root context on wall-clock time.
    #[must_use]
    pub fn background() -> (Self, CxController) {
        Self::new_inner(Clock::Real, None)
    }

    /// Create a root context using a [`LabClock`].
    #[must_use]
    pub fn lab(clock: &LabClock) -> (Self, CxController) {
        Self::new_inner(Clock::Lab(clock.clone()), None)
    }

    /// Derive a child context sharing this context's clock.
    ///
    /// Cancelling the parent also cancels the child; cancelling the child
    /// leaves the parent live.
    #[must_use]
    pub fn child(&self) -> (Self, CxController) {
        Self::new_inner(self.inner.clock.clone(), Some(self.inner.clone()))
    }

    fn new_inner(clock: Clock, parent: Option<Arc<CxInner>>) -> (Self, CxController) {
        let inner = Arc::new(CxInner {
            id: next_cx_id(),
            cancelled: AtomicBool::new(false),
            clock,
            parent,
        });
        let cx = Self {
            inner: inner.clone(),
        };
        (cx, CxController { inner })
    }

    /// Unique identifier for this context (for logging).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Check if this context (or any ancestor) has been cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Current time according to this context's clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    /// The clock this context reads time from.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Whether this context uses a lab clock.
    #[inline]
    #[must_use]
    pub fn is_lab(&self) -> bool {
        matches!(self.inner.clock, Clock::Lab(_))
    }

    /// Return `Err` if the context is cancelled.
    ///
    /// ```ignore
    /// cx.check()?;
    /// // ... touch the tree ...
    /// ```
    pub fn check(&self) -> Result<(), CxError> {
        if self.is_cancelled() {
            return Err(CxError::Cancelled);
        }
        Ok(())
    }
}

// ─── CxController ────────────────────────────────────────────────────────────

/// Control handle for a [`Cx`].
///
/// Dropping the controller does **not** cancel the context; cancellation is
/// always explicit.
#[derive(Debug)]
pub struct CxController {
    inner: Arc<CxInner>,
}

impl CxController {
    /// Cancel the associated context and every child derived from it.
    pub fn cancel(&self) {
        let was_cancelled = self.inner.cancelled.swap(true, Ordering::Release);
        if !was_cancelled {
            CX_CANCELLATIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(cx_id = self.inner.id, "cx cancelled");
        }
    }

    /// Whether this context has already been cancelled (directly).
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

// ─── CxError ─────────────────────────────────────────────────────────────────

/// Error returned when work is attempted on a cancelled context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CxError {
    /// The context was explicitly cancelled.
    Cancelled,
}

impl std::fmt::Display for CxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "context cancelled"),
        }
    }
}

impl std::error::Error for CxError {}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_cx_is_not_cancelled() {
        let (cx, _ctrl) = Cx::background();
        assert!(!cx.is_cancelled());
        assert!(!cx.is_lab());
        assert!(cx.check().is_ok());
    }

    #[test]
    fn cancel_propagates_to_clones() {
        let (cx, ctrl) = Cx::background();
        let cx2 = cx.clone();
        ctrl.cancel();
        assert!(cx.is_cancelled());
        assert!(cx2.is_cancelled());
        assert_eq!(cx.check(), Err(CxError::Cancelled));
    }

    #[test]
    fn child_inherits_cancellation() {
        let (parent, parent_ctrl) = Cx::background();
        let (child, _child_ctrl) = parent.child();
        assert!(!child.is_cancelled());
        parent_ctrl.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_cancel_leaves_parent_live() {
        let (parent, _parent_ctrl) = Cx::background();
        let (child, child_ctrl) = parent.child();
        child_ctrl.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn child_shares_lab_clock() {
        let clock = LabClock::new();
        let (parent, _) = Cx::lab(&clock);
        let (child, _) = parent.child();
        assert!(child.is_lab());
        let t0 = child.now();
        clock.advance(Duration::from_millis(40));
        assert_eq!(child.now() - t0, Duration::from_millis(40));
        assert_eq!(parent.now(), child.now());
    }

    #[test]
    fn lab_clock_advance_accumulates() {
        let clock = LabClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_millis(100));
        clock.advance(Duration::from_millis(200));
        assert_eq!(clock.now().duration_since(t0), Duration::from_millis(300));
        assert_eq!(clock.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn clock_as_lab() {
        let clock = LabClock::new();
        assert!(Clock::Lab(clock).as_lab().is_some());
        assert!(Clock::Real.as_lab().is_none());
    }

    #[test]
    fn cx_id_is_unique() {
        let (cx1, _) = Cx::background();
        let (cx2, _) = Cx::background();
        assert_ne!(cx1.id(), cx2.id());
    }

    #[test]
    fn cancellation_counter_increments_once() {
        let before = cx_cancellations_total();
        let (_cx, ctrl) = Cx::background();
        ctrl.cancel();
        assert!(cx_cancellations_total() > before);
        let after_first = cx_cancellations_total();
        ctrl.cancel();
        assert!(ctrl.is_cancelled());
        assert!(cx_cancellations_total() >= after_first);
    }

    #[test]
    fn cx_error_display() {
        assert_eq!(CxError::Cancelled.to_string(), "context cancelled");
    }

    proptest::proptest! {
        #[test]
        fn lab_clock_elapsed_is_sum_of_steps(steps in proptest::collection::vec(0u64..10_000, 0..32)) {
            let clock = LabClock::new();
            let t0 = clock.now();
            for s in &steps {
                clock.advance(Duration::from_millis(*s));
            }
            let total = Duration::from_millis(steps.iter().sum());
            proptest::prop_assert_eq!(clock.elapsed(), total);
            proptest::prop_assert_eq!(clock.now() - t0, total);
        }
    }
}
