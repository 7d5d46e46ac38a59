#![forbid(unsafe_code)]

//! Runtime plumbing for the contact form engine.
//!
//! Everything here is single-threaded and cooperative: change notification
//! ([`reactive`]), cancellable timers ([`timer`]), and the debounce built on
//! top of them ([`debounce`]). Nothing blocks; a debounce is a scheduled
//! callback that the owner of the [`TimerQueue`] drives by calling
//! [`TimerQueue::run_due`].

pub mod debounce;
pub mod reactive;
pub mod timer;

pub use debounce::Debouncer;
pub use reactive::{DistinctUntilChanged, Notifier, Subscription};
pub use timer::{TimerId, TimerQueue};
