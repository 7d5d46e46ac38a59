#![forbid(unsafe_code)]

//! Core: time source, session cancellation, and diagnostic counters shared by
//! the form runtime.

pub mod cx;

pub use cx::{Clock, Cx, CxController, CxError, LabClock, cx_cancellations_total};
