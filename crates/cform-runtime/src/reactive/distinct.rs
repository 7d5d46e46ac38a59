#![forbid(unsafe_code)]

//! Distinct-until-changed gate.
//!
//! A rule that reacts to a value stream must not re-fire when the stream
//! repeats itself. [`DistinctUntilChanged`] remembers the serialized form of
//! the last admitted value and rejects a new value whose serialized form is
//! identical. Equality is total and structural: two separately built but
//! equal objects are the same value.
//!
//! # Invariants
//!
//! 1. The first value offered is always admitted.
//! 2. A value is admitted iff its serialization differs from the last
//!    admitted value's serialization.
//! 3. A rejected value does not replace the remembered one.
//!
//! # Failure Modes
//!
//! - Serialization failure (e.g. a map with non-string keys): the value is
//!   admitted and the memory is cleared, so the next value is admitted too.

use serde::Serialize;

/// Gate that suppresses consecutive structurally equal values.
#[derive(Debug, Clone, Default)]
pub struct DistinctUntilChanged {
    last: Option<String>,
    admitted: u64,
    suppressed: u64,
}

impl DistinctUntilChanged {
    /// Create a gate with no memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `value` to the gate. Returns `true` if it should be processed.
    pub fn admit<T: Serialize + ?Sized>(&mut self, value: &T) -> bool {
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(error = %err, "distinct gate could not serialize value");
                self.last = None;
                self.admitted += 1;
                return true;
            }
        };
        if self.last.as_deref() == Some(serialized.as_str()) {
            self.suppressed += 1;
            tracing::trace!(value = %serialized, "distinct gate suppressed repeat");
            return false;
        }
        self.last = Some(serialized);
        self.admitted += 1;
        true
    }

    /// Forget the remembered value; the next offer is admitted.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Serialized form of the last admitted value.
    #[must_use]
    pub fn last_serialized(&self) -> Option<&str> {
        self.last.as_deref()
    }

    /// Number of values admitted so far.
    #[must_use]
    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    /// Number of values suppressed so far.
    #[must_use]
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
