//! Validator registry and the built-in stateless rules.
//!
//! A [`ValidatorId`] names a rule; the [`ValidatorRegistry`] maps each id to a
//! pure [`ValidatorRule`]. Fields store ids only, split into an ordered static
//! list and a runtime-attached dynamic set, and look the rules up here on
//! every evaluation.
//!
//! # Failure Modes
//!
//! - A rule that panics is treated as a pass for that evaluation. The panic is
//!   counted in [`validator_faults_total`] and logged at `error`, and never
//!   reaches the field's error map.

use std::borrow::Cow;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use thiserror::Error;

use crate::restricted::RestrictedWords;
use crate::value::FieldValue;

/// Total number of validator panics swallowed (for diagnostics).
static VALIDATOR_FAULTS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total validator fault count.
#[must_use]
pub fn validator_faults_total() -> u64 {
    VALIDATOR_FAULTS_TOTAL.load(Ordering::Relaxed)
}

/// Name of a registered validator; also the key of its error on a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValidatorId(Cow<'static, str>);

impl ValidatorId {
    pub const REQUIRED: Self = Self(Cow::Borrowed("required"));
    pub const RESTRICTED_WORDS: Self = Self(Cow::Borrowed("restrictedWords"));

    /// An id for a custom rule.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Id of the min-length rule for `min`.
    #[must_use]
    pub fn min_length(min: usize) -> Self {
        Self(Cow::Owned(format!("minLength({min})")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a value failed a validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a value is required")]
    MissingRequired,

    #[error("must be at least {min} characters (has {actual})")]
    TooShort { min: usize, actual: usize },

    #[error("contains restricted words: {}", .words.join(","))]
    ContainsRestrictedWords { words: Vec<String> },
}

/// A pure predicate over a field value.
pub trait ValidatorRule {
    /// Id the rule is registered under.
    fn id(&self) -> ValidatorId;

    /// `Ok(())` on pass, the failure payload otherwise.
    fn validate(&self, value: &FieldValue) -> Result<(), ValidationError>;
}

/// Fails on `Null` and empty text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl ValidatorRule for Required {
    fn id(&self) -> ValidatorId {
        ValidatorId::REQUIRED
    }

    fn validate(&self, value: &FieldValue) -> Result<(), ValidationError> {
        if value.is_empty() {
            Err(ValidationError::MissingRequired)
        } else {
            Ok(())
        }
    }
}

/// Fails on non-empty text shorter than `min` characters. Empty passes.
#[derive(Debug, Clone, Copy)]
pub struct MinLength(pub usize);

impl ValidatorRule for MinLength {
    fn id(&self) -> ValidatorId {
        ValidatorId::min_length(self.0)
    }

    fn validate(&self, value: &FieldValue) -> Result<(), ValidationError> {
        let Some(text) = value.as_text() else {
            return Ok(());
        };
        let actual = text.chars().count();
        if actual > 0 && actual < self.0 {
            Err(ValidationError::TooShort {
                min: self.0,
                actual,
            })
        } else {
            Ok(())
        }
    }
}

/// Adapter turning a closure into a [`ValidatorRule`].
pub struct FnValidator<F> {
    id: ValidatorId,
    check: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&FieldValue) -> Result<(), ValidationError>,
{
    pub fn new(id: ValidatorId, check: F) -> Self {
        Self { id, check }
    }
}

impl<F> ValidatorRule for FnValidator<F>
where
    F: Fn(&FieldValue) -> Result<(), ValidationError>,
{
    fn id(&self) -> ValidatorId {
        self.id.clone()
    }

    fn validate(&self, value: &FieldValue) -> Result<(), ValidationError> {
        (self.check)(value)
    }
}

/// Catalog of validators available to a form, keyed by id.
///
/// Built once per form and shared read-only by every field.
#[derive(Default)]
pub struct ValidatorRegistry {
    rules: AHashMap<ValidatorId, Rc<dyn ValidatorRule>>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.rules.keys().map(ValidatorId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("ValidatorRegistry").field("ids", &ids).finish()
    }
}

impl ValidatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `required`, `minLength(min_length)` and
    /// `restrictedWords` over `restricted`.
    #[must_use]
    pub fn with_defaults(min_length: usize, restricted: RestrictedWords) -> Self {
        Self::new()
            .with(Required)
            .with(MinLength(min_length))
            .with(restricted)
    }

    /// Register `rule` under its id (builder form).
    #[must_use]
    pub fn with(mut self, rule: impl ValidatorRule + 'static) -> Self {
        self.register(rule);
        self
    }

    /// Register `rule` under its id, replacing any previous rule with that id.
    pub fn register(&mut self, rule: impl ValidatorRule + 'static) {
        self.rules.insert(rule.id(), Rc::new(rule));
    }

    #[must_use]
    pub fn contains(&self, id: &ValidatorId) -> bool {
        self.rules.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &ValidatorId) -> Option<Rc<dyn ValidatorRule>> {
        self.rules.get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run the rule registered under `id` against `value`.
    ///
    /// Unknown ids and panicking rules both pass; a panic is also recorded as
    /// a validator fault.
    pub fn evaluate(
        &self,
        field: &str,
        id: &ValidatorId,
        value: &FieldValue,
    ) -> Result<(), ValidationError> {
        let Some(rule) = self.rules.get(id) else {
            tracing::warn!(field, validator = %id, "validator missing at evaluation");
            return Ok(());
        };
        match catch_unwind(AssertUnwindSafe(|| rule.validate(value))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                VALIDATOR_FAULTS_TOTAL.fetch_add(1, Ordering::Relaxed);
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(field, validator = %id, reason = %reason, "validator panicked; treating as pass");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_rejects_empty_only() {
        assert_eq!(
            Required.validate(&FieldValue::Null),
            Err(ValidationError::MissingRequired)
        );
        assert_eq!(
            Required.validate(&FieldValue::from("")),
            Err(ValidationError::MissingRequired)
        );
        assert!(Required.validate(&FieldValue::from("x")).is_ok());
        assert!(Required.validate(&FieldValue::from(false)).is_ok());
    }

    #[test]
    fn min_length_counts_chars_and_skips_empty() {
        let rule = MinLength(3);
        assert!(rule.validate(&FieldValue::from("")).is_ok());
        assert!(rule.validate(&FieldValue::Null).is_ok());
        assert!(rule.validate(&FieldValue::from("Zoë")).is_ok());
        assert_eq!(
            rule.validate(&FieldValue::from("Al")),
            Err(ValidationError::TooShort { min: 3, actual: 2 })
        );
        assert_eq!(rule.id().as_str(), "minLength(3)");
    }

    #[test]
    fn registry_defaults() {
        let reg = ValidatorRegistry::with_defaults(3, RestrictedWords::new(["foo"]));
        assert_eq!(reg.len(), 3);
        assert!(reg.contains(&ValidatorId::REQUIRED));
        assert!(reg.contains(&ValidatorId::min_length(3)));
        assert!(reg.contains(&ValidatorId::RESTRICTED_WORDS));
        assert!(!reg.contains(&ValidatorId::min_length(4)));
    }

    #[test]
    fn fn_validator_runs_closure() {
        let even = ValidatorId::new("even");
        let reg = ValidatorRegistry::new().with(FnValidator::new(even.clone(), |v| match v {
            FieldValue::Integer(n) if n % 2 != 0 => Err(ValidationError::MissingRequired),
            _ => Ok(()),
        }));
        assert!(reg.evaluate("n", &even, &FieldValue::from(2i64)).is_ok());
        assert!(reg.evaluate("n", &even, &FieldValue::from(3i64)).is_err());
    }

    #[test]
    fn panicking_rule_is_a_pass_and_counted() {
        let boom = ValidatorId::new("boom");
        let reg = ValidatorRegistry::new().with(FnValidator::new(boom.clone(), |_| {
            panic!("validator bug")
        }));
        let before = validator_faults_total();
        assert!(reg.evaluate("notes", &boom, &FieldValue::from("x")).is_ok());
        assert!(validator_faults_total() > before);
    }

    #[test]
    fn unknown_id_passes() {
        let reg = ValidatorRegistry::new();
        assert!(reg.evaluate("f", &ValidatorId::REQUIRED, &FieldValue::Null).is_ok());
    }

    #[test]
    fn restricted_error_display_joins_with_commas() {
        let err = ValidationError::ContainsRestrictedWords {
            words: vec!["foo".into(), "bar".into()],
        };
        assert_eq!(err.to_string(), "contains restricted words: foo,bar");
    }
}
