use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use cform_runtime::{Notifier, Subscription};
use serde_json::Value;

use super::{ChildChange, FieldError, NodeEvent, NodeStatus, ParentLink};
use crate::error::{FormError, Result};
use crate::validator::{ValidationError, ValidatorId, ValidatorRegistry};
use crate::value::{FieldKind, FieldValue, ValueAdapter};

struct FieldInner {
    key: String,
    kind: FieldKind,
    value: FieldValue,
    /// Always-on validators, in declaration order.
    validators: Vec<ValidatorId>,
    /// Runtime-attached validators, in attach order, no duplicates.
    dynamic: Vec<ValidatorId>,
    status: NodeStatus,
    errors: Vec<FieldError>,
    registry: Rc<ValidatorRegistry>,
    adapter: Option<Rc<dyn ValueAdapter>>,
    parent: Option<ParentLink>,
    events: Notifier<NodeEvent>,
}

impl FieldInner {
    /// `validators ∪ dynamic`, static first, each id once.
    fn active(&self) -> Vec<ValidatorId> {
        let mut ids = self.validators.clone();
        ids.extend(
            self.dynamic
                .iter()
                .filter(|id| !self.validators.contains(id))
                .cloned(),
        );
        ids
    }
}

/// Leaf node holding one typed value and its validity.
///
/// Cloning a `FieldNode` creates a new handle to the **same** field.
#[derive(Clone)]
pub struct FieldNode {
    inner: Rc<RefCell<FieldInner>>,
}

impl fmt::Debug for FieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("FieldNode")
            .field("key", &inner.key)
            .field("value", &inner.value)
            .field("status", &inner.status)
            .field("validators", &inner.validators)
            .field("dynamic", &inner.dynamic)
            .finish()
    }
}

impl FieldNode {
    /// Create a field with a `Null` value and no validators.
    #[must_use]
    pub fn new(key: impl Into<String>, kind: FieldKind, registry: &Rc<ValidatorRegistry>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(FieldInner {
                key: key.into(),
                kind,
                value: FieldValue::Null,
                validators: Vec::new(),
                dynamic: Vec::new(),
                status: NodeStatus::Valid,
                errors: Vec::new(),
                registry: Rc::clone(registry),
                adapter: None,
                parent: None,
                events: Notifier::new(),
            })),
        }
    }

    /// Use `adapter` for [`set_external`](Self::set_external) /
    /// [`external`](Self::external) and for coercing stored strings.
    #[must_use]
    pub fn with_adapter(self, adapter: impl ValueAdapter + 'static) -> Self {
        self.inner.borrow_mut().adapter = Some(Rc::new(adapter));
        self
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.inner.borrow().key.clone()
    }

    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.inner.borrow().kind
    }

    #[must_use]
    pub fn value(&self) -> FieldValue {
        self.inner.borrow().value.clone()
    }

    /// JSON snapshot of the value.
    #[must_use]
    pub fn json(&self) -> Value {
        self.inner.borrow().value.to_json()
    }

    /// Cached status; never runs validators.
    #[must_use]
    pub fn status(&self) -> NodeStatus {
        self.inner.borrow().status
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status() == NodeStatus::Valid
    }

    /// Current failures, static validators first.
    #[must_use]
    pub fn errors(&self) -> Vec<FieldError> {
        self.inner.borrow().errors.clone()
    }

    /// The current failure for `id`, if it is failing.
    #[must_use]
    pub fn error(&self, id: &ValidatorId) -> Option<ValidationError> {
        self.inner
            .borrow()
            .errors
            .iter()
            .find(|e| &e.validator == id)
            .map(|e| e.error.clone())
    }

    #[must_use]
    pub fn has_error(&self, id: &ValidatorId) -> bool {
        self.error(id).is_some()
    }

    #[must_use]
    pub fn validators(&self) -> Vec<ValidatorId> {
        self.inner.borrow().validators.clone()
    }

    #[must_use]
    pub fn dynamic_validators(&self) -> Vec<ValidatorId> {
        self.inner.borrow().dynamic.clone()
    }

    /// Whether `id` is attached, statically or dynamically.
    #[must_use]
    pub fn has_validator(&self, id: &ValidatorId) -> bool {
        let inner = self.inner.borrow();
        inner.validators.contains(id) || inner.dynamic.contains(id)
    }

    /// Whether `id` is registered, i.e. could be attached to this field.
    #[must_use]
    pub fn supports(&self, id: &ValidatorId) -> bool {
        self.inner.borrow().registry.contains(id)
    }

    /// Replace the value, re-run validators, notify the parent, then
    /// notify observers.
    pub fn set_value(&self, value: impl Into<FieldValue>) -> Result<()> {
        let value = value.into();
        {
            let mut inner = self.inner.borrow_mut();
            inner.kind.check(&inner.key, &value)?;
            inner.value = value;
            inner.status = NodeStatus::Pending;
        }
        self.evaluate();
        self.emit(ChildChange::Value);
        Ok(())
    }

    /// Assign from a stored JSON value, coercing to the field's kind.
    pub fn set_json(&self, json: &Value) -> Result<()> {
        let value = {
            let inner = self.inner.borrow();
            inner.kind.coerce(&inner.key, json, inner.adapter.as_deref())?
        };
        self.set_value(value)
    }

    /// Whether [`set_json`](Self::set_json) would accept `json`.
    pub(crate) fn check_json(&self, json: &Value) -> Result<()> {
        let inner = self.inner.borrow();
        inner.kind.coerce(&inner.key, json, inner.adapter.as_deref()).map(drop)
    }

    /// Assign from input text through the field's adapter.
    ///
    /// Without an adapter the text is stored as-is (empty text reads as
    /// `Null` for non-text kinds).
    pub fn set_external(&self, text: &str) -> Result<()> {
        let value = {
            let inner = self.inner.borrow();
            match (&inner.adapter, inner.kind) {
                (Some(a), _) => a.to_internal(text),
                (None, FieldKind::Text) => FieldValue::from(text),
                (None, _) if text.is_empty() => FieldValue::Null,
                (None, _) => FieldValue::from(text),
            }
        };
        self.set_value(value)
    }

    /// Render the value for an input through the field's adapter.
    #[must_use]
    pub fn external(&self) -> String {
        let inner = self.inner.borrow();
        match (&inner.adapter, &inner.value) {
            (Some(a), v) => a.to_external(v),
            (None, FieldValue::Null) => String::new(),
            (None, FieldValue::Text(s)) => s.clone(),
            (None, v) => v.to_json().to_string(),
        }
    }

    /// Add an always-on validator. Idempotent.
    pub fn add_validator(&self, id: ValidatorId) -> Result<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.registry.contains(&id) {
                return Err(FormError::UnknownValidator(id));
            }
            if !inner.validators.contains(&id) {
                inner.validators.push(id);
            }
        }
        self.revalidate();
        Ok(())
    }

    /// Attach a runtime validator and re-evaluate.
    ///
    /// Returns `true` if it was newly attached. Attaching an attached id is a
    /// no-op apart from the re-evaluation.
    pub fn attach(&self, id: ValidatorId) -> Result<bool> {
        let added = {
            let mut inner = self.inner.borrow_mut();
            if !inner.registry.contains(&id) {
                return Err(FormError::UnknownValidator(id));
            }
            if inner.dynamic.contains(&id) {
                false
            } else {
                inner.dynamic.push(id);
                true
            }
        };
        self.revalidate();
        Ok(added)
    }

    /// Detach a runtime validator and re-evaluate.
    ///
    /// Returns `true` if it was attached. Static validators are unaffected.
    pub fn detach(&self, id: &ValidatorId) -> bool {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let before = inner.dynamic.len();
            inner.dynamic.retain(|d| d != id);
            inner.dynamic.len() < before
        };
        self.revalidate();
        removed
    }

    /// Re-run every attached validator against the unchanged value and
    /// report the result upward as a status change.
    pub fn revalidate(&self) {
        self.evaluate();
        self.emit(ChildChange::Status);
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&NodeEvent) + 'static) -> Subscription {
        self.inner.borrow().events.subscribe(callback)
    }

    pub(crate) fn set_parent(&self, link: ParentLink) {
        self.inner.borrow_mut().parent = Some(link);
    }

    fn evaluate(&self) {
        let (key, value, ids, registry) = {
            let inner = self.inner.borrow();
            (
                inner.key.clone(),
                inner.value.clone(),
                inner.active(),
                Rc::clone(&inner.registry),
            )
        };
        let errors: Vec<FieldError> = ids
            .into_iter()
            .filter_map(|id| {
                registry
                    .evaluate(&key, &id, &value)
                    .err()
                    .map(|error| FieldError { validator: id, error })
            })
            .collect();
        let mut inner = self.inner.borrow_mut();
        inner.status = if errors.is_empty() {
            NodeStatus::Valid
        } else {
            NodeStatus::Invalid
        };
        inner.errors = errors;
    }

    fn emit(&self, change: ChildChange) {
        let (parent, events, event) = {
            let inner = self.inner.borrow();
            let event = match change {
                ChildChange::Value => NodeEvent::Value(inner.value.to_json()),
                ChildChange::Status => NodeEvent::Status(inner.status),
            };
            (inner.parent.clone(), inner.events.clone(), event)
        };
        if let Some(parent) = parent {
            parent(change);
        }
        events.notify(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restricted::RestrictedWords;
    use crate::validator::{FnValidator, MinLength, Required};
    use crate::value::IsoDateAdapter;
    use chrono::NaiveDate;
    use std::cell::Cell;

    fn registry() -> Rc<ValidatorRegistry> {
        Rc::new(ValidatorRegistry::with_defaults(3, RestrictedWords::new(["foo", "bar"])))
    }

    #[test]
    fn new_field_is_valid_and_null() {
        let f = FieldNode::new("firstName", FieldKind::Text, &registry());
        assert!(f.is_valid());
        assert_eq!(f.value(), FieldValue::Null);
        assert!(f.errors().is_empty());
    }

    #[test]
    fn static_validators_evaluate_on_add_and_write() {
        let f = FieldNode::new("firstName", FieldKind::Text, &registry());
        f.add_validator(ValidatorId::REQUIRED).unwrap();
        f.add_validator(ValidatorId::min_length(3)).unwrap();
        assert_eq!(f.status(), NodeStatus::Invalid);
        assert!(f.has_error(&ValidatorId::REQUIRED));

        f.set_value("Al").unwrap();
        assert_eq!(
            f.errors(),
            vec![FieldError {
                validator: ValidatorId::min_length(3),
                error: ValidationError::TooShort { min: 3, actual: 2 },
            }]
        );

        f.set_value("Alma").unwrap();
        assert!(f.is_valid());
    }

    #[test]
    fn attach_detach_toggles_status() {
        let f = FieldNode::new("phoneNumber", FieldKind::Text, &registry());
        assert!(f.is_valid());
        assert!(f.attach(ValidatorId::REQUIRED).unwrap());
        assert_eq!(f.status(), NodeStatus::Invalid);
        assert!(f.detach(&ValidatorId::REQUIRED));
        assert!(f.is_valid());
        assert!(!f.detach(&ValidatorId::REQUIRED));
    }

    #[test]
    fn attach_twice_is_idempotent() {
        let f = FieldNode::new("city", FieldKind::Text, &registry());
        assert!(f.attach(ValidatorId::REQUIRED).unwrap());
        assert!(!f.attach(ValidatorId::REQUIRED).unwrap());
        assert_eq!(f.dynamic_validators(), vec![ValidatorId::REQUIRED]);
        assert_eq!(f.errors().len(), 1);
    }

    #[test]
    fn dynamic_duplicate_of_static_evaluates_once() {
        let f = FieldNode::new("lastName", FieldKind::Text, &registry());
        f.add_validator(ValidatorId::REQUIRED).unwrap();
        f.attach(ValidatorId::REQUIRED).unwrap();
        assert_eq!(f.errors().len(), 1);
        f.detach(&ValidatorId::REQUIRED);
        assert!(f.has_validator(&ValidatorId::REQUIRED));
        assert_eq!(f.status(), NodeStatus::Invalid);
    }

    #[test]
    fn unknown_validator_is_rejected() {
        let f = FieldNode::new("x", FieldKind::Text, &registry());
        let err = f.attach(ValidatorId::min_length(9)).unwrap_err();
        assert!(matches!(err, FormError::UnknownValidator(_)));
        assert!(f.add_validator(ValidatorId::new("nope")).is_err());
    }

    #[test]
    fn kind_mismatch_leaves_value_untouched() {
        let f = FieldNode::new("preferred", FieldKind::Bool, &registry());
        f.set_value(true).unwrap();
        assert!(f.set_value("yes").is_err());
        assert_eq!(f.value(), FieldValue::Bool(true));
    }

    #[test]
    fn observers_see_value_then_status_events() {
        let f = FieldNode::new("notes", FieldKind::Text, &registry());
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _sub = f.subscribe(move |e| l.borrow_mut().push(e.clone()));

        f.set_value("hello").unwrap();
        f.attach(ValidatorId::RESTRICTED_WORDS).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                NodeEvent::Value(Value::String("hello".into())),
                NodeEvent::Status(NodeStatus::Valid),
            ]
        );
    }

    #[test]
    fn parent_link_runs_before_observers() {
        let f = FieldNode::new("city", FieldKind::Text, &registry());
        let order = Rc::new(RefCell::new(Vec::new()));
        let o = Rc::clone(&order);
        f.set_parent(Rc::new(move |_| o.borrow_mut().push("parent")));
        let o = Rc::clone(&order);
        let _sub = f.subscribe(move |_| o.borrow_mut().push("observer"));
        f.set_value("Gleeberg City").unwrap();
        assert_eq!(*order.borrow(), vec!["parent", "observer"]);
    }

    #[test]
    fn panicking_validator_counts_as_pass() {
        let boom = ValidatorId::new("boom");
        let reg = Rc::new(
            ValidatorRegistry::new()
                .with(Required)
                .with(FnValidator::new(boom.clone(), |_| panic!("bad rule"))),
        );
        let f = FieldNode::new("notes", FieldKind::Text, &reg);
        f.add_validator(boom).unwrap();
        f.set_value("anything").unwrap();
        assert!(f.is_valid());
        f.attach(ValidatorId::REQUIRED).unwrap();
        f.set_value("").unwrap();
        assert_eq!(f.errors().len(), 1);
    }

    #[test]
    fn date_adapter_bridges_text() {
        let f = FieldNode::new("dateOfBirth", FieldKind::Date, &registry()).with_adapter(IsoDateAdapter);
        f.set_external("1994-05-05").unwrap();
        assert_eq!(
            f.value(),
            FieldValue::Date(NaiveDate::from_ymd_opt(1994, 5, 5).unwrap())
        );
        assert_eq!(f.external(), "1994-05-05");
        f.set_external("not a date").unwrap();
        assert_eq!(f.value(), FieldValue::Null);
        assert_eq!(f.external(), "");
    }

    #[test]
    fn set_json_coerces() {
        let f = FieldNode::new("favoritesRanking", FieldKind::Integer, &registry());
        f.set_json(&serde_json::json!(2)).unwrap();
        assert_eq!(f.value(), FieldValue::Integer(2));
        assert!(f.set_json(&serde_json::json!("two")).is_err());
    }

    #[test]
    fn min_length_registry_only_has_configured_min() {
        let reg = Rc::new(ValidatorRegistry::new().with(MinLength(5)));
        let f = FieldNode::new("x", FieldKind::Text, &reg);
        assert!(f.add_validator(ValidatorId::min_length(5)).is_ok());
        assert!(f.add_validator(ValidatorId::min_length(3)).is_err());
    }

    #[test]
    fn evaluation_runs_once_per_write() {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let counted = ValidatorId::new("counted");
        let reg = Rc::new(ValidatorRegistry::new().with(FnValidator::new(counted.clone(), move |_| {
            c.set(c.get() + 1);
            Ok(())
        })));
        let f = FieldNode::new("x", FieldKind::Text, &reg);
        f.add_validator(counted).unwrap();
        let after_add = count.get();
        f.set_value("a").unwrap();
        assert_eq!(count.get(), after_add + 1);
        assert!(f.is_valid());
        assert!(f.is_valid());
        assert_eq!(count.get(), after_add + 1);
    }
}
