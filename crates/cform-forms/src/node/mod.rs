//! The form tree.
//!
//! # Architecture
//!
//! Every node is a cheap handle around `Rc<RefCell<..>>`. A child holds a
//! [`ParentLink`] closure capturing a `Weak` pointer to its parent, so the
//! tree owns downward only and dropping the root frees everything.
//!
//! A write flows upward synchronously:
//!
//! ```text
//! FieldNode::set_value
//!   -> evaluate validators, cache status + errors
//!   -> parent link (group/list recomputes aggregate status, emits upward)
//!   -> value observers (conditional rules)
//! ```
//!
//! # Invariants
//!
//! 1. A field is `Invalid` iff at least one of its static or dynamic
//!    validators currently fails.
//! 2. A group or list is `Invalid` iff any child is `Invalid`.
//! 3. `status()` / `is_valid()` never run validators.
//! 4. Re-evaluation after attach/detach emits [`NodeEvent::Status`] only;
//!    value observers are not re-triggered by revalidation.
//! 5. No `RefCell` borrow is held while a parent link or observer runs.

mod field;
mod group;
mod list;

pub use field::FieldNode;
pub use group::GroupNode;
pub use list::{ItemFactory, ListNode};

use std::fmt;
use std::rc::Rc;

use cform_runtime::Subscription;
use serde_json::Value;

use crate::error::{FormError, Result};
use crate::validator::{ValidationError, ValidatorId};

/// Validity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Valid,
    Invalid,
    /// Transient while a write is being evaluated.
    Pending,
}

impl NodeStatus {
    /// Aggregate child statuses: any invalid wins, then any pending.
    pub(crate) fn aggregate(statuses: impl IntoIterator<Item = NodeStatus>) -> Self {
        let mut out = Self::Valid;
        for s in statuses {
            match s {
                Self::Invalid => return Self::Invalid,
                Self::Pending => out = Self::Pending,
                Self::Valid => {}
            }
        }
        out
    }
}

/// What a node tells its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// The node's value changed; carries the new JSON snapshot.
    Value(Value),
    /// The node was re-evaluated without a value change.
    Status(NodeStatus),
}

/// One failing validator on a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub validator: ValidatorId,
    pub error: ValidationError,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.validator, self.error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildChange {
    Value,
    Status,
}

/// Callback a child uses to tell its parent it changed.
pub(crate) type ParentLink = Rc<dyn Fn(ChildChange)>;

/// Any node of the form tree.
#[derive(Clone)]
pub enum FormNode {
    Field(FieldNode),
    Group(GroupNode),
    List(ListNode),
}

impl fmt::Debug for FormNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(n) => fmt::Debug::fmt(n, f),
            Self::Group(n) => fmt::Debug::fmt(n, f),
            Self::List(n) => fmt::Debug::fmt(n, f),
        }
    }
}

impl From<FieldNode> for FormNode {
    fn from(n: FieldNode) -> Self {
        Self::Field(n)
    }
}

impl From<GroupNode> for FormNode {
    fn from(n: GroupNode) -> Self {
        Self::Group(n)
    }
}

impl From<ListNode> for FormNode {
    fn from(n: ListNode) -> Self {
        Self::List(n)
    }
}

impl FormNode {
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Field(n) => n.key(),
            Self::Group(n) => n.key(),
            Self::List(n) => n.key(),
        }
    }

    /// Cached status; O(1).
    #[must_use]
    pub fn status(&self) -> NodeStatus {
        match self {
            Self::Field(n) => n.status(),
            Self::Group(n) => n.status(),
            Self::List(n) => n.status(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status() == NodeStatus::Valid
    }

    /// JSON snapshot of the node's value.
    #[must_use]
    pub fn value(&self) -> Value {
        match self {
            Self::Field(n) => n.json(),
            Self::Group(n) => n.value(),
            Self::List(n) => n.value(),
        }
    }

    /// Assign from a JSON snapshot of the same shape.
    pub fn set_value(&self, value: &Value) -> Result<()> {
        match self {
            Self::Field(n) => n.set_json(value),
            Self::Group(n) => n.set_value(value),
            Self::List(n) => n.set_value(value),
        }
    }

    /// Check `value` against this node's shape and kinds without writing.
    pub(crate) fn check_value(&self, value: &Value) -> Result<()> {
        match self {
            Self::Field(n) => n.check_json(value),
            Self::Group(n) => n.check_value(value),
            Self::List(n) => n.check_value(value),
        }
    }

    pub(crate) fn write_value(&self, value: &Value) -> Result<()> {
        match self {
            Self::Field(n) => n.set_json(value),
            Self::Group(n) => n.write_value(value),
            Self::List(n) => n.write_value(value),
        }
    }

    /// Observe every event on this node.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&NodeEvent) + 'static) -> Subscription {
        match self {
            Self::Field(n) => n.subscribe(callback),
            Self::Group(n) => n.subscribe(callback),
            Self::List(n) => n.subscribe(callback),
        }
    }

    /// Observe value changes only.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn on_value(&self, callback: impl Fn(&Value) + 'static) -> Subscription {
        self.subscribe(move |event| {
            if let NodeEvent::Value(v) = event {
                callback(v);
            }
        })
    }

    /// Every failing validator below this node, keyed by dotted path.
    #[must_use]
    pub fn errors(&self) -> Vec<(String, FieldError)> {
        let mut out = Vec::new();
        self.collect_errors("", &mut out);
        out
    }

    pub(crate) fn collect_errors(&self, path: &str, out: &mut Vec<(String, FieldError)>) {
        match self {
            Self::Field(n) => out.extend(n.errors().into_iter().map(|e| (path.to_string(), e))),
            Self::Group(n) => n.collect_errors(path, out),
            Self::List(n) => n.collect_errors(path, out),
        }
    }

    pub(crate) fn set_parent(&self, link: ParentLink) {
        match self {
            Self::Field(n) => n.set_parent(link),
            Self::Group(n) => n.set_parent(link),
            Self::List(n) => n.set_parent(link),
        }
    }

    /// Resolve a dotted path (`"address.city"`, `"phones.0.preferred"`).
    pub fn find(&self, path: &str) -> Result<FormNode> {
        let mut node = self.clone();
        if path.is_empty() {
            return Ok(node);
        }
        for segment in path.split('.') {
            let next = match &node {
                Self::Group(g) => g.get(segment),
                Self::List(l) => segment.parse::<usize>().ok().and_then(|i| l.item(i)).map(Self::Group),
                Self::Field(_) => None,
            };
            node = next.ok_or_else(|| FormError::NoSuchPath {
                path: path.to_string(),
            })?;
        }
        Ok(node)
    }

    #[must_use]
    pub fn as_field(&self) -> Option<&FieldNode> {
        match self {
            Self::Field(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_group(&self) -> Option<&GroupNode> {
        match self {
            Self::Group(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&ListNode> {
        match self {
            Self::List(n) => Some(n),
            _ => None,
        }
    }
}

pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
