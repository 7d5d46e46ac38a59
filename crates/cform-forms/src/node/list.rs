use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use cform_runtime::{Notifier, Subscription};
use serde_json::Value;

use super::{ChildChange, FieldError, FormNode, GroupNode, NodeEvent, NodeStatus, ParentLink, join_path};
use crate::error::{FormError, Result};

/// Builds the item at a given index. Every item must have the same shape.
pub type ItemFactory = Rc<dyn Fn(usize) -> Result<GroupNode>>;

struct ListInner {
    key: String,
    items: Vec<GroupNode>,
    factory: ItemFactory,
    status: NodeStatus,
    batching: u32,
    value_dirty: bool,
    status_dirty: bool,
    parent: Option<ParentLink>,
    events: Notifier<NodeEvent>,
}

/// Ordered, append-only sequence of same-shape groups.
///
/// Items are addressed by index (`"phones.0.preferred"`). Each item owns
/// whatever per-item rules its factory wired, so items never share state.
#[derive(Clone)]
pub struct ListNode {
    inner: Rc<RefCell<ListInner>>,
}

impl fmt::Debug for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ListNode")
            .field("key", &inner.key)
            .field("len", &inner.items.len())
            .field("status", &inner.status)
            .finish()
    }
}

impl ListNode {
    /// An empty list whose items come from `factory`.
    #[must_use]
    pub fn new(key: impl Into<String>, factory: impl Fn(usize) -> Result<GroupNode> + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ListInner {
                key: key.into(),
                items: Vec::new(),
                factory: Rc::new(factory),
                status: NodeStatus::Valid,
                batching: 0,
                value_dirty: false,
                status_dirty: false,
                parent: None,
                events: Notifier::new(),
            })),
        }
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.inner.borrow().key.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn item(&self, index: usize) -> Option<GroupNode> {
        self.inner.borrow().items.get(index).cloned()
    }

    #[must_use]
    pub fn items(&self) -> Vec<GroupNode> {
        self.inner.borrow().items.clone()
    }

    /// Append a fresh item from the list's factory. Existing items are
    /// untouched.
    ///
    /// The new item must have the same keys as the existing items.
    pub fn append(&self) -> Result<GroupNode> {
        let factory = Rc::clone(&self.inner.borrow().factory);
        let index = self.len();
        let item = factory(index)?;
        if let Some(first) = self.item(0) {
            if first.keys() != item.keys() {
                return Err(FormError::shape(
                    self.key(),
                    format!("item {index} has keys {:?}, expected {:?}", item.keys(), first.keys()),
                ));
            }
        }
        let weak: Weak<RefCell<ListInner>> = Rc::downgrade(&self.inner);
        item.set_parent(Rc::new(move |change| {
            if let Some(inner) = weak.upgrade() {
                ListNode { inner }.on_child_change(change);
            }
        }));
        self.inner.borrow_mut().items.push(item.clone());
        tracing::trace!(list = %self.key(), index, "list item appended");
        self.on_child_change(ChildChange::Value);
        Ok(item)
    }

    /// Grow to at least `len` items. Returns how many were appended.
    ///
    /// Observers see a single value event for the whole growth.
    pub fn ensure_len(&self, len: usize) -> Result<usize> {
        self.batch(|| {
            let mut added = 0;
            while self.len() < len {
                self.append()?;
                added += 1;
            }
            Ok(added)
        })
    }

    /// Array snapshot, one object per item.
    #[must_use]
    pub fn value(&self) -> Value {
        Value::Array(self.items().iter().map(GroupNode::value).collect())
    }

    /// Assign every item from an array of the same length.
    ///
    /// Every item is checked before any is written.
    pub fn set_value(&self, value: &Value) -> Result<()> {
        self.check_value(value)?;
        self.write_value(value)
    }

    pub(crate) fn check_value(&self, value: &Value) -> Result<()> {
        let Value::Array(values) = value else {
            return Err(FormError::shape(self.key(), "expected an array"));
        };
        let items = self.items();
        if values.len() != items.len() {
            return Err(FormError::ListLengthMismatch {
                list: self.key(),
                expected: items.len(),
                actual: values.len(),
            });
        }
        items
            .iter()
            .zip(values)
            .try_for_each(|(item, v)| item.check_value(v))
    }

    pub(crate) fn write_value(&self, value: &Value) -> Result<()> {
        let Value::Array(values) = value else {
            return Err(FormError::shape(self.key(), "expected an array"));
        };
        let items = self.items();
        self.batch(|| {
            items
                .iter()
                .zip(values)
                .try_for_each(|(item, v)| item.write_value(v))
        })
    }

    #[must_use]
    pub fn status(&self) -> NodeStatus {
        self.inner.borrow().status
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status() == NodeStatus::Valid
    }

    #[must_use]
    pub fn errors(&self) -> Vec<(String, FieldError)> {
        let mut out = Vec::new();
        self.collect_errors("", &mut out);
        out
    }

    pub(crate) fn collect_errors(&self, path: &str, out: &mut Vec<(String, FieldError)>) {
        for (i, item) in self.items().into_iter().enumerate() {
            item.collect_errors(&join_path(path, &i.to_string()), out);
        }
    }

    /// Resolve a dotted path relative to this list (`"1.phoneNumber"`).
    pub fn find(&self, path: &str) -> Result<FormNode> {
        FormNode::List(self.clone()).find(path)
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&NodeEvent) + 'static) -> Subscription {
        self.inner.borrow().events.subscribe(callback)
    }

    pub(crate) fn set_parent(&self, link: ParentLink) {
        self.inner.borrow_mut().parent = Some(link);
    }

    fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.borrow_mut().batching += 1;
        let out = f();
        let flush = {
            let mut inner = self.inner.borrow_mut();
            inner.batching -= 1;
            if inner.batching > 0 {
                None
            } else {
                let change = if inner.value_dirty {
                    Some(ChildChange::Value)
                } else if inner.status_dirty {
                    Some(ChildChange::Status)
                } else {
                    None
                };
                inner.value_dirty = false;
                inner.status_dirty = false;
                change
            }
        };
        if let Some(change) = flush {
            self.emit(change);
        }
        out
    }

    fn on_child_change(&self, change: ChildChange) {
        let emit = {
            let mut inner = self.inner.borrow_mut();
            let status = NodeStatus::aggregate(inner.items.iter().map(GroupNode::status));
            let status_changed = status != inner.status;
            inner.status = status;
            if inner.batching > 0 {
                inner.value_dirty |= change == ChildChange::Value;
                inner.status_dirty |= status_changed;
                None
            } else if change == ChildChange::Value {
                Some(change)
            } else if status_changed {
                Some(ChildChange::Status)
            } else {
                None
            }
        };
        if let Some(change) = emit {
            self.emit(change);
        }
    }

    fn emit(&self, change: ChildChange) {
        let (parent, events) = {
            let inner = self.inner.borrow();
            (inner.parent.clone(), inner.events.clone())
        };
        if let Some(parent) = parent {
            parent(change);
        }
        let event = match change {
            ChildChange::Value => NodeEvent::Value(self.value()),
            ChildChange::Status => NodeEvent::Status(self.status()),
        };
        events.notify(&event);
    }
}
