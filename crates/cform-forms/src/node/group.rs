use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use cform_runtime::{Notifier, Subscription};
use serde_json::{Map, Value};

use super::{ChildChange, FieldError, FieldNode, FormNode, ListNode, NodeEvent, NodeStatus, ParentLink, join_path};
use crate::error::{FormError, Result};

struct GroupInner {
    key: String,
    children: Vec<(String, FormNode)>,
    status: NodeStatus,
    /// Nesting depth of [`GroupNode::batch`].
    batching: u32,
    value_dirty: bool,
    status_dirty: bool,
    parent: Option<ParentLink>,
    events: Notifier<NodeEvent>,
    /// Guards whose lifetime is tied to this group (rule subscriptions).
    retained: Vec<Box<dyn Any>>,
}

/// Fixed-shape composite of named child nodes.
///
/// Children keep declaration order; status is the aggregate of the
/// children's cached statuses.
#[derive(Clone)]
pub struct GroupNode {
    inner: Rc<RefCell<GroupInner>>,
}

impl fmt::Debug for GroupNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let keys: Vec<&str> = inner.children.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("GroupNode")
            .field("key", &inner.key)
            .field("children", &keys)
            .field("status", &inner.status)
            .finish()
    }
}

impl GroupNode {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(GroupInner {
                key: key.into(),
                children: Vec::new(),
                status: NodeStatus::Valid,
                batching: 0,
                value_dirty: false,
                status_dirty: false,
                parent: None,
                events: Notifier::new(),
                retained: Vec::new(),
            })),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_child(self, child: impl Into<FormNode>) -> Result<Self> {
        self.insert(child)?;
        Ok(self)
    }

    /// Add a child under its own key.
    pub fn insert(&self, child: impl Into<FormNode>) -> Result<()> {
        let child = child.into();
        let key = child.key();
        if self.get(&key).is_some() {
            return Err(FormError::DuplicateKey { key });
        }
        let weak: Weak<RefCell<GroupInner>> = Rc::downgrade(&self.inner);
        child.set_parent(Rc::new(move |change| {
            if let Some(inner) = weak.upgrade() {
                GroupNode { inner }.on_child_change(change);
            }
        }));
        self.inner.borrow_mut().children.push((key, child));
        self.on_child_change(ChildChange::Status);
        Ok(())
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.inner.borrow().key.clone()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<FormNode> {
        self.inner
            .borrow()
            .children
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, n)| n.clone())
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<FieldNode> {
        self.get(key).and_then(|n| n.as_field().cloned())
    }

    #[must_use]
    pub fn group(&self, key: &str) -> Option<GroupNode> {
        self.get(key).and_then(|n| n.as_group().cloned())
    }

    #[must_use]
    pub fn list(&self, key: &str) -> Option<ListNode> {
        self.get(key).and_then(|n| n.as_list().cloned())
    }

    /// Child keys in declaration order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().children.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Direct field children, in declaration order.
    #[must_use]
    pub fn fields(&self) -> Vec<FieldNode> {
        self.inner
            .borrow()
            .children
            .iter()
            .filter_map(|(_, n)| n.as_field().cloned())
            .collect()
    }

    /// Resolve a dotted path relative to this group.
    pub fn find(&self, path: &str) -> Result<FormNode> {
        FormNode::Group(self.clone()).find(path)
    }

    /// Object snapshot, keys in declaration order.
    #[must_use]
    pub fn value(&self) -> Value {
        let children: Vec<(String, FormNode)> = self.inner.borrow().children.clone();
        let mut map = Map::with_capacity(children.len());
        for (k, n) in children {
            map.insert(k, n.value());
        }
        Value::Object(map)
    }

    /// Assign every child from an object holding exactly this group's keys.
    ///
    /// The whole object is checked before anything is written, so a rejected
    /// assignment leaves every child as it was. Observers see one value event
    /// for the whole assignment.
    pub fn set_value(&self, value: &Value) -> Result<()> {
        self.check_value(value)?;
        self.write_value(value)
    }

    /// Shape and kind check of `value` against this group, without writing.
    pub(crate) fn check_value(&self, value: &Value) -> Result<()> {
        let Value::Object(map) = value else {
            return Err(FormError::shape(self.key(), "expected an object"));
        };
        let children: Vec<(String, FormNode)> = self.inner.borrow().children.clone();
        if let Some((missing, _)) = children.iter().find(|(k, _)| !map.contains_key(k)) {
            return Err(FormError::shape(self.key(), format!("missing key `{missing}`")));
        }
        if let Some(extra) = map.keys().find(|k| !children.iter().any(|(c, _)| c == *k)) {
            return Err(FormError::shape(self.key(), format!("unknown key `{extra}`")));
        }
        children
            .iter()
            .try_for_each(|(k, n)| n.check_value(&map[k.as_str()]))
    }

    /// Write a value that already passed [`check_value`](Self::check_value).
    pub(crate) fn write_value(&self, value: &Value) -> Result<()> {
        let Value::Object(map) = value else {
            return Err(FormError::shape(self.key(), "expected an object"));
        };
        let children: Vec<(String, FormNode)> = self.inner.borrow().children.clone();
        self.batch(|| {
            children.iter().try_for_each(|(k, n)| match map.get(k.as_str()) {
                Some(v) => n.write_value(v),
                None => Err(FormError::shape(self.key(), format!("missing key `{k}`"))),
            })
        })
    }

    /// Run `f` with upward notifications coalesced into at most one value
    /// event (or one status event) when the outermost batch ends.
    pub(crate) fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.borrow_mut().batching += 1;
        let out = f();
        let flush = {
            let mut inner = self.inner.borrow_mut();
            inner.batching -= 1;
            if inner.batching == 0 {
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
            } else {
                None
            }
        };
        if let Some(change) = flush {
            self.emit(change);
        }
        out
    }

    /// Cached aggregate status.
    #[must_use]
    pub fn status(&self) -> NodeStatus {
        self.inner.borrow().status
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status() == NodeStatus::Valid
    }

    /// Every failing validator below this group, keyed by path.
    #[must_use]
    pub fn errors(&self) -> Vec<(String, FieldError)> {
        let mut out = Vec::new();
        self.collect_errors("", &mut out);
        out
    }

    pub(crate) fn collect_errors(&self, path: &str, out: &mut Vec<(String, FieldError)>) {
        let children: Vec<(String, FormNode)> = self.inner.borrow().children.clone();
        for (k, n) in children {
            n.collect_errors(&join_path(path, &k), out);
        }
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&NodeEvent) + 'static) -> Subscription {
        self.inner.borrow().events.subscribe(callback)
    }

    /// Keep `guard` alive for as long as this group exists.
    pub fn retain(&self, guard: impl Any) {
        self.inner.borrow_mut().retained.push(Box::new(guard));
    }

    pub(crate) fn set_parent(&self, link: ParentLink) {
        self.inner.borrow_mut().parent = Some(link);
    }

    fn on_child_change(&self, change: ChildChange) {
        let emit = {
            let mut inner = self.inner.borrow_mut();
            let status = NodeStatus::aggregate(inner.children.iter().map(|(_, n)| n.status()));
            let status_changed = status != inner.status;
            inner.status = status;
            if inner.batching > 0 {
                inner.value_dirty |= change == ChildChange::Value;
                inner.status_dirty |= status_changed;
                None
            } else if change == ChildChange::Value {
                Some(ChildChange::Value)
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
