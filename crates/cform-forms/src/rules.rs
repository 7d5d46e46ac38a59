//! Conditional rules: attach or detach a validator on target fields in
//! reaction to another node's value.
//!
//! # State Machine
//!
//! ```text
//!  Idle ──distinct value──► Active ──immediate──► Idle
//!                             │
//!                             └─debounced─► PendingCommit ──quiet elapsed──► Committed ──► Idle
//!                                              ▲      │
//!                                              └──────┘ distinct value (timer reset)
//! ```
//!
//! # Invariants
//!
//! 1. Every rule owns its own [`DistinctUntilChanged`] gate; a value whose
//!    serialized form equals the last admitted one is ignored.
//! 2. A debounced rule has at most one pending timer; a new admitted value
//!    cancels and replaces it.
//! 3. Applying an action only changes validator sets and re-evaluates the
//!    targets. That emits status events, never value events, so a rule can
//!    not re-trigger itself through its own targets.
//! 4. Dropping the rule unsubscribes it and cancels its pending timer.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use cform_runtime::{Debouncer, DistinctUntilChanged, Subscription, TimerQueue};
use serde_json::Value;
use web_time::Duration;

use crate::error::{FormError, Result};
use crate::node::{FieldNode, FormNode};
use crate::validator::ValidatorId;

/// What a rule does to its targets' validator sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Attach,
    Detach,
    /// Leave the targets alone.
    Hold,
}

/// When and how a rule acts on an admitted trigger value.
#[derive(Clone)]
pub enum ActivationPolicy {
    /// Decide from the value and act synchronously.
    Immediate(Rc<dyn Fn(&Value) -> RuleAction>),
    /// Act once the trigger has been quiet for `quiet`.
    Debounced { quiet: Duration, action: RuleAction },
}

impl fmt::Debug for ActivationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(_) => f.write_str("Immediate(..)"),
            Self::Debounced { quiet, action } => f
                .debug_struct("Debounced")
                .field("quiet", quiet)
                .field("action", action)
                .finish(),
        }
    }
}

impl ActivationPolicy {
    pub fn immediate(decide: impl Fn(&Value) -> RuleAction + 'static) -> Self {
        Self::Immediate(Rc::new(decide))
    }

    /// Apply `action` on every admitted value.
    #[must_use]
    pub fn always(action: RuleAction) -> Self {
        Self::immediate(move |_| action)
    }

    /// Attach while the trigger is `true`, detach otherwise.
    #[must_use]
    pub fn attach_when_true() -> Self {
        Self::immediate(|v| {
            if v.as_bool() == Some(true) {
                RuleAction::Attach
            } else {
                RuleAction::Detach
            }
        })
    }

    #[must_use]
    pub fn debounced(quiet: Duration, action: RuleAction) -> Self {
        Self::Debounced { quiet, action }
    }
}

/// Where a rule is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Idle,
    Active,
    PendingCommit,
    Committed,
}

struct RuleInner {
    name: String,
    validator: ValidatorId,
    targets: Vec<FieldNode>,
    gate: DistinctUntilChanged,
    policy: ActivationPolicy,
    state: RuleState,
    debouncer: Option<Debouncer>,
    applications: u64,
}

/// One trigger → targets binding.
///
/// The rule lives as long as this handle; keep it next to the nodes it
/// serves (see [`crate::GroupNode::retain`]).
pub struct ConditionalRule {
    inner: Rc<RefCell<RuleInner>>,
    _subscription: Subscription,
}

impl fmt::Debug for ConditionalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ConditionalRule")
            .field("name", &inner.name)
            .field("validator", &inner.validator)
            .field("targets", &inner.targets.len())
            .field("policy", &inner.policy)
            .field("state", &inner.state)
            .field("applications", &inner.applications)
            .finish()
    }
}

impl ConditionalRule {
    /// Bind `trigger`'s value stream to `validator` on `targets`.
    ///
    /// The trigger's current value is not replayed; the rule reacts to the
    /// next change. Fails with [`FormError::UnknownValidator`] if any target
    /// cannot attach `validator`.
    pub fn new(
        name: impl Into<String>,
        trigger: &FormNode,
        targets: Vec<FieldNode>,
        validator: ValidatorId,
        policy: ActivationPolicy,
        timers: &TimerQueue,
    ) -> Result<Self> {
        if targets.iter().any(|t| !t.supports(&validator)) {
            return Err(FormError::UnknownValidator(validator));
        }
        let debouncer = match &policy {
            ActivationPolicy::Debounced { quiet, .. } => Some(Debouncer::new(timers, *quiet)),
            ActivationPolicy::Immediate(_) => None,
        };
        let inner = Rc::new(RefCell::new(RuleInner {
            name: name.into(),
            validator,
            targets,
            gate: DistinctUntilChanged::new(),
            policy,
            state: RuleState::Idle,
            debouncer,
            applications: 0,
        }));
        let weak = Rc::downgrade(&inner);
        let subscription = trigger.on_value(move |value| {
            if let Some(inner) = weak.upgrade() {
                on_trigger(&inner, value);
            }
        });
        Ok(Self {
            inner,
            _subscription: subscription,
        })
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    #[must_use]
    pub fn state(&self) -> RuleState {
        self.inner.borrow().state
    }

    /// How many times an attach/detach was applied to the targets.
    #[must_use]
    pub fn applications(&self) -> u64 {
        self.inner.borrow().applications
    }

    /// How many pending commits were replaced by a newer value.
    #[must_use]
    pub fn resets(&self) -> u64 {
        self.inner.borrow().debouncer.as_ref().map_or(0, Debouncer::resets)
    }

    /// Trigger values ignored as repeats.
    #[must_use]
    pub fn suppressed(&self) -> u64 {
        self.inner.borrow().gate.suppressed()
    }

    /// Whether a debounced commit is waiting for its quiet window.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner
            .borrow()
            .debouncer
            .as_ref()
            .is_some_and(Debouncer::is_pending)
    }

    /// Drop a pending commit. Returns `true` if one was pending.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        let cancelled = inner.debouncer.as_ref().is_some_and(Debouncer::cancel);
        if cancelled {
            inner.state = RuleState::Idle;
        }
        cancelled
    }
}

fn on_trigger(inner: &Rc<RefCell<RuleInner>>, value: &Value) {
    let immediate = {
        let mut rule = inner.borrow_mut();
        if !rule.gate.admit(value) {
            return;
        }
        rule.state = RuleState::Active;
        match &rule.policy {
            ActivationPolicy::Immediate(decide) => Some(Rc::clone(decide)),
            ActivationPolicy::Debounced { .. } => None,
        }
    };

    if let Some(decide) = immediate {
        apply(inner, decide(value));
        inner.borrow_mut().state = RuleState::Idle;
        return;
    }

    let weak: Weak<RefCell<RuleInner>> = Rc::downgrade(inner);
    let mut rule = inner.borrow_mut();
    rule.state = RuleState::PendingCommit;
    let ActivationPolicy::Debounced { action, .. } = &rule.policy else {
        return;
    };
    let action = *action;
    if let Some(debouncer) = &rule.debouncer {
        debouncer.trigger(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.borrow_mut().state = RuleState::Committed;
            apply(&inner, action);
            inner.borrow_mut().state = RuleState::Idle;
        });
    }
}

fn apply(inner: &Rc<RefCell<RuleInner>>, action: RuleAction) {
    if action == RuleAction::Hold {
        return;
    }
    let (name, validator, targets) = {
        let mut rule = inner.borrow_mut();
        rule.applications += 1;
        (rule.name.clone(), rule.validator.clone(), rule.targets.clone())
    };
    tracing::debug!(
        rule = %name,
        action = ?action,
        validator = %validator,
        targets = targets.len(),
        "conditional rule applied"
    );
    for target in &targets {
        match action {
            RuleAction::Attach => {
                if let Err(err) = target.attach(validator.clone()) {
                    tracing::warn!(rule = %name, field = %target.key(), error = %err, "attach failed");
                }
            }
            RuleAction::Detach => {
                target.detach(&validator);
            }
            RuleAction::Hold => {}
        }
    }
}
