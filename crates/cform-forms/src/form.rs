//! The contact edit form: tree construction and rule wiring.
//!
//! ```text
//! root
//! ├── id, icon, personal
//! ├── firstName        required, minLength(n)
//! ├── lastName         required
//! ├── dateOfBirth      ISO date adapter
//! ├── favoritesRanking
//! ├── notes            restrictedWords
//! ├── phones[i]
//! │   ├── phoneNumber  required while preferred == true
//! │   ├── phoneType
//! │   └── preferred
//! └── address
//!     └── streetAddress, city, state, postalCode, addressType
//!                      required, suspended while the address is being edited
//! ```
//!
//! Every phone item carries its own preferred rule, created by the list's
//! item factory, so items appended later behave exactly like the first.
//!
//! The address group drives two rules from the same value stream: an
//! immediate relax that detaches `required` from every address field, and a
//! debounced commit that attaches it again after the quiet period.

use std::rc::Rc;

use cform_runtime::TimerQueue;
use serde_json::Value;

use crate::config::FormConfig;
use crate::contact::{AddressType, Contact, PhoneType};
use crate::error::{FormError, Result};
use crate::node::{FieldError, FieldNode, FormNode, GroupNode, ListNode, NodeStatus};
use crate::restricted::RestrictedWords;
use crate::rules::{ActivationPolicy, ConditionalRule, RuleAction};
use crate::validator::{ValidatorId, ValidatorRegistry};
use crate::value::{FieldKind, IsoDateAdapter};

const ADDRESS_FIELDS: [(&str, FieldKind); 5] = [
    ("streetAddress", FieldKind::Text),
    ("city", FieldKind::Text),
    ("state", FieldKind::Text),
    ("postalCode", FieldKind::Text),
    ("addressType", FieldKind::Choice(AddressType::OPTIONS)),
];

/// A fully wired contact form.
#[derive(Debug)]
pub struct ContactForm {
    root: GroupNode,
    address: GroupNode,
    phones: ListNode,
    timers: TimerQueue,
    config: FormConfig,
    registry: Rc<ValidatorRegistry>,
    address_relax: ConditionalRule,
    address_commit: ConditionalRule,
}

impl ContactForm {
    /// A form for a new contact, with `initial_phone_slots` empty phones.
    pub fn new_blank(config: FormConfig, timers: &TimerQueue) -> Result<Self> {
        let form = Self::build(config, timers)?;
        form.phones.ensure_len(form.config.initial_phone_slots)?;
        tracing::debug!(phones = form.phones.len(), "blank contact form built");
        Ok(form)
    }

    /// A form populated from `contact`.
    ///
    /// The phone list is grown to the record's phone count before any value
    /// is assigned, so every phone gets a wired item.
    pub fn for_contact(contact: &Contact, config: FormConfig, timers: &TimerQueue) -> Result<Self> {
        let form = Self::build(config, timers)?;
        form.load(contact)?;
        tracing::debug!(id = %contact.id, phones = form.phones.len(), "contact form built");
        Ok(form)
    }

    fn build(config: FormConfig, timers: &TimerQueue) -> Result<Self> {
        config.validate()?;
        let registry = Rc::new(ValidatorRegistry::with_defaults(
            config.first_name_min_length,
            RestrictedWords::new(config.restricted_words.iter().cloned()),
        ));
        let reg = &registry;

        let id = FieldNode::new("id", FieldKind::Text, reg);
        id.set_value("")?;
        let first_name = FieldNode::new("firstName", FieldKind::Text, reg);
        first_name.add_validator(ValidatorId::REQUIRED)?;
        first_name.add_validator(ValidatorId::min_length(config.first_name_min_length))?;
        let last_name = FieldNode::new("lastName", FieldKind::Text, reg);
        last_name.add_validator(ValidatorId::REQUIRED)?;
        let notes = FieldNode::new("notes", FieldKind::Text, reg);
        notes.add_validator(ValidatorId::RESTRICTED_WORDS)?;

        let address = GroupNode::new("address");
        for (key, kind) in ADDRESS_FIELDS {
            let field = FieldNode::new(key, kind, reg);
            field.attach(ValidatorId::REQUIRED)?;
            address.insert(field)?;
        }

        let phones = {
            let registry = Rc::clone(&registry);
            let timers = timers.clone();
            ListNode::new("phones", move |index| phone_item(index, &registry, &timers))
        };

        let root = GroupNode::new("")
            .with_child(id)?
            .with_child(FieldNode::new("icon", FieldKind::Text, reg))?
            .with_child(FieldNode::new("personal", FieldKind::Bool, reg))?
            .with_child(first_name)?
            .with_child(last_name)?
            .with_child(FieldNode::new("dateOfBirth", FieldKind::Date, reg).with_adapter(IsoDateAdapter))?
            .with_child(FieldNode::new("favoritesRanking", FieldKind::Integer, reg))?
            .with_child(notes)?
            .with_child(phones.clone())?
            .with_child(address.clone())?;

        let trigger = FormNode::Group(address.clone());
        let address_relax = ConditionalRule::new(
            "address.relax",
            &trigger,
            address.fields(),
            ValidatorId::REQUIRED,
            ActivationPolicy::always(RuleAction::Detach),
            timers,
        )?;
        let address_commit = ConditionalRule::new(
            "address.commit",
            &trigger,
            address.fields(),
            ValidatorId::REQUIRED,
            ActivationPolicy::debounced(config.address_quiet_period(), RuleAction::Attach),
            timers,
        )?;

        Ok(Self {
            root,
            address,
            phones,
            timers: timers.clone(),
            config,
            registry,
            address_relax,
            address_commit,
        })
    }

    #[must_use]
    pub fn root(&self) -> &GroupNode {
        &self.root
    }

    #[must_use]
    pub fn address(&self) -> &GroupNode {
        &self.address
    }

    #[must_use]
    pub fn phones(&self) -> &ListNode {
        &self.phones
    }

    #[must_use]
    pub fn phone(&self, index: usize) -> Option<GroupNode> {
        self.phones.item(index)
    }

    #[must_use]
    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Rc<ValidatorRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    /// The rule that suspends `required` on the address while it is edited.
    #[must_use]
    pub fn address_relax_rule(&self) -> &ConditionalRule {
        &self.address_relax
    }

    /// The rule that restores `required` on the address after a pause.
    #[must_use]
    pub fn address_commit_rule(&self) -> &ConditionalRule {
        &self.address_commit
    }

    /// Resolve a dotted path from the root.
    pub fn find(&self, path: &str) -> Result<FormNode> {
        self.root.find(path)
    }

    /// Resolve a dotted path that must end at a field.
    pub fn field(&self, path: &str) -> Result<FieldNode> {
        self.find(path)?
            .as_field()
            .cloned()
            .ok_or_else(|| FormError::NoSuchPath {
                path: path.to_string(),
            })
    }

    /// Append an empty, wired phone item.
    pub fn add_phone(&self) -> Result<GroupNode> {
        self.phones.append()
    }

    /// Assign `contact` to the form, growing the phone list first.
    ///
    /// Fails with [`FormError::ListLengthMismatch`] if the form already has
    /// more phone items than the record.
    pub fn load(&self, contact: &Contact) -> Result<()> {
        self.phones.ensure_len(contact.phones.len())?;
        let value = serde_json::to_value(contact)?;
        self.root.set_value(&value)
    }

    /// The form's current value as a record.
    pub fn to_contact(&self) -> Result<Contact> {
        Ok(serde_json::from_value(self.root.value())?)
    }

    #[must_use]
    pub fn value(&self) -> Value {
        self.root.value()
    }

    #[must_use]
    pub fn status(&self) -> NodeStatus {
        self.root.status()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.root.is_valid()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<(String, FieldError)> {
        self.root.errors()
    }
}

fn phone_item(index: usize, registry: &Rc<ValidatorRegistry>, timers: &TimerQueue) -> Result<GroupNode> {
    let number = FieldNode::new("phoneNumber", FieldKind::Text, registry);
    let preferred = FieldNode::new("preferred", FieldKind::Bool, registry);
    preferred.set_value(false)?;
    let item = GroupNode::new(index.to_string())
        .with_child(number.clone())?
        .with_child(FieldNode::new("phoneType", FieldKind::Choice(PhoneType::OPTIONS), registry))?
        .with_child(preferred.clone())?;
    let rule = ConditionalRule::new(
        format!("phones.{index}.preferred"),
        &FormNode::Field(preferred),
        vec![number],
        ValidatorId::REQUIRED,
        ActivationPolicy::attach_when_true(),
        timers,
    )?;
    item.retain(rule);
    Ok(item)
}
