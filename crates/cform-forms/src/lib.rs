#![forbid(unsafe_code)]

//! Contact edit form engine.
//!
//! The form is a tree of [`FieldNode`]s, [`GroupNode`]s and [`ListNode`]s.
//! Each field evaluates its attached validators synchronously on every write
//! and caches the result, so [`FormNode::is_valid`] is a plain read. Groups and
//! lists aggregate their children's status.
//!
//! [`ConditionalRule`]s observe one node's value stream and attach or detach a
//! validator on other fields, either immediately or after a debounce window.
//! [`ContactForm`] wires the concrete tree and rules for a contact record, and
//! [`EditSession`] ties it to a repository, navigation, and the session's
//! cancellation context.

pub mod config;
pub mod contact;
pub mod error;
pub mod form;
pub mod node;
pub mod restricted;
pub mod rules;
pub mod session;
pub mod validator;
pub mod value;

pub use config::FormConfig;
pub use contact::{Address, AddressType, Contact, Phone, PhoneType};
pub use error::{FormError, RepositoryError, Result};
pub use form::ContactForm;
pub use node::{FieldError, FieldNode, FormNode, GroupNode, ListNode, NodeEvent, NodeStatus};
pub use restricted::RestrictedWords;
pub use rules::{ActivationPolicy, ConditionalRule, RuleAction, RuleState};
pub use session::{
    ContactRepository, EditSession, InMemoryContactRepository, Navigator, SessionState,
};
pub use validator::{
    FnValidator, MinLength, Required, ValidationError, ValidatorId, ValidatorRegistry,
    ValidatorRule, validator_faults_total,
};
pub use value::{FieldKind, FieldValue, IsoDateAdapter, ValueAdapter};
