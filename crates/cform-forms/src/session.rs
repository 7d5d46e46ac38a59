//! Edit session: one form, one cancellation context, one save or cancel.
//!
//! # Lifecycle
//!
//! ```text
//! open ──► Open ──save (valid)──► Saved
//!            │
//!            └──cancel──────────► Cancelled
//! ```
//!
//! Leaving `Open` (or dropping the session) tears it down: the session's
//! [`Cx`] is cancelled and every pending timer is dropped, so no debounced
//! rule can fire against the discarded tree.

use cform_core::cx::{Cx, CxController};
use cform_runtime::TimerQueue;
use web_time::Duration;

use crate::config::FormConfig;
use crate::contact::Contact;
use crate::error::{FormError, RepositoryError, Result};
use crate::form::ContactForm;

/// Where contacts are loaded from and saved to.
pub trait ContactRepository {
    /// `Ok(None)` when no contact has `id`.
    fn load(&self, id: &str) -> std::result::Result<Option<Contact>, RepositoryError>;

    fn save(&mut self, contact: Contact) -> std::result::Result<(), RepositoryError>;

    /// Like [`load`](Self::load), but a missing contact is an error.
    fn fetch(&self, id: &str) -> std::result::Result<Contact, RepositoryError> {
        self.load(id)?.ok_or_else(|| RepositoryError::NotFound { id: id.to_string() })
    }
}

/// Where the user goes when the session ends.
pub trait Navigator {
    fn go_to_list_view(&mut self);
}

impl<F: FnMut()> Navigator for F {
    fn go_to_list_view(&mut self) {
        self();
    }
}

/// Vec-backed repository keeping insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContactRepository {
    contacts: Vec<Contact>,
    next_id: u64,
    saves: u64,
    fail_saves: Option<String>,
}

impl InMemoryContactRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
        Self {
            contacts: contacts.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Make every subsequent save fail with [`RepositoryError::Storage`].
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_saves = Some(message.into());
        self
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Successful saves so far.
    #[must_use]
    pub fn saves(&self) -> u64 {
        self.saves
    }

    fn generate_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let id = format!("c{}", self.next_id);
            if self.get(&id).is_none() {
                return id;
            }
        }
    }
}

impl ContactRepository for InMemoryContactRepository {
    fn load(&self, id: &str) -> std::result::Result<Option<Contact>, RepositoryError> {
        Ok(self.get(id).cloned())
    }

    fn save(&mut self, mut contact: Contact) -> std::result::Result<(), RepositoryError> {
        if let Some(message) = &self.fail_saves {
            return Err(RepositoryError::Storage(message.clone()));
        }
        if contact.id.is_empty() {
            contact.id = self.generate_id();
        }
        match self.contacts.iter_mut().find(|c| c.id == contact.id) {
            Some(existing) => *existing = contact,
            None => self.contacts.push(contact),
        }
        self.saves += 1;
        Ok(())
    }
}

/// How a session ended, if it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Saved,
    Cancelled,
}

/// Owns a [`ContactForm`] for the duration of one edit.
pub struct EditSession<R: ContactRepository, N: Navigator> {
    form: ContactForm,
    timers: TimerQueue,
    cx: Cx,
    ctrl: CxController,
    repository: R,
    navigator: N,
    state: SessionState,
}

impl<R: ContactRepository, N: Navigator> std::fmt::Debug for EditSession<R, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("cx_id", &self.cx.id())
            .field("state", &self.state)
            .field("pending_timers", &self.timers.pending())
            .finish()
    }
}

impl<R: ContactRepository, N: Navigator> EditSession<R, N> {
    /// Open a session under `parent`.
    ///
    /// With no `id`, or an `id` the repository does not know, the form is
    /// blank. Cancelling `parent` cancels the session.
    pub fn open(
        parent: &Cx,
        id: Option<&str>,
        config: FormConfig,
        repository: R,
        navigator: N,
    ) -> Result<Self> {
        parent.check()?;
        let (cx, ctrl) = parent.child();
        let timers = TimerQueue::new(cx.clone());
        let record = match id {
            Some(id) => repository.load(id)?,
            None => None,
        };
        let form = match &record {
            Some(contact) => ContactForm::for_contact(contact, config, &timers)?,
            None => ContactForm::new_blank(config, &timers)?,
        };
        tracing::debug!(
            cx_id = cx.id(),
            id = id.unwrap_or(""),
            found = record.is_some(),
            "edit session opened"
        );
        Ok(Self {
            form,
            timers,
            cx,
            ctrl,
            repository,
            navigator,
            state: SessionState::Open,
        })
    }

    #[must_use]
    pub fn form(&self) -> &ContactForm {
        &self.form
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open && !self.cx.is_cancelled()
    }

    #[must_use]
    pub fn cx(&self) -> &Cx {
        &self.cx
    }

    #[must_use]
    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    #[must_use]
    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Run timers that are due on the session clock.
    pub fn tick(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.timers.run_due())
    }

    /// Move a lab clock forward by `by`, firing timers on the way.
    pub fn advance(&self, by: Duration) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.timers.advance(by))
    }

    /// Save the form if it is valid, then end the session.
    ///
    /// An invalid form is refused with [`FormError::InvalidForm`] and the
    /// session stays open. A repository failure also leaves it open.
    pub fn save(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.form.is_valid() {
            let errors = self.form.errors().len();
            tracing::debug!(cx_id = self.cx.id(), errors, "save refused: form invalid");
            return Err(FormError::InvalidForm { errors });
        }
        let contact = self.form.to_contact()?;
        self.repository.save(contact)?;
        self.state = SessionState::Saved;
        self.teardown();
        self.navigator.go_to_list_view();
        Ok(())
    }

    /// Discard the edit and end the session.
    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.state = SessionState::Cancelled;
        self.teardown();
        self.navigator.go_to_list_view();
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(FormError::SessionClosed);
        }
        self.cx.check()?;
        Ok(())
    }

    fn teardown(&mut self) {
        if !self.ctrl.is_cancelled() {
            self.ctrl.cancel();
        }
        let dropped = self.timers.cancel_all();
        tracing::debug!(cx_id = self.cx.id(), dropped, state = ?self.state, "edit session torn down");
    }
}

impl<R: ContactRepository, N: Navigator> Drop for EditSession<R, N> {
    fn drop(&mut self) {
        if !self.ctrl.is_cancelled() {
            self.teardown();
        }
    }
}
