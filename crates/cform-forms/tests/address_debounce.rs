//! Address relax/commit timing against a lab clock.

use cform_core::cx::{Cx, CxController, LabClock};
use cform_forms::{ContactForm, FieldNode, FormConfig, FormError, NodeStatus, RuleState, ValidatorId};
use cform_runtime::TimerQueue;
use web_time::Duration;

struct Harness {
    clock: LabClock,
    _ctrl: CxController,
    timers: TimerQueue,
    form: ContactForm,
}

fn harness() -> Harness {
    let clock = LabClock::new();
    let (cx, ctrl) = Cx::lab(&clock);
    let timers = TimerQueue::new(cx);
    let form = ContactForm::new_blank(FormConfig::default(), &timers).unwrap();
    Harness {
        clock,
        _ctrl: ctrl,
        timers,
        form,
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn address_fields(form: &ContactForm) -> Vec<FieldNode> {
    form.address().fields()
}

fn all_required(form: &ContactForm) -> bool {
    address_fields(form)
        .iter()
        .all(|f| f.has_validator(&ValidatorId::REQUIRED))
}

fn none_required(form: &ContactForm) -> bool {
    address_fields(form)
        .iter()
        .all(|f| !f.has_validator(&ValidatorId::REQUIRED))
}

#[test]
fn address_starts_required() {
    let h = harness();
    assert!(all_required(&h.form));
    assert_eq!(h.form.address().status(), NodeStatus::Invalid);
    assert_eq!(h.form.address().errors().len(), 5);
}

#[test]
fn relax_is_synchronous() {
    let h = harness();
    let city = h.form.field("address.city").unwrap();
    city.set_value("G").unwrap();

    // No timer has run yet.
    assert_eq!(h.timers.fired(), 0);
    assert!(none_required(&h.form));
    assert!(h.form.address().is_valid());
    assert!(h.form.address().errors().is_empty());
    assert_eq!(h.form.address_commit_rule().state(), RuleState::PendingCommit);
}

#[test]
fn commit_fires_once_quiet_period_after_last_change() {
    let h = harness();
    let city = h.form.field("address.city").unwrap();
    let commit = h.form.address_commit_rule();

    city.set_value("G").unwrap();
    h.timers.advance(ms(1000));
    city.set_value("Gl").unwrap();
    assert_eq!(commit.resets(), 1);

    // 2000 ms after the first change: nothing.
    h.timers.advance(ms(1000));
    assert!(none_required(&h.form));

    // One tick before 2000 ms after the second change: still nothing.
    h.timers.advance(ms(999));
    assert!(none_required(&h.form));
    assert_eq!(commit.applications(), 0);

    h.timers.advance(ms(1));
    assert_eq!(h.clock.elapsed(), ms(3000));
    assert!(all_required(&h.form));
    assert_eq!(commit.applications(), 1);
    assert_eq!(commit.state(), RuleState::Idle);

    h.timers.advance(ms(10_000));
    assert_eq!(commit.applications(), 1);
}

#[test]
fn commit_restores_errors_for_empty_fields_only() {
    let h = harness();
    h.form.field("address.city").unwrap().set_value("Gleeberg City").unwrap();
    h.timers.advance(ms(2000));

    let errors: Vec<String> = h.form.address().errors().into_iter().map(|(p, _)| p).collect();
    assert_eq!(errors, vec!["streetAddress", "state", "postalCode", "addressType"]);
    assert!(h.form.field("address.city").unwrap().is_valid());
}

#[test]
fn each_distinct_change_relaxes_and_resets() {
    let h = harness();
    let street = h.form.field("address.streetAddress").unwrap();
    let relax = h.form.address_relax_rule();
    let commit = h.form.address_commit_rule();

    for (i, text) in ["1", "12", "123", "123 M"].iter().enumerate() {
        street.set_value(*text).unwrap();
        h.timers.advance(ms(500));
        assert_eq!(relax.applications(), i as u64 + 1);
    }
    assert_eq!(commit.resets(), 3);
    assert_eq!(commit.applications(), 0);
    h.timers.advance(ms(1500));
    assert_eq!(commit.applications(), 1);
}

#[test]
fn identical_rewrite_is_ignored_by_both_rules() {
    let h = harness();
    let city = h.form.field("address.city").unwrap();
    city.set_value("Smallville").unwrap();
    h.timers.advance(ms(1500));
    city.set_value("Smallville").unwrap();

    assert_eq!(h.form.address_relax_rule().applications(), 1);
    assert_eq!(h.form.address_relax_rule().suppressed(), 1);
    assert_eq!(h.form.address_commit_rule().resets(), 0);

    // The commit keeps its original deadline.
    h.timers.advance(ms(500));
    assert!(all_required(&h.form));
}

#[test]
fn commit_does_not_retrigger_relax() {
    let h = harness();
    h.form.field("address.state").unwrap().set_value("KS").unwrap();
    h.timers.advance(ms(2000));
    assert!(all_required(&h.form));
    assert_eq!(h.form.address_relax_rule().applications(), 1);
    assert_eq!(h.timers.pending(), 0);
}

#[test]
fn cancelled_context_drops_pending_commit() {
    let clock = LabClock::new();
    let (cx, ctrl) = Cx::lab(&clock);
    let timers = TimerQueue::new(cx);
    let form = ContactForm::new_blank(FormConfig::default(), &timers).unwrap();

    form.field("address.city").unwrap().set_value("x").unwrap();
    assert_eq!(timers.pending(), 1);
    ctrl.cancel();
    clock.advance(ms(5000));
    assert_eq!(timers.run_due(), 0);
    assert_eq!(timers.pending(), 0);
    assert!(none_required(&form));
    assert_eq!(form.address_commit_rule().applications(), 0);
}

#[test]
fn custom_quiet_period() {
    let clock = LabClock::new();
    let (cx, _ctrl) = Cx::lab(&clock);
    let timers = TimerQueue::new(cx);
    let config = FormConfig::default().with_address_quiet_period(ms(250)).unwrap();
    let form = ContactForm::new_blank(config, &timers).unwrap();

    form.field("address.postalCode").unwrap().set_value("66502").unwrap();
    timers.advance(ms(249));
    assert!(none_required(&form));
    timers.advance(ms(1));
    assert!(all_required(&form));
}

#[test]
fn rejected_address_assignment_changes_nothing() {
    let h = harness();
    let before = h.form.address().value();

    let err = h
        .form
        .address()
        .set_value(&serde_json::json!({
            "streetAddress": "1 Main",
            "city": 5,
            "state": "KS",
            "postalCode": "66502",
            "addressType": "home"
        }))
        .unwrap_err();

    assert!(matches!(err, FormError::TypeMismatch { .. }));
    assert_eq!(h.form.address().value(), before);
    assert!(all_required(&h.form));
    assert_eq!(h.form.address_relax_rule().applications(), 0);
    assert!(!h.form.address_commit_rule().is_pending());
    assert_eq!(h.timers.pending(), 0);
}
