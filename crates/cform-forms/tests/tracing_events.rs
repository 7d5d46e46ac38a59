//! Diagnostic events: validator faults and rule applications.

use std::rc::Rc;
use std::sync::{Arc, Mutex};

use cform_core::cx::{Cx, LabClock};
use cform_forms::{
    ContactForm, FieldKind, FieldNode, FnValidator, FormConfig, ValidatorId, ValidatorRegistry,
    validator_faults_total,
};
use cform_runtime::TimerQueue;
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

#[derive(Debug, Clone)]
struct Captured {
    level: tracing::Level,
    message: String,
    fields: Vec<(String, String)>,
}

impl Captured {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

struct Capture {
    events: Arc<Mutex<Vec<Captured>>>,
}

impl<S> Layer<S> for Capture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Fields {
            message: String,
            fields: Vec<(String, String)>,
        }
        impl tracing::field::Visit for Fields {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = value.to_string();
                } else {
                    self.fields.push((field.name().to_string(), value.to_string()));
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                let text = format!("{value:?}").trim_matches('"').to_string();
                if field.name() == "message" {
                    self.message = text;
                } else {
                    self.fields.push((field.name().to_string(), text));
                }
            }
        }
        let mut visitor = Fields {
            message: String::new(),
            fields: Vec::new(),
        };
        event.record(&mut visitor);
        self.events.lock().expect("capture lock").push(Captured {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

fn capture() -> (Arc<Mutex<Vec<Captured>>>, tracing::subscriber::DefaultGuard) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        events: Arc::clone(&events),
    });
    (events, tracing::subscriber::set_default(subscriber))
}

#[test]
fn validator_panic_is_logged_and_passes() {
    let (events, _guard) = capture();
    let boom = ValidatorId::new("alwaysPanics");
    let registry = Rc::new(
        ValidatorRegistry::new().with(FnValidator::new(boom.clone(), |_| panic!("rule exploded"))),
    );
    let notes = FieldNode::new("notes", FieldKind::Text, &registry);
    notes.add_validator(boom).unwrap();
    let before = validator_faults_total();

    notes.set_value("hello").unwrap();

    assert!(notes.is_valid());
    assert!(notes.errors().is_empty());
    assert!(validator_faults_total() > before);

    let events = events.lock().expect("capture lock");
    let fault = events
        .iter()
        .find(|e| e.level == tracing::Level::ERROR)
        .expect("expected an error event");
    assert_eq!(fault.message, "validator panicked; treating as pass");
    assert_eq!(fault.field("validator"), Some("alwaysPanics"));
    assert_eq!(fault.field("field"), Some("notes"));
    assert_eq!(fault.field("reason"), Some("rule exploded"));
}

#[test]
fn rule_applications_are_logged() {
    let (events, _guard) = capture();
    let clock = LabClock::new();
    let (cx, _ctrl) = Cx::lab(&clock);
    let timers = TimerQueue::new(cx);
    let form = ContactForm::new_blank(FormConfig::default(), &timers).unwrap();

    form.field("phones.0.preferred").unwrap().set_value(true).unwrap();
    form.field("address.city").unwrap().set_value("Westview").unwrap();
    timers.advance(web_time::Duration::from_millis(2000));

    let events = events.lock().expect("capture lock");
    let applied: Vec<(&str, &str)> = events
        .iter()
        .filter(|e| e.message == "conditional rule applied")
        .map(|e| (e.field("rule").unwrap_or(""), e.field("action").unwrap_or("")))
        .collect();
    assert_eq!(
        applied,
        vec![
            ("phones.0.preferred", "Attach"),
            ("address.relax", "Detach"),
            ("address.commit", "Attach"),
        ]
    );
    assert!(events.iter().all(|e| e.level != tracing::Level::ERROR));
}

#[test]
fn scheduling_after_cancellation_warns() {
    let (events, _guard) = capture();
    let clock = LabClock::new();
    let (cx, ctrl) = Cx::lab(&clock);
    let timers = TimerQueue::new(cx);
    ctrl.cancel();
    timers.schedule(web_time::Duration::from_millis(1), || {});

    let events = events.lock().expect("capture lock");
    let warnings: Vec<&str> = events
        .iter()
        .filter(|e| e.level == tracing::Level::WARN)
        .map(|e| e.message.as_str())
        .collect();
    assert_eq!(
        warnings,
        vec!["cx cancelled", "timer scheduled after cancellation; dropped"]
    );
    assert_eq!(timers.pending(), 0);
}
