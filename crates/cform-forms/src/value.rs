//! Field values, field kinds, and external representation adapters.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::error::{FormError, Result};

/// The value held by a [`crate::FieldNode`].
///
/// Serializes to plain JSON; dates render as `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    Date(NaiveDate),
}

impl FieldValue {
    /// Whether this counts as "no value" for `required`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// JSON snapshot of this value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(n) => Value::from(*n),
            Self::Text(s) => Value::String(s.clone()),
            Self::Date(d) => Value::String(d.format(ISO_DATE).to_string()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Shape constraint for a field's value. `Null` is accepted by every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Bool,
    Integer,
    Date,
    /// Text restricted to a fixed option list.
    Choice(&'static [&'static str]),
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::Date => write!(f, "date"),
            Self::Choice(options) => write!(f, "one of [{}]", options.join(", ")),
        }
    }
}

impl FieldKind {
    /// Whether `value` is a legal value for this kind.
    #[must_use]
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (_, FieldValue::Null) => true,
            (Self::Text, FieldValue::Text(_)) => true,
            (Self::Bool, FieldValue::Bool(_)) => true,
            (Self::Integer, FieldValue::Integer(_)) => true,
            (Self::Date, FieldValue::Date(_)) => true,
            (Self::Choice(options), FieldValue::Text(s)) => options.contains(&s.as_str()),
            _ => false,
        }
    }

    /// Check `value` against this kind.
    pub fn check(&self, field: &str, value: &FieldValue) -> Result<()> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(FormError::TypeMismatch {
                field: field.to_string(),
                expected: *self,
                found: value.type_name().to_string(),
            })
        }
    }

    /// Convert a JSON value (as stored by a repository) into a field value.
    ///
    /// Date strings go through `adapter`; an empty string in a choice or date
    /// field reads as `Null`.
    pub fn coerce(
        &self,
        field: &str,
        json: &Value,
        adapter: Option<&dyn ValueAdapter>,
    ) -> Result<FieldValue> {
        let mismatch = || FormError::TypeMismatch {
            field: field.to_string(),
            expected: *self,
            found: json_type_name(json).to_string(),
        };
        let value = match (self, json) {
            (_, Value::Null) => FieldValue::Null,
            (Self::Text, Value::String(s)) => FieldValue::Text(s.clone()),
            (Self::Bool, Value::Bool(b)) => FieldValue::Bool(*b),
            (Self::Integer, Value::Number(n)) => FieldValue::Integer(n.as_i64().ok_or_else(mismatch)?),
            (Self::Date, Value::String(s)) if s.is_empty() => FieldValue::Null,
            (Self::Date, Value::String(s)) => {
                let parsed = match adapter {
                    Some(a) => a.to_internal(s),
                    None => IsoDateAdapter.to_internal(s),
                };
                if parsed.is_empty() {
                    return Err(mismatch());
                }
                parsed
            }
            (Self::Choice(_), Value::String(s)) if s.is_empty() => FieldValue::Null,
            (Self::Choice(_), Value::String(s)) => FieldValue::Text(s.clone()),
            _ => return Err(mismatch()),
        };
        if self.accepts(&value) {
            Ok(value)
        } else {
            Err(mismatch())
        }
    }
}

fn json_type_name(json: &Value) -> &'static str {
    match json {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

const ISO_DATE: &str = "%Y-%m-%d";

/// Bidirectional mapping between an input's text and a field's value.
///
/// Both directions are pure; the field calls them on `set_external` and
/// `external`.
pub trait ValueAdapter {
    /// Parse the input text. Unparsable text maps to [`FieldValue::Null`].
    fn to_internal(&self, external: &str) -> FieldValue;

    /// Render a value for the input.
    fn to_external(&self, value: &FieldValue) -> String;
}

/// `YYYY-MM-DD` calendar dates, as produced by a native date input.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoDateAdapter;

impl ValueAdapter for IsoDateAdapter {
    fn to_internal(&self, external: &str) -> FieldValue {
        NaiveDate::parse_from_str(external.trim(), ISO_DATE)
            .map(FieldValue::Date)
            .unwrap_or(FieldValue::Null)
    }

    fn to_external(&self, value: &FieldValue) -> String {
        match value {
            FieldValue::Date(d) => d.format(ISO_DATE).to_string(),
            _ => String::new(),
        }
    }
}
