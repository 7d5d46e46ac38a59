use cform_core::cx::CxError;
use thiserror::Error;

use crate::validator::ValidatorId;
use crate::value::FieldKind;

pub type Result<T> = std::result::Result<T, FormError>;

/// Errors raised by tree construction, value assignment, and the edit session.
///
/// Validation failures are not errors: they are recorded on the owning node
/// as [`crate::ValidationError`]s and surface through `is_valid()`.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("validator not registered: {0}")]
    UnknownValidator(ValidatorId),

    #[error("duplicate child key: {key}")]
    DuplicateKey { key: String },

    #[error("no node at path: {path}")]
    NoSuchPath { path: String },

    #[error("field {field} expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        found: String,
    },

    #[error("value for {node} does not match its shape: {message}")]
    ShapeMismatch { node: String, message: String },

    #[error("list {list} has {expected} items, value has {actual}")]
    ListLengthMismatch {
        list: String,
        expected: usize,
        actual: usize,
    },

    #[error("form is invalid ({errors} failing validators)")]
    InvalidForm { errors: usize },

    #[error("edit session is closed")]
    SessionClosed,

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Cancelled(#[from] CxError),
}

impl FormError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn shape(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            node: node.into(),
            message: message.into(),
        }
    }
}

/// Errors reported by a [`crate::ContactRepository`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("contact not found: {id}")]
    NotFound { id: String },

    #[error("storage failure: {0}")]
    Storage(String),
}
