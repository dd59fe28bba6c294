//! Error types for formsync
//!
//! Only configuration and usage errors surface as [`FormError`]. Bad user
//! input never does: it becomes a message on the field.

use crate::accessor::AccessorId;
use crate::path::PathError;
use formsync_convert::ConfigError;

/// Main formsync error type
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    /// No accessor or tree node at this address
    #[error("no accessor at '{0}'")]
    UnknownPath(String),

    /// A repeating form was stepped into with a non-numeric step
    #[error("expected index of repeating form at '{path}', got '{step}'")]
    ExpectedIndex { path: String, step: String },

    /// Index outside the repeating form
    #[error("{index} is not an index of repeating form '{path}'")]
    MissingIndex { path: String, index: usize },

    /// `remove` could not find the value in the list
    #[error("cannot find node to remove in '{0}'")]
    ValueNotFound(String),

    /// The accessor was destroyed by a removal or a record swap
    #[error("accessor {0} no longer exists")]
    StaleAccessor(AccessorId),

    /// The accessor exists but is of another kind
    #[error("accessor at '{path}' is not a {expected}")]
    WrongKind { path: String, expected: &'static str },

    /// A backend function was invoked but not configured
    #[error("cannot {0} if {0} function is not configured")]
    NotConfigured(&'static str),

    /// A patch could not be applied to the data tree
    #[error("invalid patch at '{path}': {reason}")]
    InvalidPatch { path: String, reason: String },

    /// Malformed tree address
    #[error("invalid path: {0}")]
    Path(#[from] PathError),

    /// Raw or value does not fit the field's converter
    #[error("value does not fit converter: {0}")]
    TypeMismatch(#[from] serde_json::Error),

    /// Converter misconfiguration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Remote authority call failed
    #[error("remote call failed: {0}")]
    Remote(anyhow::Error),

    /// The form state was dropped while work was pending
    #[error("form state has been dropped")]
    SessionClosed,
}

impl FormError {
    /// Create invalid patch error
    #[inline]
    pub fn invalid_patch(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPatch {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error came from the remote authority
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}
