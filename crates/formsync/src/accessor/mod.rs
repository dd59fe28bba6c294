//! Accessor tree
//!
//! Handles onto the runtime nodes that mirror the data tree: fields, forms
//! (records and list rows) and repeating forms. Handles are cheap to clone;
//! all state lives in the session arena and every call goes through the
//! session lock.

pub(crate) mod arena;
mod field;
mod form;
mod repeating;

pub use field::FieldAccessor;
pub use form::{FormAccessor, GroupAccessor, RepeatingFormIndexedAccessor};
pub use repeating::RepeatingFormAccessor;

use crate::error::FormError;
use crate::state::FormState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable accessor identity, never reused within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessorId(pub(crate) u64);

impl fmt::Display for AccessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Accessor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessorKind {
    /// Leaf bound to a converter
    Field,
    /// Record or list row
    Form,
    /// List of records
    RepeatingForm,
}

/// What access policies get to see about an accessor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessorInfo {
    /// Tree address
    pub path: String,
    /// Human-facing reference
    pub fieldref: String,
    /// Accessor kind
    pub kind: AccessorKind,
}

/// Inherited access flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flag {
    Disabled,
    Hidden,
    ReadOnly,
}

/// Knobs for validation passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Skip required checks
    pub ignore_required: bool,
    /// Ignore errors attached to repeating forms themselves
    pub ignore_own_errors: bool,
}

/// Any accessor
#[derive(Debug, Clone)]
pub enum Accessor {
    /// Field accessor
    Field(FieldAccessor),
    /// Form or list row accessor
    Form(FormAccessor),
    /// Repeating form accessor
    RepeatingForm(RepeatingFormAccessor),
}

impl Accessor {
    pub(crate) fn new(state: FormState, id: AccessorId, kind: AccessorKind) -> Self {
        match kind {
            AccessorKind::Field => Self::Field(FieldAccessor::new(state, id)),
            AccessorKind::Form => Self::Form(FormAccessor::new(state, id)),
            AccessorKind::RepeatingForm => {
                Self::RepeatingForm(RepeatingFormAccessor::new(state, id))
            }
        }
    }

    /// Accessor identity
    #[must_use]
    pub fn id(&self) -> AccessorId {
        match self {
            Self::Field(a) => a.id(),
            Self::Form(a) => a.id(),
            Self::RepeatingForm(a) => a.id(),
        }
    }

    /// Accessor kind
    #[must_use]
    pub fn kind(&self) -> AccessorKind {
        match self {
            Self::Field(_) => AccessorKind::Field,
            Self::Form(_) => AccessorKind::Form,
            Self::RepeatingForm(_) => AccessorKind::RepeatingForm,
        }
    }

    /// Tree address
    pub fn path(&self) -> Result<String, FormError> {
        match self {
            Self::Field(a) => a.path(),
            Self::Form(a) => a.path(),
            Self::RepeatingForm(a) => a.path(),
        }
    }

    /// Human-facing reference
    pub fn fieldref(&self) -> Result<String, FormError> {
        match self {
            Self::Field(a) => a.fieldref(),
            Self::Form(a) => a.fieldref(),
            Self::RepeatingForm(a) => a.fieldref(),
        }
    }

    /// Validity from current error state
    pub fn is_valid(&self) -> Result<bool, FormError> {
        match self {
            Self::Field(a) => a.is_valid(),
            Self::Form(a) => a.is_valid(),
            Self::RepeatingForm(a) => a.is_valid(),
        }
    }

    /// Re-run validation below this accessor
    pub async fn validate(&self) -> Result<bool, FormError> {
        match self {
            Self::Field(a) => a.validate().await,
            Self::Form(a) => a.validate().await,
            Self::RepeatingForm(a) => a.validate().await,
        }
    }

    /// Field accessor, if this is one
    #[must_use]
    pub fn as_field(&self) -> Option<&FieldAccessor> {
        match self {
            Self::Field(a) => Some(a),
            _ => None,
        }
    }

    /// Form accessor, if this is one
    #[must_use]
    pub fn as_form(&self) -> Option<&FormAccessor> {
        match self {
            Self::Form(a) => Some(a),
            _ => None,
        }
    }

    /// Repeating form accessor, if this is one
    #[must_use]
    pub fn as_repeating_form(&self) -> Option<&RepeatingFormAccessor> {
        match self {
            Self::RepeatingForm(a) => Some(a),
            _ => None,
        }
    }

    /// Into a field accessor
    pub fn into_field(self) -> Result<FieldAccessor, FormError> {
        match self {
            Self::Field(a) => Ok(a),
            other => Err(FormError::WrongKind {
                path: other.path()?,
                expected: "field",
            }),
        }
    }
}
