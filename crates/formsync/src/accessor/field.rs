use super::{AccessorId, Flag, ValidateOptions};
use crate::error::FormError;
use crate::state::FormState;
use crate::tree::Patch;
use formsync_convert::Binding;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Handle onto one field
///
/// Raw is what the input shows and may be invalid; value is what the data
/// tree holds.
#[derive(Clone)]
pub struct FieldAccessor {
    state: FormState,
    id: AccessorId,
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor").field("id", &self.id).finish()
    }
}

impl FieldAccessor {
    pub(crate) fn new(state: FormState, id: AccessorId) -> Self {
        Self { state, id }
    }

    /// Accessor identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> AccessorId {
        self.id
    }

    /// Tree address
    pub fn path(&self) -> Result<String, FormError> {
        self.state
            .with_inner(|inner| Ok(inner.arena.path(self.id)?.to_string()))
    }

    /// Human-facing reference (`a[].b`)
    pub fn fieldref(&self) -> Result<String, FormError> {
        self.state
            .with_inner(|inner| Ok(inner.arena.path(self.id)?.fieldref()))
    }

    /// Current raw
    pub fn raw(&self) -> Result<Value, FormError> {
        self.state
            .with_inner(|inner| Ok(inner.arena.field(self.id)?.raw.clone()))
    }

    /// Current raw as the converter's raw type
    pub fn raw_as<T: DeserializeOwned>(&self) -> Result<T, FormError> {
        Ok(serde_json::from_value(self.raw()?)?)
    }

    /// Committed value, `None` if the key is absent from the record
    pub fn value(&self) -> Result<Option<Value>, FormError> {
        self.state.with_inner(|inner| {
            let path = inner.arena.path(self.id)?;
            inner.arena.field(self.id)?;
            Ok(inner.tree.get(&path).cloned())
        })
    }

    /// Committed value as the converter's value type
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T, FormError> {
        Ok(serde_json::from_value(self.value()?.unwrap_or(Value::Null))?)
    }

    /// Local error, else external error messages
    pub fn error(&self) -> Result<Option<String>, FormError> {
        self.state.with_inner(|inner| inner.field_error(self.id))
    }

    /// External warning messages
    pub fn warning(&self) -> Result<Option<String>, FormError> {
        self.state.with_inner(|inner| {
            inner.arena.field(self.id)?;
            inner.warning(self.id)
        })
    }

    /// No error is showing
    pub fn is_valid(&self) -> Result<bool, FormError> {
        Ok(self.error()?.is_none())
    }

    /// Required by definition or by a server access update
    pub fn required(&self) -> Result<bool, FormError> {
        self.state.with_inner(|inner| inner.required(self.id))
    }

    /// Disabled here or on an ancestor
    pub fn disabled(&self) -> Result<bool, FormError> {
        self.state.with_inner(|inner| inner.flag(self.id, Flag::Disabled))
    }

    /// Hidden here or on an ancestor
    pub fn hidden(&self) -> Result<bool, FormError> {
        self.state.with_inner(|inner| inner.flag(self.id, Flag::Hidden))
    }

    /// Read-only here or on an ancestor
    pub fn read_only(&self) -> Result<bool, FormError> {
        self.state.with_inner(|inner| inner.flag(self.id, Flag::ReadOnly))
    }

    /// Neither disabled, read-only nor hidden
    pub fn input_allowed(&self) -> Result<bool, FormError> {
        self.state.with_inner(|inner| inner.input_allowed(self.id))
    }

    /// Binding to use for inputs
    pub fn binding(&self) -> Result<Binding, FormError> {
        self.state
            .with_inner(|inner| Ok(inner.arena.field(self.id)?.spec.binding()))
    }

    /// Take user input
    ///
    /// Raw is stored before anything else runs. On a valid outcome the value
    /// is committed, the change hook runs if the value actually changed and
    /// the path is scheduled for a background `process`. Ignored on
    /// read-only fields. An outcome for raw that has since been replaced is
    /// dropped.
    ///
    /// # Errors
    /// [`FormError::TypeMismatch`] if `raw` does not have the converter's raw
    /// shape, [`FormError::StaleAccessor`] if the field no longer exists.
    pub async fn set_raw(&self, raw: impl Serialize) -> Result<(), FormError> {
        let raw = serde_json::to_value(raw)?;
        let Some(input) = self
            .state
            .with_inner(|inner| inner.store_raw(self.id, raw))?
        else {
            return Ok(());
        };
        let response = input
            .spec
            .process(input.raw.clone(), input.required, input.options)
            .await?;
        let changed = self
            .state
            .with_inner(|inner| inner.commit(self.id, &input.raw, response))?;
        if let Some(path) = changed {
            self.state.backend().run(&path.to_string());
        }
        Ok(())
    }

    /// Write a value directly; raw re-renders from it
    pub fn set_value(&self, value: impl Serialize) -> Result<(), FormError> {
        let value = serde_json::to_value(value)?;
        self.state.with_inner(|inner| {
            let path = inner.arena.path(self.id)?;
            inner.arena.field(self.id)?;
            inner.apply_external(&Patch::replace(&path, value))
        })
    }

    /// Re-run the pipeline on the current raw, updating the error only
    pub async fn validate(&self) -> Result<bool, FormError> {
        self.validate_with(ValidateOptions::default()).await
    }

    /// [`validate`](Self::validate) with options
    pub async fn validate_with(&self, options: ValidateOptions) -> Result<bool, FormError> {
        let input = self
            .state
            .with_inner(|inner| inner.validation_input(self.id, options))?;
        let response = input
            .spec
            .process(input.raw.clone(), input.required, input.options)
            .await?;
        self.state.with_inner(|inner| {
            inner.record_validation(self.id, &input.raw, response)?;
            Ok(inner.field_error(self.id)?.is_none())
        })
    }
}
