use super::form::validate_below;
use super::{Accessor, AccessorId, Flag, FormAccessor, ValidateOptions};
use crate::error::FormError;
use crate::state::FormState;
use crate::tree::Patch;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Handle onto a list of records
///
/// Rows stay contiguous. Inserting or removing relabels the rows after the
/// mutation point instead of rebuilding them, so a row's handle and its
/// uncommitted raw follow it to its new index.
#[derive(Clone)]
pub struct RepeatingFormAccessor {
    state: FormState,
    id: AccessorId,
}

impl fmt::Debug for RepeatingFormAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatingFormAccessor")
            .field("id", &self.id)
            .finish()
    }
}

impl RepeatingFormAccessor {
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

    /// Human-facing reference
    pub fn fieldref(&self) -> Result<String, FormError> {
        self.state
            .with_inner(|inner| Ok(inner.arena.path(self.id)?.fieldref()))
    }

    /// Live length of the list
    pub fn length(&self) -> Result<usize, FormError> {
        self.state.with_inner(|inner| {
            inner.arena.repeating(self.id)?;
            let path = inner.arena.path(self.id)?;
            Ok(inner.tree.list_len(&path).unwrap_or(0))
        })
    }

    /// Row at `index`
    pub fn index(&self, index: usize) -> Result<FormAccessor, FormError> {
        self.state.with_inner(|inner| {
            inner.arena.repeating(self.id)?;
            let row = inner.arena.step_into(self.id, &index.to_string())?;
            Ok(FormAccessor::new(self.state.clone(), row))
        })
    }

    /// Rows in index order
    pub fn accessors(&self) -> Result<Vec<FormAccessor>, FormError> {
        self.state.with_inner(|inner| {
            Ok(inner
                .arena
                .repeating(self.id)?
                .rows
                .values()
                .map(|row| FormAccessor::new(self.state.clone(), *row))
                .collect())
        })
    }

    /// Every accessor below the list, depth-first pre-order
    pub fn flat_accessors(&self) -> Result<Vec<Accessor>, FormError> {
        let mut result = Vec::new();
        for row in self.accessors()? {
            result.push(Accessor::Form(row.clone()));
            result.extend(row.flat_accessors()?);
        }
        Ok(result)
    }

    /// Accessor reached by descending from the list; the first step is an index
    pub fn access_by_steps<S: AsRef<str>>(&self, steps: &[S]) -> Result<Accessor, FormError> {
        self.state.with_inner(|inner| {
            inner.arena.repeating(self.id)?;
            let id = inner.arena.locate(self.id, steps)?;
            Ok(Accessor::new(self.state.clone(), id, inner.arena.get(id)?.kind()))
        })
    }

    /// Insert a record at `index`, returning the new row
    ///
    /// A missing or null list in the record is created first.
    pub fn insert(&self, index: usize, value: impl Serialize) -> Result<FormAccessor, FormError> {
        let value = serde_json::to_value(value)?;
        self.state.with_inner(|inner| {
            let path = inner.arena.path(self.id)?;
            inner.arena.repeating(self.id)?;
            if matches!(inner.tree.get(&path), None | Some(Value::Null)) {
                inner.apply_external(&Patch::add(&path, Value::Array(Vec::new())))?;
            }
            inner.apply_external(&Patch::add(path.child(index.to_string()), value))?;
            let row = inner.arena.step_into(self.id, &index.to_string())?;
            Ok(FormAccessor::new(self.state.clone(), row))
        })
    }

    /// Append a record, returning the new row
    pub fn push(&self, value: impl Serialize) -> Result<FormAccessor, FormError> {
        let length = self.length()?;
        self.insert(length, value)
    }

    /// Remove the first record structurally equal to `value`
    ///
    /// # Errors
    /// [`FormError::ValueNotFound`] if no record matches.
    pub fn remove(&self, value: impl Serialize) -> Result<(), FormError> {
        let value = serde_json::to_value(value)?;
        self.state.with_inner(|inner| {
            let path = inner.arena.path(self.id)?;
            inner.arena.repeating(self.id)?;
            let index = inner
                .tree
                .get(&path)
                .and_then(Value::as_array)
                .and_then(|items| items.iter().position(|item| *item == value))
                .ok_or_else(|| FormError::ValueNotFound(path.to_string()))?;
            inner.apply_external(&Patch::remove(path.child(index.to_string())))
        })
    }

    /// Remove the record at `index`
    ///
    /// # Errors
    /// [`FormError::MissingIndex`] if there is no such row.
    pub fn remove_index(&self, index: usize) -> Result<(), FormError> {
        self.state.with_inner(|inner| {
            let path = inner.arena.path(self.id)?;
            if !inner.arena.repeating(self.id)?.rows.contains_key(&index) {
                return Err(FormError::MissingIndex {
                    path: path.to_string(),
                    index,
                });
            }
            inner.apply_external(&Patch::remove(path.child(index.to_string())))
        })
    }

    /// Attach an error to the list itself
    pub fn set_error(&self, error: impl Into<String>) -> Result<(), FormError> {
        let error = error.into();
        self.state.with_inner(|inner| {
            inner.arena.repeating_mut(self.id)?.error = Some(error);
            Ok(())
        })
    }

    /// Drop the list's own error
    pub fn clear_error(&self) -> Result<(), FormError> {
        self.state.with_inner(|inner| {
            inner.arena.repeating_mut(self.id)?.error = None;
            Ok(())
        })
    }

    /// Own error, else external error messages for the list path
    pub fn error(&self) -> Result<Option<String>, FormError> {
        self.state.with_inner(|inner| inner.repeating_error(self.id))
    }

    /// Every row valid and no error on the list itself
    pub fn is_valid(&self) -> Result<bool, FormError> {
        self.is_valid_with(ValidateOptions::default())
    }

    /// [`is_valid`](Self::is_valid) with options
    pub fn is_valid_with(&self, options: ValidateOptions) -> Result<bool, FormError> {
        self.state.with_inner(|inner| inner.is_valid(self.id, options))
    }

    /// Re-run every field pipeline in every row
    pub async fn validate(&self) -> Result<bool, FormError> {
        self.validate_with(ValidateOptions::default()).await
    }

    /// [`validate`](Self::validate) with options
    pub async fn validate_with(&self, options: ValidateOptions) -> Result<bool, FormError> {
        validate_below(&self.state, self.id, options).await
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
}
