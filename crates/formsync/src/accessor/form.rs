use super::arena::Step;
use super::{
    Accessor, AccessorId, AccessorKind, FieldAccessor, Flag, RepeatingFormAccessor,
    ValidateOptions,
};
use crate::definition::Group;
use crate::error::FormError;
use crate::path::TreePath;
use crate::state::FormState;
use futures::future::join_all;
use serde_json::Value;
use std::fmt;

/// Handle onto a record: the root, a sub-form or a row of a repeating form
#[derive(Clone)]
pub struct FormAccessor {
    state: FormState,
    id: AccessorId,
}

/// A row of a repeating form
pub type RepeatingFormIndexedAccessor = FormAccessor;

impl fmt::Debug for FormAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormAccessor").field("id", &self.id).finish()
    }
}

/// Validate every field under `id` concurrently, then read validity
pub(crate) async fn validate_below(
    state: &FormState,
    id: AccessorId,
    options: ValidateOptions,
) -> Result<bool, FormError> {
    let fields = state.with_inner(|inner| inner.field_ids(id))?;
    let outcomes = join_all(fields.into_iter().map(|field| {
        let field = FieldAccessor::new(state.clone(), field);
        async move { field.validate_with(options).await }
    }))
    .await;
    for outcome in outcomes {
        match outcome {
            // a row removed while validators ran
            Ok(_) | Err(FormError::StaleAccessor(_)) => {}
            Err(err) => return Err(err),
        }
    }
    state.with_inner(|inner| inner.is_valid(id, options))
}

impl FormAccessor {
    pub(crate) fn new(state: FormState, id: AccessorId) -> Self {
        Self { state, id }
    }

    /// Accessor identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> AccessorId {
        self.id
    }

    /// Tree address (`""` for the root)
    pub fn path(&self) -> Result<String, FormError> {
        self.state
            .with_inner(|inner| Ok(inner.arena.path(self.id)?.to_string()))
    }

    /// Human-facing reference
    pub fn fieldref(&self) -> Result<String, FormError> {
        self.state
            .with_inner(|inner| Ok(inner.arena.path(self.id)?.fieldref()))
    }

    /// Position in the owning list, `None` unless this is a row
    pub fn index(&self) -> Result<Option<usize>, FormError> {
        self.state.with_inner(|inner| {
            inner.arena.form(self.id)?;
            Ok(match inner.arena.get(self.id)?.step {
                Step::Index(index) => Some(index),
                _ => None,
            })
        })
    }

    /// Snapshot of the record
    pub fn value(&self) -> Result<Value, FormError> {
        self.state.with_inner(|inner| {
            let path = inner.arena.path(self.id)?;
            Ok(inner.tree.get(&path).cloned().unwrap_or(Value::Null))
        })
    }

    fn child(&self, key: &str) -> Result<(AccessorId, AccessorKind), FormError> {
        self.state.with_inner(|inner| {
            inner.arena.form(self.id)?;
            let child = inner.arena.step_into(self.id, key)?;
            Ok((child, inner.arena.get(child)?.kind()))
        })
    }

    fn wrong_kind(&self, key: &str, expected: &'static str) -> FormError {
        let path = self
            .state
            .with_inner(|inner| inner.arena.path(self.id).map(|p| p.child(key).to_string()))
            .unwrap_or_else(|_| key.to_string());
        FormError::WrongKind { path, expected }
    }

    /// Field bound to `key`
    pub fn field(&self, key: &str) -> Result<FieldAccessor, FormError> {
        match self.child(key)? {
            (id, AccessorKind::Field) => Ok(FieldAccessor::new(self.state.clone(), id)),
            _ => Err(self.wrong_kind(key, "field")),
        }
    }

    /// Nested record bound to `key`
    pub fn sub_form(&self, key: &str) -> Result<FormAccessor, FormError> {
        match self.child(key)? {
            (id, AccessorKind::Form) => Ok(FormAccessor::new(self.state.clone(), id)),
            _ => Err(self.wrong_kind(key, "sub form")),
        }
    }

    /// List of records bound to `key`
    pub fn repeating_form(&self, key: &str) -> Result<RepeatingFormAccessor, FormError> {
        match self.child(key)? {
            (id, AccessorKind::RepeatingForm) => {
                Ok(RepeatingFormAccessor::new(self.state.clone(), id))
            }
            _ => Err(self.wrong_kind(key, "repeating form")),
        }
    }

    /// Accessor at an address relative to this record
    pub fn access(&self, path: &str) -> Result<Accessor, FormError> {
        let path: TreePath = path.parse()?;
        self.access_by_steps(path.steps())
    }

    /// Accessor reached by descending one step at a time
    ///
    /// # Errors
    /// [`FormError::ExpectedIndex`] for a non-numeric step into a repeating
    /// form, [`FormError::MissingIndex`] for a row that does not exist,
    /// [`FormError::UnknownPath`] for anything else that does not resolve.
    pub fn access_by_steps<S: AsRef<str>>(&self, steps: &[S]) -> Result<Accessor, FormError> {
        self.state.with_inner(|inner| {
            let id = inner.arena.locate(self.id, steps)?;
            Ok(Accessor::new(self.state.clone(), id, inner.arena.get(id)?.kind()))
        })
    }

    /// Every accessor below this record, depth-first pre-order
    pub fn flat_accessors(&self) -> Result<Vec<Accessor>, FormError> {
        self.state.with_inner(|inner| {
            inner.arena.get(self.id)?;
            inner
                .arena
                .descendants(self.id)
                .into_iter()
                .map(|id| -> Result<Accessor, FormError> {
                    Ok(Accessor::new(self.state.clone(), id, inner.arena.get(id)?.kind()))
                })
                .collect()
        })
    }

    /// Validity from current error state
    pub fn is_valid(&self) -> Result<bool, FormError> {
        self.is_valid_with(ValidateOptions::default())
    }

    /// [`is_valid`](Self::is_valid) with options
    pub fn is_valid_with(&self, options: ValidateOptions) -> Result<bool, FormError> {
        self.state.with_inner(|inner| inner.is_valid(self.id, options))
    }

    /// Re-run every field pipeline below this record
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

    /// Named group of this record's fields
    pub fn group(&self, name: &str) -> Result<GroupAccessor, FormError> {
        let group = self.state.with_inner(|inner| {
            inner
                .arena
                .form(self.id)?
                .definition
                .get_group(name)
                .cloned()
                .ok_or_else(|| FormError::UnknownPath(format!("group '{name}'")))
        })?;
        Ok(GroupAccessor {
            form: self.clone(),
            group,
        })
    }
}

/// Subset of a record's fields selected by a [`Group`]
#[derive(Debug, Clone)]
pub struct GroupAccessor {
    form: FormAccessor,
    group: Group,
}

impl GroupAccessor {
    /// Field accessors in the group, in declaration order
    pub fn field_accessors(&self) -> Result<Vec<FieldAccessor>, FormError> {
        let ids = self.form.state.with_inner(|inner| {
            let form = inner.arena.form(self.form.id)?;
            Ok::<_, FormError>(
                form.children
                    .iter()
                    .filter(|(key, id)| self.group.contains(key) && inner.arena.field(**id).is_ok())
                    .map(|(_, id)| *id)
                    .collect::<Vec<_>>(),
            )
        })?;
        Ok(ids
            .into_iter()
            .map(|id| FieldAccessor::new(self.form.state.clone(), id))
            .collect())
    }

    /// No field in the group shows an error
    pub fn is_valid(&self) -> Result<bool, FormError> {
        for field in self.field_accessors()? {
            if !field.is_valid()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Re-run the group's field pipelines
    pub async fn validate(&self) -> Result<bool, FormError> {
        let outcomes = join_all(
            self.field_accessors()?
                .into_iter()
                .map(|field| async move { field.validate().await }),
        )
        .await;
        let mut valid = true;
        for outcome in outcomes {
            valid &= outcome?;
        }
        Ok(valid)
    }
}
