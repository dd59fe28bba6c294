//! Form session state
//!
//! [`FormState`] owns the data tree, the accessor arena, the generation
//! counter, server-provided access updates and external validations. All of
//! it sits behind one lock that is never held across an `.await`; async work
//! (validators, remote calls) runs between a "read inputs" and a "commit
//! outcome" critical section, and the commit re-checks that its inputs are
//! still current.

use crate::accessor::arena::{render_raw, Arena, NodeKind, Step};
use crate::accessor::{
    Accessor, AccessorId, AccessorInfo, AccessorKind, FieldAccessor, Flag, FormAccessor,
    RepeatingFormAccessor, ValidateOptions,
};
use crate::backend::{AccessUpdate, Backend, Message, Severity, ValidationInfo};
use crate::change_tracker::{ChangeTracker, TrackerCallback};
use crate::config::{AccessPolicy, FormStateOptions};
use crate::definition::{FieldSpec, Form, ProcessOptions, ProcessResponse};
use crate::error::FormError;
use crate::path::{normalize, TreePath};
use crate::tree::{DataTree, Patch};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Mutable view of one record, handed to change hooks and update appliers
///
/// Relative paths resolve against the record; writes go through the same
/// reconciliation as any other tree mutation, so affected fields re-render.
pub struct NodeRef<'a> {
    inner: &'a mut StateInner,
    path: TreePath,
}

impl<'a> NodeRef<'a> {
    pub(crate) fn new(inner: &'a mut StateInner, path: TreePath) -> Self {
        Self { inner, path }
    }

    /// Address of the record
    #[must_use]
    pub fn path(&self) -> String {
        self.path.to_string()
    }

    /// The record itself
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.inner.tree.get(&self.path)
    }

    /// Read below the record
    #[must_use]
    pub fn get(&self, relative: &str) -> Option<&Value> {
        let relative: TreePath = relative.parse().ok()?;
        self.inner.tree.get(&self.path.join(&relative))
    }

    /// Replace a value below the record
    pub fn set(&mut self, relative: &str, value: impl Serialize) -> Result<(), FormError> {
        let value = serde_json::to_value(value)?;
        self.apply(&Patch::replace(relative, value))
    }

    /// Apply a patch whose path is relative to the record
    pub fn apply(&mut self, patch: &Patch) -> Result<(), FormError> {
        let patch = patch.rebase(&self.path)?;
        self.inner.apply_patch(&patch, None)
    }
}

#[derive(Clone, Default)]
struct Policies {
    disabled: Option<AccessPolicy>,
    hidden: Option<AccessPolicy>,
    read_only: Option<AccessPolicy>,
}

impl Policies {
    fn get(&self, flag: Flag) -> Option<&AccessPolicy> {
        match flag {
            Flag::Disabled => self.disabled.as_ref(),
            Flag::Hidden => self.hidden.as_ref(),
            Flag::ReadOnly => self.read_only.as_ref(),
        }
    }
}

/// Everything guarded by the session lock
pub(crate) struct StateInner {
    pub(crate) tree: DataTree,
    definition: Arc<Form>,
    pub(crate) arena: Arena,
    pub(crate) root: AccessorId,
    pub(crate) generation: u64,
    policies: Policies,
    access_updates: HashMap<String, AccessUpdate>,
    errors: HashMap<String, Vec<Message>>,
    warnings: HashMap<String, Vec<Message>>,
}

/// Inputs for one run of a field pipeline
pub(crate) struct PipelineInput {
    pub(crate) spec: Arc<dyn FieldSpec>,
    pub(crate) raw: Value,
    pub(crate) required: bool,
    pub(crate) options: ProcessOptions,
}

fn join_messages(messages: &[Message]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }
    Some(
        messages
            .iter()
            .map(|m| m.message.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

impl StateInner {
    fn new(definition: Arc<Form>, record: Value, policies: Policies) -> Result<Self, FormError> {
        let mut arena = Arena::new();
        let root = arena.build_form(None, Step::Root, &definition, Some(&record), false)?;
        Ok(Self {
            tree: DataTree::new(record),
            definition,
            arena,
            root,
            generation: 0,
            policies,
            access_updates: HashMap::new(),
            errors: HashMap::new(),
            warnings: HashMap::new(),
        })
    }

    pub(crate) fn info(&self, id: AccessorId) -> Result<AccessorInfo, FormError> {
        let path = self.arena.path(id)?;
        Ok(AccessorInfo {
            fieldref: path.fieldref(),
            path: path.to_string(),
            kind: self.arena.get(id)?.kind(),
        })
    }

    /// True if any ancestor has the flag, else the access update, else the policy
    pub(crate) fn flag(&self, id: AccessorId, flag: Flag) -> Result<bool, FormError> {
        if let Some(parent) = self.arena.get(id)?.parent {
            if self.flag(parent, flag)? {
                return Ok(true);
            }
        }
        let info = self.info(id)?;
        if let Some(value) = self
            .access_updates
            .get(&info.path)
            .and_then(|update| update.flag(flag))
        {
            return Ok(value);
        }
        Ok(self.policies.get(flag).is_some_and(|policy| policy(&info)))
    }

    pub(crate) fn input_allowed(&self, id: AccessorId) -> Result<bool, FormError> {
        Ok(!self.flag(id, Flag::Disabled)?
            && !self.flag(id, Flag::ReadOnly)?
            && !self.flag(id, Flag::Hidden)?)
    }

    pub(crate) fn required(&self, id: AccessorId) -> Result<bool, FormError> {
        let field = self.arena.field(id)?;
        let path = self.arena.path(id)?.to_string();
        Ok(self
            .access_updates
            .get(&path)
            .and_then(|update| update.required)
            .unwrap_or_else(|| field.spec.required()))
    }

    fn external(&self, severity: Severity, path: &str) -> Option<String> {
        let set = match severity {
            Severity::Error => &self.errors,
            Severity::Warning => &self.warnings,
        };
        set.get(path).and_then(|messages| join_messages(messages))
    }

    /// Local error first, then external error messages
    pub(crate) fn field_error(&self, id: AccessorId) -> Result<Option<String>, FormError> {
        let field = self.arena.field(id)?;
        if field.error.is_some() {
            return Ok(field.error.clone());
        }
        let path = self.arena.path(id)?.to_string();
        Ok(self.external(Severity::Error, &path))
    }

    pub(crate) fn warning(&self, id: AccessorId) -> Result<Option<String>, FormError> {
        let path = self.arena.path(id)?.to_string();
        Ok(self.external(Severity::Warning, &path))
    }

    pub(crate) fn repeating_error(&self, id: AccessorId) -> Result<Option<String>, FormError> {
        let repeating = self.arena.repeating(id)?;
        if repeating.error.is_some() {
            return Ok(repeating.error.clone());
        }
        let path = self.arena.path(id)?.to_string();
        Ok(self.external(Severity::Error, &path))
    }

    pub(crate) fn is_valid(&self, id: AccessorId, options: ValidateOptions) -> Result<bool, FormError> {
        match &self.arena.get(id)?.kind {
            NodeKind::Field(_) => Ok(self.field_error(id)?.is_none()),
            NodeKind::Form(_) => self.children_valid(id, options),
            NodeKind::Repeating(_) => {
                if !options.ignore_own_errors && self.repeating_error(id)?.is_some() {
                    return Ok(false);
                }
                self.children_valid(id, options)
            }
        }
    }

    fn children_valid(&self, id: AccessorId, options: ValidateOptions) -> Result<bool, FormError> {
        for child in self.arena.children(id) {
            if !self.is_valid(child, options)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Field ids at or below `id`, pre-order
    pub(crate) fn field_ids(&self, id: AccessorId) -> Result<Vec<AccessorId>, FormError> {
        if self.arena.field(id).is_ok() {
            return Ok(vec![id]);
        }
        self.arena.get(id)?;
        Ok(self
            .arena
            .descendants(id)
            .into_iter()
            .filter(|child| self.arena.field(*child).is_ok())
            .collect())
    }

    fn in_just_added_row(&self, id: AccessorId) -> Result<bool, FormError> {
        Ok(match self.arena.get(id)?.parent {
            Some(parent) => self.arena.form(parent).is_ok_and(|form| form.just_added),
            None => false,
        })
    }

    /// Store raw ahead of the pipeline; `None` for read-only fields
    pub(crate) fn store_raw(
        &mut self,
        id: AccessorId,
        raw: Value,
    ) -> Result<Option<PipelineInput>, FormError> {
        if self.flag(id, Flag::ReadOnly)? {
            debug!(accessor = %id, "ignoring raw for read-only field");
            return Ok(None);
        }
        let required = self.required(id)?;
        let field = self.arena.field_mut(id)?;
        field.spec.check_raw(&raw)?;
        field.raw = raw.clone();
        field.touched = true;
        Ok(Some(PipelineInput {
            spec: Arc::clone(&field.spec),
            raw,
            required,
            options: ProcessOptions::default(),
        }))
    }

    /// Inputs for re-validating the current raw
    pub(crate) fn validation_input(
        &self,
        id: AccessorId,
        options: ValidateOptions,
    ) -> Result<PipelineInput, FormError> {
        let field = self.arena.field(id)?;
        let lenient = self.in_just_added_row(id)? && !field.touched;
        Ok(PipelineInput {
            spec: Arc::clone(&field.spec),
            raw: field.raw.clone(),
            required: self.required(id)?,
            options: ProcessOptions {
                ignore_required: options.ignore_required || lenient,
            },
        })
    }

    /// Update the local error from a validation pass, unless raw moved on
    pub(crate) fn record_validation(
        &mut self,
        id: AccessorId,
        raw: &Value,
        response: ProcessResponse,
    ) -> Result<(), FormError> {
        let field = self.arena.field_mut(id)?;
        if &field.raw != raw {
            return Ok(());
        }
        field.error = match response {
            ProcessResponse::Message(message) => Some(message),
            ProcessResponse::Value(_) => None,
        };
        Ok(())
    }

    /// Commit a pipeline outcome for `raw`
    ///
    /// Returns the field's path if the tree value actually changed.
    pub(crate) fn commit(
        &mut self,
        id: AccessorId,
        raw: &Value,
        response: ProcessResponse,
    ) -> Result<Option<TreePath>, FormError> {
        let field = self.arena.field_mut(id)?;
        if &field.raw != raw {
            debug!(accessor = %id, "raw changed while processing, discarding outcome");
            return Ok(None);
        }
        let value = match response {
            ProcessResponse::Message(message) => {
                field.error = Some(message);
                return Ok(None);
            }
            ProcessResponse::Value(value) => {
                field.error = None;
                value
            }
        };
        let spec = Arc::clone(&field.spec);
        let path = self.arena.path(id)?;
        if let Some(current) = self.tree.get(&path) {
            if spec.same_value(current, &value) {
                return Ok(None);
            }
        }
        self.apply_patch(&Patch::replace(&path, value.clone()), Some(id))?;
        let record = path.parent().unwrap_or_default();
        spec.change(&mut NodeRef::new(self, record), &value)?;
        self.refresh_derived()?;
        Ok(Some(path))
    }

    /// Mutate the tree and bring the accessor tree back in line
    ///
    /// `skip` names a field whose raw must stay as typed.
    pub(crate) fn apply_patch(&mut self, patch: &Patch, skip: Option<AccessorId>) -> Result<(), FormError> {
        self.tree.apply(patch)?;
        let path: TreePath = patch.path().parse()?;
        if let (Patch::Add { .. } | Patch::Remove { .. }, Some(parent)) = (patch, path.parent()) {
            let (list, depth) = self.arena.locate_nearest(self.root, &parent);
            if depth == parent.len() && self.arena.repeating(list).is_ok() {
                return self.reshape_list(list, patch, &path, &parent);
            }
        }
        let (id, depth) = self.arena.locate_nearest(self.root, &path);
        if depth == path.len() || self.arena.field(id).is_ok() {
            self.resync(id, skip)?;
        }
        Ok(())
    }

    fn reshape_list(
        &mut self,
        list: AccessorId,
        patch: &Patch,
        path: &TreePath,
        parent: &TreePath,
    ) -> Result<(), FormError> {
        let index = match path.last_index() {
            Some(index) => index,
            // "-" appends
            None => self.tree.list_len(parent).unwrap_or(1).saturating_sub(1),
        };
        match patch {
            Patch::Add { .. } => {
                let value = self.tree.get(&parent.child(index.to_string())).cloned();
                self.arena.insert_row(list, index, value.as_ref())?;
            }
            _ => {
                self.arena.remove_row(list, index)?;
            }
        }
        Ok(())
    }

    /// Re-read raw from the tree for everything at or below `id`
    fn resync(&mut self, id: AccessorId, skip: Option<AccessorId>) -> Result<(), FormError> {
        let path = self.arena.path(id)?;
        match self.arena.get(id)?.kind() {
            AccessorKind::Field => {
                if skip == Some(id) {
                    return Ok(());
                }
                let value = self.tree.get(&path).cloned();
                let field = self.arena.field_mut(id)?;
                field.raw = render_raw(field.spec.as_ref(), value.as_ref())?;
                field.error = None;
            }
            AccessorKind::Form => {
                for child in self.arena.children(id) {
                    self.resync(child, skip)?;
                }
            }
            AccessorKind::RepeatingForm => {
                let rows = self.arena.repeating(id)?.rows.len();
                let len = self.tree.list_len(&path).unwrap_or(0);
                for index in (len..rows).rev() {
                    self.arena.remove_row(id, index)?;
                }
                for child in self.arena.children(id) {
                    self.resync(child, skip)?;
                }
                for index in rows..len {
                    let value = self.tree.get(&path.child(index.to_string())).cloned();
                    self.arena.build_row(id, index, value.as_ref(), false)?;
                }
            }
        }
        Ok(())
    }

    /// Write derived fields whose computed result moved
    pub(crate) fn refresh_derived(&mut self) -> Result<(), FormError> {
        for id in self.arena.descendants(self.root) {
            let Ok(field) = self.arena.field(id) else {
                continue;
            };
            let spec = Arc::clone(&field.spec);
            let last = field.last_derived.clone();
            let path = self.arena.path(id)?;
            let record = path
                .parent()
                .and_then(|p| self.tree.get(&p))
                .cloned()
                .unwrap_or(Value::Null);
            let Some(value) = spec.derive(&record) else {
                continue;
            };
            let value = value?;
            if last.as_ref() == Some(&value) {
                continue;
            }
            self.arena.field_mut(id)?.last_derived = Some(value.clone());
            self.apply_patch(&Patch::replace(&path, value), None)?;
        }
        Ok(())
    }

    /// Tree mutation from outside a field's own pipeline
    pub(crate) fn apply_external(&mut self, patch: &Patch) -> Result<(), FormError> {
        self.apply_patch(patch, None)?;
        self.refresh_derived()
    }

    pub(crate) fn set_access_update(&mut self, update: AccessUpdate) {
        let path = normalize(&update.path);
        let entry = self
            .access_updates
            .entry(path.clone())
            .or_insert_with(|| AccessUpdate::new(path));
        entry.merge(update);
    }

    /// Replace every external validation of one severity
    pub(crate) fn set_external_validations(&mut self, severity: Severity, infos: Vec<ValidationInfo>) {
        let mut set: HashMap<String, Vec<Message>> = HashMap::new();
        for info in infos {
            set.entry(normalize(&info.id))
                .or_default()
                .extend(info.messages);
        }
        match severity {
            Severity::Error => self.errors = set,
            Severity::Warning => self.warnings = set,
        }
    }

    pub(crate) fn clear_external_validations(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }

    /// Swap the backing record and rebuild every accessor
    pub(crate) fn set_record(&mut self, record: Value) -> Result<(), FormError> {
        let root = self
            .arena
            .build_form(None, Step::Root, &self.definition, Some(&record), false)?;
        self.arena.remove_subtree(self.root);
        self.root = root;
        self.tree = DataTree::new(record);
        self.generation += 1;
        self.access_updates.clear();
        self.clear_external_validations();
        info!(generation = self.generation, "record replaced, accessor tree rebuilt");
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> (Value, u64) {
        (self.tree.root().clone(), self.generation)
    }
}

pub(crate) struct Shared {
    pub(crate) inner: Mutex<StateInner>,
    pub(crate) backend: Backend,
}

/// A form editing session
///
/// # Example
///
/// ```rust,ignore
/// let state = FormState::new(form, json!({"name": ""}), FormStateOptions::new())?;
/// let name = state.field("name")?;
/// name.set_raw("Ada").await?;
/// assert_eq!(state.value()["name"], "Ada");
/// ```
#[derive(Clone)]
pub struct FormState {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for FormState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormState")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl FormState {
    /// Start a session over a record
    ///
    /// # Errors
    /// Returns [`FormError::TypeMismatch`] if a record value does not fit its
    /// field's converter.
    pub fn new(definition: Form, record: Value, options: FormStateOptions) -> Result<Self, FormError> {
        let policies = Policies {
            disabled: options.is_disabled.clone(),
            hidden: options.is_hidden.clone(),
            read_only: options.is_read_only.clone(),
        };
        let inner = StateInner::new(Arc::new(definition), record, policies)?;
        let tracker_config = options.config.tracker;
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            let callback: TrackerCallback = Arc::new(move |path: String| -> BoxFuture<'static, ()> {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(shared) = weak.upgrade() {
                        let state = FormState { shared };
                        state.backend().real_process(&state, path).await;
                    }
                })
            });
            Shared {
                inner: Mutex::new(inner),
                backend: Backend::new(&options, ChangeTracker::new(tracker_config, callback)),
            }
        });
        Ok(Self { shared })
    }

    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&mut StateInner) -> R) -> R {
        f(&mut self.shared.inner.lock())
    }

    pub(crate) fn backend(&self) -> &Backend {
        &self.shared.backend
    }

    /// Root form accessor of the current record
    #[must_use]
    pub fn root(&self) -> FormAccessor {
        let root = self.with_inner(|inner| inner.root);
        FormAccessor::new(self.clone(), root)
    }

    /// Top-level field
    pub fn field(&self, key: &str) -> Result<FieldAccessor, FormError> {
        self.root().field(key)
    }

    /// Top-level nested record
    pub fn sub_form(&self, key: &str) -> Result<FormAccessor, FormError> {
        self.root().sub_form(key)
    }

    /// Top-level list of records
    pub fn repeating_form(&self, key: &str) -> Result<RepeatingFormAccessor, FormError> {
        self.root().repeating_form(key)
    }

    /// Accessor at an absolute address
    pub fn access(&self, path: &str) -> Result<Accessor, FormError> {
        self.root().access(path)
    }

    /// Every accessor, depth-first pre-order
    pub fn flat_accessors(&self) -> Result<Vec<Accessor>, FormError> {
        self.root().flat_accessors()
    }

    /// Snapshot of the whole record
    #[must_use]
    pub fn value(&self) -> Value {
        self.with_inner(|inner| inner.tree.root().clone())
    }

    /// Snapshot of one node
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        self.with_inner(|inner| crate::tree::get_by_path(inner.tree.root(), path).cloned())
    }

    /// Current generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.with_inner(|inner| inner.generation)
    }

    /// Passed to `process` and `process_all`
    #[must_use]
    pub fn live_only(&self) -> bool {
        self.backend().live_only()
    }

    /// Swap the record, rebuild accessors and bump the generation
    ///
    /// Handles into the old tree report [`FormError::StaleAccessor`] from
    /// then on, and results stamped with the old generation are discarded.
    /// Pending edits of the old record are forgotten.
    pub fn set_record(&self, record: Value) -> Result<(), FormError> {
        self.with_inner(|inner| inner.set_record(record))?;
        self.backend().tracker().reset();
        Ok(())
    }

    /// Mutate the tree from outside; fields re-render and lists renumber
    pub fn apply_patch(&self, patch: &Patch) -> Result<(), FormError> {
        self.with_inner(|inner| inner.apply_external(patch))
    }

    /// Validity from current error state
    pub fn is_valid(&self) -> Result<bool, FormError> {
        self.root().is_valid()
    }

    /// Re-run every field pipeline
    pub async fn validate(&self) -> Result<bool, FormError> {
        self.root().validate().await
    }

    /// True while `path` has a pending debounce or a fresh edit
    #[must_use]
    pub fn has_changed(&self, path: &str) -> bool {
        self.backend().tracker().has_changed(&normalize(path))
    }

    /// No debounce timer is pending
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.backend().tracker().is_finished()
    }

    /// Wait until no debounce timer is pending
    pub async fn wait_finished(&self) {
        self.backend().tracker().wait_finished().await;
    }

    /// Save once in-flight edits have settled
    ///
    /// Returns `true` if the authority accepted the record as is.
    pub async fn save(&self) -> Result<bool, FormError> {
        self.wait_finished().await;
        self.backend().real_save(self).await
    }

    /// Clear external validations and merge a bulk process result
    pub async fn process_all(&self) -> Result<bool, FormError> {
        self.backend().real_process_all(self).await
    }

    /// Clear external validations and merge a bulk revalidation result
    pub async fn revalidate(&self) -> Result<bool, FormError> {
        self.backend().real_revalidate(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Field, RepeatingForm};
    use formsync_convert::converters;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn state(record: Value) -> FormState {
        let form = Form::new()
            .field("a", Field::new(converters::integer()))
            .field(
                "double",
                Field::new(converters::integer())
                    .derived(|record: &Value| record["a"].as_i64().unwrap_or(0) * 2),
            )
            .repeating_form(
                "items",
                RepeatingForm::new(Form::new().field("n", Field::new(converters::string()))),
            );
        FormState::new(form, record, FormStateOptions::new()).unwrap()
    }

    #[test]
    fn external_patch_re_renders_field() {
        let state = state(json!({"a": 1, "double": 2, "items": []}));
        state.apply_patch(&Patch::replace("/a", json!(5))).unwrap();
        assert_eq!(state.field("a").unwrap().raw().unwrap(), json!("5"));
        assert_eq!(state.get("/double"), Some(json!(10)));
        assert_eq!(state.field("double").unwrap().raw().unwrap(), json!("10"));
    }

    #[test]
    fn external_list_patches_reshape_accessors() {
        let state = state(json!({"a": 1, "items": [{"n": "x"}]}));
        state
            .apply_patch(&Patch::add("/items/-", json!({"n": "y"})))
            .unwrap();
        state.apply_patch(&Patch::add("/items/0", json!({"n": "w"}))).unwrap();
        let items = state.repeating_form("items").unwrap();
        assert_eq!(items.length().unwrap(), 3);
        let raw = |i: usize| items.index(i).unwrap().field("n").unwrap().raw().unwrap();
        assert_eq!(raw(0), json!("w"));
        assert_eq!(raw(2), json!("y"));

        state.apply_patch(&Patch::remove("/items/0")).unwrap();
        assert_eq!(items.length().unwrap(), 2);
        assert_eq!(raw(0), json!("x"));
    }

    #[test]
    fn replacing_list_keeps_leading_rows() {
        let state = state(json!({"a": 1, "items": [{"n": "x"}, {"n": "y"}]}));
        let first = state.repeating_form("items").unwrap().index(0).unwrap();
        state
            .apply_patch(&Patch::replace("/items", json!([{"n": "q"}])))
            .unwrap();
        let items = state.repeating_form("items").unwrap();
        assert_eq!(items.length().unwrap(), 1);
        assert_eq!(items.index(0).unwrap().id(), first.id());
        assert_eq!(first.field("n").unwrap().raw().unwrap(), json!("q"));
    }

    #[test]
    fn set_record_bumps_generation_and_stales_handles() {
        let state = state(json!({"a": 1, "items": []}));
        let old = state.field("a").unwrap();
        state.set_record(json!({"a": 3, "items": []})).unwrap();
        assert_eq!(state.generation(), 1);
        assert!(matches!(old.raw(), Err(FormError::StaleAccessor(_))));
        assert_eq!(state.field("a").unwrap().raw().unwrap(), json!("3"));
    }

    #[test]
    fn external_messages_join() {
        let state = state(json!({"a": 1, "items": []}));
        state.with_inner(|inner| {
            inner.set_external_validations(
                Severity::Error,
                vec![ValidationInfo::new("a", ["bad", "worse"])],
            );
        });
        let a = state.field("a").unwrap();
        assert_eq!(a.error().unwrap().as_deref(), Some("bad, worse"));
        assert!(!state.is_valid().unwrap());
    }
}
