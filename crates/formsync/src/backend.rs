//! Remote synchronization
//!
//! The backend drives the caller-supplied `save`, `process`, `process_all`
//! and `revalidate` functions and merges their [`ProcessResult`]s back into
//! the session. Merging never overwrites a path the user edited recently and
//! never applies anything stamped with another generation.

use crate::accessor::Flag;
use crate::change_tracker::ChangeTracker;
use crate::config::FormStateOptions;
use crate::error::FormError;
use crate::path::{normalize, TreePath};
use crate::state::{FormState, NodeRef, StateInner};
use crate::tree::Patch;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Remote save: `(record, generation)`; `None` means saved cleanly
pub type SaveFn =
    Arc<dyn Fn(Value, u64) -> BoxFuture<'static, anyhow::Result<Option<ProcessResult>>> + Send + Sync>;

/// Remote per-path process: `(record, path, live_only, generation)`
pub type ProcessFn =
    Arc<dyn Fn(Value, String, bool, u64) -> BoxFuture<'static, anyhow::Result<ProcessResult>> + Send + Sync>;

/// Remote bulk process or revalidation: `(record, live_only, generation)`
pub type ProcessAllFn =
    Arc<dyn Fn(Value, bool, u64) -> BoxFuture<'static, anyhow::Result<ProcessResult>> + Send + Sync>;

/// Applies one server update to the record
pub type ApplyUpdateFn = Arc<dyn Fn(&mut NodeRef<'_>, &Update) -> Result<(), FormError> + Send + Sync>;

/// Server-computed value for a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Tree address
    pub path: String,
    /// New value
    #[serde(default)]
    pub value: Value,
}

/// Server-authoritative access flags for a path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessUpdate {
    /// Tree address
    pub path: String,
    /// Overrides the read-only policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Overrides the disabled policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    /// Overrides the hidden policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    /// Overrides the field definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl AccessUpdate {
    /// Update with no flags set
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// With `read_only`
    #[must_use]
    pub fn with_read_only(mut self, value: bool) -> Self {
        self.read_only = Some(value);
        self
    }

    /// With `disabled`
    #[must_use]
    pub fn with_disabled(mut self, value: bool) -> Self {
        self.disabled = Some(value);
        self
    }

    /// With `hidden`
    #[must_use]
    pub fn with_hidden(mut self, value: bool) -> Self {
        self.hidden = Some(value);
        self
    }

    /// With `required`
    #[must_use]
    pub fn with_required(mut self, value: bool) -> Self {
        self.required = Some(value);
        self
    }

    pub(crate) fn flag(&self, flag: Flag) -> Option<bool> {
        match flag {
            Flag::Disabled => self.disabled,
            Flag::Hidden => self.hidden,
            Flag::ReadOnly => self.read_only,
        }
    }

    /// Later flags win; unset flags keep their earlier value
    pub(crate) fn merge(&mut self, other: AccessUpdate) {
        self.read_only = other.read_only.or(self.read_only);
        self.disabled = other.disabled.or(self.disabled);
        self.hidden = other.hidden.or(self.hidden);
        self.required = other.required.or(self.required);
    }
}

/// One validation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Text shown to the user
    pub message: String,
}

/// Messages for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationInfo {
    /// Tree address the messages belong to
    pub id: String,
    /// Messages, joined with ", " for display
    pub messages: Vec<Message>,
}

impl ValidationInfo {
    /// Messages for a path
    pub fn new<S: Into<String>>(id: impl Into<String>, messages: impl IntoIterator<Item = S>) -> Self {
        Self {
            id: id.into(),
            messages: messages
                .into_iter()
                .map(|message| Message {
                    message: message.into(),
                })
                .collect(),
        }
    }
}

/// Validation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Makes the accessor invalid
    Error,
    /// Informational
    Warning,
}

/// Response of the remote authority
///
/// Every field defaults, so partial responses deserialize as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessResult {
    /// Generation the result was computed for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    /// Values to write unless the path was edited locally
    pub updates: Vec<Update>,
    /// Flags to apply unconditionally
    pub access_updates: Vec<AccessUpdate>,
    /// Replaces every external error
    pub error_validations: Vec<ValidationInfo>,
    /// Replaces every external warning
    pub warning_validations: Vec<ValidationInfo>,
}

impl ProcessResult {
    /// Empty result
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp with a generation
    #[must_use]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Add a value update
    #[must_use]
    pub fn with_update(mut self, path: impl Into<String>, value: Value) -> Self {
        self.updates.push(Update {
            path: path.into(),
            value,
        });
        self
    }

    /// Add an access update
    #[must_use]
    pub fn with_access_update(mut self, update: AccessUpdate) -> Self {
        self.access_updates.push(update);
        self
    }

    /// Add an error message for a path
    #[must_use]
    pub fn with_error(mut self, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_validations
            .push(ValidationInfo::new(path, [message.into()]));
        self
    }

    /// Add a warning message for a path
    #[must_use]
    pub fn with_warning(mut self, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.warning_validations
            .push(ValidationInfo::new(path, [message.into()]));
        self
    }
}

fn default_apply_update(node: &mut NodeRef<'_>, update: &Update) -> Result<(), FormError> {
    node.apply(&Patch::replace(&update.path, update.value.clone()))
}

/// Remote functions plus the change tracker that schedules `process`
pub(crate) struct Backend {
    tracker: ChangeTracker,
    live_only: bool,
    save: Option<SaveFn>,
    process: Option<ProcessFn>,
    process_all: Option<ProcessAllFn>,
    revalidate: Option<ProcessAllFn>,
    apply_update: Option<ApplyUpdateFn>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("tracker", &self.tracker)
            .field("live_only", &self.live_only)
            .finish_non_exhaustive()
    }
}

impl Backend {
    pub(crate) fn new(options: &FormStateOptions, tracker: ChangeTracker) -> Self {
        Self {
            tracker,
            live_only: options.config.live_only,
            save: options.save.clone(),
            process: options.process.clone(),
            process_all: options.process_all.clone(),
            revalidate: options.revalidate.clone(),
            apply_update: options.apply_update.clone(),
        }
    }

    #[inline]
    pub(crate) fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    #[inline]
    pub(crate) fn live_only(&self) -> bool {
        self.live_only
    }

    /// Schedule a background process for `path`
    pub(crate) fn run(&self, path: &str) {
        self.tracker.change(path);
    }

    /// Merge a result into the session
    ///
    /// Returns `false` if the result belongs to another generation, in which
    /// case nothing was applied.
    pub(crate) fn run_process_result(&self, inner: &mut StateInner, result: ProcessResult) -> bool {
        if let Some(generation) = result.generation {
            if generation != inner.generation {
                debug!(
                    stale = generation,
                    current = inner.generation,
                    "discarding result of another generation"
                );
                return false;
            }
        }

        for update in &result.updates {
            let path = normalize(&update.path);
            if self.tracker.has_changed(&path) {
                debug!(path = %path, "keeping local edit over server update");
                continue;
            }
            let mut root = NodeRef::new(inner, TreePath::root());
            let applied = match &self.apply_update {
                Some(apply) => apply(&mut root, update),
                None => default_apply_update(&mut root, update),
            };
            if let Err(err) = applied {
                warn!(path = %path, error = %err, "could not apply server update");
            }
        }

        for access_update in result.access_updates {
            inner.set_access_update(access_update);
        }
        inner.set_external_validations(Severity::Error, result.error_validations);
        inner.set_external_validations(Severity::Warning, result.warning_validations);

        if let Err(err) = inner.refresh_derived() {
            warn!(error = %err, "could not refresh derived fields");
        }
        true
    }

    /// Background check of one path, fired by the change tracker
    ///
    /// Remote failures are logged and swallowed. A result of another
    /// generation reschedules the path.
    pub(crate) async fn real_process(&self, state: &FormState, path: String) {
        let Some(process) = self.process.clone() else {
            return;
        };
        let (record, generation) = state.with_inner(|inner| inner.snapshot());
        let result = match process(record, path.clone(), self.live_only, generation).await {
            Ok(result) => result,
            Err(err) => {
                error!(path = %path, error = %err, "process failed");
                return;
            }
        };
        let applied = state.with_inner(|inner| self.run_process_result(inner, result));
        if !applied {
            self.tracker.change(&path);
        }
    }

    /// Returns `true` if the authority accepted the record as is
    pub(crate) async fn real_save(&self, state: &FormState) -> Result<bool, FormError> {
        let save = self.save.clone().ok_or(FormError::NotConfigured("save"))?;
        let (record, generation) = state.with_inner(|inner| inner.snapshot());
        let result = save(record, generation).await.map_err(FormError::Remote)?;
        Ok(state.with_inner(|inner| match result {
            None => {
                inner.clear_external_validations();
                info!(generation, "saved");
                true
            }
            Some(result) => {
                info!(generation, "save rejected");
                self.run_process_result(inner, result);
                false
            }
        }))
    }

    /// Returns whether the bulk result was applied
    pub(crate) async fn real_process_all(&self, state: &FormState) -> Result<bool, FormError> {
        let process_all = self
            .process_all
            .clone()
            .ok_or(FormError::NotConfigured("process_all"))?;
        self.bulk(state, process_all).await
    }

    /// Returns whether the bulk result was applied
    pub(crate) async fn real_revalidate(&self, state: &FormState) -> Result<bool, FormError> {
        let revalidate = self
            .revalidate
            .clone()
            .ok_or(FormError::NotConfigured("revalidate"))?;
        self.bulk(state, revalidate).await
    }

    async fn bulk(&self, state: &FormState, f: ProcessAllFn) -> Result<bool, FormError> {
        let (record, generation) = state.with_inner(|inner| inner.snapshot());
        let result = f(record, self.live_only, generation)
            .await
            .map_err(FormError::Remote)?;
        Ok(state.with_inner(|inner| {
            inner.clear_external_validations();
            self.run_process_result(inner, result)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_result_deserializes() {
        let result: ProcessResult = serde_json::from_value(json!({
            "errorValidations": [{"id": "/a", "messages": [{"message": "bad"}]}]
        }))
        .unwrap();
        assert_eq!(result.generation, None);
        assert!(result.updates.is_empty());
        assert_eq!(result.error_validations[0].messages[0].message, "bad");
    }

    #[test]
    fn full_result_shape() {
        let result = ProcessResult::new()
            .with_generation(2)
            .with_update("/a", json!(1))
            .with_access_update(AccessUpdate::new("/a").with_read_only(true));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "generation": 2,
                "updates": [{"path": "/a", "value": 1}],
                "accessUpdates": [{"path": "/a", "readOnly": true}],
                "errorValidations": [],
                "warningValidations": []
            })
        );
    }

    #[test]
    fn access_update_merge() {
        let mut update = AccessUpdate::new("/a").with_disabled(true);
        update.merge(AccessUpdate::new("/a").with_hidden(true));
        assert_eq!(update.flag(Flag::Disabled), Some(true));
        assert_eq!(update.flag(Flag::Hidden), Some(true));
        assert_eq!(update.flag(Flag::ReadOnly), None);
        update.merge(AccessUpdate::new("/a").with_disabled(false));
        assert_eq!(update.flag(Flag::Disabled), Some(false));
    }
}
