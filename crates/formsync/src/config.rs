//! Session configuration
//!
//! [`StateConfig`] holds the serializable knobs; [`FormStateOptions`] adds the
//! runtime pieces (access policies and backend functions).

use crate::accessor::AccessorInfo;
use crate::backend::{ApplyUpdateFn, ProcessAllFn, ProcessFn, ProcessResult, SaveFn, Update};
use crate::error::FormError;
use crate::state::NodeRef;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default debounce before a dirtied path is sent to `process`
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Default window during which a local edit wins over server updates
pub const DEFAULT_FRESHNESS_MS: u64 = 1_000;

/// Change tracker timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeTrackerConfig {
    /// Quiet time per path before the callback fires
    pub debounce_ms: u64,
    /// How long after an edit the path counts as changed
    pub freshness_ms: u64,
}

impl ChangeTrackerConfig {
    /// Debounce as a duration
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Freshness window as a duration
    #[inline]
    #[must_use]
    pub fn freshness(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }

    /// With debounce
    #[inline]
    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// With freshness window
    #[inline]
    #[must_use]
    pub fn with_freshness_ms(mut self, ms: u64) -> Self {
        self.freshness_ms = ms;
        self
    }
}

impl Default for ChangeTrackerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            freshness_ms: DEFAULT_FRESHNESS_MS,
        }
    }
}

/// Serializable session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Passed through to `process`/`process_all`
    pub live_only: bool,
    /// Change tracker timing
    pub tracker: ChangeTrackerConfig,
}

impl StateConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With live-only flag
    #[inline]
    #[must_use]
    pub fn with_live_only(mut self, live_only: bool) -> Self {
        self.live_only = live_only;
        self
    }

    /// With change tracker timing
    #[inline]
    #[must_use]
    pub fn with_tracker(mut self, tracker: ChangeTrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }
}

/// Access-control policy: decides a flag for one accessor
pub type AccessPolicy = Arc<dyn Fn(&AccessorInfo) -> bool + Send + Sync>;

/// Runtime options for a form session
#[derive(Clone, Default)]
pub struct FormStateOptions {
    pub(crate) config: StateConfig,
    pub(crate) is_disabled: Option<AccessPolicy>,
    pub(crate) is_hidden: Option<AccessPolicy>,
    pub(crate) is_read_only: Option<AccessPolicy>,
    pub(crate) save: Option<SaveFn>,
    pub(crate) process: Option<ProcessFn>,
    pub(crate) process_all: Option<ProcessAllFn>,
    pub(crate) revalidate: Option<ProcessAllFn>,
    pub(crate) apply_update: Option<ApplyUpdateFn>,
}

impl fmt::Debug for FormStateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormStateOptions")
            .field("config", &self.config)
            .field("save", &self.save.is_some())
            .field("process", &self.process.is_some())
            .field("process_all", &self.process_all.is_some())
            .field("revalidate", &self.revalidate.is_some())
            .finish_non_exhaustive()
    }
}

impl FormStateOptions {
    /// Options with defaults and no backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With serializable configuration
    #[must_use]
    pub fn with_config(mut self, config: StateConfig) -> Self {
        self.config = config;
        self
    }

    /// Policy for `disabled`
    #[must_use]
    pub fn with_disabled(mut self, f: impl Fn(&AccessorInfo) -> bool + Send + Sync + 'static) -> Self {
        self.is_disabled = Some(Arc::new(f));
        self
    }

    /// Policy for `hidden`
    #[must_use]
    pub fn with_hidden(mut self, f: impl Fn(&AccessorInfo) -> bool + Send + Sync + 'static) -> Self {
        self.is_hidden = Some(Arc::new(f));
        self
    }

    /// Policy for `read_only`
    #[must_use]
    pub fn with_read_only(
        mut self,
        f: impl Fn(&AccessorInfo) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_read_only = Some(Arc::new(f));
        self
    }

    /// Remote save: `(record, generation)`
    #[must_use]
    pub fn with_save<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<ProcessResult>>> + Send + 'static,
    {
        self.save = Some(Arc::new(
            move |node: Value, generation: u64| -> BoxFuture<'static, anyhow::Result<Option<ProcessResult>>> {
                Box::pin(f(node, generation))
            },
        ));
        self
    }

    /// Remote per-path process: `(record, path, live_only, generation)`
    #[must_use]
    pub fn with_process<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value, String, bool, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ProcessResult>> + Send + 'static,
    {
        self.process = Some(Arc::new(
            move |node: Value, path: String, live_only: bool, generation: u64| -> BoxFuture<'static, anyhow::Result<ProcessResult>> {
                Box::pin(f(node, path, live_only, generation))
            },
        ));
        self
    }

    /// Remote bulk process: `(record, live_only, generation)`
    #[must_use]
    pub fn with_process_all<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value, bool, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ProcessResult>> + Send + 'static,
    {
        self.process_all = Some(Arc::new(
            move |node: Value, live_only: bool, generation: u64| -> BoxFuture<'static, anyhow::Result<ProcessResult>> {
                Box::pin(f(node, live_only, generation))
            },
        ));
        self
    }

    /// Remote bulk revalidation: `(record, live_only, generation)`
    #[must_use]
    pub fn with_revalidate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value, bool, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ProcessResult>> + Send + 'static,
    {
        self.revalidate = Some(Arc::new(
            move |node: Value, live_only: bool, generation: u64| -> BoxFuture<'static, anyhow::Result<ProcessResult>> {
                Box::pin(f(node, live_only, generation))
            },
        ));
        self
    }

    /// Custom application of server updates (default: replace patch)
    #[must_use]
    pub fn with_apply_update(
        mut self,
        f: impl Fn(&mut NodeRef<'_>, &Update) -> Result<(), FormError> + Send + Sync + 'static,
    ) -> Self {
        self.apply_update = Some(Arc::new(f));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_defaults() {
        let config = ChangeTrackerConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(DEFAULT_DEBOUNCE_MS));
        assert_eq!(config.freshness(), Duration::from_millis(DEFAULT_FRESHNESS_MS));
    }

    #[test]
    fn state_config_partial_deserialize() {
        let config: StateConfig =
            serde_json::from_str(r#"{"live_only": true, "tracker": {"debounce_ms": 50}}"#).unwrap();
        assert!(config.live_only);
        assert_eq!(config.tracker.debounce_ms, 50);
        assert_eq!(config.tracker.freshness_ms, DEFAULT_FRESHNESS_MS);
    }

    #[test]
    fn options_builder() {
        let options = FormStateOptions::new()
            .with_config(StateConfig::new().with_live_only(true))
            .with_save(|_node, _generation| async { Ok(None) });
        assert!(options.config.live_only);
        assert!(options.save.is_some());
        assert!(options.process.is_none());
    }
}
