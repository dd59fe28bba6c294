//! formsync - live form state over a data tree
//!
//! Keeps a validated, two-way-bound accessor tree over a JSON record and
//! reconciles it with an asynchronous remote authority:
//! - Field pipelines turn raw input into committed values
//! - Repeating forms renumber rows instead of rebuilding them
//! - A per-path debounce schedules background `process` calls
//! - Server results never overwrite fresher local edits or a newer generation
//!
//! # Example
//!
//! ```rust,ignore
//! use formsync::{Field, Form, FormState, FormStateOptions, ProcessResult};
//! use formsync_convert::converters;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), formsync::FormError> {
//! let form = Form::new().field("age", Field::new(converters::integer()).required());
//! let options = FormStateOptions::new()
//!     .with_process(|_record, path, _live_only, generation| async move {
//!         Ok(ProcessResult::new().with_generation(generation).with_warning(path, "checked"))
//!     });
//! let state = FormState::new(form, json!({"age": 1}), options)?;
//!
//! state.field("age")?.set_raw("42").await?;
//! assert_eq!(state.value(), json!({"age": 42}));
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod accessor;
pub mod backend;
pub mod change_tracker;
pub mod config;
pub mod definition;
pub mod error;
pub mod path;
pub mod state;
pub mod tree;

pub use accessor::{
    Accessor, AccessorId, AccessorInfo, AccessorKind, FieldAccessor, FormAccessor,
    GroupAccessor, RepeatingFormAccessor, RepeatingFormIndexedAccessor, ValidateOptions,
};
pub use backend::{
    AccessUpdate, ApplyUpdateFn, Message, ProcessAllFn, ProcessFn, ProcessResult, SaveFn,
    Severity, Update, ValidationInfo,
};
pub use change_tracker::{ChangeTracker, TrackerCallback};
pub use config::{AccessPolicy, ChangeTrackerConfig, FormStateOptions, StateConfig};
pub use definition::{
    Entry, Field, FieldSpec, Form, Group, ProcessOptions, ProcessResponse, RepeatingForm, SubForm,
};
pub use error::FormError;
pub use path::{is_int, path_to_fieldref, path_to_steps, steps_to_path, PathError, TreePath};
pub use state::{FormState, NodeRef};
pub use tree::{delete_by_path, get_by_path, DataTree, Patch};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building forms
    pub use crate::{
        Field, FieldAccessor, Form, FormAccessor, FormError, FormState, FormStateOptions,
        Group, ProcessResult, RepeatingForm, RepeatingFormAccessor, SubForm,
    };
    pub use formsync_convert::converters;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
