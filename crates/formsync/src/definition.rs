//! Form definitions
//!
//! Immutable schema describing which converter, validators and grouping
//! apply to each key of the data tree. Definitions are built once and shared
//! by every accessor created from them.

use crate::error::FormError;
use crate::state::NodeRef;
use async_trait::async_trait;
use formsync_convert::{Binding, ConversionResponse, Converter};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Default message for a blank required field
pub const DEFAULT_REQUIRED_ERROR: &str = "Required";

/// Default message for raw input that does not convert
pub const DEFAULT_CONVERSION_ERROR: &str = "Could not convert";

/// Validator over raw or value; `Some` non-empty message means failure
pub type Validator<T> = Arc<dyn Fn(&T) -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// Value computed from the owning record
pub type Derived<V> = Arc<dyn Fn(&Value) -> V + Send + Sync>;

/// Hook run after a field commits a changed value
pub type Change<V> = Arc<dyn Fn(&mut NodeRef<'_>, &V) -> Result<(), FormError> + Send + Sync>;

/// Knobs for a single pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Skip the required check
    pub ignore_required: bool,
}

/// Outcome of a field pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResponse {
    /// Converted and validated value, as stored in the tree
    Value(Value),
    /// Required, conversion or validator message
    Message(String),
}

/// Type-erased field definition
///
/// Implemented by [`Field`]; accessors only ever see this trait, so raw and
/// value travel as JSON.
#[async_trait]
pub trait FieldSpec: fmt::Debug + Send + Sync {
    /// Raw meaning "nothing entered"
    fn empty_raw(&self) -> Result<Value, FormError>;

    /// Required by definition
    fn required(&self) -> bool;

    /// Binding to use for inputs
    fn binding(&self) -> Binding;

    /// Check that raw has the converter's raw shape
    fn check_raw(&self, raw: &Value) -> Result<(), FormError>;

    /// Render a tree value into raw
    fn render(&self, value: &Value) -> Result<Value, FormError>;

    /// Compare two tree values the way the converter's value type does
    fn same_value(&self, a: &Value, b: &Value) -> bool;

    /// Run the conversion and validation pipeline on raw
    async fn process(
        &self,
        raw: Value,
        required: bool,
        options: ProcessOptions,
    ) -> Result<ProcessResponse, FormError>;

    /// Run the change hook, if any
    fn change(&self, node: &mut NodeRef<'_>, value: &Value) -> Result<(), FormError>;

    /// Compute the derived value from the owning record, if derived
    fn derive(&self, record: &Value) -> Option<Result<Value, FormError>>;
}

/// Field definition bound to a converter
pub struct Field<C: Converter> {
    converter: C,
    raw_validators: Vec<Validator<C::Raw>>,
    validators: Vec<Validator<C::Value>>,
    required: bool,
    required_error: String,
    conversion_error: String,
    binding: Option<Binding>,
    derived: Option<Derived<C::Value>>,
    change: Option<Change<C::Value>>,
}

impl<C: Converter> fmt::Debug for Field<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("required", &self.required)
            .field("raw_validators", &self.raw_validators.len())
            .field("validators", &self.validators.len())
            .field("derived", &self.derived.is_some())
            .field("change", &self.change.is_some())
            .finish_non_exhaustive()
    }
}

fn boxed<T, F>(f: F) -> Validator<T>
where
    F: Fn(&T) -> Option<String> + Send + Sync + 'static,
{
    Arc::new(move |v: &T| {
        let outcome = f(v);
        Box::pin(async move { outcome }) as BoxFuture<'static, Option<String>>
    })
}

fn boxed_async<T, F, Fut>(f: F) -> Validator<T>
where
    F: Fn(&T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<String>> + Send + 'static,
{
    Arc::new(move |v: &T| Box::pin(f(v)) as BoxFuture<'static, Option<String>>)
}

/// First non-empty message wins
async fn run_validators<T>(validators: &[Validator<T>], input: &T) -> Option<String> {
    for validator in validators {
        if let Some(message) = validator(input).await {
            if !message.is_empty() {
                return Some(message);
            }
        }
    }
    None
}

impl<C: Converter> Field<C> {
    /// Field with default messages, not required
    #[must_use]
    pub fn new(converter: C) -> Self {
        Self {
            converter,
            raw_validators: Vec::new(),
            validators: Vec::new(),
            required: false,
            required_error: DEFAULT_REQUIRED_ERROR.to_string(),
            conversion_error: DEFAULT_CONVERSION_ERROR.to_string(),
            binding: None,
            derived: None,
            change: None,
        }
    }

    /// Empty raw is a validation failure
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Message for a blank required field
    #[must_use]
    pub fn required_error(mut self, message: impl Into<String>) -> Self {
        self.required_error = message.into();
        self
    }

    /// Message for raw that does not convert
    #[must_use]
    pub fn conversion_error(mut self, message: impl Into<String>) -> Self {
        self.conversion_error = message.into();
        self
    }

    /// Override the converter's binding
    #[must_use]
    pub fn binding(mut self, binding: Binding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Check raw before conversion
    #[must_use]
    pub fn raw_validator(
        mut self,
        f: impl Fn(&C::Raw) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.raw_validators.push(boxed(f));
        self
    }

    /// Check raw before conversion, asynchronously
    #[must_use]
    pub fn raw_validator_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&C::Raw) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.raw_validators.push(boxed_async(f));
        self
    }

    /// Check the converted value
    #[must_use]
    pub fn validator(
        mut self,
        f: impl Fn(&C::Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.validators.push(boxed(f));
        self
    }

    /// Check the converted value, asynchronously
    #[must_use]
    pub fn validator_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&C::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.validators.push(boxed_async(f));
        self
    }

    /// Value recomputed from the owning record whenever the result changes
    #[must_use]
    pub fn derived(mut self, f: impl Fn(&Value) -> C::Value + Send + Sync + 'static) -> Self {
        self.derived = Some(Arc::new(f));
        self
    }

    /// Hook receiving the owning record and the newly committed value
    #[must_use]
    pub fn change(
        mut self,
        f: impl Fn(&mut NodeRef<'_>, &C::Value) -> Result<(), FormError> + Send + Sync + 'static,
    ) -> Self {
        self.change = Some(Arc::new(f));
        self
    }

    fn decode_value(value: &Value) -> Result<C::Value, FormError> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

#[async_trait]
impl<C: Converter> FieldSpec for Field<C> {
    fn empty_raw(&self) -> Result<Value, FormError> {
        Ok(serde_json::to_value(self.converter.empty_raw())?)
    }

    fn required(&self) -> bool {
        self.required
    }

    fn binding(&self) -> Binding {
        self.binding.unwrap_or_else(|| self.converter.binding())
    }

    fn check_raw(&self, raw: &Value) -> Result<(), FormError> {
        serde_json::from_value::<C::Raw>(raw.clone())?;
        Ok(())
    }

    fn render(&self, value: &Value) -> Result<Value, FormError> {
        let value = Self::decode_value(value)?;
        Ok(serde_json::to_value(self.converter.render(&value))?)
    }

    fn same_value(&self, a: &Value, b: &Value) -> bool {
        match (Self::decode_value(a), Self::decode_value(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        }
    }

    async fn process(
        &self,
        raw: Value,
        required: bool,
        options: ProcessOptions,
    ) -> Result<ProcessResponse, FormError> {
        let raw: C::Raw = serde_json::from_value(raw)?;
        let raw = self.converter.preprocess_raw(raw);
        let is_empty = raw == self.converter.empty_raw();

        if required && is_empty && !options.ignore_required && !self.converter.never_required() {
            return Ok(ProcessResponse::Message(self.required_error.clone()));
        }
        if let Some(message) = run_validators(&self.raw_validators, &raw).await {
            return Ok(ProcessResponse::Message(message));
        }
        let value = match self.converter.convert(raw).await {
            ConversionResponse::Value(value) => value,
            // garbage and blank are told apart: a blank field is a missing one
            ConversionResponse::Error if is_empty => {
                return Ok(ProcessResponse::Message(self.required_error.clone()))
            }
            ConversionResponse::Error => {
                return Ok(ProcessResponse::Message(self.conversion_error.clone()))
            }
        };
        if let Some(message) = run_validators(&self.validators, &value).await {
            return Ok(ProcessResponse::Message(message));
        }
        Ok(ProcessResponse::Value(serde_json::to_value(value)?))
    }

    fn change(&self, node: &mut NodeRef<'_>, value: &Value) -> Result<(), FormError> {
        match &self.change {
            Some(change) => change(node, &Self::decode_value(value)?),
            None => Ok(()),
        }
    }

    fn derive(&self, record: &Value) -> Option<Result<Value, FormError>> {
        self.derived
            .as_ref()
            .map(|derived| serde_json::to_value(derived(record)).map_err(FormError::from))
    }
}

/// Named subset of sibling keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    include: Option<Vec<String>>,
    exclude: Vec<String>,
}

impl Group {
    /// Only these keys
    #[must_use]
    pub fn include<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self {
            include: Some(keys.into_iter().map(Into::into).collect()),
            exclude: Vec::new(),
        }
    }

    /// Every key but these
    #[must_use]
    pub fn exclude<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self {
            include: None,
            exclude: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if a key belongs to the group
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let included = match &self.include {
            Some(include) => include.iter().any(|k| k == key),
            None => true,
        };
        included && !self.exclude.iter().any(|k| k == key)
    }
}

/// One entry of a form definition
#[derive(Debug, Clone)]
pub enum Entry {
    /// Leaf bound to a converter
    Field(Arc<dyn FieldSpec>),
    /// Nested record
    SubForm(SubForm),
    /// List of records
    RepeatingForm(RepeatingForm),
}

/// Schema for one record
///
/// # Example
///
/// ```rust,ignore
/// use formsync::{Field, Form, RepeatingForm};
/// use formsync_convert::converters;
///
/// let form = Form::new()
///     .field("name", Field::new(converters::string()).required())
///     .repeating_form("lines", RepeatingForm::new(
///         Form::new().field("amount", Field::new(converters::decimal(Default::default())?)),
///     ));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Form {
    entries: IndexMap<String, Entry>,
    groups: IndexMap<String, Group>,
}

impl Form {
    /// Empty definition
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a field to a key
    #[must_use]
    pub fn field<C: Converter>(mut self, key: impl Into<String>, field: Field<C>) -> Self {
        self.entries.insert(key.into(), Entry::Field(Arc::new(field)));
        self
    }

    /// Bind a nested record to a key
    #[must_use]
    pub fn sub_form(mut self, key: impl Into<String>, sub_form: SubForm) -> Self {
        self.entries.insert(key.into(), Entry::SubForm(sub_form));
        self
    }

    /// Bind a list of records to a key
    #[must_use]
    pub fn repeating_form(mut self, key: impl Into<String>, repeating: RepeatingForm) -> Self {
        self.entries.insert(key.into(), Entry::RepeatingForm(repeating));
        self
    }

    /// Declare a group of sibling keys
    #[must_use]
    pub fn group(mut self, name: impl Into<String>, group: Group) -> Self {
        self.groups.insert(name.into(), group);
        self
    }

    /// Entries in declaration order
    #[inline]
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entry for a key
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Group by name
    #[inline]
    #[must_use]
    pub fn get_group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }
}

/// Nested record definition
#[derive(Debug, Clone)]
pub struct SubForm {
    definition: Arc<Form>,
}

impl SubForm {
    /// Wrap a definition
    #[must_use]
    pub fn new(definition: Form) -> Self {
        Self {
            definition: Arc::new(definition),
        }
    }

    /// Nested definition
    #[inline]
    #[must_use]
    pub fn definition(&self) -> &Arc<Form> {
        &self.definition
    }
}

/// List-of-records definition
#[derive(Debug, Clone)]
pub struct RepeatingForm {
    definition: Arc<Form>,
}

impl RepeatingForm {
    /// Wrap the per-row definition
    #[must_use]
    pub fn new(definition: Form) -> Self {
        Self {
            definition: Arc::new(definition),
        }
    }

    /// Per-row definition
    #[inline]
    #[must_use]
    pub fn definition(&self) -> &Arc<Form> {
        &self.definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsync_convert::converters;
    use serde_json::json;

    async fn process(spec: &dyn FieldSpec, raw: Value, required: bool) -> ProcessResponse {
        spec.process(raw, required, ProcessOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_raw_on_required_field_is_required_message() {
        let field = Field::new(converters::number()).required();
        assert_eq!(
            process(&field, json!(""), true).await,
            ProcessResponse::Message(DEFAULT_REQUIRED_ERROR.into())
        );
        assert_eq!(
            process(&field, json!("   "), true).await,
            ProcessResponse::Message(DEFAULT_REQUIRED_ERROR.into())
        );
    }

    #[tokio::test]
    async fn empty_raw_conversion_failure_reads_as_required() {
        // not required, but blank still cannot become a number
        let field = Field::new(converters::number());
        assert_eq!(
            process(&field, json!(""), false).await,
            ProcessResponse::Message(DEFAULT_REQUIRED_ERROR.into())
        );
        assert_eq!(
            process(&field, json!("1foo"), false).await,
            ProcessResponse::Message(DEFAULT_CONVERSION_ERROR.into())
        );
    }

    #[tokio::test]
    async fn ignore_required_skips_check() {
        let field = Field::new(converters::string()).required();
        let response = field
            .process(json!(""), true, ProcessOptions { ignore_required: true })
            .await
            .unwrap();
        assert_eq!(response, ProcessResponse::Value(json!("")));
    }

    #[tokio::test]
    async fn never_required_converter() {
        let field = Field::new(converters::boolean()).required();
        assert_eq!(
            process(&field, json!(false), true).await,
            ProcessResponse::Value(json!(false))
        );
    }

    #[tokio::test]
    async fn validators_short_circuit_in_order() {
        let field = Field::new(converters::integer())
            .raw_validator(|raw: &String| (raw == "13").then(|| "unlucky".to_string()))
            .validator(|_v: &i64| Some(String::new()))
            .validator_async(|v: &i64| {
                let v = *v;
                async move { (v > 10).then(|| "too big".to_string()) }
            })
            .validator(|_v: &i64| Some("never reached".to_string()));

        assert_eq!(
            process(&field, json!("13"), false).await,
            ProcessResponse::Message("unlucky".into())
        );
        assert_eq!(
            process(&field, json!("12"), false).await,
            ProcessResponse::Message("too big".into())
        );
        assert_eq!(
            process(&field, json!("3"), false).await,
            ProcessResponse::Message("never reached".into())
        );
    }

    #[tokio::test]
    async fn custom_messages() {
        let field = Field::new(converters::integer())
            .required()
            .required_error("fill me")
            .conversion_error("digits only");
        assert_eq!(
            process(&field, json!(""), true).await,
            ProcessResponse::Message("fill me".into())
        );
        assert_eq!(
            process(&field, json!("x"), true).await,
            ProcessResponse::Message("digits only".into())
        );
    }

    #[tokio::test]
    async fn wrong_raw_type_is_an_error() {
        let field = Field::new(converters::number());
        let result = field
            .process(json!(true), false, ProcessOptions::default())
            .await;
        assert!(matches!(result, Err(FormError::TypeMismatch(_))));
    }

    #[test]
    fn render_and_compare() {
        let field = Field::new(converters::number());
        assert_eq!(field.render(&json!(19)).unwrap(), json!("19"));
        assert_eq!(field.render(&json!(0.14)).unwrap(), json!("0.14"));
        assert!(field.same_value(&json!(17), &json!(17.0)));
        assert!(!field.same_value(&json!(17), &json!(18)));
    }

    #[test]
    fn raw_shape_check() {
        let field = Field::new(converters::string());
        assert!(field.check_raw(&json!("x")).is_ok());
        assert!(field.check_raw(&json!(3)).is_err());
    }

    #[test]
    fn binding_defaults_to_converter() {
        let checkbox = Field::new(converters::boolean());
        assert_eq!(FieldSpec::binding(&checkbox), Binding::Checked);
        let picker = Field::new(converters::string()).binding(Binding::Object);
        assert_eq!(FieldSpec::binding(&picker), Binding::Object);
    }

    #[test]
    fn derived_value() {
        let field = Field::new(converters::number()).derived(|record: &Value| {
            record["a"].as_f64().unwrap_or_default() * 2.0
        });
        assert_eq!(field.derive(&json!({"a": 2})).unwrap().unwrap(), json!(4.0));
        assert!(Field::new(converters::number()).derive(&json!({})).is_none());
    }

    #[test]
    fn group_membership() {
        let include = Group::include(["a", "b"]);
        assert!(include.contains("a"));
        assert!(!include.contains("c"));

        let exclude = Group::exclude(["a"]);
        assert!(!exclude.contains("a"));
        assert!(exclude.contains("z"));
    }

    #[test]
    fn form_keeps_declaration_order() {
        let form = Form::new()
            .field("b", Field::new(converters::string()))
            .field("a", Field::new(converters::string()))
            .repeating_form("rows", RepeatingForm::new(Form::new()))
            .sub_form("sub", SubForm::new(Form::new()))
            .group("g", Group::include(["a"]));
        let keys: Vec<_> = form.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "rows", "sub"]);
        assert!(matches!(form.get("rows"), Some(Entry::RepeatingForm(_))));
        assert!(form.get_group("g").is_some());
    }
}
