//! The converter contract
//!
//! A converter turns the raw form of a field (what the user typed) into the
//! value stored in the data tree, and renders values back into raw form.

use crate::error::{ConfigError, ConvertError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

/// Bounds shared by raw and value types
///
/// Everything a converter produces must be storable in the JSON data tree.
pub trait Data:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Data for T where
    T: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Outcome of one raw → value attempt
///
/// Either carries the converted value or signals failure, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionResponse<V> {
    /// Conversion succeeded
    Value(V),
    /// The raw input could not be converted
    Error,
}

impl<V> ConversionResponse<V> {
    /// Check if conversion failed
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Converted value, if any
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Value(v) => Some(v),
            Self::Error => None,
        }
    }

    /// Consume into the converted value
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Value(v) => Some(v),
            Self::Error => None,
        }
    }

    /// Map the converted value
    #[inline]
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> ConversionResponse<U> {
        match self {
            Self::Value(v) => ConversionResponse::Value(f(v)),
            Self::Error => ConversionResponse::Error,
        }
    }
}

/// How an input widget binds to a field
///
/// Used when a field definition does not name a binding itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    /// Raw travels as the input's value
    #[default]
    Value,
    /// Raw travels as a checkbox's checked state
    Checked,
    /// Raw is a whole record or object
    Object,
}

/// Bidirectional raw ↔ value transformation with validation
#[async_trait]
pub trait Converter: Send + Sync + 'static {
    /// Pending/textual representation
    type Raw: Data;
    /// Representation stored in the data tree
    type Value: Data;

    /// Raw sentinel meaning "nothing entered"
    fn empty_raw(&self) -> Self::Raw;

    /// Fields using this converter are never required (e.g. booleans)
    fn never_required(&self) -> bool {
        false
    }

    /// Default input binding
    fn binding(&self) -> Binding {
        Binding::Value
    }

    /// Normalize raw before any check (e.g. trimming)
    fn preprocess_raw(&self, raw: Self::Raw) -> Self::Raw {
        raw
    }

    /// Convert raw into a value
    async fn convert(&self, raw: Self::Raw) -> ConversionResponse<Self::Value>;

    /// Render a value back into raw
    fn render(&self, value: &Self::Value) -> Self::Raw;
}

type RawValidate<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;
type ConvertFn<R, V> = Arc<dyn Fn(R) -> Result<V, ConvertError> + Send + Sync>;
type ValueValidate<V> = Arc<dyn Fn(&V) -> BoxFuture<'static, bool> + Send + Sync>;
type RenderFn<R, V> = Arc<dyn Fn(&V) -> R + Send + Sync>;
type PreprocessFn<R> = Arc<dyn Fn(R) -> R + Send + Sync>;

/// Converter assembled from closures
///
/// Built with [`ConverterBuilder`].
pub struct FnConverter<R, V> {
    empty_raw: R,
    empty_value: Option<V>,
    empty_impossible: bool,
    never_required: bool,
    binding: Binding,
    preprocess: Option<PreprocessFn<R>>,
    raw_validate: Option<RawValidate<R>>,
    convert: ConvertFn<R, V>,
    validate: Option<ValueValidate<V>>,
    render: RenderFn<R, V>,
}

impl<R: Debug, V: Debug> Debug for FnConverter<R, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConverter")
            .field("empty_raw", &self.empty_raw)
            .field("empty_value", &self.empty_value)
            .field("empty_impossible", &self.empty_impossible)
            .field("never_required", &self.never_required)
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R: Data, V: Data> Converter for FnConverter<R, V> {
    type Raw = R;
    type Value = V;

    fn empty_raw(&self) -> R {
        self.empty_raw.clone()
    }

    fn never_required(&self) -> bool {
        self.never_required
    }

    fn binding(&self) -> Binding {
        self.binding
    }

    fn preprocess_raw(&self, raw: R) -> R {
        match &self.preprocess {
            Some(preprocess) => preprocess(raw),
            None => raw,
        }
    }

    async fn convert(&self, raw: R) -> ConversionResponse<V> {
        if raw == self.empty_raw {
            if self.empty_impossible {
                return ConversionResponse::Error;
            }
            if let Some(empty) = &self.empty_value {
                return ConversionResponse::Value(empty.clone());
            }
        }
        if let Some(raw_validate) = &self.raw_validate {
            if !raw_validate(&raw) {
                return ConversionResponse::Error;
            }
        }
        let value = match (self.convert)(raw) {
            Ok(value) => value,
            Err(_) => return ConversionResponse::Error,
        };
        if let Some(validate) = &self.validate {
            if !validate(&value).await {
                return ConversionResponse::Error;
            }
        }
        ConversionResponse::Value(value)
    }

    fn render(&self, value: &V) -> R {
        (self.render)(value)
    }
}

/// Builder for [`FnConverter`]
///
/// # Example
///
/// ```rust
/// use formsync_convert::{ConverterBuilder, ConvertError};
///
/// let converter = ConverterBuilder::new(
///     String::new(),
///     |raw: String| raw.parse::<u32>().map_err(|_| ConvertError::new()),
///     |value: &u32| value.to_string(),
/// )
/// .empty_impossible()
/// .build()
/// .unwrap();
/// # let _ = converter;
/// ```
pub struct ConverterBuilder<R, V> {
    inner: FnConverter<R, V>,
}

impl<R: Data, V: Data> ConverterBuilder<R, V> {
    /// Start a converter from its empty raw, conversion and rendering
    pub fn new<C, F>(empty_raw: R, convert: C, render: F) -> Self
    where
        C: Fn(R) -> Result<V, ConvertError> + Send + Sync + 'static,
        F: Fn(&V) -> R + Send + Sync + 'static,
    {
        Self {
            inner: FnConverter {
                empty_raw,
                empty_value: None,
                empty_impossible: false,
                never_required: false,
                binding: Binding::Value,
                preprocess: None,
                raw_validate: None,
                convert: Arc::new(convert),
                validate: None,
                render: Arc::new(render),
            },
        }
    }

    /// Value produced for the empty raw, skipping conversion
    #[must_use]
    pub fn empty_value(mut self, value: V) -> Self {
        self.inner.empty_value = Some(value);
        self
    }

    /// The empty raw never converts
    #[must_use]
    pub fn empty_impossible(mut self) -> Self {
        self.inner.empty_impossible = true;
        self
    }

    /// Fields using this converter are never required
    #[must_use]
    pub fn never_required(mut self) -> Self {
        self.inner.never_required = true;
        self
    }

    /// Default binding
    #[must_use]
    pub fn binding(mut self, binding: Binding) -> Self {
        self.inner.binding = binding;
        self
    }

    /// Normalization applied before conversion
    #[must_use]
    pub fn preprocess(mut self, f: impl Fn(R) -> R + Send + Sync + 'static) -> Self {
        self.inner.preprocess = Some(Arc::new(f));
        self
    }

    /// Grammar check on raw, run before conversion
    #[must_use]
    pub fn raw_validate(mut self, f: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.inner.raw_validate = Some(Arc::new(f));
        self
    }

    /// Check on the converted value
    #[must_use]
    pub fn validate(mut self, f: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
        self.inner.validate = Some(Arc::new(move |value: &V| {
            let ok = f(value);
            Box::pin(async move { ok }) as BoxFuture<'static, bool>
        }));
        self
    }

    /// Asynchronous check on the converted value
    #[must_use]
    pub fn validate_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.inner.validate = Some(Arc::new(move |value: &V| {
            Box::pin(f(value)) as BoxFuture<'static, bool>
        }));
        self
    }

    /// Finish the converter
    ///
    /// # Errors
    /// Returns [`ConfigError::EmptyValueAndEmptyImpossible`] if both empty
    /// options were given.
    pub fn build(self) -> Result<FnConverter<R, V>, ConfigError> {
        if self.inner.empty_value.is_some() && self.inner.empty_impossible {
            return Err(ConfigError::EmptyValueAndEmptyImpossible);
        }
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    fn identity_string() -> ConverterBuilder<String, String> {
        ConverterBuilder::new(String::new(), |raw: String| Ok(raw), |v: &String| v.clone())
    }

    #[tokio::test]
    async fn simple_converter() {
        let converter = identity_string().empty_value(String::new()).build().unwrap();

        assert_eq!(
            converter.convert("foo".into()).await,
            ConversionResponse::Value("foo".to_string())
        );
        // text that looks like an error marker is still valid input
        assert_eq!(
            converter.convert("ConversionError".into()).await,
            ConversionResponse::Value("ConversionError".to_string())
        );
    }

    #[test]
    fn empty_value_and_empty_impossible_conflict() {
        let result = identity_string()
            .empty_value(String::new())
            .empty_impossible()
            .build();
        assert!(matches!(result, Err(ConfigError::EmptyValueAndEmptyImpossible)));
    }

    #[tokio::test]
    async fn converter_to_integer() {
        let converter = ConverterBuilder::new(
            String::new(),
            |raw: String| raw.parse::<i64>().map_err(|_| ConvertError::new()),
            |v: &i64| v.to_string(),
        )
        .empty_impossible()
        .raw_validate(|raw| !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()))
        .build()
        .unwrap();

        assert_eq!(converter.convert("3".into()).await, ConversionResponse::Value(3));
        assert!(converter.convert("not a number".into()).await.is_error());
        assert!(converter.convert(String::new()).await.is_error());
    }

    #[tokio::test]
    async fn converter_with_validate() {
        let converter = ConverterBuilder::new(
            String::new(),
            |raw: String| raw.parse::<i64>().map_err(|_| ConvertError::new()),
            |v: &i64| v.to_string(),
        )
        .empty_impossible()
        .validate(|v| *v <= 10)
        .build()
        .unwrap();

        assert_eq!(converter.convert("3".into()).await, ConversionResponse::Value(3));
        assert!(converter.convert("100".into()).await.is_error());
    }

    #[tokio::test]
    async fn converter_with_async_validate() {
        let (tx, rx) = oneshot::channel::<()>();
        let rx = Arc::new(Mutex::new(Some(rx)));
        let converter = identity_string()
            .empty_value(String::new())
            .validate_async(move |_v| {
                let rx = rx.lock().unwrap().take();
                async move {
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    true
                }
            })
            .build()
            .unwrap();

        let pending = tokio::spawn(async move { converter.convert("foo".into()).await });
        tx.send(()).unwrap();
        assert_eq!(
            pending.await.unwrap(),
            ConversionResponse::Value("foo".to_string())
        );
    }

    #[tokio::test]
    async fn convert_error_becomes_conversion_error() {
        let converter = ConverterBuilder::new(
            String::new(),
            |_raw: String| -> Result<String, ConvertError> { Err(ConvertError::new()) },
            |v: &String| v.clone(),
        )
        .empty_value(String::new())
        .build()
        .unwrap();

        assert!(converter.convert("foo".into()).await.is_error());
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected failure")]
    async fn other_failures_propagate() {
        let converter = ConverterBuilder::new(
            String::new(),
            |_raw: String| -> Result<String, ConvertError> { panic!("Unexpected failure") },
            |v: &String| v.clone(),
        )
        .build()
        .unwrap();

        let _ = converter.convert("foo".into()).await;
    }

    #[test]
    fn conversion_response_accessors() {
        let ok: ConversionResponse<i32> = ConversionResponse::Value(3);
        assert_eq!(ok.value(), Some(&3));
        assert_eq!(ok.map(|v| v * 2).into_value(), Some(6));
        assert!(ConversionResponse::<i32>::Error.value().is_none());
    }
}
