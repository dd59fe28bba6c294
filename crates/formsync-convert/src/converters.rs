//! Stock converters
//!
//! Text converters trim their raw input and check it against a grammar before
//! parsing. The decimal converter keeps the text as its value so no floating
//! point rounding ever happens.

use crate::converter::{Binding, ConversionResponse, Converter, Data};
use crate::error::ConfigError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::marker::PhantomData;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(0|[1-9]\d*)(\.\d*)?$").expect("number grammar compiles"));
static INTEGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(0|[1-9]\d*)$").expect("integer grammar compiles"));

/// A leading `.` is read as `0.`
fn with_leading_zero(raw: &str) -> std::borrow::Cow<'_, str> {
    if raw.starts_with('.') {
        std::borrow::Cow::Owned(format!("0{raw}"))
    } else {
        std::borrow::Cow::Borrowed(raw)
    }
}

/// Plain text
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

#[async_trait]
impl Converter for StringConverter {
    type Raw = String;
    type Value = String;

    fn empty_raw(&self) -> String {
        String::new()
    }

    fn preprocess_raw(&self, raw: String) -> String {
        raw.trim().to_string()
    }

    async fn convert(&self, raw: String) -> ConversionResponse<String> {
        ConversionResponse::Value(raw)
    }

    fn render(&self, value: &String) -> String {
        value.clone()
    }
}

/// Floating point number
///
/// Accepts `19.` and `.14`; rejects anything with trailing garbage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberConverter;

#[async_trait]
impl Converter for NumberConverter {
    type Raw = String;
    type Value = f64;

    fn empty_raw(&self) -> String {
        String::new()
    }

    fn preprocess_raw(&self, raw: String) -> String {
        raw.trim().to_string()
    }

    async fn convert(&self, raw: String) -> ConversionResponse<f64> {
        let normalized = with_leading_zero(&raw);
        if !NUMBER_RE.is_match(&normalized) {
            return ConversionResponse::Error;
        }
        match normalized.parse::<f64>() {
            Ok(value) if value.is_finite() => ConversionResponse::Value(value),
            _ => ConversionResponse::Error,
        }
    }

    fn render(&self, value: &f64) -> String {
        value.to_string()
    }
}

/// Whole number
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerConverter;

#[async_trait]
impl Converter for IntegerConverter {
    type Raw = String;
    type Value = i64;

    fn empty_raw(&self) -> String {
        String::new()
    }

    fn preprocess_raw(&self, raw: String) -> String {
        raw.trim().to_string()
    }

    async fn convert(&self, raw: String) -> ConversionResponse<i64> {
        if !INTEGER_RE.is_match(&raw) {
            return ConversionResponse::Error;
        }
        // out of range is a conversion failure, not a panic
        match raw.parse::<i64>() {
            Ok(value) => ConversionResponse::Value(value),
            Err(_) => ConversionResponse::Error,
        }
    }

    fn render(&self, value: &i64) -> String {
        value.to_string()
    }
}

/// Bounds for [`Decimal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalOptions {
    /// Digits allowed before the separator; `0` means the default of 10
    pub max_whole_digits: u32,
    /// Digits allowed after the separator; `0` means the default of 2
    pub decimal_places: u32,
    /// Accept a leading `-`
    pub allow_negative: bool,
}

impl DecimalOptions {
    /// Options with explicit digit bounds, negatives allowed
    #[inline]
    #[must_use]
    pub fn new(max_whole_digits: u32, decimal_places: u32) -> Self {
        Self {
            max_whole_digits,
            decimal_places,
            allow_negative: true,
        }
    }

    /// Reject negative numbers
    #[inline]
    #[must_use]
    pub fn non_negative(mut self) -> Self {
        self.allow_negative = false;
        self
    }
}

impl Default for DecimalOptions {
    fn default() -> Self {
        Self::new(10, 2)
    }
}

/// Bounded-precision decimal kept as text
#[derive(Debug, Clone)]
pub struct Decimal {
    grammar: Regex,
    options: DecimalOptions,
}

impl Decimal {
    /// Build the grammar for the given bounds
    ///
    /// # Errors
    /// Returns [`ConfigError::Pattern`] if the grammar cannot be compiled.
    pub fn new(options: DecimalOptions) -> Result<Self, ConfigError> {
        let whole = if options.max_whole_digits == 0 {
            10
        } else {
            options.max_whole_digits
        };
        let places = if options.decimal_places == 0 {
            2
        } else {
            options.decimal_places
        };
        let sign = if options.allow_negative { "-?" } else { "" };
        let grammar = Regex::new(&format!(
            r"^{sign}(0|[1-9]\d{{0,{}}})(\.\d{{0,{places}}})?$",
            whole - 1
        ))?;
        Ok(Self { grammar, options })
    }

    /// Bounds this converter was built with
    #[inline]
    #[must_use]
    pub fn options(&self) -> DecimalOptions {
        self.options
    }
}

#[async_trait]
impl Converter for Decimal {
    type Raw = String;
    type Value = String;

    fn empty_raw(&self) -> String {
        String::new()
    }

    fn preprocess_raw(&self, raw: String) -> String {
        raw.trim().to_string()
    }

    async fn convert(&self, raw: String) -> ConversionResponse<String> {
        if raw.is_empty() || raw == "." {
            return ConversionResponse::Error;
        }
        if !self.grammar.is_match(&with_leading_zero(&raw)) {
            return ConversionResponse::Error;
        }
        ConversionResponse::Value(raw)
    }

    fn render(&self, value: &String) -> String {
        value.clone()
    }
}

/// Checkbox state; never required
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanConverter;

#[async_trait]
impl Converter for BooleanConverter {
    type Raw = bool;
    type Value = bool;

    fn empty_raw(&self) -> bool {
        false
    }

    fn never_required(&self) -> bool {
        true
    }

    fn binding(&self) -> Binding {
        Binding::Checked
    }

    async fn convert(&self, raw: bool) -> ConversionResponse<bool> {
        ConversionResponse::Value(raw)
    }

    fn render(&self, value: &bool) -> bool {
        *value
    }
}

/// List of strings lifted into the tree's list representation
#[derive(Debug, Clone, Copy, Default)]
pub struct StringArray;

#[async_trait]
impl Converter for StringArray {
    type Raw = Vec<String>;
    type Value = Vec<String>;

    fn empty_raw(&self) -> Vec<String> {
        Vec::new()
    }

    async fn convert(&self, raw: Vec<String>) -> ConversionResponse<Vec<String>> {
        ConversionResponse::Value(raw)
    }

    fn render(&self, value: &Vec<String>) -> Vec<String> {
        value.clone()
    }
}

/// Reference to a tree record; nothing selected does not convert
#[derive(Debug)]
pub struct Model<M>(PhantomData<fn() -> M>);

impl<M> Default for Model<M> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<M: Data> Converter for Model<M> {
    type Raw = Option<M>;
    type Value = M;

    fn empty_raw(&self) -> Option<M> {
        None
    }

    fn binding(&self) -> Binding {
        Binding::Object
    }

    async fn convert(&self, raw: Option<M>) -> ConversionResponse<M> {
        match raw {
            Some(record) => ConversionResponse::Value(record),
            None => ConversionResponse::Error,
        }
    }

    fn render(&self, value: &M) -> Option<M> {
        Some(value.clone())
    }
}

/// Arbitrary JSON, passed through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectConverter;

#[async_trait]
impl Converter for ObjectConverter {
    type Raw = serde_json::Value;
    type Value = serde_json::Value;

    fn empty_raw(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    async fn convert(&self, raw: serde_json::Value) -> ConversionResponse<serde_json::Value> {
        ConversionResponse::Value(raw)
    }

    fn render(&self, value: &serde_json::Value) -> serde_json::Value {
        value.clone()
    }
}

/// Text converter whose empty raw means `null`
///
/// The wrapped converter is not consulted for empty input.
#[derive(Debug, Clone)]
pub struct MaybeNull<C>(C);

impl<C> MaybeNull<C> {
    /// Wrapped converter
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.0
    }
}

#[async_trait]
impl<C> Converter for MaybeNull<C>
where
    C: Converter<Raw = String>,
{
    type Raw = String;
    type Value = Option<C::Value>;

    fn empty_raw(&self) -> String {
        String::new()
    }

    fn preprocess_raw(&self, raw: String) -> String {
        raw.trim().to_string()
    }

    async fn convert(&self, raw: String) -> ConversionResponse<Option<C::Value>> {
        if raw.trim().is_empty() {
            return ConversionResponse::Value(None);
        }
        self.0.convert(raw).await.map(Some)
    }

    fn render(&self, value: &Option<C::Value>) -> String {
        match value {
            Some(value) => self.0.render(value),
            None => String::new(),
        }
    }
}

/// Record reference where nothing selected means `null`
#[derive(Debug)]
pub struct MaybeNullModel<M>(PhantomData<fn() -> M>);

impl<M> Default for MaybeNullModel<M> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<M: Data> Converter for MaybeNullModel<M> {
    type Raw = Option<M>;
    type Value = Option<M>;

    fn empty_raw(&self) -> Option<M> {
        None
    }

    fn binding(&self) -> Binding {
        Binding::Object
    }

    async fn convert(&self, raw: Option<M>) -> ConversionResponse<Option<M>> {
        ConversionResponse::Value(raw)
    }

    fn render(&self, value: &Option<M>) -> Option<M> {
        value.clone()
    }
}

/// Plain text
#[inline]
#[must_use]
pub fn string() -> StringConverter {
    StringConverter
}

/// Floating point number
#[inline]
#[must_use]
pub fn number() -> NumberConverter {
    NumberConverter
}

/// Whole number
#[inline]
#[must_use]
pub fn integer() -> IntegerConverter {
    IntegerConverter
}

/// Bounded decimal kept as text
///
/// # Errors
/// Returns [`ConfigError::Pattern`] if the grammar cannot be compiled.
pub fn decimal(options: DecimalOptions) -> Result<Decimal, ConfigError> {
    Decimal::new(options)
}

/// Checkbox
#[inline]
#[must_use]
pub fn boolean() -> BooleanConverter {
    BooleanConverter
}

/// List of strings
#[inline]
#[must_use]
pub fn string_array() -> StringArray {
    StringArray
}

/// Record reference
#[inline]
#[must_use]
pub fn model<M: Data>() -> Model<M> {
    Model::default()
}

/// Arbitrary JSON
#[inline]
#[must_use]
pub fn object() -> ObjectConverter {
    ObjectConverter
}

/// Empty text converts to `null`
#[inline]
#[must_use]
pub fn maybe_null<C: Converter<Raw = String>>(converter: C) -> MaybeNull<C> {
    MaybeNull(converter)
}

/// Unselected record converts to `null`
#[inline]
#[must_use]
pub fn maybe_null_model<M: Data>() -> MaybeNullModel<M> {
    MaybeNullModel::default()
}
