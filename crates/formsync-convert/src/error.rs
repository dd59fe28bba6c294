//! Error types for converters

/// Raised by a conversion closure to signal that the raw input cannot be
/// turned into a value.
///
/// This is the only failure a converter turns into
/// [`ConversionResponse::Error`](crate::ConversionResponse::Error). Panics are
/// not caught.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("could not convert{}", .0.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct ConvertError(pub Option<String>);

impl ConvertError {
    /// Conversion failure without detail
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(None)
    }

    /// Conversion failure with a diagnostic message
    #[inline]
    #[must_use]
    pub fn with_message(message: impl Into<String>) -> Self {
        Self(Some(message.into()))
    }
}

/// Converter configuration errors
///
/// These are programmer errors, reported when the converter is built.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `empty_value` and `empty_impossible` were both given
    #[error("cannot set both empty_value and empty_impossible")]
    EmptyValueAndEmptyImpossible,

    /// A generated grammar failed to compile
    #[error("invalid converter grammar: {0}")]
    Pattern(#[from] regex::Error),
}
