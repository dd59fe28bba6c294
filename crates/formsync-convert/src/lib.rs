//! formsync converters
//!
//! Pure raw ↔ value transformation and validation units for form fields.
//! Nothing here knows about the data tree.
//!
//! # Core Concepts
//!
//! - [`Converter`]: the contract (`preprocess_raw`, `convert`, `render`)
//! - [`ConversionResponse`]: converted value or conversion error
//! - [`ConverterBuilder`]: converter assembled from closures
//! - [`converters`]: stock converters (`string`, `number`, `integer`,
//!   `decimal`, `boolean`, `string_array`, `model`, `object`, `maybe_null`)
//!
//! # Example
//!
//! ```rust,ignore
//! use formsync_convert::{converters, Converter, ConversionResponse};
//!
//! let number = converters::number();
//! assert_eq!(number.convert("19.".into()).await, ConversionResponse::Value(19.0));
//! ```

#![warn(unreachable_pub)]

mod converter;
pub mod converters;
mod error;

pub use converter::{Binding, ConversionResponse, Converter, ConverterBuilder, Data, FnConverter};
pub use converters::DecimalOptions;
pub use error::{ConfigError, ConvertError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
