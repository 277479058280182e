#![forbid(unsafe_code)]

//! Culture model and composite format templates used by tether bindings.
//!
//! - [`culture`]: locale tags and number-rendering conventions.
//! - [`format`]: `"{0} is {1}"`-style templates with alignment and numeric
//!   specifiers.

pub mod culture;
pub mod format;

pub use culture::{Culture, Locale, normalize_locale};
pub use format::{FormatArg, FormatError, FormatTemplate, Placeholder};
