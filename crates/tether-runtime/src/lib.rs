#![forbid(unsafe_code)]

//! Data bindings for tether.
//!
//! This crate provides:
//! - [`reactive`]: property hosts, single-source and multi-source bindings
//! - [`value`]: the dynamic [`Value`] carried between properties
//! - [`locale`]: the thread-local culture used by converters and formats
//! - [`error`]: the [`BindingError`] type shared by all of the above

pub mod error;
pub mod locale;
pub mod reactive;
pub mod value;

pub use error::BindingError;
pub use locale::{CultureContext, CultureOverride, current_culture, set_culture};
pub use reactive::{
    ActivationPhase, BindableObject, BindingMode, MultiBinding, MultiBindingBuilder,
    MultiValueConverter, PathBinding, PropertyBinding, PropertyId, PropertySpec,
};
pub use tether_i18n::Culture;
pub use value::{Value, ValueKind};
