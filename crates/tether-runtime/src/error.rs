#![forbid(unsafe_code)]

//! Error type shared by the property host and every binding kind.
//!
//! Two classes matter to callers:
//!
//! - **Unsupported mode**: a binding was asked to run in a direction it does
//!   not implement ([`BindingError::UnsupportedMode`],
//!   [`BindingError::TargetToSource`]).
//! - **Configuration**: the binding's declaration was changed at a point
//!   where changes are no longer allowed, or was malformed
//!   ([`BindingError::Sealed`], [`BindingError::SourcesLocked`],
//!   [`BindingError::Format`]).
//!
//! Both are programming errors and surface synchronously at the offending
//! call. Nothing in the runtime retries or swallows them.

use std::fmt;

use tether_i18n::FormatError;

use crate::reactive::binding::BindingMode;
use crate::reactive::host::PropertyId;
use crate::value::ValueKind;

/// Errors from property hosts and bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingError {
    /// Activation was attempted in a mode the binding does not support.
    UnsupportedMode {
        binding: &'static str,
        mode: BindingMode,
    },
    /// A target-to-source conversion was requested from a one-way binding.
    TargetToSource { binding: &'static str },
    /// A write-once setting was changed after the first activation.
    Sealed { setting: &'static str },
    /// The source list was changed while the binding is active.
    SourcesLocked,
    /// A string format template was malformed or could not be rendered.
    Format(FormatError),
    /// A user-supplied converter failed.
    Converter(String),
    /// The property id is not registered on this host.
    UnknownProperty(PropertyId),
    /// A property with this name already exists on the host.
    DuplicateProperty { name: String },
    /// A value of the wrong kind was written to a typed property.
    TypeMismatch {
        property: String,
        expected: ValueKind,
        found: ValueKind,
    },
}

impl BindingError {
    /// Whether this error belongs to the unsupported-mode class.
    #[must_use]
    pub fn is_unsupported_mode(&self) -> bool {
        matches!(self, Self::UnsupportedMode { .. } | Self::TargetToSource { .. })
    }

    /// Whether this error belongs to the configuration class.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Sealed { .. } | Self::SourcesLocked | Self::Format(_)
        )
    }

    /// Convenience constructor for converter failures.
    pub fn converter(message: impl Into<String>) -> Self {
        Self::Converter(message.into())
    }
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedMode { binding, mode } => write!(
                f,
                "{binding} only supports BindingMode::OneWay (requested {mode:?})"
            ),
            Self::TargetToSource { binding } => write!(
                f,
                "{binding} only supports BindingMode::OneWay; target-to-source conversion is unavailable"
            ),
            Self::Sealed { setting } => {
                write!(f, "cannot change {setting} after the binding has been activated")
            }
            Self::SourcesLocked => write!(f, "cannot change sources while the binding is active"),
            Self::Format(err) => write!(f, "string format error: {err}"),
            Self::Converter(msg) => write!(f, "converter failed: {msg}"),
            Self::UnknownProperty(id) => write!(f, "unknown property {id}"),
            Self::DuplicateProperty { name } => write!(f, "property '{name}' is already registered"),
            Self::TypeMismatch {
                property,
                expected,
                found,
            } => write!(
                f,
                "property '{property}' expects {expected:?} but received {found:?}"
            ),
        }
    }
}

impl std::error::Error for BindingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Format(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FormatError> for BindingError {
    fn from(err: FormatError) -> Self {
        Self::Format(err)
    }
}
