#![forbid(unsafe_code)]

//! Dynamically typed values carried by properties and bindings.
//!
//! Properties on a [`BindableObject`] are registered at runtime, so their
//! values are dynamic. [`Value`] covers the scalar kinds bindings coerce
//! between, ordered lists (what a multi-source binding combines its sources
//! into), and nested objects (what dotted property paths traverse).
//!
//! # Invariants
//!
//! 1. Equality is structural for data variants and identity-based for
//!    `Object` (two handles to the same host are equal).
//! 2. `Null` is accepted by every [`ValueKind`] and coerces to itself.
//! 3. [`Value::coerce`] never panics; `None` means "not representable".

use std::fmt;

use tether_i18n::format::{FormatArg, format_float, format_integer};
use tether_i18n::Culture;

use crate::reactive::host::BindableObject;

/// A dynamically typed property value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Object(BindableObject),
}

/// The declared kind of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueKind {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    Text,
    List,
    Object,
}

impl ValueKind {
    /// Whether a property of this kind can hold `value` without coercion.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        self == Self::Any || value.is_null() || value.kind() == self
    }
}

impl Value {
    /// Build a list value from anything convertible into values.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// The kind of this value. `Null` reports [`ValueKind::Any`].
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Any,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::List(_) => ValueKind::List,
            Self::Object(_) => ValueKind::Object,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: integers widen to floats.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&BindableObject> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Render as text using `culture` separators.
    #[must_use]
    pub fn to_text(&self, culture: &Culture) -> String {
        let mut out = String::new();
        self.write_arg(None, culture, &mut out);
        out
    }

    /// Convert into a value a property of `kind` accepts.
    ///
    /// Supported conversions: identity, `Int -> Float`, integral
    /// `Float -> Int`, `Bool <-> Int`, anything but objects to `Text`, and
    /// `Text` parsed into `Int`/`Float`/`Bool` (culture separators honored).
    #[must_use]
    pub fn coerce(&self, kind: ValueKind, culture: &Culture) -> Option<Value> {
        if kind.accepts(self) {
            return Some(self.clone());
        }
        match (kind, self) {
            (ValueKind::Float, Self::Int(i)) => Some(Self::Float(*i as f64)),
            (ValueKind::Int, Self::Float(f)) => {
                (f.fract() == 0.0 && f.abs() < 9.0e15).then(|| Self::Int(*f as i64))
            }
            (ValueKind::Int, Self::Bool(b)) => Some(Self::Int(i64::from(*b))),
            (ValueKind::Bool, Self::Int(i)) => Some(Self::Bool(*i != 0)),
            (ValueKind::Int, Self::Text(s)) => {
                culture.delocalize_number(s).parse().ok().map(Self::Int)
            }
            (ValueKind::Float, Self::Text(s)) => {
                culture.delocalize_number(s).parse().ok().map(Self::Float)
            }
            (ValueKind::Bool, Self::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Self::Bool(true)),
                "false" => Some(Self::Bool(false)),
                _ => None,
            },
            (ValueKind::Text, Self::Object(_)) => None,
            (ValueKind::Text, other) => Some(Self::Text(other.to_text(culture))),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl FormatArg for Value {
    fn write_arg(&self, spec: Option<&str>, culture: &Culture, out: &mut String) {
        match self {
            Self::Null => {}
            Self::Bool(b) => b.write_arg(spec, culture, out),
            Self::Int(i) => out.push_str(&format_integer(*i, spec, culture)),
            Self::Float(f) => out.push_str(&format_float(*f, spec, culture)),
            Self::Text(s) => out.push_str(s),
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_arg(spec, culture, out);
                }
                out.push(']');
            }
            Self::Object(obj) => {
                out.push('<');
                out.push_str(obj.type_name());
                out.push('>');
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(&Culture::invariant()))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<BindableObject> for Value {
    fn from(v: BindableObject) -> Self {
        Self::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
