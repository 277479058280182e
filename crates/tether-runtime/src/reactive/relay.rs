#![forbid(unsafe_code)]

//! The last hop of a multi-source binding.
//!
//! A [`MultiBinding`](super::MultiBinding) never writes its target directly.
//! It publishes the ordered source values into a [`ValueCell`], and a
//! [`RelayBinding`], an ordinary [`PathBinding`] pointed at that cell, carries
//! the value to the target. The combine transformation is plugged into the
//! path binding as its converter, so coercion to the target kind and
//! equal-value suppression behave exactly as for any single-source binding.

use std::rc::Rc;

use tether_i18n::Culture;

use super::binding::{PathBinding, PropertyBinding, ValueConverter};
use super::host::{BindableObject, PropertyId};
use super::multi_binding::CombineSettings;
use crate::error::BindingError;
use crate::value::{Value, ValueKind};

const CELL_PROPERTY: &str = "Value";

/// Observable holder of the latest combined source values.
#[derive(Clone, Debug)]
pub(crate) struct ValueCell {
    owner: BindableObject,
    property: PropertyId,
}

impl ValueCell {
    pub(crate) fn new(seed: Value) -> Self {
        let (owner, property) =
            BindableObject::with_single_property("MultiBinding.Cell", CELL_PROPERTY, seed);
        Self { owner, property }
    }

    pub(crate) fn get(&self) -> Value {
        self.owner.get(self.property).unwrap_or_default()
    }

    /// Store `value`; listeners run only if it differs from the current one.
    pub(crate) fn set(&self, value: Value) -> Result<(), BindingError> {
        self.owner.set(self.property, value)
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.owner.listener_count(self.property)
    }
}

/// Converter adapter that applies the aggregator's combine settings.
struct RelayConverter {
    settings: Rc<CombineSettings>,
}

impl ValueConverter for RelayConverter {
    fn convert(
        &self,
        value: &Value,
        target: ValueKind,
        _parameter: Option<&Value>,
        culture: &Culture,
    ) -> Result<Value, BindingError> {
        self.settings.apply(value, target, culture)
    }

    fn convert_back(
        &self,
        _value: &Value,
        _source: ValueKind,
        _parameter: Option<&Value>,
        _culture: &Culture,
    ) -> Result<Value, BindingError> {
        Err(BindingError::TargetToSource {
            binding: "MultiBinding",
        })
    }
}

/// Single-source binding from a [`ValueCell`] to the real target property.
#[derive(Debug)]
pub(crate) struct RelayBinding {
    inner: PathBinding,
}

impl RelayBinding {
    pub(crate) fn new(cell: &ValueCell, settings: Rc<CombineSettings>) -> Self {
        Self {
            inner: PathBinding::new(CELL_PROPERTY)
                .with_source(cell.owner.clone())
                .with_converter(RelayConverter { settings }),
        }
    }

    pub(crate) fn activate(
        &mut self,
        target: &BindableObject,
        property: PropertyId,
    ) -> Result<(), BindingError> {
        self.inner.activate(None, target, property)
    }

    pub(crate) fn refresh(&mut self, from_target: bool) -> Result<(), BindingError> {
        self.inner.refresh(from_target)
    }

    pub(crate) fn deactivate(&mut self) {
        self.inner.deactivate();
    }
}
