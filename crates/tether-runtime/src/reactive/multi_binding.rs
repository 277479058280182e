#![forbid(unsafe_code)]

//! Multi-source bindings: one target property derived from N sources.
//!
//! A [`MultiBinding`] owns an ordered list of child bindings. On activation
//! each child is pointed at its own synthetic property on the host object
//! (a *source slot*). Whenever any slot changes, the aggregator gathers all
//! slot values in declaration order, stores them in its value cell, and the
//! relay binding carries the combined result to the real target.
//!
//! ```ignore
//! use tether_runtime::reactive::{BindableObject, MultiBinding, PathBinding, PropertyBinding};
//! use tether_runtime::value::{Value, ValueKind};
//!
//! let point = BindableObject::new("Point");
//! let x = point.define("X", ValueKind::Int, 3)?;
//! point.define("Y", ValueKind::Int, 4)?;
//!
//! let label = BindableObject::new("Label");
//! let text = label.define("Text", ValueKind::Text, "")?;
//!
//! let mut binding = MultiBinding::builder()
//!     .source(PathBinding::new("X"))
//!     .source(PathBinding::new("Y"))
//!     .string_format("({0}, {1})")
//!     .build()?;
//! binding.activate(Some(&point), &label, text)?;
//! assert_eq!(label.get(text)?, Value::from("(3, 4)"));
//!
//! point.set(x, 5)?;
//! assert_eq!(label.get(text)?, Value::from("(5, 4)"));
//! ```
//!
//! # Activation phases
//!
//! `Inactive → Wiring → Active`. While `Wiring`, slot writes made by the
//! children's own activation do not recombine; exactly one recombine runs
//! when wiring completes.
//!
//! # Invariants
//!
//! 1. The values handed to the combining function are in source declaration
//!    order, whichever source changed.
//! 2. While active there is exactly one slot per source.
//! 3. A recombine that produces the value already in the cell notifies
//!    nothing downstream.
//! 4. Converter, converter parameter, and string format are sealed by the
//!    first successful activation and stay sealed after deactivation.
//! 5. Only [`BindingMode::OneWay`] is supported.
//! 6. Clones share no child binding and carry no activation state.
//!
//! # Re-entrancy
//!
//! A recombine reads the slots as they are when its callback runs; nothing
//! is snapshotted. A combining function that writes back into one of its
//! own sources triggers a nested recombine whose ordering relative to the
//! outer pass is not specified.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tether_i18n::{Culture, FormatTemplate};
use tracing::{debug, debug_span, trace};

use super::binding::{BindingMode, PropertyBinding};
use super::host::{BindableObject, PropertyId, PropertySpec, WeakBindableObject};
use super::relay::{RelayBinding, ValueCell};
use crate::error::BindingError;
use crate::locale::current_culture;
use crate::value::{Value, ValueKind};

const BINDING_NAME: &str = "MultiBinding";

static NEXT_ACTIVATION: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Combining function
// ---------------------------------------------------------------------------

/// Combines the ordered source values into one derived value.
///
/// Implemented for closures of the matching shape:
///
/// ```ignore
/// let sum = |values: &[Value], _: ValueKind, _: Option<&Value>, _: &Culture| {
///     Ok::<_, BindingError>(Value::Int(values.iter().filter_map(Value::as_int).sum()))
/// };
/// ```
pub trait MultiValueConverter {
    fn convert(
        &self,
        values: &[Value],
        target: ValueKind,
        parameter: Option<&Value>,
        culture: &Culture,
    ) -> Result<Value, BindingError>;
}

impl<F> MultiValueConverter for F
where
    F: Fn(&[Value], ValueKind, Option<&Value>, &Culture) -> Result<Value, BindingError>,
{
    fn convert(
        &self,
        values: &[Value],
        target: ValueKind,
        parameter: Option<&Value>,
        culture: &Culture,
    ) -> Result<Value, BindingError> {
        self(values, target, parameter, culture)
    }
}

/// The sealed part of a multi-binding's declaration.
#[derive(Clone, Default)]
pub(crate) struct CombineSettings {
    converter: Option<Rc<dyn MultiValueConverter>>,
    converter_parameter: Option<Value>,
    string_format: Option<FormatTemplate>,
}

impl CombineSettings {
    /// Turn the cell's ordered source values into the value for the target.
    pub(crate) fn apply(
        &self,
        combined: &Value,
        target: ValueKind,
        culture: &Culture,
    ) -> Result<Value, BindingError> {
        let mut value = match &self.converter {
            Some(converter) => converter.convert(
                combined.as_list().unwrap_or(&[]),
                target,
                self.converter_parameter.as_ref(),
                culture,
            )?,
            None => combined.clone(),
        };

        if let Some(template) = &self.string_format {
            if !value.is_null() {
                let text = match &value {
                    Value::List(items) => template.render(items, culture)?,
                    single => template.render(std::slice::from_ref(single), culture)?,
                };
                value = Value::Text(text);
            }
        }
        Ok(value)
    }
}

impl fmt::Debug for CombineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombineSettings")
            .field("converter", &self.converter.is_some())
            .field("converter_parameter", &self.converter_parameter)
            .field("string_format", &self.string_format.as_ref().map(FormatTemplate::source))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Activation state
// ---------------------------------------------------------------------------

/// Where a multi-binding is in its activation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationPhase {
    #[default]
    Inactive,
    /// Child bindings are being attached; slot writes do not recombine.
    Wiring,
    Active,
}

/// One source's synthetic property, addressed by the source's position.
#[derive(Debug, Clone, Copy)]
struct SourceSlot {
    index: usize,
    property: PropertyId,
}

/// State shared with the slot callbacks (held weakly by them).
struct Activation {
    serial: u64,
    phase: Cell<ActivationPhase>,
    host: WeakBindableObject,
    slots: RefCell<Vec<SourceSlot>>,
    cell: ValueCell,
    recombines: Cell<u64>,
}

impl Activation {
    fn recombine(&self) -> Result<(), BindingError> {
        if self.phase.get() != ActivationPhase::Active {
            return Ok(());
        }
        let Some(host) = self.host.upgrade() else {
            return Ok(());
        };
        let values = self
            .slots
            .borrow()
            .iter()
            .map(|slot| host.get(slot.property))
            .collect::<Result<Vec<_>, _>>()?;

        self.recombines.set(self.recombines.get() + 1);
        trace!(activation = self.serial, sources = values.len(), "recombine");
        self.cell.set(Value::List(values))
    }
}

struct ActiveState {
    shared: Rc<Activation>,
    relay: Option<RelayBinding>,
}

// ---------------------------------------------------------------------------
// MultiBinding
// ---------------------------------------------------------------------------

/// A one-way binding whose value is derived from several source bindings.
pub struct MultiBinding {
    sources: Vec<Box<dyn PropertyBinding>>,
    settings: CombineSettings,
    mode: BindingMode,
    context: Option<BindableObject>,
    cell: ValueCell,
    sealed: bool,
    active: Option<ActiveState>,
}

impl MultiBinding {
    /// An empty one-way multi-binding.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            settings: CombineSettings::default(),
            mode: BindingMode::OneWay,
            context: None,
            cell: ValueCell::new(Value::Null),
            sealed: false,
            active: None,
        }
    }

    #[must_use]
    pub fn builder() -> MultiBindingBuilder {
        MultiBindingBuilder::default()
    }

    // -- configuration ------------------------------------------------------

    /// Set the combining function.
    ///
    /// # Errors
    ///
    /// [`BindingError::Sealed`] after the first activation.
    pub fn set_converter(
        &mut self,
        converter: impl MultiValueConverter + 'static,
    ) -> Result<(), BindingError> {
        self.ensure_unsealed("converter")?;
        self.settings.converter = Some(Rc::new(converter));
        Ok(())
    }

    /// Remove the combining function.
    ///
    /// # Errors
    ///
    /// [`BindingError::Sealed`] after the first activation.
    pub fn clear_converter(&mut self) -> Result<(), BindingError> {
        self.ensure_unsealed("converter")?;
        self.settings.converter = None;
        Ok(())
    }

    #[must_use]
    pub fn has_converter(&self) -> bool {
        self.settings.converter.is_some()
    }

    /// Set the opaque parameter handed to the combining function. `Null`
    /// clears it.
    ///
    /// # Errors
    ///
    /// [`BindingError::Sealed`] after the first activation.
    pub fn set_converter_parameter(&mut self, parameter: impl Into<Value>) -> Result<(), BindingError> {
        self.ensure_unsealed("converter_parameter")?;
        let parameter = parameter.into();
        self.settings.converter_parameter = (!parameter.is_null()).then_some(parameter);
        Ok(())
    }

    #[must_use]
    pub fn converter_parameter(&self) -> Option<&Value> {
        self.settings.converter_parameter.as_ref()
    }

    /// Set or clear the string format template.
    ///
    /// # Errors
    ///
    /// - [`BindingError::Sealed`] after the first activation.
    /// - [`BindingError::Format`] if the template does not parse.
    pub fn set_string_format(&mut self, template: Option<&str>) -> Result<(), BindingError> {
        self.ensure_unsealed("string_format")?;
        self.settings.string_format = template.map(FormatTemplate::parse).transpose()?;
        Ok(())
    }

    #[must_use]
    pub fn string_format(&self) -> Option<&str> {
        self.settings.string_format.as_ref().map(FormatTemplate::source)
    }

    /// Change the requested mode. Anything but `OneWay` fails at activation.
    pub fn set_mode(&mut self, mode: BindingMode) {
        self.mode = mode;
    }

    /// Pin every source to `context` regardless of the activation context.
    pub fn set_context(&mut self, context: Option<BindableObject>) {
        self.context = context;
    }

    #[must_use]
    pub fn context(&self) -> Option<&BindableObject> {
        self.context.as_ref()
    }

    // -- sources ------------------------------------------------------------

    /// Append a source binding.
    ///
    /// # Errors
    ///
    /// [`BindingError::SourcesLocked`] while active.
    pub fn push_source(&mut self, binding: impl PropertyBinding) -> Result<(), BindingError> {
        self.push_boxed_source(Box::new(binding))
    }

    /// Append an already boxed source binding.
    ///
    /// # Errors
    ///
    /// [`BindingError::SourcesLocked`] while active.
    pub fn push_boxed_source(&mut self, binding: Box<dyn PropertyBinding>) -> Result<(), BindingError> {
        if self.active.is_some() {
            return Err(BindingError::SourcesLocked);
        }
        self.sources.push(binding);
        Ok(())
    }

    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// The source at `index`, if it is a `B`.
    #[must_use]
    pub fn source<B: PropertyBinding>(&self, index: usize) -> Option<&B> {
        self.sources.get(index)?.as_any().downcast_ref::<B>()
    }

    /// Mutable access to the source at `index`, if it is a `B`. Changes take
    /// effect on the next activation.
    pub fn source_mut<B: PropertyBinding>(&mut self, index: usize) -> Option<&mut B> {
        self.sources.get_mut(index)?.as_any_mut().downcast_mut::<B>()
    }

    pub fn sources(&self) -> impl Iterator<Item = &dyn PropertyBinding> {
        self.sources.iter().map(|b| &**b)
    }

    // -- state --------------------------------------------------------------

    #[must_use]
    pub fn phase(&self) -> ActivationPhase {
        self.active
            .as_ref()
            .map_or(ActivationPhase::Inactive, |state| state.shared.phase.get())
    }

    /// Whether converter, parameter, and format can no longer change.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// The ordered source values last published to the cell.
    #[must_use]
    pub fn current_value(&self) -> Value {
        self.cell.get()
    }

    /// Recombine passes run by the current activation (0 while inactive).
    #[must_use]
    pub fn recombine_count(&self) -> u64 {
        self.active
            .as_ref()
            .map_or(0, |state| state.shared.recombines.get())
    }

    /// Synthetic slot properties of the current activation, in source order.
    #[must_use]
    pub fn slot_properties(&self) -> Vec<PropertyId> {
        self.active.as_ref().map_or_else(Vec::new, |state| {
            state.shared.slots.borrow().iter().map(|s| s.property).collect()
        })
    }

    /// Apply the combine settings to an ordered list of source values, as
    /// the relay does before handing the result to the target.
    ///
    /// # Errors
    ///
    /// Converter and format errors.
    pub fn convert(&self, combined: &Value, target: ValueKind) -> Result<Value, BindingError> {
        self.settings.apply(combined, target, &current_culture())
    }

    /// Target-to-source conversion. Always fails: only one-way is supported.
    ///
    /// # Errors
    ///
    /// Always [`BindingError::TargetToSource`].
    pub fn convert_back(&self, _value: &Value, _source: ValueKind) -> Result<Vec<Value>, BindingError> {
        Err(BindingError::TargetToSource {
            binding: BINDING_NAME,
        })
    }

    fn ensure_unsealed(&self, setting: &'static str) -> Result<(), BindingError> {
        if self.sealed {
            Err(BindingError::Sealed { setting })
        } else {
            Ok(())
        }
    }

    fn wire(
        &mut self,
        shared: &Rc<Activation>,
        context: Option<&BindableObject>,
        host: &BindableObject,
        property: PropertyId,
    ) -> Result<(), BindingError> {
        for (index, binding) in self.sources.iter_mut().enumerate() {
            let weak = Rc::downgrade(shared);
            let spec = PropertySpec::new(format!("{BINDING_NAME}.source[{index}]#{}", shared.serial))
                .owner(BINDING_NAME)
                .on_changed(move |_, _, _| match weak.upgrade() {
                    Some(activation) => activation.recombine(),
                    None => Ok(()),
                });
            let slot = host.register(spec)?;
            shared.slots.borrow_mut().push(SourceSlot {
                index,
                property: slot,
            });
            binding.activate(context, host, slot)?;
        }

        shared.phase.set(ActivationPhase::Active);
        shared.recombine()?;

        let mut relay = RelayBinding::new(&self.cell, Rc::new(self.settings.clone()));
        relay.activate(host, property)?;
        if let Some(state) = &mut self.active {
            state.relay = Some(relay);
        }
        Ok(())
    }
}

impl Default for MultiBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MultiBinding {
    fn clone(&self) -> Self {
        debug!(sources = self.sources.len(), "clone multi-binding");
        Self {
            sources: self.sources.iter().map(|b| b.clone_binding()).collect(),
            settings: self.settings.clone(),
            mode: self.mode,
            context: self.context.clone(),
            cell: ValueCell::new(self.cell.get()),
            sealed: false,
            active: None,
        }
    }
}

impl Drop for MultiBinding {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl fmt::Debug for MultiBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiBinding")
            .field("sources", &self.sources)
            .field("settings", &self.settings)
            .field("mode", &self.mode)
            .field("phase", &self.phase())
            .field("sealed", &self.sealed)
            .finish()
    }
}

impl PropertyBinding for MultiBinding {
    fn mode(&self) -> BindingMode {
        self.mode
    }

    fn activate(
        &mut self,
        context: Option<&BindableObject>,
        target: &BindableObject,
        property: PropertyId,
    ) -> Result<(), BindingError> {
        if self.mode != BindingMode::OneWay {
            return Err(BindingError::UnsupportedMode {
                binding: BINDING_NAME,
                mode: self.mode,
            });
        }
        self.deactivate();
        if !target.contains(property) {
            return Err(BindingError::UnknownProperty(property));
        }

        let serial = NEXT_ACTIVATION.fetch_add(1, Ordering::Relaxed);
        let _span = debug_span!(
            "multi_binding_activate",
            activation = serial,
            sources = self.sources.len(),
            target = %property
        )
        .entered();

        let shared = Rc::new(Activation {
            serial,
            phase: Cell::new(ActivationPhase::Wiring),
            host: target.downgrade(),
            slots: RefCell::new(Vec::with_capacity(self.sources.len())),
            cell: self.cell.clone(),
            recombines: Cell::new(0),
        });
        self.active = Some(ActiveState {
            shared: Rc::clone(&shared),
            relay: None,
        });

        let context = self.context.clone().or_else(|| context.cloned());
        if let Err(err) = self.wire(&shared, context.as_ref(), target, property) {
            debug!(activation = serial, error = %err, "multi-binding activation failed");
            self.deactivate();
            return Err(err);
        }

        self.sealed = true;
        debug!(activation = serial, "multi-binding active");
        Ok(())
    }

    fn refresh(&mut self, from_target: bool) -> Result<(), BindingError> {
        let Some(state) = &mut self.active else {
            return Ok(());
        };
        for binding in &mut self.sources {
            binding.refresh(from_target)?;
        }
        if let Some(relay) = &mut state.relay {
            relay.refresh(from_target)?;
        }
        Ok(())
    }

    fn deactivate(&mut self) {
        let Some(state) = self.active.take() else {
            return;
        };
        if let Some(mut relay) = state.relay {
            relay.deactivate();
        }
        for binding in &mut self.sources {
            binding.deactivate();
        }
        state.shared.phase.set(ActivationPhase::Inactive);
        let slots = std::mem::take(&mut *state.shared.slots.borrow_mut());
        if let Some(host) = state.shared.host.upgrade() {
            for slot in &slots {
                trace!(index = slot.index, slot = %slot.property, "release source slot");
                host.unregister(slot.property);
            }
        }
        debug!(
            activation = state.shared.serial,
            slots = slots.len(),
            "multi-binding deactivated"
        );
    }

    fn is_active(&self) -> bool {
        self.active.is_some()
    }

    fn clone_binding(&self) -> Box<dyn PropertyBinding> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Declarative construction of a [`MultiBinding`].
#[derive(Default)]
pub struct MultiBindingBuilder {
    sources: Vec<Box<dyn PropertyBinding>>,
    converter: Option<Rc<dyn MultiValueConverter>>,
    converter_parameter: Option<Value>,
    string_format: Option<String>,
    mode: BindingMode,
    context: Option<BindableObject>,
}

impl MultiBindingBuilder {
    #[must_use]
    pub fn source(mut self, binding: impl PropertyBinding) -> Self {
        self.sources.push(Box::new(binding));
        self
    }

    #[must_use]
    pub fn boxed_source(mut self, binding: Box<dyn PropertyBinding>) -> Self {
        self.sources.push(binding);
        self
    }

    #[must_use]
    pub fn converter(mut self, converter: impl MultiValueConverter + 'static) -> Self {
        self.converter = Some(Rc::new(converter));
        self
    }

    #[must_use]
    pub fn converter_parameter(mut self, parameter: impl Into<Value>) -> Self {
        self.converter_parameter = Some(parameter.into());
        self
    }

    #[must_use]
    pub fn string_format(mut self, template: impl Into<String>) -> Self {
        self.string_format = Some(template.into());
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: BindingMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn context(mut self, context: BindableObject) -> Self {
        self.context = Some(context);
        self
    }

    /// Finish the declaration.
    ///
    /// # Errors
    ///
    /// [`BindingError::Format`] if the string format does not parse.
    pub fn build(self) -> Result<MultiBinding, BindingError> {
        let string_format = self
            .string_format
            .as_deref()
            .map(FormatTemplate::parse)
            .transpose()?;
        let mut binding = MultiBinding::new();
        binding.sources = self.sources;
        binding.settings = CombineSettings {
            converter: self.converter,
            converter_parameter: self.converter_parameter.filter(|p| !p.is_null()),
            string_format,
        };
        binding.mode = self.mode;
        binding.context = self.context;
        Ok(binding)
    }
}

impl fmt::Debug for MultiBindingBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiBindingBuilder")
            .field("sources", &self.sources.len())
            .field("converter", &self.converter.is_some())
            .field("string_format", &self.string_format)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::binding::PathBinding;
    use proptest::prelude::*;

    fn sum(
        values: &[Value],
        _: ValueKind,
        _: Option<&Value>,
        _: &Culture,
    ) -> Result<Value, BindingError> {
        Ok(Value::Int(values.iter().filter_map(Value::as_int).sum()))
    }

    struct Scene {
        model: BindableObject,
        a: PropertyId,
        b: PropertyId,
        view: BindableObject,
        out: PropertyId,
    }

    fn scene() -> Scene {
        let model = BindableObject::new("Model");
        let a = model.define("A", ValueKind::Int, 3).unwrap();
        let b = model.define("B", ValueKind::Int, 4).unwrap();
        let view = BindableObject::new("View");
        let out = view.define("Out", ValueKind::Any, Value::Null).unwrap();
        Scene {
            model,
            a,
            b,
            view,
            out,
        }
    }

    fn two_sources() -> MultiBindingBuilder {
        MultiBinding::builder()
            .source(PathBinding::new("A"))
            .source(PathBinding::new("B"))
    }

    #[test]
    fn combines_in_declaration_order() {
        let s = scene();
        let mut mb = two_sources().build().unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::list([3, 4]));

        s.model.set(s.b, 10).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::list([3, 10]));
    }

    #[test]
    fn converter_and_recombine_count() {
        let s = scene();
        let mut mb = two_sources().converter(sum).build().unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::Int(7));
        assert_eq!(mb.recombine_count(), 1);

        s.model.set(s.a, 5).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::Int(9));
        assert_eq!(mb.recombine_count(), 2);
    }

    #[test]
    fn wiring_window_suppresses_recombine() {
        let s = scene();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let mut mb = two_sources()
            .converter(move |values: &[Value], _: ValueKind, _: Option<&Value>, _: &Culture| {
                log.borrow_mut().push(values.to_vec());
                Ok::<_, BindingError>(Value::Null)
            })
            .build()
            .unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert_eq!(mb.recombine_count(), 1);
        assert_eq!(*seen.borrow(), vec![vec![Value::Int(3), Value::Int(4)]]);
    }

    #[test]
    fn equal_recombine_does_not_propagate() {
        let s = scene();
        let mut mb = two_sources().build().unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();

        // Overwrite the target, then recombine the unchanged sources: the
        // cell holds an equal list, so the overwrite survives.
        s.view.set(s.out, "kept").unwrap();
        mb.recombine_now().unwrap();
        assert_eq!(mb.recombine_count(), 2);
        assert_eq!(s.view.get(s.out).unwrap(), Value::from("kept"));

        s.model.set(s.a, 8).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::list([8, 4]));
    }

    #[test]
    fn string_format_with_list_and_single_value() {
        let s = scene();
        let mut mb = two_sources().string_format("{0} + {1}").build().unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::from("3 + 4"));

        let mut mb = two_sources()
            .converter(sum)
            .string_format("total={0:D3}")
            .build()
            .unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::from("total=007"));
    }

    #[test]
    fn null_converter_result_skips_format() {
        let mb = two_sources()
            .converter(|_: &[Value], _: ValueKind, _: Option<&Value>, _: &Culture| {
                Ok::<_, BindingError>(Value::Null)
            })
            .string_format("never {0}")
            .build()
            .unwrap();
        assert_eq!(mb.convert(&Value::list([1]), ValueKind::Any).unwrap(), Value::Null);
    }

    #[test]
    fn converter_receives_parameter_target_kind_and_culture() {
        let s = scene();
        let text_out = s.view.define("Text", ValueKind::Text, "").unwrap();
        let seen = Rc::new(RefCell::new(None));
        let log = Rc::clone(&seen);
        let mut mb = two_sources()
            .converter(move |_: &[Value], target: ValueKind, p: Option<&Value>, c: &Culture| {
                *log.borrow_mut() = Some((target, p.cloned(), c.name().to_string()));
                Ok::<_, BindingError>(Value::Float(1.5))
            })
            .converter_parameter("param")
            .build()
            .unwrap();

        let _guard = crate::locale::CultureContext::global().push_override(Culture::new("de-DE"));
        mb.activate(Some(&s.model), &s.view, text_out).unwrap();
        assert_eq!(
            *seen.borrow(),
            Some((ValueKind::Text, Some(Value::from("param")), "de-DE".to_string()))
        );
        assert_eq!(s.view.get(text_out).unwrap(), Value::from("1,5"));
    }

    #[test]
    fn unsupported_mode_fails_before_wiring() {
        let s = scene();
        let mut mb = two_sources().mode(BindingMode::TwoWay).build().unwrap();
        let before = s.view.property_count();
        let err = mb.activate(Some(&s.model), &s.view, s.out).unwrap_err();
        assert!(err.is_unsupported_mode());
        assert_eq!(s.view.property_count(), before);
        assert!(!mb.is_active());
        assert!(!mb.is_sealed());
    }

    #[test]
    fn settings_seal_on_first_activation() {
        let s = scene();
        let mut mb = two_sources().build().unwrap();
        mb.set_converter(sum).unwrap();
        mb.set_converter_parameter(1).unwrap();
        mb.set_string_format(Some("{0}")).unwrap();

        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert!(mb.is_sealed());
        assert_eq!(
            mb.set_converter(sum),
            Err(BindingError::Sealed {
                setting: "converter"
            })
        );
        assert!(mb.set_converter_parameter(2).unwrap_err().is_configuration());
        assert!(mb.set_string_format(None).unwrap_err().is_configuration());
        assert!(mb.clear_converter().unwrap_err().is_configuration());

        mb.deactivate();
        assert!(mb.set_converter(sum).unwrap_err().is_configuration());
        assert_eq!(mb.converter_parameter(), Some(&Value::Int(1)));
        assert_eq!(mb.string_format(), Some("{0}"));
    }

    #[test]
    fn malformed_string_format_is_rejected_up_front() {
        let err = two_sources().string_format("{0").build().unwrap_err();
        assert!(matches!(err, BindingError::Format(_)));
        let mut mb = MultiBinding::new();
        assert!(mb.set_string_format(Some("}")).unwrap_err().is_configuration());
    }

    #[test]
    fn sources_locked_while_active() {
        let s = scene();
        let mut mb = two_sources().build().unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert_eq!(
            mb.push_source(PathBinding::new("A")),
            Err(BindingError::SourcesLocked)
        );
        mb.deactivate();
        mb.push_source(PathBinding::new("A")).unwrap();
        assert_eq!(mb.source_count(), 3);
    }

    #[test]
    fn deactivate_releases_slots_and_is_idempotent() {
        let s = scene();
        let before = s.view.property_count();
        let mut mb = two_sources().build().unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert_eq!(mb.slot_properties().len(), 2);
        assert_eq!(s.view.property_count(), before + 2);

        mb.deactivate();
        mb.deactivate();
        assert_eq!(mb.phase(), ActivationPhase::Inactive);
        assert!(mb.slot_properties().is_empty());
        assert_eq!(s.view.property_count(), before);
        assert_eq!(s.model.listener_count(s.a), 0);

        s.model.set(s.a, 100).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::list([3, 4]));
    }

    #[test]
    fn reactivation_uses_fresh_slot_names() {
        let s = scene();
        let mut mb = two_sources().build().unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        let first = mb.slot_properties();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        let second = mb.slot_properties();
        assert_eq!(second.len(), 2);
        assert!(first.iter().all(|p| !second.contains(p)));
        assert_eq!(mb.phase(), ActivationPhase::Active);
    }

    #[test]
    fn explicit_context_wins() {
        let s = scene();
        let pinned = BindableObject::new("Pinned");
        pinned.define("A", ValueKind::Int, 1).unwrap();
        pinned.define("B", ValueKind::Int, 2).unwrap();
        let mut mb = two_sources().context(pinned).build().unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::list([1, 2]));
    }

    #[test]
    fn zero_sources_combine_to_empty_list() {
        let s = scene();
        let mut mb = MultiBinding::new();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::List(Vec::new()));
        assert_eq!(mb.recombine_count(), 1);
    }

    #[test]
    fn converter_error_propagates_to_source_write() {
        let s = scene();
        let mut mb = two_sources()
            .converter(|values: &[Value], _: ValueKind, _: Option<&Value>, _: &Culture| {
                match values.first().and_then(Value::as_int) {
                    Some(v) if v < 0 => Err(BindingError::converter("negative")),
                    _ => Ok(Value::Int(0)),
                }
            })
            .build()
            .unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        let err = s.model.set(s.a, -1).unwrap_err();
        assert_eq!(err, BindingError::Converter("negative".into()));
    }

    #[test]
    fn convert_back_is_unsupported() {
        let mb = MultiBinding::new();
        let err = mb.convert_back(&Value::Int(1), ValueKind::Any).unwrap_err();
        assert!(err.is_unsupported_mode());
        assert!(err.to_string().contains("OneWay"));
    }

    #[test]
    fn clone_copies_declaration_not_activation() {
        let s = scene();
        let mut mb = two_sources().converter(sum).string_format("{0}").build().unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();

        let copy = mb.clone();
        assert!(!copy.is_active());
        assert!(!copy.is_sealed());
        assert_eq!(copy.source_count(), 2);
        assert!(copy.has_converter());
        assert_eq!(copy.string_format(), Some("{0}"));
        assert_eq!(copy.current_value(), Value::list([3, 4]));
        assert!(copy.sources().all(|b| !b.is_active()));
    }

    #[test]
    fn nested_multi_binding() {
        let s = scene();
        let inner = two_sources().converter(sum).build().unwrap();
        let mut outer = MultiBinding::builder()
            .source(inner)
            .source(PathBinding::new("A"))
            .string_format("{0}/{1}")
            .build()
            .unwrap();
        outer.activate(Some(&s.model), &s.view, s.out).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::from("7/3"));

        s.model.set(s.a, 1).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::from("5/1"));
    }

    #[test]
    fn drop_deactivates() {
        let s = scene();
        let before = s.view.property_count();
        {
            let mut mb = two_sources().build().unwrap();
            mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        }
        assert_eq!(s.view.property_count(), before);
        assert_eq!(s.model.listener_count(s.a), 0);
    }

    #[test]
    fn refresh_repushes_sources() {
        let s = scene();
        let mut mb = two_sources().build().unwrap();
        mb.activate(Some(&s.model), &s.view, s.out).unwrap();
        let slots = mb.slot_properties();
        s.view.set(slots[1], 40).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::list([3, 40]));

        mb.refresh(false).unwrap();
        assert_eq!(s.view.get(s.out).unwrap(), Value::list([3, 4]));
        mb.refresh(true).unwrap();
    }

    impl MultiBinding {
        fn recombine_now(&self) -> Result<(), BindingError> {
            match &self.active {
                Some(state) => state.shared.recombine(),
                None => Ok(()),
            }
        }
    }

    proptest! {
        #[test]
        fn converter_sees_declaration_order(
            initial in prop::collection::vec(-50i64..50, 1..7),
            edits in prop::collection::vec((0usize..7, -50i64..50), 0..12),
        ) {
            let model = BindableObject::new("Model");
            let ids: Vec<PropertyId> = initial
                .iter()
                .enumerate()
                .map(|(i, v)| model.define(format!("S{i}"), ValueKind::Int, *v).unwrap())
                .collect();
            let view = BindableObject::new("View");
            let out = view.define("Out", ValueKind::Any, Value::Null).unwrap();

            let last = Rc::new(RefCell::new(Vec::new()));
            let log = Rc::clone(&last);
            let mut builder = MultiBinding::builder().converter(
                move |values: &[Value], _: ValueKind, _: Option<&Value>, _: &Culture| {
                    *log.borrow_mut() = values.to_vec();
                    Ok::<_, BindingError>(Value::Null)
                },
            );
            for i in 0..initial.len() {
                builder = builder.source(PathBinding::new(format!("S{i}").as_str()));
            }
            let mut mb = builder.build().unwrap();
            mb.activate(Some(&model), &view, out).unwrap();

            let mut expected: Vec<Value> = initial.iter().copied().map(Value::Int).collect();
            prop_assert_eq!(&*last.borrow(), &expected);
            for (index, value) in edits {
                let index = index % initial.len();
                model.set(ids[index], value).unwrap();
                expected[index] = Value::Int(value);
                prop_assert_eq!(&*last.borrow(), &expected);
            }
        }
    }
}
