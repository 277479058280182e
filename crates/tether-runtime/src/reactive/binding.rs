#![forbid(unsafe_code)]

//! Property bindings: the activation contract and the single-source
//! [`PathBinding`].
//!
//! A binding is declared detached, then *activated* against a context
//! object and a target property on a host. While active it keeps the target
//! in sync with the value found by walking its property path from the
//! source object.
//!
//! ```ignore
//! use tether_runtime::reactive::{BindableObject, PathBinding, PropertyBinding};
//! use tether_runtime::value::ValueKind;
//!
//! let person = BindableObject::new("Person");
//! let name = person.define("Name", ValueKind::Text, "Alice")?;
//!
//! let label = BindableObject::new("Label");
//! let text = label.define("Text", ValueKind::Text, "")?;
//!
//! let mut binding = PathBinding::new("Name");
//! binding.activate(Some(&person), &label, text)?;
//! assert_eq!(label.get(text)?, "Alice".into());
//!
//! person.set(name, "Bob")?;
//! assert_eq!(label.get(text)?, "Bob".into());
//! ```
//!
//! # Invariants
//!
//! 1. An explicit source set on the binding wins over the activation
//!    context.
//! 2. Every hop of a dotted path is observed; replacing an intermediate
//!    object re-resolves the path and moves the subscriptions.
//! 3. Source-to-target values pass converter, then string format (non-null
//!    values only), then coercion to the target kind, in that order.
//! 4. A re-entrancy guard stops two-way bindings from echoing a write back
//!    to where it came from.
//! 5. `deactivate()` is idempotent and drops every subscription the
//!    activation created.
//!
//! # Failure Modes
//!
//! - Unresolvable path: target receives the fallback value, or its default.
//! - Value the target kind cannot hold: logged at `warn`, target untouched.
//! - Converter or format error: returned from the write that triggered it.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tether_i18n::{Culture, FormatTemplate};
use tracing::{trace, warn};

use crate::error::BindingError;
use crate::locale::current_culture;
use crate::reactive::host::{BindableObject, PropertyId, WeakBindableObject};
use crate::reactive::observable::Subscription;
use crate::value::{Value, ValueKind};

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Direction(s) a binding propagates values in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingMode {
    /// Source to target, continuously.
    #[default]
    OneWay,
    /// Both directions, continuously.
    TwoWay,
    /// Target to source, continuously.
    OneWayToSource,
    /// Source to target, once at activation.
    OneTime,
}

impl BindingMode {
    /// Whether values flow from source to target.
    #[must_use]
    pub fn updates_target(self) -> bool {
        matches!(self, Self::OneWay | Self::TwoWay | Self::OneTime)
    }

    /// Whether values flow from target to source.
    #[must_use]
    pub fn updates_source(self) -> bool {
        matches!(self, Self::TwoWay | Self::OneWayToSource)
    }
}

/// A binding that can be attached to a target property.
pub trait PropertyBinding: Any + fmt::Debug {
    fn mode(&self) -> BindingMode;

    /// Attach to `property` on `target`, resolving sources against
    /// `context` unless the binding carries its own source.
    ///
    /// Activating an already active binding deactivates it first.
    fn activate(
        &mut self,
        context: Option<&BindableObject>,
        target: &BindableObject,
        property: PropertyId,
    ) -> Result<(), BindingError>;

    /// Re-push the current value: target to source when `from_target`,
    /// otherwise source to target. No-op while inactive.
    fn refresh(&mut self, from_target: bool) -> Result<(), BindingError>;

    /// Detach. Safe to call repeatedly.
    fn deactivate(&mut self);

    fn is_active(&self) -> bool;

    /// Deep, inactive copy of the declaration.
    fn clone_binding(&self) -> Box<dyn PropertyBinding>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn PropertyBinding> {
    fn clone(&self) -> Self {
        self.clone_binding()
    }
}

/// Single-value converter used by [`PathBinding`].
pub trait ValueConverter {
    /// Source to target.
    fn convert(
        &self,
        value: &Value,
        target: ValueKind,
        parameter: Option<&Value>,
        culture: &Culture,
    ) -> Result<Value, BindingError>;

    /// Target to source. Unsupported unless overridden.
    fn convert_back(
        &self,
        value: &Value,
        source: ValueKind,
        parameter: Option<&Value>,
        culture: &Culture,
    ) -> Result<Value, BindingError> {
        let _ = (value, source, parameter, culture);
        Err(BindingError::converter("convert_back is not implemented"))
    }
}

impl<F> ValueConverter for F
where
    F: Fn(&Value, ValueKind, Option<&Value>, &Culture) -> Result<Value, BindingError>,
{
    fn convert(
        &self,
        value: &Value,
        target: ValueKind,
        parameter: Option<&Value>,
        culture: &Culture,
    ) -> Result<Value, BindingError> {
        self(value, target, parameter, culture)
    }
}

// ---------------------------------------------------------------------------
// PropertyPath
// ---------------------------------------------------------------------------

/// Dotted property path. The empty path names the source object itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PropertyPath {
    segments: Vec<String>,
}

impl PropertyPath {
    #[must_use]
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn is_self(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            f.write_str(".")
        } else {
            f.write_str(&self.segments.join("."))
        }
    }
}

impl From<&str> for PropertyPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

// ---------------------------------------------------------------------------
// PathBinding
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct PathConfig {
    path: PropertyPath,
    mode: BindingMode,
    converter: Option<Rc<dyn ValueConverter>>,
    converter_parameter: Option<Value>,
    string_format: Option<FormatTemplate>,
    fallback: Option<Value>,
}

impl PathConfig {
    fn to_target(&self, value: Value, target: ValueKind, culture: &Culture) -> Result<Value, BindingError> {
        let mut value = value;
        if let Some(converter) = &self.converter {
            value = converter.convert(&value, target, self.converter_parameter.as_ref(), culture)?;
        }
        if let Some(template) = &self.string_format {
            if !value.is_null() {
                value = Value::Text(template.render(std::slice::from_ref(&value), culture)?);
            }
        }
        Ok(value)
    }

    fn to_source(&self, value: Value, source: ValueKind, culture: &Culture) -> Result<Value, BindingError> {
        match &self.converter {
            Some(converter) => {
                converter.convert_back(&value, source, self.converter_parameter.as_ref(), culture)
            }
            None => Ok(value),
        }
    }
}

/// Binding that follows a property path on a source object.
pub struct PathBinding {
    config: PathConfig,
    source: Option<BindableObject>,
    active: Option<Rc<PathActivation>>,
}

impl PathBinding {
    /// One-way binding to `path` on the activation context.
    pub fn new(path: impl Into<PropertyPath>) -> Self {
        Self {
            config: PathConfig {
                path: path.into(),
                mode: BindingMode::OneWay,
                converter: None,
                converter_parameter: None,
                string_format: None,
                fallback: None,
            },
            source: None,
            active: None,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: BindingMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Pin the binding to `source` regardless of activation context.
    #[must_use]
    pub fn with_source(mut self, source: BindableObject) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_converter(mut self, converter: impl ValueConverter + 'static) -> Self {
        self.config.converter = Some(Rc::new(converter));
        self
    }

    #[must_use]
    pub fn with_converter_parameter(mut self, parameter: impl Into<Value>) -> Self {
        self.config.converter_parameter = Some(parameter.into());
        self
    }

    /// Value pushed to the target while the path cannot be resolved.
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<Value>) -> Self {
        self.config.fallback = Some(fallback.into());
        self
    }

    /// Render non-null values through `template` before they reach the target.
    ///
    /// # Errors
    ///
    /// [`BindingError::Format`] if the template does not parse.
    pub fn with_string_format(mut self, template: &str) -> Result<Self, BindingError> {
        self.config.string_format = Some(FormatTemplate::parse(template)?);
        Ok(self)
    }

    #[must_use]
    pub fn path(&self) -> &PropertyPath {
        &self.config.path
    }

    /// Change the path. Takes effect on the next activation.
    pub fn set_path(&mut self, path: impl Into<PropertyPath>) {
        self.config.path = path.into();
    }

    /// Change the mode. Takes effect on the next activation.
    pub fn set_mode(&mut self, mode: BindingMode) {
        self.config.mode = mode;
    }

    #[must_use]
    pub fn source(&self) -> Option<&BindableObject> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: Option<BindableObject>) {
        self.source = source;
    }
}

impl Clone for PathBinding {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            source: self.source.clone(),
            active: None,
        }
    }
}

impl fmt::Debug for PathBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathBinding")
            .field("path", &self.config.path)
            .field("mode", &self.config.mode)
            .field("converter", &self.config.converter.is_some())
            .field("string_format", &self.config.string_format.as_ref().map(FormatTemplate::source))
            .field("active", &self.active.is_some())
            .finish()
    }
}

impl PropertyBinding for PathBinding {
    fn mode(&self) -> BindingMode {
        self.config.mode
    }

    fn activate(
        &mut self,
        context: Option<&BindableObject>,
        target: &BindableObject,
        property: PropertyId,
    ) -> Result<(), BindingError> {
        self.deactivate();
        if !target.contains(property) {
            return Err(BindingError::UnknownProperty(property));
        }

        let activation = Rc::new(PathActivation {
            config: self.config.clone(),
            root: self.source.clone().or_else(|| context.cloned()),
            target: target.downgrade(),
            property,
            hops: RefCell::new(Vec::new()),
            leaf: RefCell::new(None),
            target_watch: RefCell::new(None),
            updating: Cell::new(false),
        });
        trace!(path = %self.config.path, mode = ?self.config.mode, target = %property, "activate path binding");

        if self.config.mode == BindingMode::OneWayToSource {
            activation.resolve()?;
            activation.push_to_source()?;
        } else {
            activation.push_to_target()?;
        }

        if self.config.mode.updates_source() {
            let weak = Rc::downgrade(&activation);
            let watch = target.subscribe(property, move |_| match weak.upgrade() {
                Some(activation) => activation.push_to_source(),
                None => Ok(()),
            })?;
            *activation.target_watch.borrow_mut() = Some(watch);
        }

        self.active = Some(activation);
        Ok(())
    }

    fn refresh(&mut self, from_target: bool) -> Result<(), BindingError> {
        let Some(activation) = &self.active else {
            return Ok(());
        };
        if from_target {
            if self.config.mode.updates_source() {
                activation.resolve()?;
                activation.push_to_source()?;
            }
        } else if self.config.mode.updates_target() {
            activation.push_to_target()?;
        }
        Ok(())
    }

    fn deactivate(&mut self) {
        if self.active.take().is_some() {
            trace!(path = %self.config.path, "deactivate path binding");
        }
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

/// Live state of one activation. Listeners hold it weakly.
struct PathActivation {
    config: PathConfig,
    root: Option<BindableObject>,
    target: WeakBindableObject,
    property: PropertyId,
    hops: RefCell<Vec<HopWatch>>,
    leaf: RefCell<Option<(BindableObject, PropertyId)>>,
    target_watch: RefCell<Option<Subscription>>,
    updating: Cell<bool>,
}

/// Subscription on one hop of the path, keyed by its depth and property.
struct HopWatch {
    depth: usize,
    property: PropertyId,
    _subscription: Subscription,
}

impl PathActivation {
    /// Walk the path and return the leaf value, or `None` when some hop is
    /// missing or not an object.
    ///
    /// Hops already watched at the same depth keep their subscription, so a
    /// listener keeps its place among the host's listeners across walks.
    fn resolve(self: &Rc<Self>) -> Result<Option<Value>, BindingError> {
        let mode = self.config.mode;
        let watch_hops = mode != BindingMode::OneTime;
        let watch_leaf = matches!(mode, BindingMode::OneWay | BindingMode::TwoWay);

        let mut previous = std::mem::take(&mut *self.hops.borrow_mut());
        let mut watches = Vec::new();
        let mut leaf = None;
        let mut resolved = None;

        if let Some(root) = &self.root {
            let segments = self.config.path.segments();
            if segments.is_empty() {
                resolved = Some(Value::Object(root.clone()));
            }
            let mut current = root.clone();
            for (depth, segment) in segments.iter().enumerate() {
                let Some(id) = current.property(segment) else {
                    break;
                };
                let is_leaf = depth + 1 == segments.len();
                if watch_hops && (!is_leaf || watch_leaf) {
                    let kept = previous
                        .iter()
                        .position(|w| w.depth == depth && w.property == id)
                        .map(|i| previous.swap_remove(i));
                    let watch = match kept {
                        Some(watch) => watch,
                        None => self.watch_hop(&current, depth, id, is_leaf)?,
                    };
                    watches.push(watch);
                }
                let value = current.get(id)?;
                if is_leaf {
                    leaf = Some((current.clone(), id));
                    resolved = Some(value);
                    break;
                }
                match value {
                    Value::Object(next) => current = next,
                    _ => break,
                }
            }
        }

        *self.hops.borrow_mut() = watches;
        *self.leaf.borrow_mut() = leaf;
        Ok(resolved)
    }

    fn watch_hop(
        self: &Rc<Self>,
        host: &BindableObject,
        depth: usize,
        property: PropertyId,
        is_leaf: bool,
    ) -> Result<HopWatch, BindingError> {
        let weak = Rc::downgrade(self);
        let subscription = host.subscribe(property, move |value| match weak.upgrade() {
            Some(activation) if is_leaf => activation.deliver(Some(value.clone())),
            Some(activation) => activation.on_hop_changed(),
            None => Ok(()),
        })?;
        Ok(HopWatch {
            depth,
            property,
            _subscription: subscription,
        })
    }

    /// An intermediate object changed: the rest of the path may now lead
    /// elsewhere.
    fn on_hop_changed(self: &Rc<Self>) -> Result<(), BindingError> {
        if self.config.mode == BindingMode::OneWayToSource {
            self.resolve()?;
            self.push_to_source()
        } else {
            self.push_to_target()
        }
    }

    fn push_to_target(self: &Rc<Self>) -> Result<(), BindingError> {
        let resolved = self.resolve()?;
        self.deliver(resolved)
    }

    /// Run `resolved` through the value pipeline and write it to the target.
    fn deliver(&self, resolved: Option<Value>) -> Result<(), BindingError> {
        if self.updating.get() {
            return Ok(());
        }
        let Some(target) = self.target.upgrade() else {
            return Ok(());
        };
        let kind = target
            .kind_of(self.property)
            .ok_or(BindingError::UnknownProperty(self.property))?;
        let culture = current_culture();

        let value = match resolved {
            Some(value) => self.config.to_target(value, kind, &culture)?,
            None => match &self.config.fallback {
                Some(fallback) => fallback.clone(),
                None => target.default_of(self.property).unwrap_or_default(),
            },
        };
        let Some(value) = value.coerce(kind, &culture) else {
            warn!(
                path = %self.config.path,
                target = %self.property,
                expected = ?kind,
                found = ?value.kind(),
                "binding value does not fit target property; target left unchanged"
            );
            return Ok(());
        };

        self.guarded(|| target.set(self.property, value))
    }

    fn push_to_source(self: &Rc<Self>) -> Result<(), BindingError> {
        if self.updating.get() {
            return Ok(());
        }
        let Some(target) = self.target.upgrade() else {
            return Ok(());
        };
        let Some((source, id)) = self.leaf.borrow().clone() else {
            return Ok(());
        };
        let kind = source.kind_of(id).unwrap_or_default();
        let culture = current_culture();

        let value = self.config.to_source(target.get(self.property)?, kind, &culture)?;
        let Some(value) = value.coerce(kind, &culture) else {
            warn!(
                path = %self.config.path,
                expected = ?kind,
                found = ?value.kind(),
                "target value does not fit source property; source left unchanged"
            );
            return Ok(());
        };

        self.guarded(|| source.set(id, value))
    }

    fn guarded(&self, write: impl FnOnce() -> Result<(), BindingError>) -> Result<(), BindingError> {
        self.updating.set(true);
        let result = write();
        self.updating.set(false);
        result
    }
}
