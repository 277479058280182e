#![forbid(unsafe_code)]

//! Objects with dynamically registered, observable properties.
//!
//! A [`BindableObject`] is the property host every binding reads from and
//! writes to. Properties are registered at runtime with a [`PropertySpec`]
//! and addressed by a process-unique [`PropertyId`].
//!
//! # Notification order
//!
//! A successful [`BindableObject::set`] that changes a value:
//!
//! 1. stores the new value and releases every internal borrow,
//! 2. runs the property's `on_changed` callback (if registered),
//! 3. runs each live listener added through [`BindableObject::subscribe`],
//!    in registration order.
//!
//! Callbacks run synchronously on the caller's stack and may re-enter the
//! host. The first callback error aborts the remaining callbacks and is
//! returned from `set`.
//!
//! # Invariants
//!
//! 1. `PropertyId`s are never reused, even after `unregister`.
//! 2. Writing a value equal to the current one runs no callbacks.
//! 3. A property only ever holds values its [`ValueKind`] accepts.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::error::BindingError;
use crate::reactive::observable::Subscription;
use crate::value::{Value, ValueKind};

static NEXT_PROPERTY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle to a registered property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(u64);

impl PropertyId {
    fn next() -> Self {
        Self(NEXT_PROPERTY_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback run when a property's value changes: `(host, old, new)`.
pub type ChangeCallback = dyn Fn(&BindableObject, &Value, &Value) -> Result<(), BindingError>;

type Listener = dyn Fn(&Value) -> Result<(), BindingError>;

/// Description of a property to register.
pub struct PropertySpec {
    name: String,
    kind: ValueKind,
    owner: &'static str,
    default: Value,
    on_changed: Option<Rc<ChangeCallback>>,
}

impl PropertySpec {
    /// An untyped (`Any`) property defaulting to `Null`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ValueKind::Any,
            owner: "",
            default: Value::Null,
            on_changed: None,
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Label of the type that declared the property (diagnostics only).
    #[must_use]
    pub fn owner(mut self, owner: &'static str) -> Self {
        self.owner = owner;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    #[must_use]
    pub fn on_changed(
        mut self,
        callback: impl Fn(&BindableObject, &Value, &Value) -> Result<(), BindingError> + 'static,
    ) -> Self {
        self.on_changed = Some(Rc::new(callback));
        self
    }
}

impl fmt::Debug for PropertySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("default", &self.default)
            .field("on_changed", &self.on_changed.is_some())
            .finish()
    }
}

struct PropertyEntry {
    id: PropertyId,
    name: String,
    kind: ValueKind,
    owner: &'static str,
    default: Value,
    value: Value,
    on_changed: Option<Rc<ChangeCallback>>,
    listeners: Vec<Weak<Listener>>,
}

#[derive(Default)]
struct HostState {
    properties: Vec<PropertyEntry>,
}

impl HostState {
    fn entry(&self, id: PropertyId) -> Option<&PropertyEntry> {
        self.properties.iter().find(|e| e.id == id)
    }

    fn entry_mut(&mut self, id: PropertyId) -> Option<&mut PropertyEntry> {
        self.properties.iter_mut().find(|e| e.id == id)
    }
}

struct HostShared {
    type_name: String,
    state: RefCell<HostState>,
}

/// Shared handle to an object holding named, observable properties.
///
/// Cloning the handle shares the object.
#[derive(Clone)]
pub struct BindableObject {
    inner: Rc<HostShared>,
}

impl BindableObject {
    /// Create an object with no properties. `type_name` labels it in
    /// diagnostics and text rendering.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(HostShared {
                type_name: type_name.into(),
                state: RefCell::new(HostState::default()),
            }),
        }
    }

    /// An object holding exactly one untyped property, pre-set to `value`.
    pub(crate) fn with_single_property(
        type_name: &'static str,
        name: &str,
        value: Value,
    ) -> (Self, PropertyId) {
        let id = PropertyId::next();
        let entry = PropertyEntry {
            id,
            name: name.to_string(),
            kind: ValueKind::Any,
            owner: type_name,
            default: Value::Null,
            value,
            on_changed: None,
            listeners: Vec::new(),
        };
        let object = Self {
            inner: Rc::new(HostShared {
                type_name: type_name.to_string(),
                state: RefCell::new(HostState {
                    properties: vec![entry],
                }),
            }),
        };
        (object, id)
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    /// Register a property.
    ///
    /// # Errors
    ///
    /// - [`BindingError::DuplicateProperty`] if the name is taken on this object.
    /// - [`BindingError::TypeMismatch`] if the default does not fit the kind.
    pub fn register(&self, spec: PropertySpec) -> Result<PropertyId, BindingError> {
        let mut state = self.inner.state.borrow_mut();
        if state.properties.iter().any(|e| e.name == spec.name) {
            return Err(BindingError::DuplicateProperty { name: spec.name });
        }
        if !spec.kind.accepts(&spec.default) {
            return Err(BindingError::TypeMismatch {
                property: spec.name,
                expected: spec.kind,
                found: spec.default.kind(),
            });
        }
        let id = PropertyId::next();
        trace!(
            host = %self.inner.type_name,
            property = %spec.name,
            owner = spec.owner,
            id = id.raw(),
            "register property"
        );
        state.properties.push(PropertyEntry {
            id,
            name: spec.name,
            kind: spec.kind,
            owner: spec.owner,
            value: spec.default.clone(),
            default: spec.default,
            on_changed: spec.on_changed,
            listeners: Vec::new(),
        });
        Ok(id)
    }

    /// Shorthand for registering a plain typed property.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn define(
        &self,
        name: impl Into<String>,
        kind: ValueKind,
        default: impl Into<Value>,
    ) -> Result<PropertyId, BindingError> {
        self.register(PropertySpec::new(name).kind(kind).default_value(default))
    }

    /// Remove a property. Returns whether it existed.
    pub fn unregister(&self, id: PropertyId) -> bool {
        let mut state = self.inner.state.borrow_mut();
        let before = state.properties.len();
        state.properties.retain(|e| e.id != id);
        before != state.properties.len()
    }

    /// Look up a property id by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<PropertyId> {
        self.inner
            .state
            .borrow()
            .properties
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.id)
    }

    #[must_use]
    pub fn contains(&self, id: PropertyId) -> bool {
        self.inner.state.borrow().entry(id).is_some()
    }

    #[must_use]
    pub fn name_of(&self, id: PropertyId) -> Option<String> {
        self.inner.state.borrow().entry(id).map(|e| e.name.clone())
    }

    #[must_use]
    pub fn owner_of(&self, id: PropertyId) -> Option<&'static str> {
        self.inner.state.borrow().entry(id).map(|e| e.owner)
    }

    #[must_use]
    pub fn kind_of(&self, id: PropertyId) -> Option<ValueKind> {
        self.inner.state.borrow().entry(id).map(|e| e.kind)
    }

    #[must_use]
    pub fn default_of(&self, id: PropertyId) -> Option<Value> {
        self.inner.state.borrow().entry(id).map(|e| e.default.clone())
    }

    /// Names of all registered properties, in registration order.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.inner
            .state
            .borrow()
            .properties
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    #[must_use]
    pub fn property_count(&self) -> usize {
        self.inner.state.borrow().properties.len()
    }

    /// Current value of a property.
    ///
    /// # Errors
    ///
    /// [`BindingError::UnknownProperty`] if `id` is not registered here.
    pub fn get(&self, id: PropertyId) -> Result<Value, BindingError> {
        self.inner
            .state
            .borrow()
            .entry(id)
            .map(|e| e.value.clone())
            .ok_or(BindingError::UnknownProperty(id))
    }

    /// Current value of the property called `name`, if any.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Value> {
        self.inner
            .state
            .borrow()
            .properties
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.clone())
    }

    /// Write a property value and run change callbacks.
    ///
    /// # Errors
    ///
    /// - [`BindingError::UnknownProperty`] if `id` is not registered here.
    /// - [`BindingError::TypeMismatch`] if the kind rejects `value`.
    /// - The first error returned by a change callback.
    pub fn set(&self, id: PropertyId, value: impl Into<Value>) -> Result<(), BindingError> {
        let value = value.into();
        let (old, on_changed, listeners) = {
            let mut state = self.inner.state.borrow_mut();
            let entry = state
                .entry_mut(id)
                .ok_or(BindingError::UnknownProperty(id))?;
            if !entry.kind.accepts(&value) {
                return Err(BindingError::TypeMismatch {
                    property: entry.name.clone(),
                    expected: entry.kind,
                    found: value.kind(),
                });
            }
            if entry.value == value {
                return Ok(());
            }
            trace!(host = %self.inner.type_name, property = %entry.name, "property changed");
            let old = std::mem::replace(&mut entry.value, value.clone());
            entry.listeners.retain(|w| w.strong_count() > 0);
            let listeners: Vec<Rc<Listener>> =
                entry.listeners.iter().filter_map(Weak::upgrade).collect();
            (old, entry.on_changed.clone(), listeners)
        };

        if let Some(callback) = on_changed {
            callback(self, &old, &value)?;
        }
        for listener in listeners {
            listener(&value)?;
        }
        Ok(())
    }

    /// Listen for changes to one property.
    ///
    /// # Errors
    ///
    /// [`BindingError::UnknownProperty`] if `id` is not registered here.
    pub fn subscribe(
        &self,
        id: PropertyId,
        listener: impl Fn(&Value) -> Result<(), BindingError> + 'static,
    ) -> Result<Subscription, BindingError> {
        let strong: Rc<Listener> = Rc::new(listener);
        let mut state = self.inner.state.borrow_mut();
        let entry = state
            .entry_mut(id)
            .ok_or(BindingError::UnknownProperty(id))?;
        entry.listeners.retain(|w| w.strong_count() > 0);
        entry.listeners.push(Rc::downgrade(&strong));
        Ok(Subscription::new(strong))
    }

    /// Number of live listeners on a property.
    #[must_use]
    pub fn listener_count(&self, id: PropertyId) -> usize {
        self.inner.state.borrow().entry(id).map_or(0, |e| {
            e.listeners.iter().filter(|w| w.strong_count() > 0).count()
        })
    }

    /// Stored listener entries on a property, dead ones included.
    #[cfg(test)]
    pub(crate) fn listener_slots(&self, id: PropertyId) -> usize {
        self.inner.state.borrow().entry(id).map_or(0, |e| e.listeners.len())
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakBindableObject {
        WeakBindableObject {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for BindableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindableObject")
            .field("type_name", &self.inner.type_name)
            .field("properties", &self.property_count())
            .finish()
    }
}

/// Non-owning counterpart of [`BindableObject`].
#[derive(Clone)]
pub struct WeakBindableObject {
    inner: Weak<HostShared>,
}

impl WeakBindableObject {
    #[must_use]
    pub fn upgrade(&self) -> Option<BindableObject> {
        self.inner.upgrade().map(|inner| BindableObject { inner })
    }
}

impl fmt::Debug for WeakBindableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBindableObject")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
