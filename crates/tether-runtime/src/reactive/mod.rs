#![forbid(unsafe_code)]

//! Reactive property bindings.
//!
//! - [`Observable`]: a shared, version-tracked value with change callbacks.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`BindableObject`]: an object whose properties are registered at
//!   runtime and observed individually.
//! - [`PathBinding`]: keeps one target property in sync with a value found
//!   by walking a property path.
//! - [`MultiBinding`]: derives one target property from several source
//!   bindings through a combining function and/or a string format.
//!
//! # Architecture
//!
//! Everything here is single-threaded: shared state lives in
//! `Rc<RefCell<..>>`, and callbacks hold their owners through `Weak` so that
//! dropping a binding (or the object it watches) tears the wiring down.
//! Change propagation is synchronous; an error raised anywhere down the
//! chain is returned from the `set` call that started it.
//!
//! # Invariants
//!
//! 1. Writing a value equal to the current one notifies nobody.
//! 2. Callbacks run in registration order.
//! 3. Dropping a [`Subscription`] removes the callback before the next
//!    notification.

pub mod binding;
pub mod host;
pub mod multi_binding;
pub mod observable;
mod relay;

pub use binding::{BindingMode, PathBinding, PropertyBinding, PropertyPath, ValueConverter};
pub use host::{BindableObject, ChangeCallback, PropertyId, PropertySpec, WeakBindableObject};
pub use multi_binding::{ActivationPhase, MultiBinding, MultiBindingBuilder, MultiValueConverter};
pub use observable::{Observable, Subscription};
