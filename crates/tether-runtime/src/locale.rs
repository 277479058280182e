#![forbid(unsafe_code)]

//! Thread-local culture context consulted by bindings.
//!
//! Converters receive the *current* culture and string formats render with
//! its separators. The current culture is the innermost scoped override if
//! one is active, otherwise the context's base culture, which starts out as
//! the system locale.

use std::cell::RefCell;
use std::env;
use std::rc::Rc;

pub use tether_i18n::Culture;
use tracing::debug;

use crate::reactive::{Observable, Subscription};

thread_local! {
    static GLOBAL_CONTEXT: CultureContext = CultureContext::system();
}

/// Base culture plus a stack of scoped overrides.
#[derive(Clone, Debug)]
pub struct CultureContext {
    base: Observable<Culture>,
    overrides: Rc<RefCell<Vec<Culture>>>,
}

impl CultureContext {
    #[must_use]
    pub fn new(culture: Culture) -> Self {
        Self {
            base: Observable::new(culture),
            overrides: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Context whose base culture comes from `LC_ALL` / `LANG`.
    #[must_use]
    pub fn system() -> Self {
        Self::new(detect_system_culture())
    }

    /// The calling thread's shared context.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_CONTEXT.with(Clone::clone)
    }

    /// Innermost override, else the base culture.
    #[must_use]
    pub fn current_culture(&self) -> Culture {
        match self.overrides.borrow().last() {
            Some(culture) => culture.clone(),
            None => self.base.get(),
        }
    }

    #[must_use]
    pub fn base_culture(&self) -> Culture {
        self.base.get()
    }

    pub fn set_culture(&self, culture: Culture) {
        debug!(culture = %culture, "set base culture");
        self.base.set(culture);
    }

    /// Observe base-culture changes (overrides are not reported).
    pub fn subscribe(&self, callback: impl Fn(&Culture) + 'static) -> Subscription {
        self.base.subscribe(callback)
    }

    /// Make `culture` current until the returned guard drops.
    #[must_use = "dropping this guard ends the override"]
    pub fn push_override(&self, culture: Culture) -> CultureOverride {
        self.overrides.borrow_mut().push(culture);
        CultureOverride {
            stack: Rc::clone(&self.overrides),
        }
    }

    /// Number of base-culture changes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.base.version()
    }
}

/// RAII guard returned by [`CultureContext::push_override`].
#[must_use = "dropping this guard ends the override"]
pub struct CultureOverride {
    stack: Rc<RefCell<Vec<Culture>>>,
}

impl Drop for CultureOverride {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

impl std::fmt::Debug for CultureOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CultureOverride")
            .field("depth", &self.stack.borrow().len())
            .finish()
    }
}

/// Culture named by `LC_ALL`, then `LANG`, else `"en"`.
#[must_use]
pub fn detect_system_culture() -> Culture {
    let lc_all = env::var("LC_ALL").ok();
    let lang = env::var("LANG").ok();
    culture_from_env(lc_all.as_deref(), lang.as_deref())
}

/// The calling thread's current culture.
#[must_use]
pub fn current_culture() -> Culture {
    CultureContext::global().current_culture()
}

/// Replace the calling thread's base culture.
pub fn set_culture(culture: Culture) {
    CultureContext::global().set_culture(culture);
}

fn culture_from_env(lc_all: Option<&str>, lang: Option<&str>) -> Culture {
    let tag = lc_all
        .and_then(tether_i18n::normalize_locale)
        .or_else(|| lang.and_then(tether_i18n::normalize_locale))
        .unwrap_or_else(|| "en".to_string());
    Culture::new(&tag)
}
