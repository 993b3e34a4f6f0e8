//! The custom pickler registry.
//!
//! A registry maps host types to user-supplied encoders.  Lookup is by
//! exact type first; on a miss, the registered handlers are walked in
//! registration order and the first one whose [`CustomPickler::accepts`]
//! claims the value wins.  That walk is the Rust rendition of the
//! supertype/interface lookup a reflective host would do.
//!
//! The process-wide registry behind [`Registry::global`] is meant to be
//! populated during startup and treated as immutable afterwards; an
//! explicitly constructed registry can be passed to the encoder through
//! [`DumpOptions::with_registry`](crate::DumpOptions::with_registry)
//! instead.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::Result;
use crate::record::Reflect;
use crate::ser::SaveContext;

/// A user-supplied encoder for one host type.
///
/// A registered handler always beats the built-in record reflection for
/// the values it matches.
pub trait CustomPickler: Send + Sync + 'static {
    /// Claim values whose exact type was not registered.  Checked in
    /// registration order after the exact-type lookup misses.
    fn accepts(&self, _value: &dyn Reflect) -> bool {
        false
    }

    /// Write a complete stream fragment for `value`.  Child values are
    /// saved recursively through `ctx`, which also exposes raw opcode
    /// emission.  The encoder memoizes `value` after this returns.
    fn pickle(&self, value: &dyn Reflect, ctx: &mut dyn SaveContext) -> Result<()>;
}

#[derive(Default)]
struct Handlers {
    exact: HashMap<TypeId, Arc<dyn CustomPickler>>,
    // Registration order, for the accepts() walk.
    order: Vec<(TypeId, Arc<dyn CustomPickler>)>,
}

/// A mapping from host types to custom picklers.
#[derive(Default)]
pub struct Registry {
    handlers: RwLock<Handlers>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Register `handler` for values of type `T`, superseding any prior
    /// registration for the same type (its position in the walk order is
    /// kept).
    pub fn register<T: Reflect, P: CustomPickler>(&self, handler: P) {
        let id = TypeId::of::<T>();
        let handler: Arc<dyn CustomPickler> = Arc::new(handler);
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        match handlers.order.iter_mut().find(|(t, _)| *t == id) {
            Some(slot) => slot.1 = handler.clone(),
            None => handlers.order.push((id, handler.clone())),
        }
        handlers.exact.insert(id, handler);
    }

    pub(crate) fn lookup(&self, value: &dyn Reflect) -> Option<Arc<dyn CustomPickler>> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        if let Some(handler) = handlers.exact.get(&value.as_any().type_id()) {
            return Some(handler.clone());
        }
        handlers.order.iter()
                      .find(|(_, handler)| handler.accepts(value))
                      .map(|(_, handler)| handler.clone())
    }
}

/// Register `handler` for type `T` on the process-wide registry.
pub fn register<T: Reflect, P: CustomPickler>(handler: P) {
    Registry::global().register::<T, P>(handler)
}
