//! Host-provided methods on nominal types.
//!
//! Reduced trees call methods such as `dispose` on user types. The evaluator
//! has no bodies for them, so the embedding registers a closure per
//! `(type, method)` pair. Registered methods take precedence over built-ins.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use arbor_ir::{Name, TypeId};

use crate::errors::EvalResult;
use crate::value::Value;

/// A host method: receives the receiver and the evaluated arguments.
pub type HostMethod = Rc<dyn Fn(&Value, &[Value]) -> EvalResult<Value>>;

#[derive(Clone, Default)]
pub struct HostRegistry {
    methods: FxHashMap<(TypeId, Name), HostMethod>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method` on `ty`, replacing any previous registration.
    pub fn register(
        &mut self,
        ty: TypeId,
        method: Name,
        f: impl Fn(&Value, &[Value]) -> EvalResult<Value> + 'static,
    ) {
        self.methods.insert((ty, method), Rc::new(f));
    }

    pub fn get(&self, ty: TypeId, method: Name) -> Option<HostMethod> {
        self.methods.get(&(ty, method)).cloned()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRegistry")
            .field("methods", &self.methods.len())
            .finish()
    }
}
