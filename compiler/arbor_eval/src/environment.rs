//! Variable scopes for the evaluator.
//!
//! Every block and lambda invocation pushes a [`Scope`]. Scopes are shared
//! through [`LocalScope`] so a closure can keep the scope it was created in
//! alive after the block that declared it has finished.

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use arbor_ir::VarId;

use crate::value::Value;

/// A single-threaded, reference-counted scope handle.
#[repr(transparent)]
pub struct LocalScope<T>(Rc<RefCell<T>>);

impl<T> LocalScope<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        LocalScope(Rc::new(RefCell::new(value)))
    }
}

impl<T> Clone for LocalScope<T> {
    #[inline]
    fn clone(&self) -> Self {
        LocalScope(Rc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for LocalScope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalScope").field(&self.0).finish()
    }
}

impl<T> Deref for LocalScope<T> {
    type Target = RefCell<T>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Bindings of one block or invocation.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: FxHashMap<VarId, Value>,
    parent: Option<LocalScope<Scope>>,
}

impl Scope {
    pub fn with_parent(parent: LocalScope<Scope>) -> Self {
        Scope {
            bindings: FxHashMap::default(),
            parent: Some(parent),
        }
    }

    #[inline]
    pub fn define(&mut self, var: VarId, value: Value) {
        self.bindings.insert(var, value);
    }

    pub fn lookup(&self, var: VarId) -> Option<Value> {
        if let Some(value) = self.bindings.get(&var) {
            return Some(value.clone());
        }
        self.parent.as_ref()?.borrow().lookup(var)
    }

    /// Overwrite the innermost binding of `var`. Returns `false` when unbound.
    pub fn assign(&mut self, var: VarId, value: Value) -> bool {
        if let Some(slot) = self.bindings.get_mut(&var) {
            *slot = value;
            return true;
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(var, value),
            None => false,
        }
    }
}

/// Stack of active scopes, innermost last.
///
/// Invoking a closure swaps the whole stack for one rooted at the closure's
/// captured scope; [`Environment::restore`] puts the caller's stack back.
pub struct Environment {
    scopes: Vec<LocalScope<Scope>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            scopes: vec![LocalScope::new(Scope::default())],
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn current(&self) -> LocalScope<Scope> {
        match self.scopes.last() {
            Some(scope) => scope.clone(),
            None => LocalScope::new(Scope::default()),
        }
    }

    #[inline]
    pub fn push_scope(&mut self) {
        let parent = self.current();
        self.scopes.push(LocalScope::new(Scope::with_parent(parent)));
    }

    #[inline]
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Replace the stack with a fresh scope under `captured`, returning the
    /// caller's stack.
    pub fn enter_closure(&mut self, captured: LocalScope<Scope>) -> Vec<LocalScope<Scope>> {
        let inner = LocalScope::new(Scope::with_parent(captured));
        std::mem::replace(&mut self.scopes, vec![inner])
    }

    pub fn restore(&mut self, saved: Vec<LocalScope<Scope>>) {
        self.scopes = saved;
    }

    pub fn define(&mut self, var: VarId, value: Value) {
        if let Some(scope) = self.scopes.last() {
            scope.borrow_mut().define(var, value);
        }
    }

    pub fn lookup(&self, var: VarId) -> Option<Value> {
        self.scopes.last()?.borrow().lookup(var)
    }

    pub fn assign(&mut self, var: VarId, value: Value) -> bool {
        match self.scopes.last() {
            Some(scope) => scope.borrow_mut().assign(var, value),
            None => false,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
