//! Scope binder: maps host symbols to the arena variables standing for them.
//!
//! Binders form a persistent chain. A child shares its parent through an
//! `Rc`, so entering a scope is one allocation and leaving it is dropping
//! the child. Inner bindings shadow outer ones for the same symbol.

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use smallvec::SmallVec;

use arbor_ir::{IrError, IrResult, VarId};

struct Frame<S> {
    bindings: SmallVec<[(S, VarId); 4]>,
    parent: Option<Rc<Frame<S>>>,
}

/// One scope of symbol bindings plus its enclosing scopes.
pub struct Binder<S> {
    frame: Rc<Frame<S>>,
}

impl<S> Clone for Binder<S> {
    fn clone(&self) -> Self {
        Binder {
            frame: Rc::clone(&self.frame),
        }
    }
}

impl<S: Copy + Eq + Hash + fmt::Debug> Binder<S> {
    /// Outermost scope binding `locals[i]` to `placeholders[i]`.
    pub fn root(locals: &[S], placeholders: &[VarId]) -> IrResult<Self> {
        Ok(Binder {
            frame: Rc::new(Frame {
                bindings: pair(locals, placeholders)?,
                parent: None,
            }),
        })
    }

    /// Nested scope over `self`.
    pub fn child(&self, locals: &[S], placeholders: &[VarId]) -> IrResult<Self> {
        Ok(Binder {
            frame: Rc::new(Frame {
                bindings: pair(locals, placeholders)?,
                parent: Some(Rc::clone(&self.frame)),
            }),
        })
    }

    pub fn child_single(&self, local: S, placeholder: VarId) -> Self {
        let mut bindings = SmallVec::new();
        bindings.push((local, placeholder));
        Binder {
            frame: Rc::new(Frame {
                bindings,
                parent: Some(Rc::clone(&self.frame)),
            }),
        }
    }

    /// The innermost binding of `local`.
    pub fn get(&self, local: S) -> Option<VarId> {
        let mut frame = Some(&self.frame);
        while let Some(current) = frame {
            if let Some(&(_, var)) = current.bindings.iter().find(|(s, _)| *s == local) {
                return Some(var);
            }
            frame = current.parent.as_ref();
        }
        None
    }

    pub fn lookup(&self, local: S) -> IrResult<VarId> {
        self.get(local).ok_or_else(|| IrError::BindingNotFound {
            symbol: format!("{local:?}"),
        })
    }

    /// Number of scopes in the chain, counting `self`.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut frame = &self.frame;
        while let Some(parent) = &frame.parent {
            depth += 1;
            frame = parent;
        }
        depth
    }
}

impl<S: fmt::Debug> fmt::Debug for Binder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut frame = Some(&self.frame);
        while let Some(current) = frame {
            list.entry(&current.bindings);
            frame = current.parent.as_ref();
        }
        list.finish()
    }
}

fn pair<S: Copy>(locals: &[S], placeholders: &[VarId]) -> IrResult<SmallVec<[(S, VarId); 4]>> {
    if locals.len() != placeholders.len() {
        return Err(IrError::invalid(
            "placeholders",
            format!(
                "{} local(s) but {} placeholder(s)",
                locals.len(),
                placeholders.len()
            ),
        ));
    }
    Ok(locals.iter().copied().zip(placeholders.iter().copied()).collect())
}
