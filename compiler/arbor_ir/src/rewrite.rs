//! Structural rewriting.
//!
//! A [`Rewriter`] maps `NodeId -> NodeId` bottom-up. [`walk_rewrite`] rewrites
//! the children and rebuilds the node through
//! [`NodeArena::with_children`], so subtrees that did not change keep their
//! identity all the way up.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use arbor_stack::ensure_sufficient_stack;

use crate::node::Node;
use crate::{IrResult, Name, NodeArena, NodeId, VarId};

pub trait Rewriter {
    fn rewrite(&mut self, arena: &mut NodeArena, id: NodeId) -> IrResult<NodeId> {
        walk_rewrite(self, arena, id)
    }
}

/// Rewrite every present child of `id`, then rebuild `id` over the results.
pub fn walk_rewrite<R: Rewriter + ?Sized>(
    r: &mut R,
    arena: &mut NodeArena,
    id: NodeId,
) -> IrResult<NodeId> {
    let children = arena.children(id);
    let mut rewritten: SmallVec<[NodeId; 4]> = SmallVec::with_capacity(children.len());
    for child in children {
        if child.is_valid() {
            rewritten.push(ensure_sufficient_stack(|| r.rewrite(arena, child))?);
        } else {
            rewritten.push(child);
        }
    }
    arena.with_children(id, &rewritten)
}

/// Reduces every extension node in a tree, leaving only primitive kinds.
#[derive(Default)]
pub struct FullReducer {
    /// Shared subtrees are reduced once.
    done: FxHashMap<NodeId, NodeId>,
}

impl Rewriter for FullReducer {
    fn rewrite(&mut self, arena: &mut NodeArena, id: NodeId) -> IrResult<NodeId> {
        if let Some(&done) = self.done.get(&id) {
            return Ok(done);
        }
        let primitive = arena.reduce_to_primitive(id)?;
        let result = walk_rewrite(self, arena, primitive)?;
        self.done.insert(id, result);
        Ok(result)
    }
}

/// Reduce `root` and all its descendants until no extension node remains.
#[tracing::instrument(level = "debug", skip_all, fields(root = ?root))]
pub fn reduce_fully(arena: &mut NodeArena, root: NodeId) -> IrResult<NodeId> {
    let before = arena.len();
    let reduced = FullReducer::default().rewrite(arena, root)?;
    tracing::debug!(allocated = arena.len() - before, "tree reduced");
    Ok(reduced)
}

/// Replaces variable reads, and member paths rooted at a variable, with
/// other nodes.
///
/// A path replacement matches `var.a.b` as `Member(Member(Parameter(var), a), b)`.
/// Path replacements are checked before variable replacements, so replacing
/// `t.x` and `t` at once is well defined.
#[derive(Clone, Debug, Default)]
pub struct Substitution {
    vars: FxHashMap<VarId, NodeId>,
    paths: FxHashMap<(VarId, Vec<Name>), NodeId>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_var(&mut self, var: VarId, with: NodeId) -> &mut Self {
        self.vars.insert(var, with);
        self
    }

    pub fn replace_path(&mut self, var: VarId, path: &[Name], with: NodeId) -> &mut Self {
        if path.is_empty() {
            self.vars.insert(var, with);
        } else {
            self.paths.insert((var, path.to_vec()), with);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.paths.is_empty()
    }

    /// Apply to `root`.
    pub fn apply(&mut self, arena: &mut NodeArena, root: NodeId) -> IrResult<NodeId> {
        if self.is_empty() {
            return Ok(root);
        }
        self.rewrite(arena, root)
    }

    fn lookup(&self, arena: &NodeArena, id: NodeId) -> Option<NodeId> {
        match *arena.node(id) {
            Node::Parameter(var) => self.vars.get(&var).copied(),
            Node::Member { .. } if !self.paths.is_empty() => {
                let (var, path) = member_path(arena, id)?;
                self.paths.get(&(var, path)).copied()
            }
            _ => None,
        }
    }
}

impl Rewriter for Substitution {
    fn rewrite(&mut self, arena: &mut NodeArena, id: NodeId) -> IrResult<NodeId> {
        match self.lookup(arena, id) {
            Some(replacement) => Ok(replacement),
            None => walk_rewrite(self, arena, id),
        }
    }
}

/// Decompose `var.a.b` into `(var, [a, b])`.
pub fn member_path(arena: &NodeArena, id: NodeId) -> Option<(VarId, Vec<Name>)> {
    let mut path = Vec::new();
    let mut current = id;
    loop {
        match *arena.node(current) {
            Node::Member { receiver, member } => {
                path.push(member);
                current = receiver;
            }
            Node::Parameter(var) => {
                path.reverse();
                return Some((var, path));
            }
            _ => return None,
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
