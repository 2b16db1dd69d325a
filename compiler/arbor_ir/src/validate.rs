//! Outbound contract check.
//!
//! A backend only understands primitive kinds. [`ensure_primitive`] walks a
//! reduced tree and reports the first extension node it finds, so a missed
//! reduction surfaces as an error naming the node rather than as a backend
//! failure.

use rustc_hash::FxHashSet;

use crate::{IrError, IrResult, NodeArena, NodeId};

/// Fail with [`IrError::Unsupported`] on the first reducible node under `root`,
/// in pre-order.
pub fn ensure_primitive(arena: &NodeArena, root: NodeId) -> IrResult<()> {
    match first_reducible(arena, root) {
        None => Ok(()),
        Some(id) => {
            let kind = arena.extension_of(id).map_or("extension", |ext| ext.kind_name());
            Err(IrError::unsupported(
                id,
                arena.tag(id),
                format!("`{kind}` node must be reduced before emission"),
            ))
        }
    }
}

pub fn is_primitive_tree(arena: &NodeArena, root: NodeId) -> bool {
    first_reducible(arena, root).is_none()
}

fn first_reducible(arena: &NodeArena, root: NodeId) -> Option<NodeId> {
    let mut seen = FxHashSet::default();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !id.is_valid() || !seen.insert(id) {
            continue;
        }
        if arena.can_reduce(id) {
            return Some(id);
        }
        stack.extend(arena.children(id).into_iter().rev());
    }
    None
}
