//! Child enumeration and identity-preserving update.
//!
//! [`NodeArena::children`] lists a node's direct children in a fixed order
//! per kind. Optional children (`NodeId::INVALID`) keep their position so the
//! arity of a kind never varies. [`NodeArena::with_children`] is the inverse:
//! given the same children it returns the same node, otherwise it allocates a
//! node of the same kind and type.

use smallvec::SmallVec;

use crate::extension::{
    DoWhileLoop, Extension, ForEachLoop, ForLoop, FormatString, LockBlock, TupleNode, UsingBlock,
    WhileLoop,
};
use crate::node::{CatchBlock, Node};
use crate::{IrError, IrResult, NodeArena, NodeId, NodeTag, TypeId};

/// Children of one node. Most kinds have four or fewer.
pub type Children = SmallVec<[NodeId; 4]>;

impl NodeArena {
    /// Direct children of `id`, in the order [`with_children`](Self::with_children) expects.
    pub fn children(&self, id: NodeId) -> Children {
        let mut out = Children::new();
        match *self.node(id) {
            Node::Constant(_) | Node::Default | Node::Parameter(_) => {}
            Node::Unary { operand, .. } | Node::TypeIs { operand, .. } => out.push(operand),
            Node::Binary { left, right, .. } => out.extend([left, right]),
            Node::Conditional {
                test,
                if_true,
                if_false,
            } => out.extend([test, if_true, if_false]),
            Node::Block { exprs, .. } => out.extend_from_slice(self.get_list(exprs)),
            Node::Assign { target, value, .. } => out.extend([target, value]),
            Node::Loop { body, .. } | Node::Lambda { body, .. } => out.push(body),
            Node::Label { default_value, .. } => out.push(default_value),
            Node::Goto { value, .. } | Node::Throw { value } => out.push(value),
            Node::Call { receiver, args, .. } | Node::Index { receiver, args } => {
                out.push(receiver);
                out.extend_from_slice(self.get_list(args));
            }
            Node::Invoke { callee, args } => {
                out.push(callee);
                out.extend_from_slice(self.get_list(args));
            }
            Node::Member { receiver, .. } => out.push(receiver),
            Node::New { args } => out.extend_from_slice(self.get_list(args)),
            Node::NewArray { elements } => out.extend_from_slice(self.get_list(elements)),
            Node::Try {
                body,
                handlers,
                finally,
                fault,
            } => {
                out.push(body);
                for handler in self.get_catches(handlers) {
                    out.extend([handler.filter, handler.body]);
                }
                out.extend([finally, fault]);
            }
            Node::Extension(ext) => self.extension_children(self.extension(ext), &mut out),
        }
        out
    }

    fn extension_children(&self, ext: &Extension, out: &mut Children) {
        match ext {
            Extension::While(w) => out.extend([w.test, w.body]),
            Extension::DoWhile(d) => out.extend([d.body, d.test]),
            Extension::For(f) => {
                out.extend_from_slice(self.get_list(f.initializers));
                out.push(f.test);
                out.extend_from_slice(self.get_list(f.steps));
                out.push(f.body);
            }
            Extension::ForEach(f) => out.extend([f.collection, f.body]),
            Extension::Using(u) => out.extend([u.resource, u.body]),
            Extension::Lock(l) => out.extend([l.lock, l.body]),
            Extension::Tuple(t) => out.extend_from_slice(self.get_list(t.elements)),
            Extension::Format(f) => out.extend_from_slice(self.get_list(f.segments)),
            Extension::TypeLiteral(_) | Extension::Slot(_) => {}
            Extension::Custom(custom) => out.extend(custom.children()),
        }
    }

    /// Rebuild `id` over `children`.
    ///
    /// Returns `id` itself when every child is identical. A replacement child
    /// must be present exactly where the original was and its type must be
    /// assignable to the original child's type, so the rebuilt node keeps the
    /// original's type.
    pub fn with_children(&mut self, id: NodeId, children: &[NodeId]) -> IrResult<NodeId> {
        let old = self.children(id);
        if old.as_slice() == children {
            return Ok(id);
        }
        if old.len() != children.len() {
            return Err(IrError::invalid(
                "children",
                format!(
                    "{} has {} children, {} supplied",
                    self.tag(id),
                    old.len(),
                    children.len()
                ),
            ));
        }
        for (&before, &after) in old.iter().zip(children) {
            if before.is_valid() != after.is_valid() {
                return Err(IrError::invalid(
                    "children",
                    "optional children cannot be added or removed",
                ));
            }
            if after.is_valid() && after != before {
                self.check_node("children", after)?;
                self.check_assignable("children", after, self.ty(before))?;
            }
        }

        let ty = self.ty(id);
        let c = children;
        let original = *self.node(id);
        let node = match original {
            Node::Constant(_) | Node::Default | Node::Parameter(_) => return Ok(id),
            Node::Unary { op, .. } => Node::Unary { op, operand: c[0] },
            Node::Binary { op, .. } => Node::Binary {
                op,
                left: c[0],
                right: c[1],
            },
            Node::Conditional { .. } => Node::Conditional {
                test: c[0],
                if_true: c[1],
                if_false: c[2],
            },
            Node::Block { variables, .. } => Node::Block {
                variables,
                exprs: self.push_list(c),
            },
            Node::Assign { op, .. } => {
                self.check_writable(c[0])?;
                Node::Assign {
                    op,
                    target: c[0],
                    value: c[1],
                }
            }
            Node::Loop {
                break_label,
                continue_label,
                ..
            } => Node::Loop {
                body: c[0],
                break_label,
                continue_label,
            },
            Node::Label { target, .. } => Node::Label {
                target,
                default_value: c[0],
            },
            Node::Goto { kind, target, .. } => Node::Goto {
                kind,
                target,
                value: c[0],
            },
            Node::Call { method, .. } => Node::Call {
                receiver: c[0],
                method,
                args: self.push_list(&c[1..]),
            },
            Node::Invoke { .. } => Node::Invoke {
                callee: c[0],
                args: self.push_list(&c[1..]),
            },
            Node::Lambda { params, .. } => Node::Lambda { params, body: c[0] },
            Node::Member { member, .. } => Node::Member {
                receiver: c[0],
                member,
            },
            Node::Index { .. } => Node::Index {
                receiver: c[0],
                args: self.push_list(&c[1..]),
            },
            Node::New { .. } => Node::New {
                args: self.push_list(c),
            },
            Node::NewArray { .. } => Node::NewArray {
                elements: self.push_list(c),
            },
            Node::TypeIs { target, .. } => Node::TypeIs {
                operand: c[0],
                target,
            },
            Node::Try { handlers, .. } => {
                let rebuilt: Vec<CatchBlock> = self
                    .get_catches(handlers)
                    .iter()
                    .enumerate()
                    .map(|(i, handler)| CatchBlock {
                        filter: c[1 + 2 * i],
                        body: c[2 + 2 * i],
                        ..*handler
                    })
                    .collect();
                let n = c.len();
                Node::Try {
                    body: c[0],
                    handlers: self.push_catches(&rebuilt),
                    finally: c[n - 2],
                    fault: c[n - 1],
                }
            }
            Node::Throw { .. } => Node::Throw { value: c[0] },
            Node::Extension(ext) => {
                let ext = self.extension(ext).clone();
                return self.rebuild_extension(&ext, c, ty);
            }
        };
        Ok(self.push(node, ty))
    }

    fn rebuild_extension(
        &mut self,
        ext: &Extension,
        c: &[NodeId],
        ty: TypeId,
    ) -> IrResult<NodeId> {
        let rebuilt = match ext {
            Extension::While(w) => Extension::While(WhileLoop {
                test: c[0],
                body: c[1],
                ..*w
            }),
            Extension::DoWhile(d) => Extension::DoWhile(DoWhileLoop {
                body: c[0],
                test: c[1],
                ..*d
            }),
            Extension::For(f) => {
                let inits = f.initializers.len();
                let steps = f.steps.len();
                Extension::For(ForLoop {
                    initializers: self.push_list(&c[..inits]),
                    test: c[inits],
                    steps: self.push_list(&c[inits + 1..inits + 1 + steps]),
                    body: c[inits + 1 + steps],
                    ..*f
                })
            }
            Extension::ForEach(f) => Extension::ForEach(ForEachLoop {
                collection: c[0],
                body: c[1],
                ..*f
            }),
            Extension::Using(u) => Extension::Using(UsingBlock {
                resource: c[0],
                body: c[1],
                ..*u
            }),
            Extension::Lock(_) => Extension::Lock(LockBlock {
                lock: c[0],
                body: c[1],
            }),
            Extension::Tuple(_) => Extension::Tuple(TupleNode {
                elements: self.push_list(c),
            }),
            Extension::Format(_) => Extension::Format(FormatString {
                segments: self.push_list(c),
            }),
            Extension::TypeLiteral(_) | Extension::Slot(_) => {
                return Err(IrError::invariant(format!(
                    "{} has no children to replace",
                    ext.kind_name()
                )))
            }
            Extension::Custom(custom) => Extension::Custom(custom.with_children(self, c)?),
        };
        Ok(self.push_extension(rebuilt, ty))
    }

    // ── Typed updates ───────────────────────────────────────────

    pub fn update_unary(&mut self, id: NodeId, operand: NodeId) -> IrResult<NodeId> {
        self.expect_kind(id, "a unary node", |n| matches!(n, Node::Unary { .. }))?;
        self.with_children(id, &[operand])
    }

    pub fn update_binary(&mut self, id: NodeId, left: NodeId, right: NodeId) -> IrResult<NodeId> {
        self.expect_kind(id, "a binary node", |n| matches!(n, Node::Binary { .. }))?;
        self.with_children(id, &[left, right])
    }

    pub fn update_conditional(
        &mut self,
        id: NodeId,
        test: NodeId,
        if_true: NodeId,
        if_false: NodeId,
    ) -> IrResult<NodeId> {
        self.expect_kind(id, "a conditional", |n| matches!(n, Node::Conditional { .. }))?;
        self.with_children(id, &[test, if_true, if_false])
    }

    pub fn update_block(&mut self, id: NodeId, exprs: &[NodeId]) -> IrResult<NodeId> {
        self.expect_kind(id, "a block", |n| matches!(n, Node::Block { .. }))?;
        self.with_children(id, exprs)
    }

    pub fn update_assign(&mut self, id: NodeId, target: NodeId, value: NodeId) -> IrResult<NodeId> {
        self.expect_kind(id, "an assignment", |n| matches!(n, Node::Assign { .. }))?;
        self.with_children(id, &[target, value])
    }

    pub fn update_loop(&mut self, id: NodeId, body: NodeId) -> IrResult<NodeId> {
        self.expect_kind(id, "a loop", |n| matches!(n, Node::Loop { .. }))?;
        self.with_children(id, &[body])
    }

    pub fn update_call(
        &mut self,
        id: NodeId,
        receiver: NodeId,
        args: &[NodeId],
    ) -> IrResult<NodeId> {
        self.expect_kind(id, "a call", |n| matches!(n, Node::Call { .. }))?;
        let mut children = Children::with_capacity(args.len() + 1);
        children.push(receiver);
        children.extend_from_slice(args);
        self.with_children(id, &children)
    }

    fn expect_kind(
        &self,
        id: NodeId,
        expected: &str,
        is_kind: impl FnOnce(&Node) -> bool,
    ) -> IrResult<()> {
        self.check_node("id", id)?;
        if is_kind(self.node(id)) {
            Ok(())
        } else {
            let tag: NodeTag = self.tag(id);
            Err(IrError::invalid("id", format!("expected {expected}, found {tag}")))
        }
    }
}
