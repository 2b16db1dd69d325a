//! Generic Tree Visitor
//!
//! Maps a tree to an arbitrary result type by double dispatch over the node
//! kind. Every handler has a default that forwards to
//! [`Visitor::default_visit`], so a visitor overrides only the kinds it cares
//! about.
//!
//! # Dispatch
//!
//! [`visit`] matches exhaustively on the node kind, then on the operator
//! subkind for the unary, binary and assignment families. Extension nodes go
//! to [`Visitor::visit_extension`], which by default reduces the node and
//! visits the result.
//!
//! Host-defined [`CustomNode`] kinds can be handled without touching the
//! trait: a visitor returns a [`DispatchTable`] built once at construction
//! with [`DispatchTable::on`] and [`DispatchTable::on_where`]. Registrations
//! are tried in order; when a table exists but nothing matches, the node goes
//! to `default_visit`.
//!
//! # Example
//!
//! ```text
//! struct CountCalls(usize);
//!
//! impl Visitor for CountCalls {
//!     type Output = ();
//!
//!     fn visit_call(&mut self, arena: &mut NodeArena, id: NodeId, ..) -> IrResult<()> {
//!         self.0 += 1;
//!         walk_children(self, arena, id).map(drop)
//!     }
//! }
//! ```

use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use arbor_stack::ensure_sufficient_stack;

use crate::extension::{CustomNode, Extension};
use crate::node::{
    AssignOp, BinaryFamily, BinaryOp, CatchBlock, ConstValue, GotoKind, Node, UnaryOp,
};
use crate::{
    CatchRange, IrError, IrResult, LabelId, Name, NodeArena, NodeId, NodeRange, TypeId, VarId,
    VarRange,
};

/// Tree visitor producing `Self::Output` per node.
///
/// Handlers receive the arena mutably so they can build new nodes (a
/// rewriting visitor) or reduce extension nodes on demand.
#[expect(unused_variables, reason = "default handlers ignore their operands")]
pub trait Visitor {
    type Output: Default;

    /// Fallback for every handler that is not overridden.
    fn default_visit(&mut self, arena: &mut NodeArena, id: NodeId) -> IrResult<Self::Output> {
        Ok(Self::Output::default())
    }

    fn visit_constant(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        value: ConstValue,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_default(&mut self, arena: &mut NodeArena, id: NodeId) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_parameter(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        var: VarId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    /// Negation, plus, logical not and ones' complement.
    fn visit_unary(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: UnaryOp,
        operand: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    /// `Convert`, `ConvertChecked` and `TypeAs`. The target is the node type.
    fn visit_convert(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: UnaryOp,
        operand: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_array_length(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        operand: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    /// Arithmetic and bitwise operators.
    fn visit_arithmetic(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_comparison(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    /// `&&`, `||` and `??`.
    fn visit_short_circuit(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_conditional(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        test: NodeId,
        if_true: NodeId,
        if_false: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_block(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        variables: VarRange,
        exprs: NodeRange,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_assign(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        target: NodeId,
        value: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_compound_assign(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: AssignOp,
        target: NodeId,
        value: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_increment(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: AssignOp,
        target: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_loop(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        body: NodeId,
        break_label: LabelId,
        continue_label: LabelId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_label(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        target: LabelId,
        default_value: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_goto(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        kind: GotoKind,
        target: LabelId,
        value: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_call(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        receiver: NodeId,
        method: Name,
        args: NodeRange,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_invoke(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        callee: NodeId,
        args: NodeRange,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_lambda(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        params: VarRange,
        body: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_member(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        receiver: NodeId,
        member: Name,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_index(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        receiver: NodeId,
        args: NodeRange,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_new(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        args: NodeRange,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_new_array(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        elements: NodeRange,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_type_is(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        operand: NodeId,
        target: TypeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_try(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        body: NodeId,
        handlers: CatchRange,
        finally: NodeId,
        fault: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    fn visit_throw(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        value: NodeId,
    ) -> IrResult<Self::Output> {
        self.default_visit(arena, id)
    }

    /// Extension nodes without a dispatch-table handler. Reduces and revisits.
    fn visit_extension(&mut self, arena: &mut NodeArena, id: NodeId) -> IrResult<Self::Output> {
        try_visit_unknown(self, arena, id)
    }

    /// Registration table for custom node kinds. Built once; shared by `Rc`
    /// so handlers can borrow the visitor mutably.
    fn dispatch_table(&self) -> Option<Rc<DispatchTable<Self>>> {
        None
    }

    /// Ancestor stack maintained by [`visit`] when present.
    fn scope_stack(&mut self) -> Option<&mut ScopeStack> {
        None
    }
}

/// Visit `id`, maintaining the visitor's scope stack around the handler.
pub fn visit<V: Visitor + ?Sized>(
    v: &mut V,
    arena: &mut NodeArena,
    id: NodeId,
) -> IrResult<V::Output> {
    arena.check_node("id", id)?;
    if let Some(stack) = v.scope_stack() {
        stack.push(id);
    }
    let result = ensure_sufficient_stack(|| dispatch(v, arena, id));
    if let Some(stack) = v.scope_stack() {
        stack.pop();
    }
    result
}

fn dispatch<V: Visitor + ?Sized>(
    v: &mut V,
    arena: &mut NodeArena,
    id: NodeId,
) -> IrResult<V::Output> {
    let node = *arena.node(id);
    match node {
        Node::Constant(value) => v.visit_constant(arena, id, value),
        Node::Default => v.visit_default(arena, id),
        Node::Parameter(var) => v.visit_parameter(arena, id, var),
        Node::Unary { op, operand } => match op {
            UnaryOp::Negate
            | UnaryOp::NegateChecked
            | UnaryOp::Plus
            | UnaryOp::Not
            | UnaryOp::OnesComplement => v.visit_unary(arena, id, op, operand),
            UnaryOp::Convert | UnaryOp::ConvertChecked | UnaryOp::TypeAs => {
                v.visit_convert(arena, id, op, operand)
            }
            UnaryOp::ArrayLength => v.visit_array_length(arena, id, operand),
        },
        Node::Binary { op, left, right } => match op.family() {
            BinaryFamily::Arithmetic | BinaryFamily::Bitwise => {
                v.visit_arithmetic(arena, id, op, left, right)
            }
            BinaryFamily::Comparison => v.visit_comparison(arena, id, op, left, right),
            BinaryFamily::ShortCircuit => v.visit_short_circuit(arena, id, op, left, right),
        },
        Node::Conditional {
            test,
            if_true,
            if_false,
        } => v.visit_conditional(arena, id, test, if_true, if_false),
        Node::Block { variables, exprs } => v.visit_block(arena, id, variables, exprs),
        Node::Assign { op, target, value } => match op {
            AssignOp::Assign => v.visit_assign(arena, id, target, value),
            AssignOp::AddAssign
            | AssignOp::SubtractAssign
            | AssignOp::MultiplyAssign
            | AssignOp::DivideAssign
            | AssignOp::ModuloAssign => v.visit_compound_assign(arena, id, op, target, value),
            AssignOp::PreIncrement
            | AssignOp::PostIncrement
            | AssignOp::PreDecrement
            | AssignOp::PostDecrement => v.visit_increment(arena, id, op, target),
        },
        Node::Loop {
            body,
            break_label,
            continue_label,
        } => v.visit_loop(arena, id, body, break_label, continue_label),
        Node::Label {
            target,
            default_value,
        } => v.visit_label(arena, id, target, default_value),
        Node::Goto {
            kind,
            target,
            value,
        } => v.visit_goto(arena, id, kind, target, value),
        Node::Call {
            receiver,
            method,
            args,
        } => v.visit_call(arena, id, receiver, method, args),
        Node::Invoke { callee, args } => v.visit_invoke(arena, id, callee, args),
        Node::Lambda { params, body } => v.visit_lambda(arena, id, params, body),
        Node::Member { receiver, member } => v.visit_member(arena, id, receiver, member),
        Node::Index { receiver, args } => v.visit_index(arena, id, receiver, args),
        Node::New { args } => v.visit_new(arena, id, args),
        Node::NewArray { elements } => v.visit_new_array(arena, id, elements),
        Node::TypeIs { operand, target } => v.visit_type_is(arena, id, operand, target),
        Node::Try {
            body,
            handlers,
            finally,
            fault,
        } => v.visit_try(arena, id, body, handlers, finally, fault),
        Node::Throw { value } => v.visit_throw(arena, id, value),
        Node::Extension(ext) => {
            let Extension::Custom(custom) = arena.extension(ext) else {
                return v.visit_extension(arena, id);
            };
            let custom = Arc::clone(custom);
            match v.dispatch_table() {
                Some(table) => table.dispatch(v, arena, id, &*custom),
                None => v.visit_extension(arena, id),
            }
        }
    }
}

/// Fallback for nodes a visitor has no handler for.
///
/// Reducible nodes are reduced and revisited. Checked operators are rewritten
/// to their unchecked form and revisited. Anything else is unsupported.
pub fn try_visit_unknown<V: Visitor + ?Sized>(
    v: &mut V,
    arena: &mut NodeArena,
    id: NodeId,
) -> IrResult<V::Output> {
    if arena.can_reduce(id) {
        let reduced = arena.reduce(id)?;
        return visit(v, arena, reduced);
    }
    let canonical = match *arena.node(id) {
        Node::Binary { op, left, right } => match op.unchecked() {
            Some(op) => Some(arena.binary(op, left, right)?),
            None => None,
        },
        Node::Unary {
            op: UnaryOp::NegateChecked,
            operand,
        } => Some(arena.unary(UnaryOp::Negate, operand)?),
        Node::Unary {
            op: UnaryOp::ConvertChecked,
            operand,
        } => {
            let target = arena.ty(id);
            Some(arena.convert(UnaryOp::Convert, operand, target)?)
        }
        _ => None,
    };
    match canonical {
        Some(canonical) => {
            tracing::trace!(?id, ?canonical, "visiting unchecked form");
            visit(v, arena, canonical)
        }
        None => Err(IrError::unsupported(
            id,
            arena.tag(id),
            "no handler and no reduction for this node",
        )),
    }
}

/// Visit every present child of `id` in order.
pub fn walk_children<V: Visitor + ?Sized>(
    v: &mut V,
    arena: &mut NodeArena,
    id: NodeId,
) -> IrResult<Vec<V::Output>> {
    let children = arena.children(id);
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        if child.is_valid() {
            out.push(visit(v, arena, child)?);
        }
    }
    Ok(out)
}

/// Visit the handler filters and bodies of a try node.
pub fn walk_handlers<V: Visitor + ?Sized>(
    v: &mut V,
    arena: &mut NodeArena,
    handlers: CatchRange,
) -> IrResult<Vec<V::Output>> {
    let handlers: Vec<CatchBlock> = arena.get_catches(handlers).to_vec();
    let mut out = Vec::with_capacity(handlers.len());
    for handler in handlers {
        if handler.filter.is_valid() {
            visit(v, arena, handler.filter)?;
        }
        out.push(visit(v, arena, handler.body)?);
    }
    Ok(out)
}

// Dispatch table

struct Registration<V: Visitor + ?Sized> {
    matches: Box<dyn Fn(&dyn CustomNode) -> bool>,
    #[expect(clippy::type_complexity, reason = "handler signature spelled out once")]
    handler: Box<dyn Fn(&mut V, &mut NodeArena, NodeId, &dyn CustomNode) -> IrResult<V::Output>>,
}

/// Ordered handlers for custom node kinds.
pub struct DispatchTable<V: Visitor + ?Sized> {
    entries: Vec<Registration<V>>,
    _visitor: PhantomData<fn(&mut V)>,
}

impl<V: Visitor + ?Sized + 'static> DispatchTable<V> {
    pub fn new() -> Self {
        DispatchTable {
            entries: Vec::new(),
            _visitor: PhantomData,
        }
    }

    /// Handle nodes whose concrete payload type is `N`.
    #[must_use]
    pub fn on<N: CustomNode>(
        mut self,
        handler: impl Fn(&mut V, &mut NodeArena, NodeId, &N) -> IrResult<V::Output> + 'static,
    ) -> Self {
        self.entries.push(Registration {
            matches: Box::new(|node| node.as_any().is::<N>()),
            handler: Box::new(move |v, arena, id, node| match node.as_any().downcast_ref::<N>() {
                Some(node) => handler(v, arena, id, node),
                None => Err(IrError::invariant(format!(
                    "dispatch entry for `{}` received `{}`",
                    std::any::type_name::<N>(),
                    node.kind_name()
                ))),
            }),
        });
        self
    }

    /// Handle any custom node accepted by `predicate`.
    #[must_use]
    pub fn on_where(
        mut self,
        predicate: impl Fn(&dyn CustomNode) -> bool + 'static,
        handler: impl Fn(&mut V, &mut NodeArena, NodeId, &dyn CustomNode) -> IrResult<V::Output>
            + 'static,
    ) -> Self {
        self.entries.push(Registration {
            matches: Box::new(predicate),
            handler: Box::new(handler),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Visitor + ?Sized> DispatchTable<V> {
    /// First matching registration, else `default_visit`.
    fn dispatch(
        &self,
        v: &mut V,
        arena: &mut NodeArena,
        id: NodeId,
        node: &dyn CustomNode,
    ) -> IrResult<V::Output> {
        match self.entries.iter().find(|entry| (entry.matches)(node)) {
            Some(entry) => (entry.handler)(v, arena, id, node),
            None => v.default_visit(arena, id),
        }
    }
}

impl<V: Visitor + ?Sized + 'static> Default for DispatchTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

// Scope stack

/// Ancestors of the node currently being visited, outermost first.
#[derive(Clone, Debug, Default)]
pub struct ScopeStack {
    nodes: Vec<NodeId>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: NodeId) {
        self.nodes.push(id);
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        self.nodes.pop()
    }

    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    /// The root of the current traversal.
    pub fn outermost(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    /// The node currently being visited.
    pub fn innermost(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// Nearest proper ancestor of the current node satisfying `pred`.
    pub fn enclosing(
        &self,
        arena: &NodeArena,
        pred: impl Fn(&NodeArena, NodeId) -> bool,
    ) -> Option<NodeId> {
        let ancestors = self.nodes.len().checked_sub(1)?;
        self.nodes[..ancestors]
            .iter()
            .rev()
            .copied()
            .find(|&id| pred(arena, id))
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
