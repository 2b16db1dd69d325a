//! Extension node payloads.
//!
//! Extension kinds are not understood by a backend. Each one reduces to an
//! equivalent primitive subtree (see [`reduce`](crate::reduce)). The built-in
//! kinds are variants of [`Extension`]; anything else implements
//! [`CustomNode`] and is stored as [`Extension::Custom`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::ids::{LabelId, NodeId, NodeRange, SlotId, VarId, VarRange};
use crate::{IrError, NodeArena, TypeId};

/// `while (test) body`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WhileLoop {
    pub test: NodeId,
    pub body: NodeId,
    pub break_label: LabelId,
    pub continue_label: LabelId,
}

/// `do body while (test)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DoWhileLoop {
    pub body: NodeId,
    pub test: NodeId,
    pub break_label: LabelId,
    pub continue_label: LabelId,
}

/// `for (variables = initializers; test; steps) body`.
///
/// `test` is `NodeId::INVALID` for a loop without a condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ForLoop {
    pub variables: VarRange,
    pub initializers: NodeRange,
    pub test: NodeId,
    pub steps: NodeRange,
    pub body: NodeId,
    pub break_label: LabelId,
    pub continue_label: LabelId,
}

/// `foreach (variable in collection) body`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ForEachLoop {
    pub variable: VarId,
    pub collection: NodeId,
    pub body: NodeId,
    pub break_label: LabelId,
    pub continue_label: LabelId,
}

/// `using (variable = resource) body`.
///
/// `variable` is `VarId::INVALID` when the resource is an expression whose
/// value the body does not name; reduction introduces a temporary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UsingBlock {
    pub variable: VarId,
    pub resource: NodeId,
    pub body: NodeId,
}

/// `lock (lock) body`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockBlock {
    pub lock: NodeId,
    pub body: NodeId,
}

/// Tuple literal. Its node type is the tuple type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TupleNode {
    pub elements: NodeRange,
}

/// Interpolated string: literal `Str` constants interleaved with holes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FormatString {
    pub segments: NodeRange,
}

/// `typeof(target)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeLiteral {
    pub target: TypeId,
}

/// A host-defined node kind.
///
/// Implementors are immutable values. `with_children` must return a new
/// value (validated as at construction); identity preservation is handled by
/// the arena, which only calls it when a child actually changed.
pub trait CustomNode: fmt::Debug + Send + Sync + 'static {
    /// Short kind name for diagnostics and tracing.
    fn kind_name(&self) -> &'static str;

    /// Child nodes in a fixed order.
    fn children(&self) -> Vec<NodeId>;

    /// Rebuild with replaced children (same order as [`children`](Self::children)).
    fn with_children(
        &self,
        arena: &mut NodeArena,
        children: &[NodeId],
    ) -> Result<Arc<dyn CustomNode>, IrError>;

    /// Lower to an equivalent subtree. `id` is the node being reduced and
    /// carries the result type.
    fn reduce(&self, arena: &mut NodeArena, id: NodeId) -> Result<NodeId, IrError>;

    fn as_any(&self) -> &dyn Any;
}

/// Payload of a [`Node::Extension`](crate::Node::Extension).
#[derive(Clone, Debug)]
pub enum Extension {
    While(WhileLoop),
    DoWhile(DoWhileLoop),
    For(ForLoop),
    ForEach(ForEachLoop),
    Using(UsingBlock),
    Lock(LockBlock),
    Tuple(TupleNode),
    Format(FormatString),
    TypeLiteral(TypeLiteral),
    /// Mutable wrapper: reduces to whatever the slot currently targets.
    Slot(SlotId),
    Custom(Arc<dyn CustomNode>),
}

impl Extension {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Extension::While(_) => "while",
            Extension::DoWhile(_) => "do-while",
            Extension::For(_) => "for",
            Extension::ForEach(_) => "foreach",
            Extension::Using(_) => "using",
            Extension::Lock(_) => "lock",
            Extension::Tuple(_) => "tuple",
            Extension::Format(_) => "format",
            Extension::TypeLiteral(_) => "typeof",
            Extension::Slot(_) => "slot",
            Extension::Custom(custom) => custom.kind_name(),
        }
    }

    /// Downcast a custom payload to its concrete type.
    pub fn as_custom<N: CustomNode>(&self) -> Option<&N> {
        match self {
            Extension::Custom(custom) => custom.as_any().downcast_ref::<N>(),
            _ => None,
        }
    }
}
