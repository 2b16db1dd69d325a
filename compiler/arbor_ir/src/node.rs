//! Node kinds.
//!
//! [`Node`] is the closed set of primitive kinds a backend understands,
//! plus [`Node::Extension`] which points into the arena's extension table.
//! Nodes are `Copy`: children are referenced by [`NodeId`], lists by ranges
//! into arena side tables.
//!
//! [`NodeTag`] is the flat discriminator used for diagnostics and dispatch
//! tables. Operator families (unary, binary, assignment) contribute one tag
//! per operator subkind.

use std::fmt;

use crate::ids::{CatchRange, ExtId, LabelId, NodeId, NodeRange, VarId, VarRange};
use crate::{Name, TypeId};

/// A literal value.
///
/// Floats are stored as bits so nodes stay `Eq` and `Hash`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConstValue {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Name),
    Type(TypeId),
}

impl ConstValue {
    pub fn float(value: f64) -> Self {
        ConstValue::Float(value.to_bits())
    }
}

/// Unary operator subkinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    NegateChecked,
    Plus,
    Not,
    OnesComplement,
    Convert,
    ConvertChecked,
    /// Conversion yielding null instead of failing.
    TypeAs,
    ArrayLength,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 9] = [
        UnaryOp::Negate,
        UnaryOp::NegateChecked,
        UnaryOp::Plus,
        UnaryOp::Not,
        UnaryOp::OnesComplement,
        UnaryOp::Convert,
        UnaryOp::ConvertChecked,
        UnaryOp::TypeAs,
        UnaryOp::ArrayLength,
    ];

    /// The unchecked counterpart of a checked operator.
    pub fn unchecked(self) -> Option<UnaryOp> {
        match self {
            UnaryOp::NegateChecked => Some(UnaryOp::Negate),
            UnaryOp::ConvertChecked => Some(UnaryOp::Convert),
            _ => None,
        }
    }

    pub fn is_conversion(self) -> bool {
        matches!(
            self,
            UnaryOp::Convert | UnaryOp::ConvertChecked | UnaryOp::TypeAs
        )
    }
}

/// Binary operator subkinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    AddChecked,
    Subtract,
    SubtractChecked,
    Multiply,
    MultiplyChecked,
    Divide,
    Modulo,
    Power,
    And,
    Or,
    ExclusiveOr,
    LeftShift,
    RightShift,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AndAlso,
    OrElse,
    Coalesce,
}

/// Dispatch family of a binary operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryFamily {
    Arithmetic,
    Bitwise,
    Comparison,
    ShortCircuit,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 23] = [
        BinaryOp::Add,
        BinaryOp::AddChecked,
        BinaryOp::Subtract,
        BinaryOp::SubtractChecked,
        BinaryOp::Multiply,
        BinaryOp::MultiplyChecked,
        BinaryOp::Divide,
        BinaryOp::Modulo,
        BinaryOp::Power,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::ExclusiveOr,
        BinaryOp::LeftShift,
        BinaryOp::RightShift,
        BinaryOp::Equal,
        BinaryOp::NotEqual,
        BinaryOp::LessThan,
        BinaryOp::LessThanOrEqual,
        BinaryOp::GreaterThan,
        BinaryOp::GreaterThanOrEqual,
        BinaryOp::AndAlso,
        BinaryOp::OrElse,
        BinaryOp::Coalesce,
    ];

    pub fn family(self) -> BinaryFamily {
        match self {
            BinaryOp::Add
            | BinaryOp::AddChecked
            | BinaryOp::Subtract
            | BinaryOp::SubtractChecked
            | BinaryOp::Multiply
            | BinaryOp::MultiplyChecked
            | BinaryOp::Divide
            | BinaryOp::Modulo
            | BinaryOp::Power => BinaryFamily::Arithmetic,
            BinaryOp::And
            | BinaryOp::Or
            | BinaryOp::ExclusiveOr
            | BinaryOp::LeftShift
            | BinaryOp::RightShift => BinaryFamily::Bitwise,
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual => BinaryFamily::Comparison,
            BinaryOp::AndAlso | BinaryOp::OrElse | BinaryOp::Coalesce => {
                BinaryFamily::ShortCircuit
            }
        }
    }

    /// The unchecked counterpart of a checked operator.
    pub fn unchecked(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::AddChecked => Some(BinaryOp::Add),
            BinaryOp::SubtractChecked => Some(BinaryOp::Subtract),
            BinaryOp::MultiplyChecked => Some(BinaryOp::Multiply),
            _ => None,
        }
    }

    pub fn is_checked(self) -> bool {
        self.unchecked().is_some()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add | BinaryOp::AddChecked => "+",
            BinaryOp::Subtract | BinaryOp::SubtractChecked => "-",
            BinaryOp::Multiply | BinaryOp::MultiplyChecked => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Power => "**",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::ExclusiveOr => "^",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::Coalesce => "??",
        }
    }
}

/// Assignment subkinds.
///
/// Increment/decrement variants have no value operand (`NodeId::INVALID`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
    PreIncrement,
    PostIncrement,
    PreDecrement,
    PostDecrement,
}

impl AssignOp {
    pub const ALL: [AssignOp; 10] = [
        AssignOp::Assign,
        AssignOp::AddAssign,
        AssignOp::SubtractAssign,
        AssignOp::MultiplyAssign,
        AssignOp::DivideAssign,
        AssignOp::ModuloAssign,
        AssignOp::PreIncrement,
        AssignOp::PostIncrement,
        AssignOp::PreDecrement,
        AssignOp::PostDecrement,
    ];

    /// The arithmetic operator a compound assignment applies.
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign | AssignOp::PreIncrement | AssignOp::PostIncrement => {
                Some(BinaryOp::Add)
            }
            AssignOp::SubtractAssign | AssignOp::PreDecrement | AssignOp::PostDecrement => {
                Some(BinaryOp::Subtract)
            }
            AssignOp::MultiplyAssign => Some(BinaryOp::Multiply),
            AssignOp::DivideAssign => Some(BinaryOp::Divide),
            AssignOp::ModuloAssign => Some(BinaryOp::Modulo),
        }
    }

    pub fn has_value(self) -> bool {
        !self.is_increment()
    }

    pub fn is_increment(self) -> bool {
        matches!(
            self,
            AssignOp::PreIncrement
                | AssignOp::PostIncrement
                | AssignOp::PreDecrement
                | AssignOp::PostDecrement
        )
    }
}

/// Flavor of a jump, kept for diagnostics; all jump to a label.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GotoKind {
    Goto,
    Break,
    Continue,
    Return,
}

/// A declared variable: block local, lambda parameter or range variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: Name,
    pub ty: TypeId,
}

/// A jump target. `ty` is the type of the value carried by jumps to it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LabelTarget {
    pub name: Name,
    pub ty: TypeId,
}

/// One `catch` handler of a [`Node::Try`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CatchBlock {
    /// Exception type caught.
    pub ty: TypeId,
    /// Variable bound to the caught value (`VarId::INVALID` for none).
    pub variable: VarId,
    /// Optional boolean filter (`NodeId::INVALID` for none).
    pub filter: NodeId,
    pub body: NodeId,
}

/// A primitive node, or a reference to an extension payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Constant(ConstValue),
    /// The default value of the node's type.
    Default,
    /// Placeholder reading a variable.
    Parameter(VarId),
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Conditional {
        test: NodeId,
        if_true: NodeId,
        if_false: NodeId,
    },
    Block {
        variables: VarRange,
        exprs: NodeRange,
    },
    Assign {
        op: AssignOp,
        target: NodeId,
        value: NodeId,
    },
    /// Infinite loop exited through `break_label`; `continue_label` restarts the body.
    Loop {
        body: NodeId,
        break_label: LabelId,
        continue_label: LabelId,
    },
    /// Marks a jump target inside a block. Evaluates to `default_value` on fallthrough.
    Label {
        target: LabelId,
        default_value: NodeId,
    },
    Goto {
        kind: GotoKind,
        target: LabelId,
        value: NodeId,
    },
    /// Method call. `receiver` is `NodeId::INVALID` for static runtime calls.
    Call {
        receiver: NodeId,
        method: Name,
        args: NodeRange,
    },
    Invoke {
        callee: NodeId,
        args: NodeRange,
    },
    Lambda {
        params: VarRange,
        body: NodeId,
    },
    Member {
        receiver: NodeId,
        member: Name,
    },
    Index {
        receiver: NodeId,
        args: NodeRange,
    },
    /// Object creation; the type being created is the node's type.
    New {
        args: NodeRange,
    },
    NewArray {
        elements: NodeRange,
    },
    TypeIs {
        operand: NodeId,
        target: TypeId,
    },
    Try {
        body: NodeId,
        handlers: CatchRange,
        finally: NodeId,
        fault: NodeId,
    },
    /// `value` is `NodeId::INVALID` for a rethrow.
    Throw {
        value: NodeId,
    },
    Extension(ExtId),
}

/// Closed discriminator over every node shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeTag {
    Constant,
    Default,
    Parameter,
    Unary(UnaryOp),
    Binary(BinaryOp),
    Conditional,
    Block,
    Assign(AssignOp),
    Loop,
    Label,
    Goto,
    Call,
    Invoke,
    Lambda,
    Member,
    Index,
    New,
    NewArray,
    TypeIs,
    Try,
    Throw,
    Extension,
}

impl NodeTag {
    /// Every tag, operator subkinds expanded.
    pub fn all() -> Vec<NodeTag> {
        let mut tags = vec![NodeTag::Constant, NodeTag::Default, NodeTag::Parameter];
        tags.extend(UnaryOp::ALL.into_iter().map(NodeTag::Unary));
        tags.extend(BinaryOp::ALL.into_iter().map(NodeTag::Binary));
        tags.push(NodeTag::Conditional);
        tags.push(NodeTag::Block);
        tags.extend(AssignOp::ALL.into_iter().map(NodeTag::Assign));
        tags.extend([
            NodeTag::Loop,
            NodeTag::Label,
            NodeTag::Goto,
            NodeTag::Call,
            NodeTag::Invoke,
            NodeTag::Lambda,
            NodeTag::Member,
            NodeTag::Index,
            NodeTag::New,
            NodeTag::NewArray,
            NodeTag::TypeIs,
            NodeTag::Try,
            NodeTag::Throw,
            NodeTag::Extension,
        ]);
        tags
    }
}

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTag::Unary(op) => write!(f, "Unary::{op:?}"),
            NodeTag::Binary(op) => write!(f, "Binary::{op:?}"),
            NodeTag::Assign(op) => write!(f, "Assign::{op:?}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl Node {
    pub fn tag(&self) -> NodeTag {
        match self {
            Node::Constant(_) => NodeTag::Constant,
            Node::Default => NodeTag::Default,
            Node::Parameter(_) => NodeTag::Parameter,
            Node::Unary { op, .. } => NodeTag::Unary(*op),
            Node::Binary { op, .. } => NodeTag::Binary(*op),
            Node::Conditional { .. } => NodeTag::Conditional,
            Node::Block { .. } => NodeTag::Block,
            Node::Assign { op, .. } => NodeTag::Assign(*op),
            Node::Loop { .. } => NodeTag::Loop,
            Node::Label { .. } => NodeTag::Label,
            Node::Goto { .. } => NodeTag::Goto,
            Node::Call { .. } => NodeTag::Call,
            Node::Invoke { .. } => NodeTag::Invoke,
            Node::Lambda { .. } => NodeTag::Lambda,
            Node::Member { .. } => NodeTag::Member,
            Node::Index { .. } => NodeTag::Index,
            Node::New { .. } => NodeTag::New,
            Node::NewArray { .. } => NodeTag::NewArray,
            Node::TypeIs { .. } => NodeTag::TypeIs,
            Node::Try { .. } => NodeTag::Try,
            Node::Throw { .. } => NodeTag::Throw,
            Node::Extension(_) => NodeTag::Extension,
        }
    }

    /// Only extension nodes reduce; every other kind is primitive.
    #[inline]
    pub fn can_reduce(&self) -> bool {
        matches!(self, Node::Extension(_))
    }
}
