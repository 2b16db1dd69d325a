//! The host compiler's typed operation tree, as consumed by the translator.
//!
//! Every operation carries its resolved type. Symbols (locals, parameters,
//! range variables) are opaque [`SymbolId`]s resolved through a
//! [`TypeResolver`]; member and method names are interned in the arena the
//! tree is translated into.

use arbor_ir::{AssignOp, BinaryOp, ConstValue, Name, TypeId, UnaryOp};
use arbor_query::Direction;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub const fn new(index: u32) -> Self {
        SymbolId(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Symbol information the host resolved before translation.
pub trait TypeResolver {
    fn symbol_type(&self, symbol: SymbolId) -> Option<TypeId>;

    fn symbol_name(&self, symbol: SymbolId) -> Option<Name>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct SymbolEntry {
    name: Name,
    ty: TypeId,
}

/// A flat table of declared symbols, the simplest [`TypeResolver`].
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<SymbolEntry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: Name, ty: TypeId) -> SymbolId {
        let id = u32::try_from(self.symbols.len()).unwrap_or(u32::MAX);
        self.symbols.push(SymbolEntry { name, ty });
        SymbolId(id)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl TypeResolver for SymbolTable {
    fn symbol_type(&self, symbol: SymbolId) -> Option<TypeId> {
        self.symbols.get(symbol.index()).map(|s| s.ty)
    }

    fn symbol_name(&self, symbol: SymbolId) -> Option<Name> {
        self.symbols.get(symbol.index()).map(|s| s.name)
    }
}

/// A typed operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub ty: TypeId,
}

impl Operation {
    pub fn new(kind: OperationKind, ty: TypeId) -> Self {
        Operation { kind, ty }
    }

    /// Statement-form operation of type `unit`.
    pub fn stmt(kind: OperationKind) -> Self {
        Operation {
            kind,
            ty: TypeId::UNIT,
        }
    }
}

/// One `catch` clause of a [`OperationKind::Try`].
#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    pub ty: TypeId,
    pub local: Option<SymbolId>,
    pub filter: Option<Operation>,
    pub body: Operation,
}

/// One clause of a query expression.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryClause {
    From {
        local: SymbolId,
        source: Operation,
    },
    Let {
        local: SymbolId,
        value: Operation,
    },
    Where(Operation),
    Join {
        local: SymbolId,
        source: Operation,
        outer_key: Operation,
        inner_key: Operation,
    },
    GroupJoin {
        local: SymbolId,
        source: Operation,
        outer_key: Operation,
        inner_key: Operation,
        into: SymbolId,
    },
    OrderBy(Vec<(Operation, Direction)>),
    Select(Operation),
    GroupBy {
        key: Operation,
        element: Operation,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum OperationKind {
    Literal(ConstValue),
    DefaultValue,
    /// Read of a local, parameter or range variable.
    LocalReference(SymbolId),
    Unary {
        op: UnaryOp,
        operand: Box<Operation>,
    },
    /// Conversion to the operation's type.
    Conversion {
        operand: Box<Operation>,
        checked: bool,
        /// `as`-style conversion yielding null on failure.
        try_cast: bool,
    },
    Binary {
        op: BinaryOp,
        left: Box<Operation>,
        right: Box<Operation>,
    },
    Conditional {
        test: Box<Operation>,
        when_true: Box<Operation>,
        when_false: Option<Box<Operation>>,
    },
    Block {
        locals: Vec<SymbolId>,
        statements: Vec<Operation>,
    },
    Assignment {
        target: Box<Operation>,
        value: Box<Operation>,
    },
    CompoundAssignment {
        op: AssignOp,
        target: Box<Operation>,
        value: Box<Operation>,
    },
    Increment {
        op: AssignOp,
        target: Box<Operation>,
    },
    Call {
        receiver: Option<Box<Operation>>,
        method: Name,
        args: Vec<Operation>,
    },
    Invoke {
        callee: Box<Operation>,
        args: Vec<Operation>,
    },
    Lambda {
        params: Vec<SymbolId>,
        body: Box<Operation>,
    },
    MemberAccess {
        receiver: Box<Operation>,
        member: Name,
    },
    ElementAccess {
        receiver: Box<Operation>,
        index: Box<Operation>,
    },
    ObjectCreation {
        args: Vec<Operation>,
    },
    ArrayCreation {
        element: TypeId,
        elements: Vec<Operation>,
    },
    TypeTest {
        operand: Box<Operation>,
        target: TypeId,
    },
    /// `throw value`, or a rethrow without one.
    Throw(Option<Box<Operation>>),
    Try {
        body: Box<Operation>,
        catches: Vec<CatchClause>,
        finally: Option<Box<Operation>>,
    },
    Return(Option<Box<Operation>>),
    While {
        test: Box<Operation>,
        body: Box<Operation>,
    },
    DoWhile {
        body: Box<Operation>,
        test: Box<Operation>,
    },
    For {
        locals: Vec<SymbolId>,
        initializers: Vec<Operation>,
        test: Option<Box<Operation>>,
        steps: Vec<Operation>,
        body: Box<Operation>,
    },
    ForEach {
        local: SymbolId,
        collection: Box<Operation>,
        body: Box<Operation>,
    },
    Break,
    Continue,
    Using {
        local: Option<SymbolId>,
        resource: Box<Operation>,
        body: Box<Operation>,
    },
    Lock {
        lock: Box<Operation>,
        body: Box<Operation>,
    },
    Tuple(Vec<Operation>),
    Interpolation(Vec<Operation>),
    TypeOf(TypeId),
    Query(Vec<QueryClause>),
    AddressOf(Box<Operation>),
    Fixed {
        local: SymbolId,
        pointer: Box<Operation>,
        body: Box<Operation>,
    },
    /// A construct the host could not bind.
    Invalid(String),
}

impl OperationKind {
    /// Short description for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            OperationKind::Literal(_) => "literal",
            OperationKind::DefaultValue => "default value",
            OperationKind::LocalReference(_) => "local reference",
            OperationKind::Unary { .. } => "unary operator",
            OperationKind::Conversion { .. } => "conversion",
            OperationKind::Binary { .. } => "binary operator",
            OperationKind::Conditional { .. } => "conditional",
            OperationKind::Block { .. } => "block",
            OperationKind::Assignment { .. } => "assignment",
            OperationKind::CompoundAssignment { .. } => "compound assignment",
            OperationKind::Increment { .. } => "increment",
            OperationKind::Call { .. } => "call",
            OperationKind::Invoke { .. } => "invocation",
            OperationKind::Lambda { .. } => "lambda",
            OperationKind::MemberAccess { .. } => "member access",
            OperationKind::ElementAccess { .. } => "element access",
            OperationKind::ObjectCreation { .. } => "object creation",
            OperationKind::ArrayCreation { .. } => "array creation",
            OperationKind::TypeTest { .. } => "type test",
            OperationKind::Throw(_) => "throw",
            OperationKind::Try { .. } => "try",
            OperationKind::Return(_) => "return",
            OperationKind::While { .. } => "while",
            OperationKind::DoWhile { .. } => "do-while",
            OperationKind::For { .. } => "for",
            OperationKind::ForEach { .. } => "foreach",
            OperationKind::Break => "break",
            OperationKind::Continue => "continue",
            OperationKind::Using { .. } => "using",
            OperationKind::Lock { .. } => "lock",
            OperationKind::Tuple(_) => "tuple",
            OperationKind::Interpolation(_) => "interpolated string",
            OperationKind::TypeOf(_) => "typeof",
            OperationKind::Query(_) => "query",
            OperationKind::AddressOf(_) => "address-of",
            OperationKind::Fixed { .. } => "fixed",
            OperationKind::Invalid(_) => "invalid operation",
        }
    }
}
