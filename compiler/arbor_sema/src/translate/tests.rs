use pretty_assertions::assert_eq;

use arbor_ir::validate::ensure_primitive;
use arbor_ir::{
    reduce_fully, BinaryOp, ConstValue, ErrorCategory, Extension, IrError, Node, NodeArena,
    NodeTag, TypeId, UnaryOp,
};
use arbor_query::Query;

use super::translate;
use crate::operation::{Operation, OperationKind, QueryClause, SymbolId, SymbolTable};

fn int(n: i64) -> Operation {
    Operation::new(OperationKind::Literal(ConstValue::Int(n)), TypeId::INT)
}

fn read(symbol: SymbolId, ty: TypeId) -> Operation {
    Operation::new(OperationKind::LocalReference(symbol), ty)
}

fn binary(op: BinaryOp, left: Operation, right: Operation, ty: TypeId) -> Operation {
    Operation::new(
        OperationKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        ty,
    )
}

fn block(locals: Vec<SymbolId>, statements: Vec<Operation>, ty: TypeId) -> Operation {
    Operation::new(OperationKind::Block { locals, statements }, ty)
}

fn assign(target: Operation, value: Operation) -> Operation {
    let ty = target.ty;
    Operation::new(
        OperationKind::Assignment {
            target: Box::new(target),
            value: Box::new(value),
        },
        ty,
    )
}

fn symbol(arena: &NodeArena, table: &mut SymbolTable, name: &str, ty: TypeId) -> SymbolId {
    table.declare(arena.intern(name), ty)
}

fn unsupported_construct(err: &IrError) -> &str {
    match err {
        IrError::UnsupportedOperation { construct, .. } => construct,
        other => panic!("expected an unsupported operation, found {other}"),
    }
}

#[test]
fn block_locals_are_bound_inside_the_block() {
    let mut arena = NodeArena::new();
    let mut table = SymbolTable::new();
    let x = symbol(&arena, &mut table, "x", TypeId::INT);
    let root = block(
        vec![x],
        vec![
            assign(read(x, TypeId::INT), int(1)),
            binary(BinaryOp::Add, read(x, TypeId::INT), int(2), TypeId::INT),
        ],
        TypeId::INT,
    );

    let id = translate(&mut arena, &table, &root).unwrap();
    let Node::Block { variables, exprs } = *arena.node(id) else {
        panic!("expected a block, found {}", arena.tag(id));
    };
    let var = arena.get_vars(variables)[0];
    assert_eq!(arena.name_str(arena.variable(var).name), "x");
    let exprs = arena.get_list(exprs).to_vec();
    let Node::Binary { left, .. } = *arena.node(exprs[1]) else {
        panic!("expected a sum");
    };
    assert_eq!(*arena.node(left), Node::Parameter(var));
    assert_eq!(arena.ty(id), TypeId::INT);
}

#[test]
fn inner_blocks_shadow_outer_locals() {
    let mut arena = NodeArena::new();
    let mut table = SymbolTable::new();
    let x = symbol(&arena, &mut table, "x", TypeId::INT);
    let inner = block(vec![x], vec![read(x, TypeId::INT)], TypeId::INT);
    let root = block(vec![x], vec![read(x, TypeId::INT), inner], TypeId::INT);

    let id = translate(&mut arena, &table, &root).unwrap();
    let outer_exprs = arena.children(id);
    let inner_exprs = arena.children(outer_exprs[1]);
    assert_ne!(arena.node(outer_exprs[0]), arena.node(inner_exprs[0]));
}

#[test]
fn unbound_symbols_fail_lookup() {
    let mut arena = NodeArena::new();
    let mut table = SymbolTable::new();
    let ghost = symbol(&arena, &mut table, "ghost", TypeId::INT);
    let err = translate(&mut arena, &table, &read(ghost, TypeId::INT)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Lookup);
}

#[test]
fn constructs_without_a_tree_form_are_unsupported() {
    let mut arena = NodeArena::new();
    let mut table = SymbolTable::new();
    let p = symbol(&arena, &mut table, "p", TypeId::INT);

    let address = Operation::new(OperationKind::AddressOf(Box::new(int(1))), TypeId::INT);
    let fixed = Operation::stmt(OperationKind::Fixed {
        local: p,
        pointer: Box::new(int(0)),
        body: Box::new(Operation::stmt(OperationKind::DefaultValue)),
    });
    let invalid = Operation::stmt(OperationKind::Invalid("unbound call".to_owned()));

    for (op, construct) in [
        (address, "address-of"),
        (fixed, "fixed"),
        (invalid, "invalid operation"),
        (Operation::stmt(OperationKind::Break), "break"),
        (Operation::stmt(OperationKind::Continue), "continue"),
    ] {
        let err = translate(&mut arena, &table, &op).unwrap_err();
        assert_eq!(unsupported_construct(&err), construct);
        assert_eq!(err.category(), ErrorCategory::Unsupported);
    }
}

#[test]
fn break_targets_the_innermost_loop() {
    let mut arena = NodeArena::new();
    let table = SymbolTable::new();
    let truth = Operation::new(OperationKind::Literal(ConstValue::Bool(true)), TypeId::BOOL);
    let body = block(
        Vec::new(),
        vec![Operation::stmt(OperationKind::Break)],
        TypeId::UNIT,
    );
    let root = Operation::stmt(OperationKind::While {
        test: Box::new(truth),
        body: Box::new(body),
    });

    let id = translate(&mut arena, &table, &root).unwrap();
    let Some(Extension::While(w)) = arena.extension_of(id).cloned() else {
        panic!("expected a while loop");
    };
    let jump = arena.children(w.body)[0];
    let Node::Goto { target, .. } = *arena.node(jump) else {
        panic!("expected a jump, found {}", arena.tag(jump));
    };
    assert_eq!(target, w.break_label);
}

#[test]
fn loops_do_not_leak_into_lambdas() {
    let mut arena = NodeArena::new();
    let table = SymbolTable::new();
    let breaking = Operation::new(
        OperationKind::Lambda {
            params: Vec::new(),
            body: Box::new(Operation::stmt(OperationKind::Break)),
        },
        TypeId::OBJECT,
    );
    let truth = Operation::new(OperationKind::Literal(ConstValue::Bool(true)), TypeId::BOOL);
    let root = Operation::stmt(OperationKind::While {
        test: Box::new(truth),
        body: Box::new(breaking),
    });
    let err = translate(&mut arena, &table, &root).unwrap_err();
    assert_eq!(unsupported_construct(&err), "break");
}

#[test]
fn return_jumps_to_the_end_of_the_lambda() {
    let mut arena = NodeArena::new();
    let mut table = SymbolTable::new();
    let n = symbol(&arena, &mut table, "n", TypeId::INT);
    let early = Operation::stmt(OperationKind::Return(Some(Box::new(read(n, TypeId::INT)))));
    let body = block(Vec::new(), vec![early, int(0)], TypeId::INT);
    let root = Operation::new(
        OperationKind::Lambda {
            params: vec![n],
            body: Box::new(body),
        },
        TypeId::OBJECT,
    );

    let id = translate(&mut arena, &table, &root).unwrap();
    let Node::Lambda { body, .. } = *arena.node(id) else {
        panic!("expected a lambda");
    };
    let Node::Label { target, .. } = *arena.node(body) else {
        panic!("expected the return label, found {}", arena.tag(body));
    };
    assert_eq!(arena.label(target).ty, TypeId::INT);
    let function = arena.pool_mut().function(&[TypeId::INT], TypeId::INT);
    assert_eq!(arena.ty(id), function);
}

#[test]
fn conversions_pick_their_operator() {
    let mut arena = NodeArena::new();
    let table = SymbolTable::new();
    let checked = Operation::new(
        OperationKind::Conversion {
            operand: Box::new(int(3)),
            checked: true,
            try_cast: false,
        },
        TypeId::FLOAT,
    );
    let id = translate(&mut arena, &table, &checked).unwrap();
    assert_eq!(arena.tag(id), NodeTag::Unary(UnaryOp::ConvertChecked));
    assert_eq!(arena.ty(id), TypeId::FLOAT);
}

#[test]
fn query_range_variables_scope_over_later_clauses() {
    let mut arena = NodeArena::new();
    let mut table = SymbolTable::new();
    let x = symbol(&arena, &mut table, "x", TypeId::INT);
    let source = Operation::new(
        OperationKind::ArrayCreation {
            element: TypeId::INT,
            elements: (1..=4).map(int).collect(),
        },
        TypeId::OBJECT,
    );
    let even = binary(
        BinaryOp::Equal,
        binary(BinaryOp::Modulo, read(x, TypeId::INT), int(2), TypeId::INT),
        int(0),
        TypeId::BOOL,
    );
    let root = Operation::new(
        OperationKind::Query(vec![
            QueryClause::From { local: x, source },
            QueryClause::Where(even),
            QueryClause::Select(binary(
                BinaryOp::Multiply,
                read(x, TypeId::INT),
                int(10),
                TypeId::INT,
            )),
        ]),
        TypeId::OBJECT,
    );

    let id = translate(&mut arena, &table, &root).unwrap();
    let query = arena
        .extension_of(id)
        .and_then(|ext| ext.as_custom::<Query>())
        .unwrap();
    assert_eq!(query.clauses().len(), 3);

    let reduced = reduce_fully(&mut arena, id).unwrap();
    ensure_primitive(&arena, reduced).unwrap();
}

#[test]
fn query_symbols_are_not_visible_before_their_clause() {
    let mut arena = NodeArena::new();
    let mut table = SymbolTable::new();
    let x = symbol(&arena, &mut table, "x", TypeId::INT);
    let y = symbol(&arena, &mut table, "y", TypeId::INT);
    let source = Operation::new(
        OperationKind::ArrayCreation {
            element: TypeId::INT,
            elements: vec![int(1)],
        },
        TypeId::OBJECT,
    );
    let root = Operation::new(
        OperationKind::Query(vec![
            QueryClause::From { local: x, source },
            QueryClause::Where(binary(
                BinaryOp::Equal,
                read(y, TypeId::INT),
                int(1),
                TypeId::BOOL,
            )),
            QueryClause::Let {
                local: y,
                value: int(1),
            },
            QueryClause::Select(read(x, TypeId::INT)),
        ]),
        TypeId::OBJECT,
    );
    let err = translate(&mut arena, &table, &root).unwrap_err();
    assert!(matches!(err, IrError::BindingNotFound { .. }), "{err}");
}

fn ints(values: &[i64]) -> Operation {
    Operation::new(
        OperationKind::ArrayCreation {
            element: TypeId::INT,
            elements: values.iter().copied().map(int).collect(),
        },
        TypeId::OBJECT,
    )
}

#[test]
fn join_inner_keys_see_only_the_joined_variable() {
    let mut arena = NodeArena::new();
    let mut table = SymbolTable::new();
    let a = symbol(&arena, &mut table, "a", TypeId::INT);
    let b = symbol(&arena, &mut table, "b", TypeId::INT);
    let g = symbol(&arena, &mut table, "g", TypeId::OBJECT);
    let joins = [
        QueryClause::Join {
            local: b,
            source: ints(&[2, 3]),
            outer_key: read(a, TypeId::INT),
            inner_key: read(a, TypeId::INT),
        },
        QueryClause::GroupJoin {
            local: b,
            source: ints(&[2, 3]),
            outer_key: read(a, TypeId::INT),
            inner_key: read(a, TypeId::INT),
            into: g,
        },
    ];
    for join in joins {
        let root = Operation::new(
            OperationKind::Query(vec![
                QueryClause::From {
                    local: a,
                    source: ints(&[1, 2]),
                },
                join,
                QueryClause::Select(read(a, TypeId::INT)),
            ]),
            TypeId::OBJECT,
        );
        let err = translate(&mut arena, &table, &root).unwrap_err();
        assert!(matches!(err, IrError::BindingNotFound { .. }), "{err}");
    }
}

#[test]
fn joined_variables_scope_over_later_clauses() {
    let mut arena = NodeArena::new();
    let mut table = SymbolTable::new();
    let a = symbol(&arena, &mut table, "a", TypeId::INT);
    let b = symbol(&arena, &mut table, "b", TypeId::INT);
    let root = Operation::new(
        OperationKind::Query(vec![
            QueryClause::From {
                local: a,
                source: ints(&[1, 2]),
            },
            QueryClause::Join {
                local: b,
                source: ints(&[2, 3]),
                outer_key: read(a, TypeId::INT),
                inner_key: read(b, TypeId::INT),
            },
            QueryClause::Select(binary(
                BinaryOp::Add,
                read(a, TypeId::INT),
                read(b, TypeId::INT),
                TypeId::INT,
            )),
        ]),
        TypeId::OBJECT,
    );
    let id = translate(&mut arena, &table, &root).unwrap();
    let reduced = reduce_fully(&mut arena, id).unwrap();
    assert!(ensure_primitive(&arena, reduced).is_ok());
}
