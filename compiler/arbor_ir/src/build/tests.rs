use pretty_assertions::assert_eq;

use crate::types::Member;
use crate::{
    AssignOp, BinaryOp, CatchBlock, ConstValue, ErrorCategory, IrError, LabelId, NodeArena,
    NodeId, NodeTag, TypeId, UnaryOp, VarId,
};

fn int_var(arena: &mut NodeArena, name: &str) -> (VarId, NodeId) {
    let var = arena.local(name, TypeId::INT);
    let node = arena.parameter(var);
    (var, node)
}

#[test]
fn constants_carry_their_type() {
    let mut arena = NodeArena::new();
    let cases = [
        (ConstValue::Unit, TypeId::UNIT),
        (ConstValue::Bool(true), TypeId::BOOL),
        (ConstValue::Int(7), TypeId::INT),
        (ConstValue::float(1.5), TypeId::FLOAT),
        (ConstValue::Null, TypeId::OBJECT),
        (ConstValue::Type(TypeId::STR), TypeId::TYPE),
    ];
    for (value, ty) in cases {
        let id = arena.constant(value);
        assert_eq!(arena.ty(id), ty, "{value:?}");
        assert!(!arena.can_reduce(id));
    }
}

#[test]
fn parameter_placeholders_are_shared() {
    let mut arena = NodeArena::new();
    let var = arena.local("x", TypeId::INT);
    assert_eq!(arena.parameter(var), arena.parameter(var));
    let other = arena.local("x", TypeId::INT);
    assert_ne!(arena.parameter(var), arena.parameter(other));
}

#[test]
fn binary_result_types() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let two = arena.int(2);
    let yes = arena.boolean(true);

    let sum = arena.binary(BinaryOp::Add, one, two).unwrap();
    assert_eq!(arena.ty(sum), TypeId::INT);
    let less = arena.binary(BinaryOp::LessThan, one, two).unwrap();
    assert_eq!(arena.ty(less), TypeId::BOOL);
    let both = arena.binary(BinaryOp::AndAlso, less, yes).unwrap();
    assert_eq!(arena.ty(both), TypeId::BOOL);

    let a = arena.string("a");
    let b = arena.string("b");
    let joined = arena.binary(BinaryOp::Add, a, b).unwrap();
    assert_eq!(arena.ty(joined), TypeId::STR);
}

#[test]
fn binary_rejects_mismatched_operands() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let yes = arena.boolean(true);
    let err = arena.binary(BinaryOp::Add, one, yes).unwrap_err();
    assert!(matches!(err, IrError::TypeMismatch { param: "right", .. }), "{err}");
    assert_eq!(err.category(), ErrorCategory::Validation);

    let err = arena.binary(BinaryOp::OrElse, one, yes).unwrap_err();
    assert!(matches!(err, IrError::TypeMismatch { param: "left", .. }), "{err}");
}

#[test]
fn factories_reject_unallocated_ids() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let err = arena.binary(BinaryOp::Add, one, NodeId::new(99)).unwrap_err();
    assert!(matches!(err, IrError::InvalidArgument { param: "right", .. }));
    let err = arena.unary(UnaryOp::Negate, NodeId::INVALID).unwrap_err();
    assert!(matches!(err, IrError::InvalidArgument { param: "operand", .. }));
}

#[test]
fn conversions_need_the_convert_factory() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    assert!(arena.unary(UnaryOp::Convert, one).is_err());
    let as_float = arena.convert(UnaryOp::ConvertChecked, one, TypeId::FLOAT).unwrap();
    assert_eq!(arena.ty(as_float), TypeId::FLOAT);
    let text = arena.string("x");
    assert!(arena.convert(UnaryOp::Convert, text, TypeId::INT).is_err());
}

#[test]
fn valued_conditional_needs_both_branches() {
    let mut arena = NodeArena::new();
    let test = arena.boolean(true);
    let one = arena.int(1);
    let err = arena
        .conditional(test, one, NodeId::INVALID, TypeId::INT)
        .unwrap_err();
    assert!(matches!(err, IrError::InvalidArgument { param: "if_false", .. }));

    let stmt = arena.if_then(test, one, NodeId::INVALID).unwrap();
    assert_eq!(arena.ty(stmt), TypeId::UNIT);
    assert_eq!(arena.children(stmt).len(), 3);
}

#[test]
fn conditional_test_must_be_bool() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let two = arena.int(2);
    let err = arena.conditional(one, one, two, TypeId::INT).unwrap_err();
    assert!(matches!(err, IrError::TypeMismatch { param: "test", .. }));
}

#[test]
fn block_type_is_last_expression() {
    let mut arena = NodeArena::new();
    let (x, x_ref) = int_var(&mut arena, "x");
    let five = arena.int(5);
    let store = arena.assign(x_ref, five).unwrap();
    let block = arena.block(&[x], &[store, x_ref]).unwrap();
    assert_eq!(arena.ty(block), TypeId::INT);

    let empty = arena.block(&[], &[]).unwrap();
    assert_eq!(arena.ty(empty), TypeId::UNIT);
    assert!(arena.block_typed(TypeId::INT, &[], &[]).is_err());
}

#[test]
fn assignment_targets_must_be_writable() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let two = arena.int(2);
    let err = arena.assign(one, two).unwrap_err();
    assert!(matches!(err, IrError::InvalidArgument { param: "target", .. }));

    let (_, x) = int_var(&mut arena, "x");
    let text = arena.string("s");
    let err = arena.assign(x, text).unwrap_err();
    assert!(matches!(err, IrError::TypeMismatch { param: "value", .. }));
}

#[test]
fn increments_and_compound_assignments() {
    let mut arena = NodeArena::new();
    let (_, x) = int_var(&mut arena, "x");
    let one = arena.int(1);
    let inc = arena.increment(AssignOp::PostIncrement, x).unwrap();
    assert_eq!(arena.tag(inc), NodeTag::Assign(AssignOp::PostIncrement));
    let add = arena.compound_assign(AssignOp::AddAssign, x, one).unwrap();
    assert_eq!(arena.ty(add), TypeId::INT);
    assert!(arena.increment(AssignOp::AddAssign, x).is_err());
    assert!(arena.compound_assign(AssignOp::PreIncrement, x, one).is_err());
}

#[test]
fn jumps_to_valued_labels_carry_values() {
    let mut arena = NodeArena::new();
    let ret = arena.declare_label("return", TypeId::INT);
    assert!(arena.return_to(ret, NodeId::INVALID).is_err());
    let one = arena.int(1);
    let jump = arena.return_to(ret, one).unwrap();
    assert_eq!(arena.ty(jump), TypeId::NEVER);
    assert!(arena.label_node(ret, NodeId::INVALID).is_err());
    assert!(arena.break_to(LabelId::new(42)).is_err());
}

#[test]
fn calls_on_named_types_are_checked() {
    let mut arena = NodeArena::new();
    let scale = arena.intern("scale");
    let counter_name = arena.intern("Counter");
    let counter = arena.pool_mut().declare_named(
        counter_name,
        vec![Member::method(scale, vec![TypeId::INT], TypeId::INT)],
        Vec::new(),
    );
    let c = arena.local("c", counter);
    let c_ref = arena.parameter(c);
    let two = arena.int(2);

    let ok = arena.call(c_ref, scale, &[two], TypeId::INT).unwrap();
    assert_eq!(arena.ty(ok), TypeId::INT);

    let err = arena.call(c_ref, scale, &[], TypeId::INT).unwrap_err();
    assert!(matches!(err, IrError::InvalidArgument { param: "args", .. }));

    let missing = arena.intern("missing");
    let err = arena.call(c_ref, missing, &[], TypeId::UNIT).unwrap_err();
    assert!(matches!(err, IrError::InvalidArgument { param: "method", .. }));
}

#[test]
fn lambda_and_invoke() {
    let mut arena = NodeArena::new();
    let (x, x_ref) = int_var(&mut arena, "x");
    let one = arena.int(1);
    let body = arena.binary(BinaryOp::Add, x_ref, one).unwrap();
    let lambda = arena.lambda(&[x], body).unwrap();
    let two = arena.int(2);
    let call = arena.invoke(lambda, &[two]).unwrap();
    assert_eq!(arena.ty(call), TypeId::INT);
    assert!(arena.invoke(lambda, &[]).is_err());
    assert!(arena.invoke(two, &[]).is_err());
}

#[test]
fn tuple_fields_and_creation() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let s = arena.string("s");
    let tuple = arena.tuple(&[one, s]).unwrap();
    assert!(arena.can_reduce(tuple));
    assert_eq!(arena.display_type(arena.ty(tuple)), "(int, str)");

    let item2 = arena.intern("item2");
    let field = arena.field(tuple, item2).unwrap();
    assert_eq!(arena.ty(field), TypeId::STR);

    let ty = arena.ty(tuple);
    assert!(arena.new_object(ty, &[one]).is_err());
    assert!(arena.tuple(&[]).is_err());
}

#[test]
fn foreach_requires_an_enumerable_collection() {
    let mut arena = NodeArena::new();
    let (x, _) = int_var(&mut arena, "x");
    let one = arena.int(1);
    let body = arena.empty();
    let err = arena
        .for_each(x, one, body, LabelId::INVALID, LabelId::INVALID)
        .unwrap_err();
    assert!(matches!(err, IrError::NotEnumerable { param: "collection", .. }));

    let text = arena.local("s", TypeId::STR);
    let array = arena.new_array(TypeId::INT, &[one]).unwrap();
    let err = arena
        .for_each(text, array, body, LabelId::INVALID, LabelId::INVALID)
        .unwrap_err();
    assert!(matches!(err, IrError::TypeMismatch { param: "variable", .. }));

    let ok = arena
        .for_each(x, array, body, LabelId::INVALID, LabelId::INVALID)
        .unwrap();
    assert_eq!(arena.extension_of(ok).map(|e| e.kind_name()), Some("foreach"));
}

#[test]
fn using_requires_a_disposable_resource() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let body = arena.empty();
    let err = arena.using_block(VarId::INVALID, one, body).unwrap_err();
    assert!(matches!(err, IrError::NotDisposable { param: "resource", .. }));
}

#[test]
fn try_needs_a_handler() {
    let mut arena = NodeArena::new();
    let body = arena.empty();
    assert!(arena.try_catch(body, &[], NodeId::INVALID, NodeId::INVALID).is_err());

    let handler_body = arena.empty();
    let handler = CatchBlock {
        ty: TypeId::EXCEPTION,
        variable: VarId::INVALID,
        filter: NodeId::INVALID,
        body: handler_body,
    };
    let guarded = arena
        .try_catch(body, &[handler], NodeId::INVALID, NodeId::INVALID)
        .unwrap();
    assert_eq!(arena.children(guarded).len(), 5);

    let bad = CatchBlock {
        ty: TypeId::INT,
        ..handler
    };
    assert!(arena
        .try_catch(body, &[bad], NodeId::INVALID, NodeId::INVALID)
        .is_err());
}

#[test]
fn throw_requires_an_exception() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    assert!(arena.throw(one).is_err());
    let message = arena.string("boom");
    let error = arena.new_object(TypeId::EXCEPTION, &[message]).unwrap();
    let thrown = arena.throw(error).unwrap();
    assert_eq!(arena.ty(thrown), TypeId::NEVER);
    assert!(arena.throw(NodeId::INVALID).is_ok());
}

#[test]
fn slot_rejects_cycles() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let (slot, wrapper) = arena.slot(TypeId::INT, one).unwrap();
    let plus = arena.binary(BinaryOp::Add, wrapper, one).unwrap();

    let err = arena.set_slot(slot, plus).unwrap_err();
    assert!(matches!(err, IrError::InvalidArgument { param: "target", .. }));
    assert_eq!(arena.slot_target(slot), one);

    let (other, other_wrapper) = arena.slot(TypeId::INT, plus).unwrap();
    let err = arena.set_slot(slot, other_wrapper).unwrap_err();
    assert!(matches!(err, IrError::InvalidArgument { .. }));
    assert_eq!(arena.slot_target(other), plus);
}

#[test]
fn foreign_slots_are_rejected() {
    let mut owner = NodeArena::new();
    let one = owner.int(1);
    owner.slot(TypeId::INT, one).unwrap();
    let (foreign, _) = owner.slot(TypeId::INT, one).unwrap();

    let mut arena = NodeArena::new();
    let two = arena.int(2);
    let err = arena.set_slot(foreign, two).unwrap_err();
    assert!(matches!(err, IrError::InvalidArgument { param: "slot", .. }));
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(arena.slot_target(foreign), NodeId::INVALID);
    assert_eq!(arena.slot_node(foreign), NodeId::INVALID);
}

#[test]
fn slot_target_type_is_checked() {
    let mut arena = NodeArena::new();
    let (slot, _) = arena.slot(TypeId::INT, NodeId::INVALID).unwrap();
    let text = arena.string("s");
    assert!(matches!(
        arena.set_slot(slot, text),
        Err(IrError::TypeMismatch { .. })
    ));
}
