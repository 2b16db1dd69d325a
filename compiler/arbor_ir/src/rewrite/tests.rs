use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::test_support::{build, shape_strategy};
use crate::validate::{ensure_primitive, is_primitive_tree};
use crate::{BinaryOp, ErrorCategory, IrError, LabelId, NodeTag, TypeId};

#[test]
fn primitive_trees_reduce_to_themselves() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let two = arena.int(2);
    let sum = arena.binary(BinaryOp::Add, one, two).unwrap();
    let len = arena.len();
    assert_eq!(reduce_fully(&mut arena, sum).unwrap(), sum);
    assert_eq!(arena.len(), len);
}

#[test]
fn nested_extensions_are_all_reduced() {
    let mut arena = NodeArena::new();
    let x = arena.local("x", TypeId::INT);
    let one = arena.int(1);
    let array = arena.new_array(TypeId::INT, &[one]).unwrap();
    let text = arena.string("v");
    let printed = arena.format(&[text]).unwrap();
    let inner = arena
        .for_each(x, array, printed, LabelId::INVALID, LabelId::INVALID)
        .unwrap();
    let test = arena.boolean(false);
    let outer = arena
        .while_loop(test, inner, LabelId::INVALID, LabelId::INVALID)
        .unwrap();

    assert!(ensure_primitive(&arena, outer).is_err());
    let reduced = reduce_fully(&mut arena, outer).unwrap();
    ensure_primitive(&arena, reduced).unwrap();
    assert_eq!(arena.ty(reduced), arena.ty(outer));
}

#[test]
fn shared_subtrees_reduce_once() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let two = arena.int(2);
    let pair = arena.tuple(&[one, two]).unwrap();
    let item1 = arena.intern("item1");
    let item2 = arena.intern("item2");
    let first = arena.field(pair, item1).unwrap();
    let second = arena.field(pair, item2).unwrap();
    let both = arena.binary(BinaryOp::Add, first, second).unwrap();

    let reduced = reduce_fully(&mut arena, both).unwrap();
    let Node::Binary { left, right, .. } = *arena.node(reduced) else {
        panic!("expected a binary node");
    };
    let (Node::Member { receiver: a, .. }, Node::Member { receiver: b, .. }) =
        (*arena.node(left), *arena.node(right))
    else {
        panic!("expected member reads");
    };
    assert_eq!(a, b);
    assert_eq!(arena.tag(a), NodeTag::New);
}

#[test]
fn unassigned_slots_fail_full_reduction() {
    let mut arena = NodeArena::new();
    let (_, hole) = arena.slot(TypeId::INT, NodeId::INVALID).unwrap();
    let one = arena.int(1);
    let sum = arena.binary(BinaryOp::Add, hole, one).unwrap();
    let err = reduce_fully(&mut arena, sum).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Invariant);
}

#[test]
fn ensure_primitive_names_the_offending_kind() {
    let mut arena = NodeArena::new();
    let test = arena.boolean(true);
    let body = arena.empty();
    let looped = arena
        .while_loop(test, body, LabelId::INVALID, LabelId::INVALID)
        .unwrap();
    let wrapped = arena.block(&[], &[looped]).unwrap();
    let err = ensure_primitive(&arena, wrapped).unwrap_err();
    let IrError::Unsupported { node, tag, .. } = &err else {
        panic!("unexpected error {err}");
    };
    assert_eq!((*node, *tag), (looped, NodeTag::Extension));
    assert!(err.to_string().contains("while"), "{err}");
}

#[test]
fn substitution_replaces_variable_reads() {
    let mut arena = NodeArena::new();
    let x = arena.local("x", TypeId::INT);
    let y = arena.local("y", TypeId::INT);
    let x_ref = arena.parameter(x);
    let y_ref = arena.parameter(y);
    let one = arena.int(1);
    let untouched = arena.binary(BinaryOp::Add, y_ref, one).unwrap();
    let touched = arena.binary(BinaryOp::Add, x_ref, one).unwrap();
    let root = arena.binary(BinaryOp::Multiply, touched, untouched).unwrap();

    let five = arena.int(5);
    let mut subst = Substitution::new();
    subst.replace_var(x, five);
    let result = subst.apply(&mut arena, root).unwrap();

    assert_ne!(result, root);
    let children = arena.children(result);
    assert_eq!(children[1], untouched);
    assert_eq!(arena.children(children[0]).as_slice(), &[five, one]);
}

#[test]
fn substitution_prefers_member_paths() {
    let mut arena = NodeArena::new();
    let pair_ty = arena.pool_mut().tuple(&[TypeId::INT, TypeId::INT]);
    let t = arena.local("t", pair_ty);
    let t_ref = arena.parameter(t);
    let item1 = arena.intern("item1");
    let item2 = arena.intern("item2");
    let first = arena.field(t_ref, item1).unwrap();
    let second = arena.field(t_ref, item2).unwrap();
    let sum = arena.binary(BinaryOp::Add, first, second).unwrap();

    assert_eq!(member_path(&arena, first), Some((t, vec![item1])));
    assert_eq!(member_path(&arena, sum), None);

    let ten = arena.int(10);
    let one = arena.int(1);
    let two = arena.int(2);
    let other = arena.tuple(&[one, two]).unwrap();
    let mut subst = Substitution::new();
    subst.replace_path(t, &[item1], ten).replace_var(t, other);
    let result = subst.apply(&mut arena, sum).unwrap();

    let Node::Binary { left, right, .. } = *arena.node(result) else {
        panic!("expected a binary node");
    };
    assert_eq!(left, ten);
    assert!(matches!(*arena.node(right), Node::Member { receiver, .. } if receiver == other));
}

#[test]
fn empty_substitution_is_identity() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let mut subst = Substitution::default();
    assert!(subst.is_empty());
    assert_eq!(subst.apply(&mut arena, one).unwrap(), one);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    /// Full reduction leaves no extension node and is idempotent.
    #[test]
    fn prop_reduce_fully_reaches_fixed_point(shape in shape_strategy()) {
        let mut arena = NodeArena::new();
        let x = arena.local("x", TypeId::INT);
        let x_ref = arena.parameter(x);
        let root = build(&mut arena, x_ref, &shape);

        let reduced = reduce_fully(&mut arena, root).unwrap();
        prop_assert!(is_primitive_tree(&arena, reduced));
        prop_assert_eq!(arena.ty(reduced), arena.ty(root));
        prop_assert_eq!(reduce_fully(&mut arena, reduced).unwrap(), reduced);
    }

    /// Substituting the variable of a tree without it changes nothing.
    #[test]
    fn prop_substitution_of_absent_var_is_identity(shape in shape_strategy()) {
        let mut arena = NodeArena::new();
        let x = arena.local("x", TypeId::INT);
        let absent = arena.local("absent", TypeId::INT);
        let x_ref = arena.parameter(x);
        let root = build(&mut arena, x_ref, &shape);
        let zero = arena.int(0);
        let mut subst = Substitution::new();
        subst.replace_var(absent, zero);
        prop_assert_eq!(subst.apply(&mut arena, root).unwrap(), root);
    }
}
