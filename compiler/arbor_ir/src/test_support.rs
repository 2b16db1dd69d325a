//! Tree generators shared by the property tests.

use proptest::prelude::*;

use crate::{BinaryOp, NodeArena, NodeId, TypeId, UnaryOp};

/// Shape of an integer-typed tree, built into an arena by [`build`].
#[derive(Clone, Debug)]
pub(crate) enum Shape {
    Leaf(i64),
    Var,
    Add(Box<Shape>, Box<Shape>),
    Neg(Box<Shape>),
    /// `if (test < 0) a else b`
    If(Box<Shape>, Box<Shape>, Box<Shape>),
    Block(Vec<Shape>),
    /// `(a, b).item1`, an extension node under a primitive one.
    Pair(Box<Shape>, Box<Shape>),
}

pub(crate) fn shape_strategy() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        any::<i8>().prop_map(|n| Shape::Leaf(i64::from(n))),
        Just(Shape::Var),
    ];
    leaf.prop_recursive(4, 48, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Shape::Add(Box::new(a), Box::new(b))),
            inner.clone().prop_map(|a| Shape::Neg(Box::new(a))),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(t, a, b)| Shape::If(Box::new(t), Box::new(a), Box::new(b))),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Shape::Block),
            (inner.clone(), inner).prop_map(|(a, b)| Shape::Pair(Box::new(a), Box::new(b))),
        ]
    })
}

/// Build `shape` with `x` standing for [`Shape::Var`].
pub(crate) fn build(arena: &mut NodeArena, x: NodeId, shape: &Shape) -> NodeId {
    match shape {
        Shape::Leaf(n) => arena.int(*n),
        Shape::Var => x,
        Shape::Add(a, b) => {
            let a = build(arena, x, a);
            let b = build(arena, x, b);
            arena.binary(BinaryOp::Add, a, b).unwrap()
        }
        Shape::Neg(a) => {
            let a = build(arena, x, a);
            arena.unary(UnaryOp::Negate, a).unwrap()
        }
        Shape::If(t, a, b) => {
            let t = build(arena, x, t);
            let zero = arena.int(0);
            let test = arena.binary(BinaryOp::LessThan, t, zero).unwrap();
            let a = build(arena, x, a);
            let b = build(arena, x, b);
            arena.conditional(test, a, b, TypeId::INT).unwrap()
        }
        Shape::Block(items) => {
            let items: Vec<NodeId> = items.iter().map(|item| build(arena, x, item)).collect();
            arena.block(&[], &items).unwrap()
        }
        Shape::Pair(a, b) => {
            let a = build(arena, x, a);
            let b = build(arena, x, b);
            let tuple = arena.tuple(&[a, b]).unwrap();
            let item1 = arena.intern("item1");
            arena.field(tuple, item1).unwrap()
        }
    }
}

/// Every node reachable from `root`, each once, in pre-order.
pub(crate) fn reachable(arena: &NodeArena, root: NodeId) -> Vec<NodeId> {
    let mut seen = rustc_hash::FxHashSet::default();
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !id.is_valid() || !seen.insert(id) {
            continue;
        }
        out.push(id);
        stack.extend(arena.children(id).into_iter().rev());
    }
    out
}
