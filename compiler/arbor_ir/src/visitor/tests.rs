use std::any::Any;

use pretty_assertions::assert_eq;

use super::*;
use crate::{ErrorCategory, NodeTag};

// Recording visitor

#[derive(Default)]
struct Recorder {
    seen: Vec<&'static str>,
}

impl Recorder {
    fn hit(&mut self, name: &'static str) -> IrResult<()> {
        self.seen.push(name);
        Ok(())
    }
}

impl Visitor for Recorder {
    type Output = ();

    fn visit_constant(&mut self, _: &mut NodeArena, _: NodeId, _: ConstValue) -> IrResult<()> {
        self.hit("constant")
    }
    fn visit_default(&mut self, _: &mut NodeArena, _: NodeId) -> IrResult<()> {
        self.hit("default")
    }
    fn visit_parameter(&mut self, _: &mut NodeArena, _: NodeId, _: VarId) -> IrResult<()> {
        self.hit("parameter")
    }
    fn visit_unary(&mut self, _: &mut NodeArena, _: NodeId, _: UnaryOp, _: NodeId) -> IrResult<()> {
        self.hit("unary")
    }
    fn visit_convert(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: UnaryOp,
        _: NodeId,
    ) -> IrResult<()> {
        self.hit("convert")
    }
    fn visit_array_length(&mut self, _: &mut NodeArena, _: NodeId, _: NodeId) -> IrResult<()> {
        self.hit("array_length")
    }
    fn visit_arithmetic(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: BinaryOp,
        _: NodeId,
        _: NodeId,
    ) -> IrResult<()> {
        self.hit("arithmetic")
    }
    fn visit_comparison(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: BinaryOp,
        _: NodeId,
        _: NodeId,
    ) -> IrResult<()> {
        self.hit("comparison")
    }
    fn visit_short_circuit(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: BinaryOp,
        _: NodeId,
        _: NodeId,
    ) -> IrResult<()> {
        self.hit("short_circuit")
    }
    fn visit_conditional(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: NodeId,
        _: NodeId,
        _: NodeId,
    ) -> IrResult<()> {
        self.hit("conditional")
    }
    fn visit_block(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: VarRange,
        _: NodeRange,
    ) -> IrResult<()> {
        self.hit("block")
    }
    fn visit_assign(&mut self, _: &mut NodeArena, _: NodeId, _: NodeId, _: NodeId) -> IrResult<()> {
        self.hit("assign")
    }
    fn visit_compound_assign(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: AssignOp,
        _: NodeId,
        _: NodeId,
    ) -> IrResult<()> {
        self.hit("compound_assign")
    }
    fn visit_increment(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: AssignOp,
        _: NodeId,
    ) -> IrResult<()> {
        self.hit("increment")
    }
    fn visit_loop(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: NodeId,
        _: LabelId,
        _: LabelId,
    ) -> IrResult<()> {
        self.hit("loop")
    }
    fn visit_label(&mut self, _: &mut NodeArena, _: NodeId, _: LabelId, _: NodeId) -> IrResult<()> {
        self.hit("label")
    }
    fn visit_goto(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: GotoKind,
        _: LabelId,
        _: NodeId,
    ) -> IrResult<()> {
        self.hit("goto")
    }
    fn visit_call(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: NodeId,
        _: Name,
        _: NodeRange,
    ) -> IrResult<()> {
        self.hit("call")
    }
    fn visit_invoke(&mut self, _: &mut NodeArena, _: NodeId, _: NodeId, _: NodeRange) -> IrResult<()> {
        self.hit("invoke")
    }
    fn visit_lambda(&mut self, _: &mut NodeArena, _: NodeId, _: VarRange, _: NodeId) -> IrResult<()> {
        self.hit("lambda")
    }
    fn visit_member(&mut self, _: &mut NodeArena, _: NodeId, _: NodeId, _: Name) -> IrResult<()> {
        self.hit("member")
    }
    fn visit_index(&mut self, _: &mut NodeArena, _: NodeId, _: NodeId, _: NodeRange) -> IrResult<()> {
        self.hit("index")
    }
    fn visit_new(&mut self, _: &mut NodeArena, _: NodeId, _: NodeRange) -> IrResult<()> {
        self.hit("new")
    }
    fn visit_new_array(&mut self, _: &mut NodeArena, _: NodeId, _: NodeRange) -> IrResult<()> {
        self.hit("new_array")
    }
    fn visit_type_is(&mut self, _: &mut NodeArena, _: NodeId, _: NodeId, _: TypeId) -> IrResult<()> {
        self.hit("type_is")
    }
    fn visit_try(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: NodeId,
        _: CatchRange,
        _: NodeId,
        _: NodeId,
    ) -> IrResult<()> {
        self.hit("try")
    }
    fn visit_throw(&mut self, _: &mut NodeArena, _: NodeId, _: NodeId) -> IrResult<()> {
        self.hit("throw")
    }
    fn visit_extension(&mut self, _: &mut NodeArena, _: NodeId) -> IrResult<()> {
        self.hit("extension")
    }
}

fn expected_handler(tag: NodeTag) -> &'static str {
    match tag {
        NodeTag::Constant => "constant",
        NodeTag::Default => "default",
        NodeTag::Parameter => "parameter",
        NodeTag::Unary(UnaryOp::ArrayLength) => "array_length",
        NodeTag::Unary(op) if op.is_conversion() => "convert",
        NodeTag::Unary(_) => "unary",
        NodeTag::Binary(op) => match op.family() {
            BinaryFamily::Arithmetic | BinaryFamily::Bitwise => "arithmetic",
            BinaryFamily::Comparison => "comparison",
            BinaryFamily::ShortCircuit => "short_circuit",
        },
        NodeTag::Conditional => "conditional",
        NodeTag::Block => "block",
        NodeTag::Assign(AssignOp::Assign) => "assign",
        NodeTag::Assign(op) if op.is_increment() => "increment",
        NodeTag::Assign(_) => "compound_assign",
        NodeTag::Loop => "loop",
        NodeTag::Label => "label",
        NodeTag::Goto => "goto",
        NodeTag::Call => "call",
        NodeTag::Invoke => "invoke",
        NodeTag::Lambda => "lambda",
        NodeTag::Member => "member",
        NodeTag::Index => "index",
        NodeTag::New => "new",
        NodeTag::NewArray => "new_array",
        NodeTag::TypeIs => "type_is",
        NodeTag::Try => "try",
        NodeTag::Throw => "throw",
        NodeTag::Extension => "extension",
    }
}

/// A well-typed node carrying `tag`.
fn sample(arena: &mut NodeArena, tag: NodeTag) -> NodeId {
    let one = arena.int(1);
    let two = arena.int(2);
    match tag {
        NodeTag::Constant => one,
        NodeTag::Default => arena.empty(),
        NodeTag::Parameter => {
            let x = arena.local("x", TypeId::INT);
            arena.parameter(x)
        }
        NodeTag::Unary(UnaryOp::ArrayLength) => {
            let array = arena.new_array(TypeId::INT, &[one]).unwrap();
            arena.unary(UnaryOp::ArrayLength, array).unwrap()
        }
        NodeTag::Unary(UnaryOp::TypeAs) => {
            let text = arena.string("s");
            arena.convert(UnaryOp::TypeAs, text, TypeId::OBJECT).unwrap()
        }
        NodeTag::Unary(op) if op.is_conversion() => {
            arena.convert(op, one, TypeId::FLOAT).unwrap()
        }
        NodeTag::Unary(op) => arena.unary(op, one).unwrap(),
        NodeTag::Binary(BinaryOp::Coalesce) => {
            let left = arena.null(TypeId::OBJECT).unwrap();
            let right = arena.null(TypeId::OBJECT).unwrap();
            arena.binary(BinaryOp::Coalesce, left, right).unwrap()
        }
        NodeTag::Binary(op @ (BinaryOp::AndAlso | BinaryOp::OrElse)) => {
            let t = arena.boolean(true);
            let f = arena.boolean(false);
            arena.binary(op, t, f).unwrap()
        }
        NodeTag::Binary(op) => arena.binary(op, one, two).unwrap(),
        NodeTag::Conditional => {
            let test = arena.boolean(true);
            arena.conditional(test, one, two, TypeId::INT).unwrap()
        }
        NodeTag::Block => arena.block(&[], &[one]).unwrap(),
        NodeTag::Assign(op) => {
            let x = arena.local("x", TypeId::INT);
            let target = arena.parameter(x);
            if op == AssignOp::Assign {
                arena.assign(target, one).unwrap()
            } else if op.is_increment() {
                arena.increment(op, target).unwrap()
            } else {
                arena.compound_assign(op, target, one).unwrap()
            }
        }
        NodeTag::Loop => {
            let (brk, _) = arena.loop_labels();
            let exit = arena.break_to(brk).unwrap();
            arena.loop_node(exit, brk, LabelId::INVALID).unwrap()
        }
        NodeTag::Label => {
            let label = arena.declare_label("l", TypeId::UNIT);
            arena.label_node(label, NodeId::INVALID).unwrap()
        }
        NodeTag::Goto => {
            let label = arena.declare_label("l", TypeId::UNIT);
            arena.goto(GotoKind::Goto, label, NodeId::INVALID).unwrap()
        }
        NodeTag::Call => {
            let to_str = arena.names().to_str;
            arena.call(one, to_str, &[], TypeId::STR).unwrap()
        }
        NodeTag::Invoke => {
            let lambda = sample(arena, NodeTag::Lambda);
            arena.invoke(lambda, &[one]).unwrap()
        }
        NodeTag::Lambda => {
            let p = arena.local("p", TypeId::INT);
            let body = arena.parameter(p);
            arena.lambda(&[p], body).unwrap()
        }
        NodeTag::Member => {
            let text = arena.string("s");
            let length = arena.intern("length");
            arena.member(text, length, TypeId::INT).unwrap()
        }
        NodeTag::Index => {
            let array = arena.new_array(TypeId::INT, &[one]).unwrap();
            let zero = arena.int(0);
            arena.index(array, &[zero]).unwrap()
        }
        NodeTag::New => arena.new_object(TypeId::OBJECT, &[]).unwrap(),
        NodeTag::NewArray => arena.new_array(TypeId::INT, &[one, two]).unwrap(),
        NodeTag::TypeIs => arena.type_is(one, TypeId::OBJECT).unwrap(),
        NodeTag::Try => {
            let handler = CatchBlock {
                ty: TypeId::EXCEPTION,
                variable: VarId::INVALID,
                filter: NodeId::INVALID,
                body: two,
            };
            arena
                .try_catch(one, &[handler], NodeId::INVALID, NodeId::INVALID)
                .unwrap()
        }
        NodeTag::Throw => {
            let error = arena.new_object(TypeId::EXCEPTION, &[]).unwrap();
            arena.throw(error).unwrap()
        }
        NodeTag::Extension => arena.type_literal(TypeId::INT),
    }
}

#[test]
fn dispatch_is_total_over_node_tags() {
    let mut arena = NodeArena::new();
    for tag in NodeTag::all() {
        let node = sample(&mut arena, tag);
        assert_eq!(arena.tag(node), tag, "sample for {tag}");
        let mut recorder = Recorder::default();
        visit(&mut recorder, &mut arena, node).unwrap();
        assert_eq!(recorder.seen, vec![expected_handler(tag)], "handler for {tag}");
    }
}

// Default forwarding and reduction

#[derive(Default)]
struct CountNodes {
    tags: Vec<NodeTag>,
}

impl Visitor for CountNodes {
    type Output = usize;

    fn default_visit(&mut self, arena: &mut NodeArena, id: NodeId) -> IrResult<usize> {
        self.tags.push(arena.tag(id));
        Ok(1 + walk_children(self, arena, id)?.into_iter().sum::<usize>())
    }
}

#[test]
fn unhandled_kinds_fall_back_to_default_visit() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let two = arena.int(2);
    let sum = arena.binary(BinaryOp::Add, one, two).unwrap();
    let neg = arena.unary(UnaryOp::Negate, sum).unwrap();
    assert_eq!(visit(&mut CountNodes::default(), &mut arena, neg).unwrap(), 4);
}

#[test]
fn extension_nodes_are_reduced_before_visiting() {
    let mut arena = NodeArena::new();
    let test = arena.boolean(false);
    let body = arena.empty();
    let looped = arena
        .while_loop(test, body, LabelId::INVALID, LabelId::INVALID)
        .unwrap();
    let mut counter = CountNodes::default();
    visit(&mut counter, &mut arena, looped).unwrap();
    assert_eq!(counter.tags[0], NodeTag::Loop);
    assert!(!counter.tags.contains(&NodeTag::Extension));
}

// Checked forms

#[derive(Default)]
struct UncheckedOnly {
    ops: Vec<BinaryOp>,
}

impl Visitor for UncheckedOnly {
    type Output = ();

    fn visit_arithmetic(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: BinaryOp,
        _left: NodeId,
        _right: NodeId,
    ) -> IrResult<()> {
        if op.unchecked().is_some() {
            return try_visit_unknown(self, arena, id);
        }
        self.ops.push(op);
        Ok(())
    }

    fn visit_unary(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: UnaryOp,
        _operand: NodeId,
    ) -> IrResult<()> {
        if op == UnaryOp::NegateChecked {
            return try_visit_unknown(self, arena, id);
        }
        Ok(())
    }

    fn default_visit(&mut self, arena: &mut NodeArena, id: NodeId) -> IrResult<()> {
        try_visit_unknown(self, arena, id)
    }
}

#[test]
fn checked_operators_are_revisited_unchecked() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let two = arena.int(2);
    let checked = arena.binary(BinaryOp::MultiplyChecked, one, two).unwrap();
    let mut v = UncheckedOnly::default();
    visit(&mut v, &mut arena, checked).unwrap();
    assert_eq!(v.ops, vec![BinaryOp::Multiply]);

    let negated = arena.unary(UnaryOp::NegateChecked, one).unwrap();
    visit(&mut v, &mut arena, negated).unwrap();
}

#[test]
fn nodes_without_any_handling_are_unsupported() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let err = visit(&mut UncheckedOnly::default(), &mut arena, one).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Unsupported);
    assert!(matches!(err, IrError::Unsupported { tag: NodeTag::Constant, .. }));
}

// Dispatch table

#[derive(Debug)]
struct Alpha;

#[derive(Debug)]
struct Marker(&'static str);

macro_rules! leaf_custom_node {
    ($ty:ty, $kind:expr) => {
        impl CustomNode for $ty {
            fn kind_name(&self) -> &'static str {
                $kind(self)
            }

            fn children(&self) -> Vec<NodeId> {
                Vec::new()
            }

            fn with_children(
                &self,
                _arena: &mut NodeArena,
                _children: &[NodeId],
            ) -> Result<Arc<dyn CustomNode>, IrError> {
                Err(IrError::invariant("leaf node has no children"))
            }

            fn reduce(&self, arena: &mut NodeArena, _id: NodeId) -> Result<NodeId, IrError> {
                Ok(arena.int(7))
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

leaf_custom_node!(Alpha, |_: &Alpha| "alpha");
leaf_custom_node!(Marker, |m: &Marker| m.0);

struct Tabled {
    table: Rc<DispatchTable<Tabled>>,
}

impl Tabled {
    fn new() -> Self {
        let table = DispatchTable::<Tabled>::new()
            .on::<Alpha>(|_, _, _, _| Ok("alpha handler"))
            .on_where(
                |node| node.kind_name() == "beta",
                |_, _, _, _| Ok("beta handler"),
            )
            .on_where(
                |node| node.kind_name().starts_with('b'),
                |_, _, _, _| Ok("b-prefix handler"),
            );
        Tabled {
            table: Rc::new(table),
        }
    }
}

impl Visitor for Tabled {
    type Output = &'static str;

    fn default_visit(&mut self, _: &mut NodeArena, _: NodeId) -> IrResult<&'static str> {
        Ok("default")
    }

    fn visit_constant(
        &mut self,
        _: &mut NodeArena,
        _: NodeId,
        _: ConstValue,
    ) -> IrResult<&'static str> {
        Ok("constant")
    }

    fn dispatch_table(&self) -> Option<Rc<DispatchTable<Self>>> {
        Some(Rc::clone(&self.table))
    }
}

#[test]
fn dispatch_table_tries_registrations_in_order() {
    let mut arena = NodeArena::new();
    let alpha = arena.custom(Arc::new(Alpha), TypeId::INT).unwrap();
    let beta = arena.custom(Arc::new(Marker("beta")), TypeId::INT).unwrap();
    let bravo = arena.custom(Arc::new(Marker("bravo")), TypeId::INT).unwrap();
    let gamma = arena.custom(Arc::new(Marker("gamma")), TypeId::INT).unwrap();

    let mut v = Tabled::new();
    assert_eq!(v.table.len(), 3);
    assert_eq!(visit(&mut v, &mut arena, alpha).unwrap(), "alpha handler");
    assert_eq!(visit(&mut v, &mut arena, beta).unwrap(), "beta handler");
    assert_eq!(visit(&mut v, &mut arena, bravo).unwrap(), "b-prefix handler");
    assert_eq!(visit(&mut v, &mut arena, gamma).unwrap(), "default");
}

#[test]
fn custom_nodes_reduce_without_a_table() {
    struct Plain;
    impl Visitor for Plain {
        type Output = Option<ConstValue>;

        fn visit_constant(
            &mut self,
            _: &mut NodeArena,
            _: NodeId,
            value: ConstValue,
        ) -> IrResult<Option<ConstValue>> {
            Ok(Some(value))
        }
    }

    let mut arena = NodeArena::new();
    let alpha = arena.custom(Arc::new(Alpha), TypeId::INT).unwrap();
    assert_eq!(
        visit(&mut Plain, &mut arena, alpha).unwrap(),
        Some(ConstValue::Int(7))
    );
}

// Scope stack

#[derive(Default)]
struct Scoped {
    stack: ScopeStack,
    at_parameter: Vec<(usize, Option<NodeId>, Option<NodeId>)>,
}

impl Visitor for Scoped {
    type Output = ();

    fn default_visit(&mut self, arena: &mut NodeArena, id: NodeId) -> IrResult<()> {
        walk_children(self, arena, id).map(drop)
    }

    fn visit_parameter(&mut self, arena: &mut NodeArena, _: NodeId, _: VarId) -> IrResult<()> {
        let is_loop = |arena: &NodeArena, id: NodeId| arena.tag(id) == NodeTag::Loop;
        let enclosing_loop = self.stack.enclosing(arena, is_loop);
        self.at_parameter
            .push((self.stack.depth(), self.stack.outermost(), enclosing_loop));
        Ok(())
    }

    fn scope_stack(&mut self) -> Option<&mut ScopeStack> {
        Some(&mut self.stack)
    }
}

#[test]
fn scope_stack_tracks_ancestors() {
    let mut arena = NodeArena::new();
    let x = arena.local("x", TypeId::INT);
    let x_ref = arena.parameter(x);
    let (brk, _) = arena.loop_labels();
    let exit = arena.break_to(brk).unwrap();
    let body = arena.block(&[], &[x_ref, exit]).unwrap();
    let looped = arena.loop_node(body, brk, LabelId::INVALID).unwrap();
    let root = arena.block(&[x], &[looped]).unwrap();

    let mut v = Scoped::default();
    visit(&mut v, &mut arena, root).unwrap();
    assert_eq!(v.at_parameter, vec![(4, Some(root), Some(looped))]);
    assert_eq!(v.stack.depth(), 0);
}

#[test]
fn enclosing_skips_the_current_node() {
    let mut arena = NodeArena::new();
    let one = arena.int(1);
    let mut stack = ScopeStack::new();
    assert_eq!(stack.enclosing(&arena, |_, _| true), None);
    stack.push(one);
    assert_eq!(stack.enclosing(&arena, |_, _| true), None);
    assert_eq!(stack.innermost(), Some(one));
    assert_eq!(stack.iter().collect::<Vec<_>>(), vec![one]);
}
