use pretty_assertions::assert_eq;

use arbor_ir::{
    reduce_fully, AssignOp, BinaryOp, CatchBlock, ConstValue, GotoKind, LabelId, NodeArena,
    NodeId, TypeId, UnaryOp, VarId,
};

use super::Interpreter;
use crate::errors::EvalError;
use crate::host::HostRegistry;
use crate::value::Value;
use crate::{evaluate, evaluate_with};

fn exception(arena: &mut NodeArena, message: &str) -> NodeId {
    let text = arena.string(message);
    arena.new_object(TypeId::EXCEPTION, &[text]).unwrap()
}

fn set(arena: &mut NodeArena, var: VarId, value: NodeId) -> NodeId {
    let target = arena.parameter(var);
    arena.assign(target, value).unwrap()
}

fn bump(arena: &mut NodeArena, var: VarId, by: i64) -> NodeId {
    let target = arena.parameter(var);
    let by = arena.int(by);
    arena.compound_assign(AssignOp::AddAssign, target, by).unwrap()
}

#[test]
fn blocks_bind_and_conditionals_branch() {
    let mut arena = NodeArena::new();
    let x = arena.local("x", TypeId::INT);
    let five = arena.int(5);
    let init = set(&mut arena, x, five);
    let read = arena.parameter(x);
    let three = arena.int(3);
    let test = arena.binary(BinaryOp::GreaterThan, read, three).unwrap();
    let two = arena.int(2);
    let doubled = arena.binary(BinaryOp::Multiply, read, two).unwrap();
    let zero = arena.int(0);
    let pick = arena.conditional(test, doubled, zero, TypeId::INT).unwrap();
    let root = arena.block(&[x], &[init, pick]).unwrap();

    assert_eq!(evaluate(&arena, root).unwrap(), Value::Int(10));
}

#[test]
fn forward_jumps_skip_to_the_label() {
    let mut arena = NodeArena::new();
    let x = arena.local("x", TypeId::INT);
    let skip = arena.declare_label("skip", TypeId::UNIT);
    let one = arena.int(1);
    let first = set(&mut arena, x, one);
    let jump = arena.goto(GotoKind::Goto, skip, NodeId::INVALID).unwrap();
    let two = arena.int(2);
    let skipped = set(&mut arena, x, two);
    let label = arena.label_node(skip, NodeId::INVALID).unwrap();
    let read = arena.parameter(x);
    let root = arena
        .block(&[x], &[first, jump, skipped, label, read])
        .unwrap();

    assert_eq!(evaluate(&arena, root).unwrap(), Value::Int(1));
}

#[test]
fn loops_break_with_a_value() {
    let mut arena = NodeArena::new();
    let i = arena.local("i", TypeId::INT);
    let done = arena.declare_label("done", TypeId::INT);
    let step = bump(&mut arena, i, 1);
    let read = arena.parameter(i);
    let four = arena.int(4);
    let reached = arena.binary(BinaryOp::Equal, read, four).unwrap();
    let exit = arena.goto(GotoKind::Break, done, read).unwrap();
    let check = arena.if_then(reached, exit, NodeId::INVALID).unwrap();
    let body = arena.block(&[], &[step, check]).unwrap();
    let looped = arena.loop_node(body, done, LabelId::INVALID).unwrap();
    let root = arena.block(&[i], &[looped]).unwrap();

    assert_eq!(evaluate(&arena, root).unwrap(), Value::Int(4));
}

#[test]
fn closures_capture_and_return_early() {
    let mut arena = NodeArena::new();
    let base = arena.local("base", TypeId::INT);
    let n = arena.local("n", TypeId::INT);
    let ret = arena.declare_label("return", TypeId::INT);

    // (n) => { if (n < 0) return 0; base + n }
    let n_ref = arena.parameter(n);
    let zero = arena.int(0);
    let negative = arena.binary(BinaryOp::LessThan, n_ref, zero).unwrap();
    let early = arena.return_to(ret, zero).unwrap();
    let guard = arena.if_then(negative, early, NodeId::INVALID).unwrap();
    let base_ref = arena.parameter(base);
    let sum = arena.binary(BinaryOp::Add, base_ref, n_ref).unwrap();
    let body = arena.block(&[], &[guard, sum]).unwrap();
    let body = arena.label_node(ret, body).unwrap();
    let lambda = arena.lambda(&[n], body).unwrap();

    let hundred = arena.int(100);
    let init = set(&mut arena, base, hundred);
    let two = arena.int(2);
    let positive = arena.invoke(lambda, &[two]).unwrap();
    let minus = arena.int(-5);
    let negative = arena.invoke(lambda, &[minus]).unwrap();
    let total = arena.binary(BinaryOp::Add, positive, negative).unwrap();
    let root = arena.block(&[base], &[init, total]).unwrap();

    assert_eq!(evaluate(&arena, root).unwrap(), Value::Int(102));
}

#[test]
fn catch_binds_the_exception_and_finally_runs() {
    let mut arena = NodeArena::new();
    let log = arena.local("log", TypeId::INT);
    let caught = arena.local("e", TypeId::EXCEPTION);
    let boom = exception(&mut arena, "boom");
    let thrown = arena.throw(boom).unwrap();
    let body = arena.block_typed(TypeId::UNIT, &[], &[thrown]).unwrap();
    let handler = CatchBlock {
        ty: TypeId::EXCEPTION,
        variable: caught,
        filter: NodeId::INVALID,
        body: bump(&mut arena, log, 1),
    };
    let finally = bump(&mut arena, log, 10);
    let guarded = arena
        .try_catch(body, &[handler], finally, NodeId::INVALID)
        .unwrap();
    let read = arena.parameter(log);
    let root = arena.block(&[log], &[guarded, read]).unwrap();

    assert_eq!(evaluate(&arena, root).unwrap(), Value::Int(11));
}

#[test]
fn filters_decline_and_rethrow_propagates() {
    let mut arena = NodeArena::new();
    let boom = exception(&mut arena, "boom");
    let thrown = arena.throw(boom).unwrap();
    let thrown = arena.block_typed(TypeId::UNIT, &[], &[thrown]).unwrap();
    let no = arena.boolean(false);
    let empty = arena.empty();
    let declined = CatchBlock {
        ty: TypeId::EXCEPTION,
        variable: VarId::INVALID,
        filter: no,
        body: empty,
    };
    let inner = arena
        .try_catch(thrown, &[declined], NodeId::INVALID, NodeId::INVALID)
        .unwrap();
    let rethrow = arena.throw(NodeId::INVALID).unwrap();
    let again = CatchBlock {
        ty: TypeId::EXCEPTION,
        variable: VarId::INVALID,
        filter: NodeId::INVALID,
        body: rethrow,
    };
    let root = arena
        .try_catch(inner, &[again], NodeId::INVALID, NodeId::INVALID)
        .unwrap();

    let err = evaluate(&arena, root).unwrap_err();
    assert_eq!(
        err,
        EvalError::Uncaught {
            message: "exception: boom".to_owned()
        }
    );
}

#[test]
fn extension_nodes_are_rejected_before_running() {
    let mut arena = NodeArena::new();
    let truth = arena.boolean(false);
    let body = arena.empty();
    let root = arena
        .while_loop(truth, body, LabelId::INVALID, LabelId::INVALID)
        .unwrap();
    let err = evaluate(&arena, root).unwrap_err();
    assert_eq!(
        err,
        EvalError::Reducible {
            node: root,
            kind: "while"
        }
    );
}

#[test]
fn checked_conversions_overflow() {
    let mut arena = NodeArena::new();
    let huge = arena.constant(ConstValue::Float(1e30_f64.to_bits()));
    let checked = arena
        .convert(UnaryOp::ConvertChecked, huge, TypeId::INT)
        .unwrap();
    assert_eq!(
        evaluate(&arena, checked).unwrap_err(),
        EvalError::Overflow { op: "conversion" }
    );

    let small = arena.constant(ConstValue::Float(2.75_f64.to_bits()));
    let truncated = arena.convert(UnaryOp::Convert, small, TypeId::INT).unwrap();
    assert_eq!(evaluate(&arena, truncated).unwrap(), Value::Int(2));
}

#[test]
fn reduced_foreach_sums_an_array() {
    let mut arena = NodeArena::new();
    let sum = arena.local("sum", TypeId::INT);
    let item = arena.local("item", TypeId::INT);
    let elements: Vec<NodeId> = (1..=4).map(|n| arena.int(n)).collect();
    let array = arena.new_array(TypeId::INT, &elements).unwrap();
    let target = arena.parameter(sum);
    let item_ref = arena.parameter(item);
    let add = arena
        .compound_assign(AssignOp::AddAssign, target, item_ref)
        .unwrap();
    let each = arena
        .for_each(item, array, add, LabelId::INVALID, LabelId::INVALID)
        .unwrap();
    let read = arena.parameter(sum);
    let root = arena.block(&[sum], &[each, read]).unwrap();

    let reduced = reduce_fully(&mut arena, root).unwrap();
    assert_eq!(evaluate(&arena, reduced).unwrap(), Value::Int(10));
}

#[test]
fn locks_release_their_monitor() {
    let mut arena = NodeArena::new();
    let gate = arena.new_object(TypeId::OBJECT, &[]).unwrap();
    let seven = arena.int(7);
    let locked = arena.lock_block(gate, seven).unwrap();
    let reduced = reduce_fully(&mut arena, locked).unwrap();

    let host = HostRegistry::new();
    let mut interpreter = Interpreter::new(&arena, &host);
    assert_eq!(interpreter.run(reduced).unwrap(), Value::Int(7));
    assert_eq!(interpreter.held_monitors(), 0);
}

#[test]
fn interpolation_renders_holes() {
    let mut arena = NodeArena::new();
    let head = arena.string("n = ");
    let n = arena.int(42);
    let flag = arena.boolean(true);
    let text = arena.format(&[head, n, flag]).unwrap();
    let reduced = reduce_fully(&mut arena, text).unwrap();
    assert_eq!(evaluate(&arena, reduced).unwrap(), Value::from("n = 42true"));
}

#[test]
fn host_methods_take_precedence() {
    let mut arena = NodeArena::new();
    let name = arena.intern("Counter");
    let ping = arena.intern("ping");
    let member = arbor_ir::Member::method(ping, Vec::new(), TypeId::INT);
    let counter = arena.pool_mut().declare_named(name, vec![member], Vec::new());
    let object = arena.new_object(counter, &[]).unwrap();
    let call = arena.call(object, ping, &[], TypeId::INT).unwrap();

    let mut host = HostRegistry::new();
    host.register(counter, ping, |_, _| Ok(Value::Int(99)));
    assert_eq!(evaluate_with(&arena, &host, call).unwrap(), Value::Int(99));
    assert!(matches!(
        evaluate(&arena, call).unwrap_err(),
        EvalError::NoSuchMethod { .. }
    ));
}
