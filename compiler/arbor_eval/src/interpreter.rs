//! Tree-walking evaluator for primitive trees.
//!
//! Control transfer is carried on the error channel as an [`Interrupt`]:
//! jumps unwind until the enclosing loop, label or block that owns the
//! target; thrown values unwind until a matching `catch`. Runtime failures
//! ([`EvalError`]) are fatal and skip `finally` blocks.

mod methods;

use std::cell::RefCell;
use std::rc::Rc;

use arbor_ir::validate::ensure_primitive;
use arbor_ir::{
    AssignOp, BinaryOp, CatchRange, ConstValue, IrError, KnownNames, LabelId, Name, Node,
    NodeArena, NodeId, NodeRange, TypeData, TypeFlags, TypeId, UnaryOp, VarId, VarRange,
};
use arbor_stack::ensure_sufficient_stack;

use crate::environment::Environment;
use crate::errors::{null_reference, type_error, EvalError, EvalResult};
use crate::host::HostRegistry;
use crate::operators::{evaluate_binary, evaluate_unary};
use crate::value::{Closure, ListValue, LookupValue, ObjectValue, Value};

/// Non-local exit from a node.
#[derive(Debug)]
enum Interrupt {
    Jump { label: LabelId, value: Value },
    Throw(Value),
    Error(EvalError),
}

impl From<EvalError> for Interrupt {
    fn from(err: EvalError) -> Self {
        Interrupt::Error(err)
    }
}

type Flow<T = Value> = Result<T, Interrupt>;

/// A writable location.
enum Place {
    Var(VarId),
    Field { object: Rc<ObjectValue>, index: usize },
    Element { list: Rc<ListValue>, index: usize },
}

pub struct Interpreter<'a> {
    arena: &'a NodeArena,
    host: &'a HostRegistry,
    names: KnownNames,
    env: Environment,
    /// Exceptions whose handlers are running, innermost last.
    handling: Vec<Value>,
    /// Monitors entered and not yet exited.
    monitors: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(arena: &'a NodeArena, host: &'a HostRegistry) -> Self {
        Interpreter {
            arena,
            host,
            names: *arena.names(),
            env: Environment::new(),
            handling: Vec::new(),
            monitors: 0,
        }
    }

    /// Number of monitors currently held.
    pub fn held_monitors(&self) -> usize {
        self.monitors
    }

    /// Evaluate `root`. Any reducible node under it is rejected before
    /// evaluation starts.
    #[tracing::instrument(level = "trace", skip_all, fields(root = ?root))]
    pub fn run(&mut self, root: NodeId) -> EvalResult<Value> {
        if let Err(IrError::Unsupported { node, .. }) = ensure_primitive(self.arena, root) {
            return Err(self.reducible(node));
        }
        match self.eval(root) {
            Ok(value) => Ok(value),
            Err(Interrupt::Error(err)) => Err(err),
            Err(Interrupt::Throw(exception)) => {
                tracing::debug!(kind = exception.kind_name(), "uncaught exception");
                Err(EvalError::Uncaught {
                    message: self.exception_message(&exception),
                })
            }
            Err(Interrupt::Jump { label, .. }) => Err(self.unhandled(label)),
        }
    }

    fn reducible(&self, node: NodeId) -> EvalError {
        EvalError::Reducible {
            node,
            kind: self
                .arena
                .extension_of(node)
                .map_or("extension", |ext| ext.kind_name()),
        }
    }

    fn unhandled(&self, label: LabelId) -> EvalError {
        EvalError::UnhandledJump {
            label: self.arena.name_str(self.arena.label(label).name).to_owned(),
        }
    }

    fn eval(&mut self, id: NodeId) -> Flow {
        ensure_sufficient_stack(|| self.eval_node(id))
    }

    fn eval_all(&mut self, range: NodeRange) -> Flow<Vec<Value>> {
        let arena = self.arena;
        arena.get_list(range).iter().map(|&id| self.eval(id)).collect()
    }

    fn eval_bool(&mut self, id: NodeId) -> Flow<bool> {
        let value = self.eval(id)?;
        value.as_bool().ok_or_else(|| {
            Interrupt::Error(type_error(format!(
                "expected a bool, found {}",
                value.kind_name()
            )))
        })
    }

    fn eval_node(&mut self, id: NodeId) -> Flow {
        let arena = self.arena;
        match *arena.node(id) {
            Node::Constant(value) => Ok(self.constant(value)),
            Node::Default => Ok(self.default_of(arena.ty(id))),
            Node::Parameter(var) => Ok(self.read(var)?),
            Node::Unary { op, operand } => {
                let value = self.eval(operand)?;
                if op.is_conversion() {
                    Ok(self.convert(op, value, arena.ty(id))?)
                } else {
                    Ok(evaluate_unary(op, &value)?)
                }
            }
            Node::Binary { op, left, right } => self.binary(op, left, right),
            Node::Conditional {
                test,
                if_true,
                if_false,
            } => {
                if self.eval_bool(test)? {
                    self.eval(if_true)
                } else if if_false.is_valid() {
                    self.eval(if_false)
                } else {
                    Ok(Value::Unit)
                }
            }
            Node::Block { variables, exprs } => self.block(id, variables, exprs),
            Node::Assign { op, target, value } => self.assign(op, target, value),
            Node::Loop {
                body,
                break_label,
                continue_label,
            } => self.run_loop(body, break_label, continue_label),
            Node::Label {
                target,
                default_value,
            } => {
                if !default_value.is_valid() {
                    return Ok(Value::Unit);
                }
                match self.eval(default_value) {
                    Err(Interrupt::Jump { label, value }) if label == target => Ok(value),
                    other => other,
                }
            }
            Node::Goto { target, value, .. } => {
                let value = if value.is_valid() {
                    self.eval(value)?
                } else {
                    Value::Unit
                };
                Err(Interrupt::Jump {
                    label: target,
                    value,
                })
            }
            Node::Call {
                receiver,
                method,
                args,
            } => {
                let receiver = if receiver.is_valid() {
                    Some(self.eval(receiver)?)
                } else {
                    None
                };
                let args = self.eval_all(args)?;
                match receiver {
                    Some(receiver) => self.call_method(&receiver, method, &args),
                    None => Ok(self.call_static(method, &args)?),
                }
            }
            Node::Invoke { callee, args } => {
                let callee = self.eval(callee)?;
                let args = self.eval_all(args)?;
                match callee {
                    Value::Closure(closure) => self.apply(&closure, args),
                    Value::Null => Err(null_reference("invocation").into()),
                    other => Err(type_error(format!("cannot invoke {}", other.kind_name())).into()),
                }
            }
            Node::Lambda { params, body } => Ok(self.closure(id, params, body)),
            Node::Member { receiver, member } => {
                let receiver = self.eval(receiver)?;
                self.member(&receiver, member)
            }
            Node::Index { .. } => {
                let place = self.place(id)?;
                Ok(self.load(&place)?)
            }
            Node::New { args } => {
                let args = self.eval_all(args)?;
                Ok(self.new_object(arena.ty(id), args))
            }
            Node::NewArray { elements } => {
                let elements = self.eval_all(elements)?;
                Ok(Value::list(arena.ty(id), elements))
            }
            Node::TypeIs { operand, target } => {
                let value = self.eval(operand)?;
                Ok(Value::Bool(self.is_instance(&value, target)))
            }
            Node::Try {
                body,
                handlers,
                finally,
                fault,
            } => self.try_region(body, handlers, finally, fault),
            Node::Throw { value } => self.throw(value),
            Node::Extension(_) => Err(self.reducible(id).into()),
        }
    }

    fn constant(&self, value: ConstValue) -> Value {
        match value {
            ConstValue::Unit => Value::Unit,
            ConstValue::Null => Value::Null,
            ConstValue::Bool(b) => Value::Bool(b),
            ConstValue::Int(n) => Value::Int(n),
            ConstValue::Float(bits) => Value::Float(f64::from_bits(bits)),
            ConstValue::Str(name) => Value::string(self.arena.name_str(name)),
            ConstValue::Type(ty) => Value::Type(ty),
        }
    }

    fn default_of(&self, ty: TypeId) -> Value {
        match self.arena.pool().get(ty) {
            TypeData::Unit | TypeData::Never => Value::Unit,
            TypeData::Bool => Value::Bool(false),
            TypeData::Int => Value::Int(0),
            TypeData::Float => Value::Float(0.0),
            _ => Value::Null,
        }
    }

    fn read(&self, var: VarId) -> EvalResult<Value> {
        self.env.lookup(var).ok_or_else(|| EvalError::UnboundVariable {
            name: self.var_name(var),
        })
    }

    fn var_name(&self, var: VarId) -> String {
        self.arena.name_str(self.arena.variable(var).name).to_owned()
    }

    fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> Flow {
        match op {
            BinaryOp::AndAlso => Ok(Value::Bool(self.eval_bool(left)? && self.eval_bool(right)?)),
            BinaryOp::OrElse => Ok(Value::Bool(self.eval_bool(left)? || self.eval_bool(right)?)),
            BinaryOp::Coalesce => {
                let left = self.eval(left)?;
                if left.is_null() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            _ => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(evaluate_binary(op, &left, &right)?)
            }
        }
    }

    fn convert(&self, op: UnaryOp, value: Value, target: TypeId) -> EvalResult<Value> {
        let pool = self.arena.pool();
        match (pool.get(target), &value) {
            (TypeData::Int, Value::Int(_)) | (TypeData::Float, Value::Float(_)) => Ok(value),
            (TypeData::Int, Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
            #[allow(clippy::cast_precision_loss, reason = "int to float conversion")]
            (TypeData::Float, Value::Int(n)) => Ok(Value::Float(*n as f64)),
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_precision_loss,
                reason = "float to int conversion truncates, checked form range-checks first"
            )]
            (TypeData::Int, Value::Float(x)) => {
                let in_range = x.is_finite() && *x >= i64::MIN as f64 && *x < i64::MAX as f64;
                if op == UnaryOp::ConvertChecked && !in_range {
                    return Err(EvalError::Overflow { op: "conversion" });
                }
                Ok(Value::Int(x.trunc() as i64))
            }
            (TypeData::Str, Value::Str(_)) | (_, Value::Null) => Ok(value),
            _ if self.is_instance(&value, target) => Ok(value),
            _ if op == UnaryOp::TypeAs => Ok(Value::Null),
            _ => Err(EvalError::InvalidCast {
                from: value
                    .runtime_type()
                    .map_or_else(|| "null".to_owned(), |ty| pool.display(ty)),
                to: pool.display(target),
            }),
        }
    }

    fn is_instance(&self, value: &Value, target: TypeId) -> bool {
        value
            .runtime_type()
            .is_some_and(|ty| self.arena.pool().is_assignable(ty, target))
    }

    fn block(&mut self, id: NodeId, variables: VarRange, exprs: NodeRange) -> Flow {
        let arena = self.arena;
        self.env.push_scope();
        for &var in arena.get_vars(variables) {
            let value = self.default_of(arena.variable(var).ty);
            self.env.define(var, value);
        }
        let result = self.sequence(arena.get_list(exprs));
        self.env.pop_scope();
        let value = result?;
        Ok(if arena.ty(id) == TypeId::UNIT {
            Value::Unit
        } else {
            value
        })
    }

    /// Run block statements in order. A jump to a label among them resumes
    /// right after that label with the jump's value.
    fn sequence(&mut self, exprs: &[NodeId]) -> Flow {
        let mut last = Value::Unit;
        let mut i = 0;
        while let Some(&expr) = exprs.get(i) {
            match self.eval(expr) {
                Ok(value) => {
                    last = value;
                    i += 1;
                }
                Err(Interrupt::Jump { label, value }) => {
                    let arena = self.arena;
                    let Some(at) = exprs.iter().position(|&e| {
                        matches!(*arena.node(e), Node::Label { target, .. } if target == label)
                    }) else {
                        return Err(Interrupt::Jump { label, value });
                    };
                    last = value;
                    i = at + 1;
                }
                Err(other) => return Err(other),
            }
        }
        Ok(last)
    }

    fn run_loop(&mut self, body: NodeId, break_label: LabelId, continue_label: LabelId) -> Flow {
        loop {
            match self.eval(body) {
                Ok(_) => {}
                Err(Interrupt::Jump { label, value })
                    if break_label.is_valid() && label == break_label =>
                {
                    return Ok(value)
                }
                Err(Interrupt::Jump { label, .. })
                    if continue_label.is_valid() && label == continue_label => {}
                Err(other) => return Err(other),
            }
        }
    }

    fn place(&mut self, target: NodeId) -> Flow<Place> {
        match *self.arena.node(target) {
            Node::Parameter(var) => Ok(Place::Var(var)),
            Node::Member { receiver, member } => match self.eval(receiver)? {
                Value::Object(object) => {
                    let Some(index) = self.field_index(object.ty, member) else {
                        return Err(self.no_member(&Value::Object(object), member).into());
                    };
                    Ok(Place::Field { object, index })
                }
                Value::Null => Err(null_reference(format!(
                    "member `{}`",
                    self.arena.name_str(member)
                ))
                .into()),
                other => Err(self.no_member(&other, member).into()),
            },
            Node::Index { receiver, args } => {
                let receiver = self.eval(receiver)?;
                let args = self.eval_all(args)?;
                let Some(index) = args.first().and_then(Value::as_int) else {
                    return Err(type_error("index must be an int").into());
                };
                match receiver {
                    Value::List(list) => {
                        let len = list.items.borrow().len();
                        let index = usize::try_from(index)
                            .ok()
                            .filter(|&i| i < len)
                            .ok_or(EvalError::IndexOutOfRange { index, len })?;
                        Ok(Place::Element { list, index })
                    }
                    Value::Null => Err(null_reference("element access").into()),
                    other => {
                        Err(type_error(format!("cannot index {}", other.kind_name())).into())
                    }
                }
            }
            _ => Err(type_error(format!("{} is not assignable", self.arena.tag(target))).into()),
        }
    }

    fn load(&self, place: &Place) -> EvalResult<Value> {
        match place {
            Place::Var(var) => self.read(*var),
            Place::Field { object, index } => {
                Ok(object.fields.borrow().get(*index).cloned().unwrap_or(Value::Null))
            }
            Place::Element { list, index } => {
                let items = list.items.borrow();
                items
                    .get(*index)
                    .cloned()
                    .ok_or_else(|| EvalError::IndexOutOfRange {
                        index: i64::try_from(*index).unwrap_or(i64::MAX),
                        len: items.len(),
                    })
            }
        }
    }

    fn store(&mut self, place: &Place, value: Value) -> EvalResult<()> {
        match place {
            Place::Var(var) => {
                if self.env.assign(*var, value) {
                    Ok(())
                } else {
                    Err(EvalError::UnboundVariable {
                        name: self.var_name(*var),
                    })
                }
            }
            Place::Field { object, index } => {
                let mut fields = object.fields.borrow_mut();
                if fields.len() <= *index {
                    fields.resize(*index + 1, Value::Null);
                }
                fields[*index] = value;
                Ok(())
            }
            Place::Element { list, index } => {
                if let Some(slot) = list.items.borrow_mut().get_mut(*index) {
                    *slot = value;
                }
                Ok(())
            }
        }
    }

    fn assign(&mut self, op: AssignOp, target: NodeId, value: NodeId) -> Flow {
        let place = self.place(target)?;
        let Some(arith) = op.binary_op() else {
            let value = self.eval(value)?;
            self.store(&place, value.clone())?;
            return Ok(value);
        };
        let current = self.load(&place)?;
        let operand = if op.is_increment() {
            Value::Int(1)
        } else {
            self.eval(value)?
        };
        let updated = evaluate_binary(arith, &current, &operand)?;
        self.store(&place, updated.clone())?;
        Ok(match op {
            AssignOp::PostIncrement | AssignOp::PostDecrement => current,
            _ => updated,
        })
    }

    fn closure(&self, id: NodeId, params: VarRange, body: NodeId) -> Value {
        Value::Closure(Rc::new(Closure {
            ty: self.arena.ty(id),
            params: self.arena.get_vars(params).to_vec(),
            body,
            scope: self.env.current(),
        }))
    }

    fn apply(&mut self, closure: &Closure, args: Vec<Value>) -> Flow {
        if args.len() != closure.params.len() {
            return Err(type_error(format!(
                "closure takes {} argument(s), {} supplied",
                closure.params.len(),
                args.len()
            ))
            .into());
        }
        let saved = self.env.enter_closure(closure.scope.clone());
        for (&param, arg) in closure.params.iter().zip(args) {
            self.env.define(param, arg);
        }
        let result = self.eval(closure.body);
        self.env.restore(saved);
        match result {
            Err(Interrupt::Jump { label, .. }) => Err(self.unhandled(label).into()),
            other => other,
        }
    }

    fn field_index(&self, ty: TypeId, member: Name) -> Option<usize> {
        let pool = self.arena.pool();
        if let Some(fields) = pool.fields(ty) {
            return fields.iter().position(|&(name, _)| name == member);
        }
        (pool.flags(ty).contains(TypeFlags::EXCEPTION) && self.arena.name_str(member) == "message")
            .then_some(0)
    }

    fn new_object(&self, ty: TypeId, args: Vec<Value>) -> Value {
        let pool = self.arena.pool();
        match pool.get(ty) {
            TypeData::List(_) => Value::list(ty, Vec::new()),
            TypeData::Lookup { key, element } => Value::Lookup(Rc::new(LookupValue {
                ty,
                grouping_ty: pool
                    .find(&TypeData::Grouping {
                        key: *key,
                        element: *element,
                    })
                    .unwrap_or(TypeId::OBJECT),
                groups: RefCell::default(),
            })),
            TypeData::Exception => {
                let message = args.into_iter().next().unwrap_or_else(|| Value::string(""));
                Value::object(ty, vec![message])
            }
            TypeData::Named(_) if args.is_empty() => {
                let fields = pool
                    .fields(ty)
                    .unwrap_or_default()
                    .iter()
                    .map(|&(_, field_ty)| self.default_of(field_ty))
                    .collect();
                Value::object(ty, fields)
            }
            _ => Value::object(ty, args),
        }
    }

    fn try_region(
        &mut self,
        body: NodeId,
        handlers: CatchRange,
        finally: NodeId,
        fault: NodeId,
    ) -> Flow {
        let outcome = match self.eval(body) {
            Err(Interrupt::Throw(exception)) => self.handle(exception, handlers),
            other => other,
        };
        if fault.is_valid() && matches!(outcome, Err(Interrupt::Throw(_))) {
            self.eval(fault)?;
        }
        if finally.is_valid() && !matches!(outcome, Err(Interrupt::Error(_))) {
            // A jump or throw out of `finally` replaces the pending outcome.
            self.eval(finally)?;
        }
        outcome
    }

    fn handle(&mut self, exception: Value, handlers: CatchRange) -> Flow {
        let arena = self.arena;
        for handler in arena.get_catches(handlers) {
            if !self.is_instance(&exception, handler.ty) {
                continue;
            }
            self.env.push_scope();
            if handler.variable.is_valid() {
                self.env.define(handler.variable, exception.clone());
            }
            let accepted = if handler.filter.is_valid() {
                match self.eval_bool(handler.filter) {
                    Ok(accepted) => accepted,
                    // A filter that throws declines the exception.
                    Err(Interrupt::Throw(_)) => false,
                    Err(other) => {
                        self.env.pop_scope();
                        return Err(other);
                    }
                }
            } else {
                true
            };
            if !accepted {
                self.env.pop_scope();
                continue;
            }
            tracing::trace!(ty = %arena.display_type(handler.ty), "exception caught");
            self.handling.push(exception);
            let result = self.eval(handler.body);
            self.handling.pop();
            self.env.pop_scope();
            return result;
        }
        Err(Interrupt::Throw(exception))
    }

    fn throw(&mut self, value: NodeId) -> Flow {
        if !value.is_valid() {
            return match self.handling.last() {
                Some(current) => Err(Interrupt::Throw(current.clone())),
                None => Err(type_error("rethrow outside a catch handler").into()),
            };
        }
        match self.eval(value)? {
            Value::Null => Err(null_reference("throw of a null exception").into()),
            exception => Err(Interrupt::Throw(exception)),
        }
    }

    /// Text of a value as produced by `to_str`.
    fn render(&self, value: &Value) -> String {
        let pool = self.arena.pool();
        match value {
            Value::Unit => "()".to_owned(),
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Str(s) => s.to_string(),
            Value::Type(ty) => pool.display(*ty),
            Value::List(list) => {
                let items: Vec<String> = list.items.borrow().iter().map(|v| self.render(v)).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Object(object) if pool.flags(object.ty).contains(TypeFlags::EXCEPTION) => {
                self.exception_message(value)
            }
            Value::Object(object) => {
                let fields: Vec<String> =
                    object.fields.borrow().iter().map(|v| self.render(v)).collect();
                format!("{}({})", pool.display(object.ty), fields.join(", "))
            }
            Value::Grouping(grouping) => self.render(&grouping.key),
            other => other
                .runtime_type()
                .map_or_else(|| other.kind_name().to_owned(), |ty| pool.display(ty)),
        }
    }

    fn exception_message(&self, exception: &Value) -> String {
        let pool = self.arena.pool();
        match exception {
            Value::Object(object) if pool.flags(object.ty).contains(TypeFlags::EXCEPTION) => {
                let message = self
                    .field_index(object.ty, self.arena.intern("message"))
                    .and_then(|i| object.fields.borrow().get(i).cloned());
                match message {
                    Some(Value::Str(text)) => format!("{}: {text}", pool.display(object.ty)),
                    _ => pool.display(object.ty),
                }
            }
            other => self.render(other),
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
