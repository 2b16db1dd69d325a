//! Validating node factories.
//!
//! Every node enters the arena through one of these methods. Each checks its
//! arguments (ids allocated, operand types compatible, capabilities present)
//! and fails with an [`IrError`] before anything is allocated. Result types
//! are computed from the operands where the operator determines them and
//! supplied by the caller everywhere else; nothing is inferred.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::extension::{
    CustomNode, DoWhileLoop, Extension, ForEachLoop, ForLoop, FormatString, LockBlock,
    TupleNode, TypeLiteral, UsingBlock, WhileLoop,
};
use crate::node::{
    AssignOp, BinaryFamily, BinaryOp, CatchBlock, ConstValue, GotoKind, Node, UnaryOp,
};
use crate::types::{MemberKind, TypeData};
use crate::{
    IrError, IrResult, LabelId, Name, NodeArena, NodeId, SlotId, TypeFlags, TypeId, VarId,
};

impl NodeArena {
    // ── Leaves ──────────────────────────────────────────────────

    pub fn constant(&mut self, value: ConstValue) -> NodeId {
        let ty = match value {
            ConstValue::Unit => TypeId::UNIT,
            ConstValue::Null => TypeId::OBJECT,
            ConstValue::Bool(_) => TypeId::BOOL,
            ConstValue::Int(_) => TypeId::INT,
            ConstValue::Float(_) => TypeId::FLOAT,
            ConstValue::Str(_) => TypeId::STR,
            ConstValue::Type(_) => TypeId::TYPE,
        };
        self.push(Node::Constant(value), ty)
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.constant(ConstValue::Int(value))
    }

    pub fn boolean(&mut self, value: bool) -> NodeId {
        self.constant(ConstValue::Bool(value))
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        let name = self.intern(value);
        self.constant(ConstValue::Str(name))
    }

    /// Typed null. `ty` must be a reference type.
    pub fn null(&mut self, ty: TypeId) -> IrResult<NodeId> {
        if !self.pool().is_reference(ty) {
            return Err(IrError::invalid(
                "ty",
                format!("{} is not a reference type", self.display_type(ty)),
            ));
        }
        Ok(self.push(Node::Constant(ConstValue::Null), ty))
    }

    pub fn default_value(&mut self, ty: TypeId) -> NodeId {
        self.push(Node::Default, ty)
    }

    /// `Default(unit)`, the empty statement.
    pub fn empty(&mut self) -> NodeId {
        self.default_value(TypeId::UNIT)
    }

    // ── Operators ───────────────────────────────────────────────

    /// Non-conversion unary operator; the result type follows the operand.
    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> IrResult<NodeId> {
        self.check_node("operand", operand)?;
        let operand_ty = self.ty(operand);
        let ty = match op {
            UnaryOp::Negate | UnaryOp::NegateChecked | UnaryOp::Plus => {
                self.expect_numeric("operand", operand_ty)?;
                operand_ty
            }
            UnaryOp::Not if operand_ty == TypeId::BOOL || operand_ty == TypeId::INT => operand_ty,
            UnaryOp::OnesComplement if operand_ty == TypeId::INT => TypeId::INT,
            UnaryOp::Not | UnaryOp::OnesComplement => {
                return Err(self.mismatch("operand", "bool or int", operand_ty));
            }
            UnaryOp::ArrayLength => {
                if !matches!(self.pool().get(operand_ty), TypeData::Array(_)) {
                    return Err(self.mismatch("operand", "an array", operand_ty));
                }
                TypeId::INT
            }
            UnaryOp::Convert | UnaryOp::ConvertChecked | UnaryOp::TypeAs => {
                return Err(IrError::invalid(
                    "op",
                    "conversions carry a target type; use `convert`",
                ));
            }
        };
        Ok(self.push(Node::Unary { op, operand }, ty))
    }

    /// Conversion (`Convert`, `ConvertChecked` or `TypeAs`) to `target`.
    pub fn convert(&mut self, op: UnaryOp, operand: NodeId, target: TypeId) -> IrResult<NodeId> {
        self.check_node("operand", operand)?;
        if !op.is_conversion() {
            return Err(IrError::invalid("op", format!("{op:?} is not a conversion")));
        }
        let from = self.ty(operand);
        let pool = self.pool();
        let legal = match op {
            UnaryOp::TypeAs => pool.is_reference(target),
            _ => {
                (pool.is_numeric(from) && pool.is_numeric(target))
                    || pool.is_assignable(from, target)
                    || pool.is_assignable(target, from)
            }
        };
        if !legal {
            return Err(IrError::TypeMismatch {
                param: "operand",
                expected: format!("a value convertible to {}", self.display_type(target)),
                found: self.display_type(from),
            });
        }
        Ok(self.push(Node::Unary { op, operand }, target))
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> IrResult<NodeId> {
        self.check_node("left", left)?;
        self.check_node("right", right)?;
        let ty = self.binary_result(op, self.ty(left), self.ty(right))?;
        Ok(self.push(Node::Binary { op, left, right }, ty))
    }

    fn binary_result(&self, op: BinaryOp, lt: TypeId, rt: TypeId) -> IrResult<TypeId> {
        let pool = self.pool();
        match op.family() {
            BinaryFamily::Arithmetic => {
                if op == BinaryOp::Add && lt == TypeId::STR && rt == TypeId::STR {
                    return Ok(TypeId::STR);
                }
                self.expect_numeric("left", lt)?;
                self.expect_same("right", lt, rt)?;
                Ok(lt)
            }
            BinaryFamily::Bitwise => match op {
                BinaryOp::LeftShift | BinaryOp::RightShift => {
                    self.expect_same("left", TypeId::INT, lt)?;
                    self.expect_same("right", TypeId::INT, rt)?;
                    Ok(TypeId::INT)
                }
                _ => {
                    if lt != TypeId::INT && lt != TypeId::BOOL {
                        return Err(self.mismatch("left", "bool or int", lt));
                    }
                    self.expect_same("right", lt, rt)?;
                    Ok(lt)
                }
            },
            BinaryFamily::Comparison => match op {
                BinaryOp::Equal | BinaryOp::NotEqual => {
                    if pool.is_assignable(lt, rt) || pool.is_assignable(rt, lt) {
                        Ok(TypeId::BOOL)
                    } else {
                        Err(self.mismatch_types("right", lt, rt))
                    }
                }
                _ => {
                    if !pool.is_numeric(lt) && lt != TypeId::STR {
                        return Err(self.mismatch("left", "a numeric or string value", lt));
                    }
                    self.expect_same("right", lt, rt)?;
                    Ok(TypeId::BOOL)
                }
            },
            BinaryFamily::ShortCircuit => match op {
                BinaryOp::Coalesce => {
                    if !pool.is_reference(lt) {
                        return Err(self.mismatch("left", "a reference value", lt));
                    }
                    if !pool.is_assignable(rt, lt) {
                        return Err(self.mismatch_types("right", lt, rt));
                    }
                    Ok(lt)
                }
                _ => {
                    self.expect_same("left", TypeId::BOOL, lt)?;
                    self.expect_same("right", TypeId::BOOL, rt)?;
                    Ok(TypeId::BOOL)
                }
            },
        }
    }

    // ── Control flow ────────────────────────────────────────────

    /// `test ? if_true : if_false` of type `ty`.
    ///
    /// With `ty == unit` the branches may have any type and `if_false` may be
    /// `NodeId::INVALID` (an `if` without `else`).
    pub fn conditional(
        &mut self,
        test: NodeId,
        if_true: NodeId,
        if_false: NodeId,
        ty: TypeId,
    ) -> IrResult<NodeId> {
        self.check_node("test", test)?;
        self.check_assignable("test", test, TypeId::BOOL)?;
        self.check_node("if_true", if_true)?;
        let if_false = if if_false.is_valid() {
            self.check_node("if_false", if_false)?;
            if_false
        } else if ty == TypeId::UNIT {
            self.empty()
        } else {
            return Err(IrError::invalid(
                "if_false",
                "a valued conditional needs both branches",
            ));
        };
        if ty != TypeId::UNIT {
            self.check_assignable("if_true", if_true, ty)?;
            self.check_assignable("if_false", if_false, ty)?;
        }
        Ok(self.push(
            Node::Conditional {
                test,
                if_true,
                if_false,
            },
            ty,
        ))
    }

    /// Statement-form `if`, typed `unit`.
    pub fn if_then(&mut self, test: NodeId, then: NodeId, otherwise: NodeId) -> IrResult<NodeId> {
        self.conditional(test, then, otherwise, TypeId::UNIT)
    }

    /// Block whose type is that of its last expression (`unit` when empty).
    pub fn block(&mut self, variables: &[VarId], exprs: &[NodeId]) -> IrResult<NodeId> {
        let ty = exprs.last().map_or(TypeId::UNIT, |&last| {
            if last.is_valid() && last.index() < self.len() {
                self.ty(last)
            } else {
                TypeId::UNIT
            }
        });
        self.block_typed(ty, variables, exprs)
    }

    /// Block of an explicit type. A `unit` block discards its last value.
    pub fn block_typed(
        &mut self,
        ty: TypeId,
        variables: &[VarId],
        exprs: &[NodeId],
    ) -> IrResult<NodeId> {
        for &var in variables {
            self.check_var("variables", var)?;
        }
        for &expr in exprs {
            self.check_node("exprs", expr)?;
        }
        if ty != TypeId::UNIT {
            match exprs.last() {
                Some(&last) => self.check_assignable("exprs", last, ty)?,
                None => {
                    return Err(IrError::invalid(
                        "exprs",
                        "an empty block can only have type unit",
                    ))
                }
            }
        }
        let variables = self.push_vars(variables);
        let exprs = self.push_list(exprs);
        Ok(self.push(Node::Block { variables, exprs }, ty))
    }

    /// Simple assignment `target = value`.
    pub fn assign(&mut self, target: NodeId, value: NodeId) -> IrResult<NodeId> {
        self.check_writable(target)?;
        self.check_node("value", value)?;
        let ty = self.ty(target);
        self.check_assignable("value", value, ty)?;
        Ok(self.push(
            Node::Assign {
                op: AssignOp::Assign,
                target,
                value,
            },
            ty,
        ))
    }

    /// Compound assignment such as `target += value`.
    pub fn compound_assign(
        &mut self,
        op: AssignOp,
        target: NodeId,
        value: NodeId,
    ) -> IrResult<NodeId> {
        let Some(binary) = op.binary_op().filter(|_| op.has_value()) else {
            return Err(IrError::invalid("op", format!("{op:?} is not a compound assignment")));
        };
        self.check_writable(target)?;
        self.check_node("value", value)?;
        let ty = self.binary_result(binary, self.ty(target), self.ty(value))?;
        self.expect_same("value", self.ty(target), ty)?;
        Ok(self.push(Node::Assign { op, target, value }, ty))
    }

    /// Pre/post increment or decrement of a numeric target.
    pub fn increment(&mut self, op: AssignOp, target: NodeId) -> IrResult<NodeId> {
        if !op.is_increment() {
            return Err(IrError::invalid("op", format!("{op:?} is not an increment")));
        }
        self.check_writable(target)?;
        let ty = self.ty(target);
        self.expect_numeric("target", ty)?;
        Ok(self.push(
            Node::Assign {
                op,
                target,
                value: NodeId::INVALID,
            },
            ty,
        ))
    }

    /// Infinite loop. Typed by its break label, `unit` without one.
    pub fn loop_node(
        &mut self,
        body: NodeId,
        break_label: LabelId,
        continue_label: LabelId,
    ) -> IrResult<NodeId> {
        self.check_node("body", body)?;
        let ty = if break_label.is_valid() {
            self.check_label("break_label", break_label)?;
            self.label(break_label).ty
        } else {
            TypeId::UNIT
        };
        if continue_label.is_valid() {
            self.check_label("continue_label", continue_label)?;
        }
        Ok(self.push(
            Node::Loop {
                body,
                break_label,
                continue_label,
            },
            ty,
        ))
    }

    /// Jump target inside a block.
    pub fn label_node(&mut self, target: LabelId, default_value: NodeId) -> IrResult<NodeId> {
        self.check_label("target", target)?;
        let ty = self.label(target).ty;
        if default_value.is_valid() {
            self.check_node("default_value", default_value)?;
            self.check_assignable("default_value", default_value, ty)?;
        } else if ty != TypeId::UNIT {
            return Err(IrError::invalid(
                "default_value",
                "a valued label needs a fallthrough value",
            ));
        }
        Ok(self.push(
            Node::Label {
                target,
                default_value,
            },
            ty,
        ))
    }

    pub fn goto(&mut self, kind: GotoKind, target: LabelId, value: NodeId) -> IrResult<NodeId> {
        self.check_label("target", target)?;
        let label_ty = self.label(target).ty;
        if value.is_valid() {
            self.check_node("value", value)?;
            self.check_assignable("value", value, label_ty)?;
        } else if label_ty != TypeId::UNIT {
            return Err(IrError::invalid(
                "value",
                "a jump to a valued label must carry a value",
            ));
        }
        Ok(self.push(
            Node::Goto {
                kind,
                target,
                value,
            },
            TypeId::NEVER,
        ))
    }

    pub fn break_to(&mut self, target: LabelId) -> IrResult<NodeId> {
        self.goto(GotoKind::Break, target, NodeId::INVALID)
    }

    pub fn continue_to(&mut self, target: LabelId) -> IrResult<NodeId> {
        self.goto(GotoKind::Continue, target, NodeId::INVALID)
    }

    pub fn return_to(&mut self, target: LabelId, value: NodeId) -> IrResult<NodeId> {
        self.goto(GotoKind::Return, target, value)
    }

    /// Fresh `(break, continue)` labels for a loop.
    pub fn loop_labels(&mut self) -> (LabelId, LabelId) {
        (
            self.declare_label("break", TypeId::UNIT),
            self.declare_label("continue", TypeId::UNIT),
        )
    }

    // ── Calls and access ────────────────────────────────────────

    /// Method call returning `ty`.
    ///
    /// When the receiver is a nominal type, the method must be declared on it
    /// (or an implemented interface) and the arguments must fit its signature.
    /// Built-in collection methods and static runtime calls are not checked.
    pub fn call(
        &mut self,
        receiver: NodeId,
        method: Name,
        args: &[NodeId],
        ty: TypeId,
    ) -> IrResult<NodeId> {
        self.check_optional("receiver", receiver)?;
        for &arg in args {
            self.check_node("args", arg)?;
        }
        if receiver.is_valid() {
            self.check_method(self.ty(receiver), method, args, ty)?;
        }
        let args = self.push_list(args);
        Ok(self.push(
            Node::Call {
                receiver,
                method,
                args,
            },
            ty,
        ))
    }

    /// Call to a runtime function with no receiver.
    pub fn static_call(&mut self, method: Name, args: &[NodeId], ty: TypeId) -> IrResult<NodeId> {
        self.call(NodeId::INVALID, method, args, ty)
    }

    fn check_method(
        &self,
        receiver_ty: TypeId,
        method: Name,
        args: &[NodeId],
        ty: TypeId,
    ) -> IrResult<()> {
        if !matches!(self.pool().get(receiver_ty), TypeData::Named(_)) {
            return Ok(());
        }
        let Some(member) = self.pool().member(receiver_ty, method) else {
            return Err(IrError::invalid(
                "method",
                format!(
                    "{} has no method `{}`",
                    self.display_type(receiver_ty),
                    self.name_str(method)
                ),
            ));
        };
        let MemberKind::Method { params, ret } = &member.kind else {
            return Err(IrError::invalid(
                "method",
                format!("`{}` is not a method", self.name_str(method)),
            ));
        };
        if params.len() != args.len() {
            return Err(IrError::invalid(
                "args",
                format!(
                    "`{}` takes {} argument(s), {} supplied",
                    self.name_str(method),
                    params.len(),
                    args.len()
                ),
            ));
        }
        for (&arg, &param) in args.iter().zip(params) {
            self.check_assignable("args", arg, param)?;
        }
        if !self.pool().is_assignable(*ret, ty) {
            return Err(self.mismatch_types("ty", ty, *ret));
        }
        Ok(())
    }

    pub fn invoke(&mut self, callee: NodeId, args: &[NodeId]) -> IrResult<NodeId> {
        self.check_node("callee", callee)?;
        for &arg in args {
            self.check_node("args", arg)?;
        }
        let callee_ty = self.ty(callee);
        let TypeData::Function { params, ret } = self.pool().get(callee_ty).clone() else {
            return Err(self.mismatch("callee", "a function", callee_ty));
        };
        if params.len() != args.len() {
            return Err(IrError::invalid(
                "args",
                format!("expected {} argument(s), found {}", params.len(), args.len()),
            ));
        }
        for (&arg, &param) in args.iter().zip(&params) {
            self.check_assignable("args", arg, param)?;
        }
        let args = self.push_list(args);
        Ok(self.push(Node::Invoke { callee, args }, ret))
    }

    pub fn lambda(&mut self, params: &[VarId], body: NodeId) -> IrResult<NodeId> {
        for &param in params {
            self.check_var("params", param)?;
        }
        self.check_node("body", body)?;
        let param_tys: Vec<TypeId> = params.iter().map(|&p| self.variable(p).ty).collect();
        let ret = self.ty(body);
        let ty = self.pool_mut().function(&param_tys, ret);
        let params = self.push_vars(params);
        Ok(self.push(Node::Lambda { params, body }, ty))
    }

    /// Member read of an explicit type.
    pub fn member(&mut self, receiver: NodeId, member: Name, ty: TypeId) -> IrResult<NodeId> {
        self.check_node("receiver", receiver)?;
        if let Some(declared) = self.declared_member_type(self.ty(receiver), member)? {
            if !self.pool().is_assignable(declared, ty) {
                return Err(self.mismatch_types("ty", ty, declared));
            }
        }
        Ok(self.push(Node::Member { receiver, member }, ty))
    }

    /// Member read typed from the receiver's declaration.
    pub fn field(&mut self, receiver: NodeId, member: Name) -> IrResult<NodeId> {
        self.check_node("receiver", receiver)?;
        let receiver_ty = self.ty(receiver);
        let ty = match self.declared_member_type(receiver_ty, member)? {
            Some(ty) => ty,
            None => match self.pool().get(receiver_ty) {
                TypeData::Enumerator(element) if member == self.names().current => *element,
                TypeData::Grouping { key, .. } if self.name_str(member) == "key" => *key,
                _ => {
                    return Err(IrError::invalid(
                        "member",
                        format!(
                            "{} has no member `{}`",
                            self.display_type(receiver_ty),
                            self.name_str(member)
                        ),
                    ))
                }
            },
        };
        Ok(self.push(Node::Member { receiver, member }, ty))
    }

    /// Declared type of a non-method member of a record or tuple, when the
    /// receiver type declares members at all.
    fn declared_member_type(&self, receiver_ty: TypeId, member: Name) -> IrResult<Option<TypeId>> {
        match self.pool().get(receiver_ty) {
            TypeData::Named(_) => match self.pool().member(receiver_ty, member) {
                Some(m) if !m.is_method() => Ok(Some(m.ty())),
                Some(_) => Err(IrError::invalid(
                    "member",
                    format!("`{}` is a method", self.name_str(member)),
                )),
                None => Err(IrError::invalid(
                    "member",
                    format!(
                        "{} has no member `{}`",
                        self.display_type(receiver_ty),
                        self.name_str(member)
                    ),
                )),
            },
            TypeData::Tuple(_) => {
                let fields = self.pool().fields(receiver_ty).unwrap_or_default();
                match fields.iter().find(|(name, _)| *name == member) {
                    Some(&(_, ty)) => Ok(Some(ty)),
                    None => Err(IrError::invalid(
                        "member",
                        format!(
                            "{} has no field `{}`",
                            self.display_type(receiver_ty),
                            self.name_str(member)
                        ),
                    )),
                }
            }
            _ => Ok(None),
        }
    }

    /// Element access on an array or list with a single integer index.
    pub fn index(&mut self, receiver: NodeId, args: &[NodeId]) -> IrResult<NodeId> {
        self.check_node("receiver", receiver)?;
        for &arg in args {
            self.check_node("args", arg)?;
        }
        let receiver_ty = self.ty(receiver);
        let element = match self.pool().get(receiver_ty) {
            TypeData::Array(e) | TypeData::List(e) => *e,
            _ => return Err(self.mismatch("receiver", "an array or list", receiver_ty)),
        };
        match args {
            [arg] => self.check_assignable("args", *arg, TypeId::INT)?,
            _ => return Err(IrError::invalid("args", "expected exactly one index")),
        }
        let args = self.push_list(args);
        Ok(self.push(Node::Index { receiver, args }, element))
    }

    /// Object creation of `ty`.
    ///
    /// Collections start empty; tuples and records take one argument per
    /// field; exceptions take an optional message.
    pub fn new_object(&mut self, ty: TypeId, args: &[NodeId]) -> IrResult<NodeId> {
        for &arg in args {
            self.check_node("args", arg)?;
        }
        match self.pool().get(ty).clone() {
            TypeData::List(_) | TypeData::Lookup { .. } => {
                if !args.is_empty() {
                    return Err(IrError::invalid("args", "collections are created empty"));
                }
            }
            TypeData::Object => {
                if !args.is_empty() {
                    return Err(IrError::invalid("args", "object takes no arguments"));
                }
            }
            TypeData::Exception => match args {
                [] => {}
                [message] => self.check_assignable("args", *message, TypeId::STR)?,
                _ => return Err(IrError::invalid("args", "expected at most a message")),
            },
            TypeData::Tuple(_) | TypeData::Named(_) => {
                let fields = self.pool().fields(ty).unwrap_or_default();
                let is_named = matches!(self.pool().get(ty), TypeData::Named(_));
                if !(is_named && args.is_empty()) {
                    if fields.len() != args.len() {
                        return Err(IrError::invalid(
                            "args",
                            format!(
                                "{} has {} field(s), {} argument(s) supplied",
                                self.display_type(ty),
                                fields.len(),
                                args.len()
                            ),
                        ));
                    }
                    for (&arg, &(_, field_ty)) in args.iter().zip(&fields) {
                        self.check_assignable("args", arg, field_ty)?;
                    }
                }
            }
            _ => {
                return Err(IrError::invalid(
                    "ty",
                    format!("cannot create a value of type {}", self.display_type(ty)),
                ))
            }
        }
        let args = self.push_list(args);
        Ok(self.push(Node::New { args }, ty))
    }

    pub fn new_array(&mut self, element: TypeId, elements: &[NodeId]) -> IrResult<NodeId> {
        for &e in elements {
            self.check_node("elements", e)?;
            self.check_assignable("elements", e, element)?;
        }
        let ty = self.pool_mut().array(element);
        let elements = self.push_list(elements);
        Ok(self.push(Node::NewArray { elements }, ty))
    }

    pub fn type_is(&mut self, operand: NodeId, target: TypeId) -> IrResult<NodeId> {
        self.check_node("operand", operand)?;
        Ok(self.push(Node::TypeIs { operand, target }, TypeId::BOOL))
    }

    // ── Exceptions ──────────────────────────────────────────────

    /// Protected region. Needs at least one of handlers, `finally`, `fault`;
    /// `finally` and `fault` are exclusive.
    pub fn try_catch(
        &mut self,
        body: NodeId,
        handlers: &[CatchBlock],
        finally: NodeId,
        fault: NodeId,
    ) -> IrResult<NodeId> {
        self.check_node("body", body)?;
        self.check_optional("finally", finally)?;
        self.check_optional("fault", fault)?;
        if handlers.is_empty() && !finally.is_valid() && !fault.is_valid() {
            return Err(IrError::invalid(
                "handlers",
                "a try needs a catch, finally or fault block",
            ));
        }
        if finally.is_valid() && fault.is_valid() {
            return Err(IrError::invalid("fault", "finally and fault are exclusive"));
        }
        let ty = self.ty(body);
        for handler in handlers {
            if !self.pool().flags(handler.ty).contains(TypeFlags::EXCEPTION)
                && handler.ty != TypeId::OBJECT
            {
                return Err(self.mismatch("handlers", "an exception type", handler.ty));
            }
            if handler.variable.is_valid() {
                self.check_var("handlers", handler.variable)?;
                let var_ty = self.variable(handler.variable).ty;
                if !self.pool().is_assignable(handler.ty, var_ty) {
                    return Err(self.mismatch_types("handlers", var_ty, handler.ty));
                }
            }
            if handler.filter.is_valid() {
                self.check_node("handlers", handler.filter)?;
                self.check_assignable("handlers", handler.filter, TypeId::BOOL)?;
            }
            self.check_node("handlers", handler.body)?;
            if ty != TypeId::UNIT {
                self.check_assignable("handlers", handler.body, ty)?;
            }
        }
        let handlers = self.push_catches(handlers);
        Ok(self.push(
            Node::Try {
                body,
                handlers,
                finally,
                fault,
            },
            ty,
        ))
    }

    pub fn try_finally(&mut self, body: NodeId, finally: NodeId) -> IrResult<NodeId> {
        self.try_catch(body, &[], finally, NodeId::INVALID)
    }

    /// `throw value`, or a rethrow when `value` is `NodeId::INVALID`.
    pub fn throw(&mut self, value: NodeId) -> IrResult<NodeId> {
        if value.is_valid() {
            self.check_node("value", value)?;
            let ty = self.ty(value);
            if !self.pool().flags(ty).contains(TypeFlags::EXCEPTION) {
                return Err(self.mismatch("value", "an exception", ty));
            }
        }
        Ok(self.push(Node::Throw { value }, TypeId::NEVER))
    }

    // ── Extensions ──────────────────────────────────────────────

    /// `while` loop. Invalid labels are replaced with fresh ones.
    pub fn while_loop(
        &mut self,
        test: NodeId,
        body: NodeId,
        break_label: LabelId,
        continue_label: LabelId,
    ) -> IrResult<NodeId> {
        self.check_node("test", test)?;
        self.check_assignable("test", test, TypeId::BOOL)?;
        self.check_node("body", body)?;
        let (break_label, continue_label) = self.loop_labels_or(break_label, continue_label)?;
        Ok(self.push_extension(
            Extension::While(WhileLoop {
                test,
                body,
                break_label,
                continue_label,
            }),
            TypeId::UNIT,
        ))
    }

    pub fn do_while(
        &mut self,
        body: NodeId,
        test: NodeId,
        break_label: LabelId,
        continue_label: LabelId,
    ) -> IrResult<NodeId> {
        self.check_node("body", body)?;
        self.check_node("test", test)?;
        self.check_assignable("test", test, TypeId::BOOL)?;
        let (break_label, continue_label) = self.loop_labels_or(break_label, continue_label)?;
        Ok(self.push_extension(
            Extension::DoWhile(DoWhileLoop {
                body,
                test,
                break_label,
                continue_label,
            }),
            TypeId::UNIT,
        ))
    }

    /// `for` loop. `test` may be `NodeId::INVALID` for a loop without a condition.
    #[expect(clippy::too_many_arguments, reason = "mirrors the for-loop shape")]
    pub fn for_loop(
        &mut self,
        variables: &[VarId],
        initializers: &[NodeId],
        test: NodeId,
        steps: &[NodeId],
        body: NodeId,
        break_label: LabelId,
        continue_label: LabelId,
    ) -> IrResult<NodeId> {
        for &var in variables {
            self.check_var("variables", var)?;
        }
        for &init in initializers {
            self.check_node("initializers", init)?;
        }
        if test.is_valid() {
            self.check_node("test", test)?;
            self.check_assignable("test", test, TypeId::BOOL)?;
        }
        for &step in steps {
            self.check_node("steps", step)?;
        }
        self.check_node("body", body)?;
        let (break_label, continue_label) = self.loop_labels_or(break_label, continue_label)?;
        let variables = self.push_vars(variables);
        let initializers = self.push_list(initializers);
        let steps = self.push_list(steps);
        Ok(self.push_extension(
            Extension::For(ForLoop {
                variables,
                initializers,
                test,
                steps,
                body,
                break_label,
                continue_label,
            }),
            TypeId::UNIT,
        ))
    }

    /// `foreach` loop. The collection must be enumerable and its element type
    /// assignable to the loop variable.
    pub fn for_each(
        &mut self,
        variable: VarId,
        collection: NodeId,
        body: NodeId,
        break_label: LabelId,
        continue_label: LabelId,
    ) -> IrResult<NodeId> {
        self.check_var("variable", variable)?;
        self.check_node("collection", collection)?;
        self.check_node("body", body)?;
        let collection_ty = self.ty(collection);
        let Some(shape) = self.pool_mut().enumerator_shape(collection_ty) else {
            return Err(IrError::NotEnumerable {
                param: "collection",
                ty: self.display_type(collection_ty),
            });
        };
        let var_ty = self.variable(variable).ty;
        if !self.pool().is_assignable(shape.element, var_ty) {
            return Err(self.mismatch_types("variable", var_ty, shape.element));
        }
        let (break_label, continue_label) = self.loop_labels_or(break_label, continue_label)?;
        Ok(self.push_extension(
            Extension::ForEach(ForEachLoop {
                variable,
                collection,
                body,
                break_label,
                continue_label,
            }),
            TypeId::UNIT,
        ))
    }

    /// `using` block. `variable` may be `VarId::INVALID` for an unnamed resource.
    pub fn using_block(
        &mut self,
        variable: VarId,
        resource: NodeId,
        body: NodeId,
    ) -> IrResult<NodeId> {
        self.check_node("resource", resource)?;
        self.check_node("body", body)?;
        let resource_ty = self.ty(resource);
        if !self.pool().is_disposable(resource_ty) {
            return Err(IrError::NotDisposable {
                param: "resource",
                ty: self.display_type(resource_ty),
            });
        }
        if variable.is_valid() {
            self.check_var("variable", variable)?;
            let var_ty = self.variable(variable).ty;
            self.check_assignable("resource", resource, var_ty)?;
        }
        let ty = self.ty(body);
        Ok(self.push_extension(
            Extension::Using(UsingBlock {
                variable,
                resource,
                body,
            }),
            ty,
        ))
    }

    pub fn lock_block(&mut self, lock: NodeId, body: NodeId) -> IrResult<NodeId> {
        self.check_node("lock", lock)?;
        self.check_node("body", body)?;
        let lock_ty = self.ty(lock);
        if !self.pool().is_reference(lock_ty) {
            return Err(self.mismatch("lock", "a reference value", lock_ty));
        }
        let ty = self.ty(body);
        Ok(self.push_extension(Extension::Lock(LockBlock { lock, body }), ty))
    }

    pub fn tuple(&mut self, elements: &[NodeId]) -> IrResult<NodeId> {
        if elements.is_empty() {
            return Err(IrError::invalid("elements", "a tuple needs at least one element"));
        }
        for &e in elements {
            self.check_node("elements", e)?;
        }
        let tys: Vec<TypeId> = elements.iter().map(|&e| self.ty(e)).collect();
        let ty = self.pool_mut().tuple(&tys);
        let elements = self.push_list(elements);
        Ok(self.push_extension(Extension::Tuple(TupleNode { elements }), ty))
    }

    /// Interpolated string over literal and hole segments.
    pub fn format(&mut self, segments: &[NodeId]) -> IrResult<NodeId> {
        for &s in segments {
            self.check_node("segments", s)?;
        }
        let segments = self.push_list(segments);
        Ok(self.push_extension(Extension::Format(FormatString { segments }), TypeId::STR))
    }

    pub fn type_literal(&mut self, target: TypeId) -> NodeId {
        self.push_extension(Extension::TypeLiteral(TypeLiteral { target }), TypeId::TYPE)
    }

    /// Mutable wrapper of type `ty`, optionally already targeting `target`.
    pub fn slot(&mut self, ty: TypeId, target: NodeId) -> IrResult<(SlotId, NodeId)> {
        if target.is_valid() {
            self.check_node("target", target)?;
            self.check_assignable("target", target, ty)?;
        }
        Ok(self.push_slot(target, ty))
    }

    /// Re-target a slot. Later reductions of the slot see the new target.
    pub fn set_slot(&mut self, slot: SlotId, target: NodeId) -> IrResult<()> {
        self.check_slot("slot", slot)?;
        self.check_node("target", target)?;
        let ty = self.ty(self.slot_node(slot));
        self.check_assignable("target", target, ty)?;
        if self.reaches_slot(target, slot) {
            return Err(IrError::invalid(
                "target",
                "the new target contains the slot itself",
            ));
        }
        tracing::trace!(?slot, ?target, "slot retargeted");
        self.retarget_slot(slot, target);
        Ok(())
    }

    /// Whether `slot` is reachable from `from` through children and slot targets.
    fn reaches_slot(&self, from: NodeId, slot: SlotId) -> bool {
        let mut seen = FxHashSet::default();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if !id.is_valid() || !seen.insert(id) {
                continue;
            }
            if let Some(Extension::Slot(s)) = self.extension_of(id) {
                if *s == slot {
                    return true;
                }
                stack.push(self.slot_target(*s));
            }
            stack.extend(self.children(id));
        }
        false
    }

    /// Host-defined node of type `ty`.
    pub fn custom(&mut self, node: Arc<dyn CustomNode>, ty: TypeId) -> IrResult<NodeId> {
        for child in node.children() {
            self.check_optional("children", child)?;
        }
        Ok(self.push_extension(Extension::Custom(node), ty))
    }

    // ── Checks ──────────────────────────────────────────────────

    fn loop_labels_or(
        &mut self,
        break_label: LabelId,
        continue_label: LabelId,
    ) -> IrResult<(LabelId, LabelId)> {
        let break_label = if break_label.is_valid() {
            self.check_label("break_label", break_label)?;
            break_label
        } else {
            self.declare_label("break", TypeId::UNIT)
        };
        let continue_label = if continue_label.is_valid() {
            self.check_label("continue_label", continue_label)?;
            continue_label
        } else {
            self.declare_label("continue", TypeId::UNIT)
        };
        Ok((break_label, continue_label))
    }

    pub(crate) fn check_writable(&self, target: NodeId) -> IrResult<()> {
        self.check_node("target", target)?;
        match self.node(target) {
            Node::Parameter(_) | Node::Member { .. } | Node::Index { .. } => Ok(()),
            other => Err(IrError::invalid(
                "target",
                format!("{} is not assignable", other.tag()),
            )),
        }
    }

    fn expect_numeric(&self, param: &'static str, ty: TypeId) -> IrResult<()> {
        if self.pool().is_numeric(ty) {
            Ok(())
        } else {
            Err(self.mismatch(param, "a numeric value", ty))
        }
    }

    fn expect_same(&self, param: &'static str, expected: TypeId, found: TypeId) -> IrResult<()> {
        if expected == found {
            Ok(())
        } else {
            Err(self.mismatch_types(param, expected, found))
        }
    }

    fn mismatch(&self, param: &'static str, expected: &str, found: TypeId) -> IrError {
        IrError::TypeMismatch {
            param,
            expected: expected.to_owned(),
            found: self.display_type(found),
        }
    }

    fn mismatch_types(&self, param: &'static str, expected: TypeId, found: TypeId) -> IrError {
        IrError::TypeMismatch {
            param,
            expected: self.display_type(expected),
            found: self.display_type(found),
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
