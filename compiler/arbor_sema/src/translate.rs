//! Semantic-tree translation: host operations into arena nodes.
//!
//! The translator walks an [`Operation`] tree with a [`Binder`] mapping host
//! symbols to arena variables. Every construct that introduces symbols
//! (block, lambda, catch, `for`, `foreach`, `using`, query range variables)
//! translates its body under a child binder. Loop constructs push their
//! break/continue labels so `break` and `continue` resolve to the innermost
//! loop; lambdas start a fresh loop context of their own.

use arbor_ir::{
    CatchBlock, ConstValue, IrError, IrResult, LabelId, NodeArena, NodeId, TypeId, UnaryOp, VarId,
};
use arbor_query::{Clause, Ordering, Query};
use arbor_stack::ensure_sufficient_stack;

use crate::binder::Binder;
use crate::operation::{CatchClause, Operation, OperationKind, QueryClause, SymbolId, TypeResolver};

/// Translate `root` with no symbols bound outside it.
#[tracing::instrument(level = "debug", skip_all, fields(kind = root.kind.describe()))]
pub fn translate(
    arena: &mut NodeArena,
    resolver: &dyn TypeResolver,
    root: &Operation,
) -> IrResult<NodeId> {
    let binder = Binder::root(&[], &[])?;
    Translator::new(arena, resolver).body(&binder, root)
}

/// Return target of the body being translated. The label is declared on the
/// first `return` that needs it.
struct ReturnTarget {
    ty: TypeId,
    label: Option<LabelId>,
}

/// Translation state over one arena.
pub struct Translator<'a> {
    arena: &'a mut NodeArena,
    resolver: &'a dyn TypeResolver,
    /// `(break, continue)` labels of the enclosing loops, innermost last.
    loops: Vec<(LabelId, LabelId)>,
    returns: Vec<ReturnTarget>,
}

impl<'a> Translator<'a> {
    pub fn new(arena: &'a mut NodeArena, resolver: &'a dyn TypeResolver) -> Self {
        Translator {
            arena,
            resolver,
            loops: Vec::new(),
            returns: Vec::new(),
        }
    }

    /// A fresh arena variable for `symbol`.
    pub fn declare(&mut self, symbol: SymbolId) -> IrResult<VarId> {
        let missing = || IrError::BindingNotFound {
            symbol: format!("{symbol:?}"),
        };
        let name = self.resolver.symbol_name(symbol).ok_or_else(missing)?;
        let ty = self.resolver.symbol_type(symbol).ok_or_else(missing)?;
        Ok(self.arena.declare_variable(name, ty))
    }

    /// Translate a function or lambda body; `return` jumps to its end.
    pub fn body(&mut self, binder: &Binder<SymbolId>, op: &Operation) -> IrResult<NodeId> {
        self.returns.push(ReturnTarget {
            ty: op.ty,
            label: None,
        });
        let saved_loops = std::mem::take(&mut self.loops);
        let translated = self.expr(binder, op);
        self.loops = saved_loops;
        let target = self.returns.pop();
        let translated = translated?;
        match target.and_then(|t| t.label) {
            Some(label) => self.arena.label_node(label, translated),
            None => Ok(translated),
        }
    }

    pub fn expr(&mut self, binder: &Binder<SymbolId>, op: &Operation) -> IrResult<NodeId> {
        ensure_sufficient_stack(|| self.expr_inner(binder, op))
    }

    fn optional(
        &mut self,
        binder: &Binder<SymbolId>,
        op: Option<&Operation>,
    ) -> IrResult<NodeId> {
        match op {
            Some(op) => self.expr(binder, op),
            None => Ok(NodeId::INVALID),
        }
    }

    fn list(&mut self, binder: &Binder<SymbolId>, ops: &[Operation]) -> IrResult<Vec<NodeId>> {
        ops.iter().map(|op| self.expr(binder, op)).collect()
    }

    fn scope(
        &mut self,
        binder: &Binder<SymbolId>,
        locals: &[SymbolId],
    ) -> IrResult<(Binder<SymbolId>, Vec<VarId>)> {
        let vars = locals
            .iter()
            .map(|&local| self.declare(local))
            .collect::<IrResult<Vec<_>>>()?;
        let child = binder.child(locals, &vars)?;
        Ok((child, vars))
    }

    /// Translate a loop body with its labels in scope.
    fn in_loop(
        &mut self,
        binder: &Binder<SymbolId>,
        body: &Operation,
    ) -> IrResult<(NodeId, LabelId, LabelId)> {
        let (brk, cont) = self.arena.loop_labels();
        self.loops.push((brk, cont));
        let body = self.expr(binder, body);
        self.loops.pop();
        Ok((body?, brk, cont))
    }

    fn expr_inner(&mut self, binder: &Binder<SymbolId>, op: &Operation) -> IrResult<NodeId> {
        match &op.kind {
            OperationKind::Literal(ConstValue::Null) => self.arena.null(op.ty),
            OperationKind::Literal(value) => Ok(self.arena.constant(*value)),
            OperationKind::DefaultValue => Ok(self.arena.default_value(op.ty)),
            OperationKind::LocalReference(symbol) => {
                let var = binder.lookup(*symbol)?;
                Ok(self.arena.parameter(var))
            }
            OperationKind::Unary { op: unary, operand } => {
                let operand = self.expr(binder, operand)?;
                self.arena.unary(*unary, operand)
            }
            OperationKind::Conversion {
                operand,
                checked,
                try_cast,
            } => {
                let operand = self.expr(binder, operand)?;
                let conversion = match (*try_cast, *checked) {
                    (true, _) => UnaryOp::TypeAs,
                    (false, true) => UnaryOp::ConvertChecked,
                    (false, false) => UnaryOp::Convert,
                };
                self.arena.convert(conversion, operand, op.ty)
            }
            OperationKind::Binary {
                op: binary,
                left,
                right,
            } => {
                let left = self.expr(binder, left)?;
                let right = self.expr(binder, right)?;
                self.arena.binary(*binary, left, right)
            }
            OperationKind::Conditional {
                test,
                when_true,
                when_false,
            } => {
                let test = self.expr(binder, test)?;
                let when_true = self.expr(binder, when_true)?;
                match when_false {
                    Some(when_false) => {
                        let when_false = self.expr(binder, when_false)?;
                        self.arena.conditional(test, when_true, when_false, op.ty)
                    }
                    None => self.arena.if_then(test, when_true, NodeId::INVALID),
                }
            }
            OperationKind::Block { locals, statements } => {
                let (inner, vars) = self.scope(binder, locals)?;
                let statements = self.list(&inner, statements)?;
                self.arena.block_typed(op.ty, &vars, &statements)
            }
            OperationKind::Assignment { target, value } => {
                let target = self.expr(binder, target)?;
                let value = self.expr(binder, value)?;
                self.arena.assign(target, value)
            }
            OperationKind::CompoundAssignment {
                op: assign,
                target,
                value,
            } => {
                let target = self.expr(binder, target)?;
                let value = self.expr(binder, value)?;
                self.arena.compound_assign(*assign, target, value)
            }
            OperationKind::Increment { op: assign, target } => {
                let target = self.expr(binder, target)?;
                self.arena.increment(*assign, target)
            }
            OperationKind::Call {
                receiver,
                method,
                args,
            } => {
                let receiver = self.optional(binder, receiver.as_deref())?;
                let args = self.list(binder, args)?;
                self.arena.call(receiver, *method, &args, op.ty)
            }
            OperationKind::Invoke { callee, args } => {
                let callee = self.expr(binder, callee)?;
                let args = self.list(binder, args)?;
                self.arena.invoke(callee, &args)
            }
            OperationKind::Lambda { params, body } => {
                let (inner, vars) = self.scope(binder, params)?;
                let body = self.body(&inner, body)?;
                self.arena.lambda(&vars, body)
            }
            OperationKind::MemberAccess { receiver, member } => {
                let receiver = self.expr(binder, receiver)?;
                self.arena.member(receiver, *member, op.ty)
            }
            OperationKind::ElementAccess { receiver, index } => {
                let receiver = self.expr(binder, receiver)?;
                let index = self.expr(binder, index)?;
                self.arena.index(receiver, &[index])
            }
            OperationKind::ObjectCreation { args } => {
                let args = self.list(binder, args)?;
                self.arena.new_object(op.ty, &args)
            }
            OperationKind::ArrayCreation { element, elements } => {
                let elements = self.list(binder, elements)?;
                self.arena.new_array(*element, &elements)
            }
            OperationKind::TypeTest { operand, target } => {
                let operand = self.expr(binder, operand)?;
                self.arena.type_is(operand, *target)
            }
            OperationKind::Throw(value) => {
                let value = self.optional(binder, value.as_deref())?;
                self.arena.throw(value)
            }
            OperationKind::Try {
                body,
                catches,
                finally,
            } => {
                let body = self.expr(binder, body)?;
                let handlers = catches
                    .iter()
                    .map(|catch| self.catch(binder, catch))
                    .collect::<IrResult<Vec<_>>>()?;
                let finally = self.optional(binder, finally.as_deref())?;
                self.arena
                    .try_catch(body, &handlers, finally, NodeId::INVALID)
            }
            OperationKind::Return(value) => {
                let value = self.optional(binder, value.as_deref())?;
                let label = self.return_label()?;
                self.arena.return_to(label, value)
            }
            OperationKind::While { test, body } => {
                let test = self.expr(binder, test)?;
                let (body, brk, cont) = self.in_loop(binder, body)?;
                self.arena.while_loop(test, body, brk, cont)
            }
            OperationKind::DoWhile { body, test } => {
                let (body, brk, cont) = self.in_loop(binder, body)?;
                let test = self.expr(binder, test)?;
                self.arena.do_while(body, test, brk, cont)
            }
            OperationKind::For {
                locals,
                initializers,
                test,
                steps,
                body,
            } => {
                let (inner, vars) = self.scope(binder, locals)?;
                let initializers = self.list(&inner, initializers)?;
                let test = self.optional(&inner, test.as_deref())?;
                let (body, brk, cont) = self.in_loop(&inner, body)?;
                let steps = self.list(&inner, steps)?;
                self.arena
                    .for_loop(&vars, &initializers, test, &steps, body, brk, cont)
            }
            OperationKind::ForEach {
                local,
                collection,
                body,
            } => {
                let collection = self.expr(binder, collection)?;
                let var = self.declare(*local)?;
                let inner = binder.child_single(*local, var);
                let (body, brk, cont) = self.in_loop(&inner, body)?;
                self.arena.for_each(var, collection, body, brk, cont)
            }
            OperationKind::Break | OperationKind::Continue => {
                let construct = op.kind.describe();
                let Some(&(brk, cont)) = self.loops.last() else {
                    return Err(IrError::UnsupportedOperation {
                        construct: construct.to_owned(),
                        reason: "not inside a loop".to_owned(),
                    });
                };
                if matches!(op.kind, OperationKind::Break) {
                    self.arena.break_to(brk)
                } else {
                    self.arena.continue_to(cont)
                }
            }
            OperationKind::Using {
                local,
                resource,
                body,
            } => {
                let resource = self.expr(binder, resource)?;
                let (var, inner) = match local {
                    Some(local) => {
                        let var = self.declare(*local)?;
                        (var, binder.child_single(*local, var))
                    }
                    None => (VarId::INVALID, binder.clone()),
                };
                let body = self.expr(&inner, body)?;
                self.arena.using_block(var, resource, body)
            }
            OperationKind::Lock { lock, body } => {
                let lock = self.expr(binder, lock)?;
                let body = self.expr(binder, body)?;
                self.arena.lock_block(lock, body)
            }
            OperationKind::Tuple(elements) => {
                let elements = self.list(binder, elements)?;
                self.arena.tuple(&elements)
            }
            OperationKind::Interpolation(parts) => {
                let parts = self.list(binder, parts)?;
                self.arena.format(&parts)
            }
            OperationKind::TypeOf(ty) => Ok(self.arena.type_literal(*ty)),
            OperationKind::Query(clauses) => self.query(binder, clauses),
            OperationKind::AddressOf(_) => Err(IrError::UnsupportedOperation {
                construct: op.kind.describe().to_owned(),
                reason: "pointers have no tree representation".to_owned(),
            }),
            OperationKind::Fixed { .. } => Err(IrError::UnsupportedOperation {
                construct: op.kind.describe().to_owned(),
                reason: "pinned pointers have no tree representation".to_owned(),
            }),
            OperationKind::Invalid(description) => Err(IrError::UnsupportedOperation {
                construct: op.kind.describe().to_owned(),
                reason: description.clone(),
            }),
        }
    }

    fn catch(&mut self, binder: &Binder<SymbolId>, catch: &CatchClause) -> IrResult<CatchBlock> {
        let (variable, inner) = match catch.local {
            Some(local) => {
                let var = self.declare(local)?;
                (var, binder.child_single(local, var))
            }
            None => (VarId::INVALID, binder.clone()),
        };
        let filter = self.optional(&inner, catch.filter.as_ref())?;
        let body = self.expr(&inner, &catch.body)?;
        Ok(CatchBlock {
            ty: catch.ty,
            variable,
            filter,
            body,
        })
    }

    fn return_label(&mut self) -> IrResult<LabelId> {
        let Some(target) = self.returns.last_mut() else {
            return Err(IrError::UnsupportedOperation {
                construct: "return".to_owned(),
                reason: "not inside a body".to_owned(),
            });
        };
        if let Some(label) = target.label {
            return Ok(label);
        }
        let label = self.arena.declare_label("return", target.ty);
        target.label = Some(label);
        Ok(label)
    }

    /// Range variables scope over the clauses after the one introducing them.
    #[tracing::instrument(level = "trace", skip_all, fields(clauses = clauses.len()))]
    fn query(&mut self, binder: &Binder<SymbolId>, clauses: &[QueryClause]) -> IrResult<NodeId> {
        let mut scope = binder.clone();
        let mut translated = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let clause = match clause {
                QueryClause::From { local, source } => {
                    let source = self.expr(&scope, source)?;
                    let variable = self.declare(*local)?;
                    scope = scope.child_single(*local, variable);
                    Clause::From { variable, source }
                }
                QueryClause::Let { local, value } => {
                    let value = self.expr(&scope, value)?;
                    let variable = self.declare(*local)?;
                    scope = scope.child_single(*local, variable);
                    Clause::Let { variable, value }
                }
                QueryClause::Where(predicate) => Clause::Where {
                    predicate: self.expr(&scope, predicate)?,
                },
                QueryClause::Join {
                    local,
                    source,
                    outer_key,
                    inner_key,
                } => {
                    let source = self.expr(&scope, source)?;
                    let outer_key = self.expr(&scope, outer_key)?;
                    let variable = self.declare(*local)?;
                    // The inner key sees only the joined variable.
                    let inner_key = self.expr(&binder.child_single(*local, variable), inner_key)?;
                    scope = scope.child_single(*local, variable);
                    Clause::Join {
                        variable,
                        source,
                        outer_key,
                        inner_key,
                    }
                }
                QueryClause::GroupJoin {
                    local,
                    source,
                    outer_key,
                    inner_key,
                    into,
                } => {
                    let source = self.expr(&scope, source)?;
                    let outer_key = self.expr(&scope, outer_key)?;
                    let variable = self.declare(*local)?;
                    let inner_key = self.expr(&binder.child_single(*local, variable), inner_key)?;
                    let into_var = self.declare(*into)?;
                    scope = scope.child_single(*into, into_var);
                    Clause::GroupJoin {
                        variable,
                        source,
                        outer_key,
                        inner_key,
                        into: into_var,
                    }
                }
                QueryClause::OrderBy(keys) => {
                    let mut orderings = smallvec::SmallVec::with_capacity(keys.len());
                    for (key, direction) in keys {
                        orderings.push(Ordering {
                            key: self.expr(&scope, key)?,
                            direction: *direction,
                        });
                    }
                    Clause::OrderBy { orderings }
                }
                QueryClause::Select(value) => Clause::Select {
                    value: self.expr(&scope, value)?,
                },
                QueryClause::GroupBy { key, element } => Clause::GroupBy {
                    key: self.expr(&scope, key)?,
                    element: self.expr(&scope, element)?,
                },
            };
            translated.push(clause);
        }
        tracing::debug!(clauses = translated.len(), "query translated");
        Query::new(self.arena, translated)?.into_node(self.arena)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
