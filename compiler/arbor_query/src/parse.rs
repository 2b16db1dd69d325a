//! Recovering clauses from a compiled comprehension call chain.
//!
//! A compiled query is a chain of static calls whose first argument is the
//! previous stage and whose other arguments are lambdas:
//!
//! ```text
//! select(where(xs, (x) => x % 2 == 0), (x) => x * 10)
//! ```
//!
//! Multi-source operators (`select_many`, `join`, `group_join`) and `let`
//! carry every visible range variable forward in a compiler-introduced
//! pass-through record (a type flagged `TRANSPARENT`). Later lambdas read
//! `t.x` where the query text said `x`. The parser keeps a table describing
//! how the current element maps onto range variables and substitutes those
//! member paths with the variables themselves, so the recovered clauses
//! mention only their own range variables.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use arbor_ir::{IrError, IrResult, Name, Node, NodeArena, NodeId, Substitution, TypeId, VarId};

use crate::clause::{Clause, Direction, Ordering};
use crate::query::Query;

/// How the element flowing between two operators maps onto range variables.
#[derive(Clone, Debug)]
enum Current {
    Var(VarId),
    /// A transparent record; one entry per field, in field order.
    Record {
        ty: TypeId,
        fields: Vec<(Name, Current)>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Op {
    Select,
    SelectMany,
    Where,
    GroupBy,
    GroupJoin,
    Join,
    OrderBy(Direction),
    ThenBy(Direction),
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Select => "select",
            Op::SelectMany => "select_many",
            Op::Where => "where",
            Op::GroupBy => "group_by",
            Op::GroupJoin => "group_join",
            Op::Join => "join",
            Op::OrderBy(Direction::Ascending) => "order_by",
            Op::OrderBy(Direction::Descending) => "order_by_descending",
            Op::ThenBy(Direction::Ascending) => "then_by",
            Op::ThenBy(Direction::Descending) => "then_by_descending",
        }
    }

    const ALL: [Op; 10] = [
        Op::Select,
        Op::SelectMany,
        Op::Where,
        Op::GroupBy,
        Op::GroupJoin,
        Op::Join,
        Op::OrderBy(Direction::Ascending),
        Op::OrderBy(Direction::Descending),
        Op::ThenBy(Direction::Ascending),
        Op::ThenBy(Direction::Descending),
    ];
}

fn malformed(message: impl Into<String>) -> IrError {
    IrError::MalformedQuery(message.into())
}

/// Rebuild the [`Query`] a comprehension call chain was compiled from.
///
/// A chain that does not end in a projection gets an implicit `select` of
/// the current element.
#[tracing::instrument(level = "trace", skip(arena))]
pub fn parse_call_chain(arena: &mut NodeArena, root: NodeId) -> IrResult<Query> {
    arena.check_node("root", root)?;
    let ops: Vec<(Name, Op)> = Op::ALL
        .iter()
        .map(|&op| (arena.intern(op.name()), op))
        .collect();

    let mut calls: Vec<(Op, Vec<NodeId>)> = Vec::new();
    let mut cursor = root;
    while let Node::Call {
        receiver,
        method,
        args,
    } = *arena.node(cursor)
    {
        let Some(&(_, op)) = ops.iter().find(|(name, _)| *name == method) else {
            break;
        };
        if receiver.is_valid() {
            break;
        }
        let args = arena.get_list(args).to_vec();
        let Some(&source) = args.first() else {
            return Err(malformed(format!("`{}` has no source", op.name())));
        };
        calls.push((op, args));
        cursor = source;
    }
    if calls.is_empty() {
        return Err(malformed("not a comprehension call chain"));
    }
    calls.reverse();

    let mut parser = ChainParser {
        arena,
        clauses: Vec::with_capacity(calls.len() + 1),
        range_vars: FxHashSet::default(),
    };
    let mut current = parser.start(cursor, &calls[0])?;
    let last = calls.len() - 1;
    for (i, (op, args)) in calls.iter().enumerate() {
        current = parser.apply(*op, args, current, i == last)?;
    }
    if !parser.clauses.last().is_some_and(Clause::is_termination) {
        let value = parser.value_of(&current)?;
        parser.clauses.push(Clause::Select { value });
    }
    tracing::debug!(clauses = parser.clauses.len(), "call chain parsed");
    let clauses = parser.clauses;
    Query::new(parser.arena, clauses)
}

struct ChainParser<'a> {
    arena: &'a mut NodeArena,
    clauses: Vec<Clause>,
    range_vars: FxHashSet<VarId>,
}

impl ChainParser<'_> {
    /// `from x in source`, where `x` is the first lambda parameter of the
    /// innermost operator.
    fn start(&mut self, source: NodeId, (op, args): &(Op, Vec<NodeId>)) -> IrResult<Current> {
        let first_lambda = args[1..]
            .iter()
            .find_map(|&arg| match *self.arena.node(arg) {
                Node::Lambda { params, .. } => self.arena.get_vars(params).first().copied(),
                _ => None,
            })
            .ok_or_else(|| malformed(format!("`{}` has no lambda argument", op.name())))?;
        self.range_vars.insert(first_lambda);
        self.clauses.push(Clause::From {
            variable: first_lambda,
            source,
        });
        Ok(Current::Var(first_lambda))
    }

    fn apply(&mut self, op: Op, args: &[NodeId], current: Current, last: bool) -> IrResult<Current> {
        match op {
            Op::Where => {
                let predicate = self.selector(op, args.get(1), &current)?;
                self.clauses.push(Clause::Where { predicate });
                Ok(current)
            }
            Op::OrderBy(direction) => {
                let key = self.selector(op, args.get(1), &current)?;
                let mut orderings = SmallVec::new();
                orderings.push(Ordering { key, direction });
                self.clauses.push(Clause::OrderBy { orderings });
                Ok(current)
            }
            Op::ThenBy(direction) => {
                let key = self.selector(op, args.get(1), &current)?;
                match self.clauses.last_mut() {
                    Some(Clause::OrderBy { orderings }) => {
                        orderings.push(Ordering { key, direction });
                        Ok(current)
                    }
                    _ => Err(malformed(format!(
                        "`{}` must follow `order_by`",
                        op.name()
                    ))),
                }
            }
            Op::Select => {
                let value = self.selector(op, args.get(1), &current)?;
                self.project(value, last)
            }
            Op::SelectMany => {
                let source = self.selector(op, args.get(1), &current)?;
                let Some(result) = args.get(2) else {
                    let (params, _) = self.lambda(op, args.get(1), 1)?;
                    let variable = self.fresh_like(params[0], source)?;
                    self.clauses.push(Clause::From { variable, source });
                    return Ok(Current::Var(variable));
                };
                let (params, body) = self.lambda(op, Some(result), 2)?;
                let variable = params[1];
                self.range_vars.insert(variable);
                self.clauses.push(Clause::From { variable, source });
                let value = self.bind(
                    body,
                    &[(params[0], current), (variable, Current::Var(variable))],
                )?;
                self.project(value, last)
            }
            Op::Join | Op::GroupJoin => {
                let inner = *args
                    .get(1)
                    .ok_or_else(|| malformed(format!("`{}` has no inner source", op.name())))?;
                let outer_key = self.selector(op, args.get(2), &current)?;
                let (inner_params, inner_body) = self.lambda(op, args.get(3), 1)?;
                let (params, body) = self.lambda(op, args.get(4), 2)?;
                if op == Op::Join {
                    let variable = params[1];
                    self.range_vars.insert(variable);
                    let inner_key =
                        self.bind(inner_body, &[(inner_params[0], Current::Var(variable))])?;
                    self.clauses.push(Clause::Join {
                        variable,
                        source: inner,
                        outer_key,
                        inner_key,
                    });
                    let value = self.bind(
                        body,
                        &[(params[0], current), (variable, Current::Var(variable))],
                    )?;
                    self.project(value, last)
                } else {
                    let (variable, into) = (inner_params[0], params[1]);
                    self.range_vars.insert(into);
                    self.clauses.push(Clause::GroupJoin {
                        variable,
                        source: inner,
                        outer_key,
                        inner_key: inner_body,
                        into,
                    });
                    let value = self.bind(body, &[(params[0], current), (into, Current::Var(into))])?;
                    self.project(value, last)
                }
            }
            Op::GroupBy => {
                if !last {
                    return Err(malformed("`group_by` must end the call chain"));
                }
                let key = self.selector(op, args.get(1), &current)?;
                let element = match args.get(2) {
                    Some(_) => self.selector(op, args.get(2), &current)?,
                    None => self.value_of(&current)?,
                };
                self.clauses.push(Clause::GroupBy { key, element });
                Ok(current)
            }
        }
    }

    /// The body of a one-parameter lambda, with its parameter bound to `current`.
    fn selector(&mut self, op: Op, arg: Option<&NodeId>, current: &Current) -> IrResult<NodeId> {
        let (params, body) = self.lambda(op, arg, 1)?;
        self.bind(body, &[(params[0], current.clone())])
    }

    fn lambda(
        &self,
        op: Op,
        arg: Option<&NodeId>,
        arity: usize,
    ) -> IrResult<(SmallVec<[VarId; 2]>, NodeId)> {
        let Some(&arg) = arg else {
            return Err(malformed(format!("`{}` is missing a lambda", op.name())));
        };
        let Node::Lambda { params, body } = *self.arena.node(arg) else {
            return Err(malformed(format!(
                "arguments of `{}` must be lambdas, found {}",
                op.name(),
                self.arena.tag(arg)
            )));
        };
        let params: SmallVec<[VarId; 2]> = self.arena.get_vars(params).iter().copied().collect();
        if params.len() != arity {
            return Err(malformed(format!(
                "`{}` expects a lambda of {arity} parameter(s), found {}",
                op.name(),
                params.len()
            )));
        }
        Ok((params, body))
    }

    /// A projection. Mid-chain, a transparent record extends the range
    /// variables and anything else continues as a new range variable.
    ///
    /// A continuation (`select .. into y`) becomes `let y = ..` rather than a
    /// fresh scope. Earlier range variables stay declared, but every later
    /// operator's lambda receives only the projected element, so no later
    /// clause can name them. Per row, the result is the same as restarting
    /// the query over the projected sequence.
    fn project(&mut self, value: NodeId, last: bool) -> IrResult<Current> {
        if last {
            self.clauses.push(Clause::Select { value });
            return Ok(Current::Var(VarId::INVALID));
        }
        if let Some(record) = self.record_of(value)? {
            return Ok(record);
        }
        let ty = self.arena.ty(value);
        let variable = self.arena.local("$projection", ty);
        self.range_vars.insert(variable);
        self.clauses.push(Clause::Let { variable, value });
        Ok(Current::Var(variable))
    }

    /// Decompose `new Transparent { a = .., b = .. }`. Fields that are not
    /// already range variables become `let` clauses named after the field.
    fn record_of(&mut self, value: NodeId) -> IrResult<Option<Current>> {
        let ty = self.arena.ty(value);
        if !self.arena.pool().is_transparent(ty) {
            return Ok(None);
        }
        let Node::New { args } = *self.arena.node(value) else {
            return Ok(None);
        };
        let args = self.arena.get_list(args).to_vec();
        let names = self.arena.pool().fields(ty).unwrap_or_default();
        if names.len() != args.len() {
            return Err(malformed(format!(
                "pass-through record {} is not fully initialized",
                self.arena.display_type(ty)
            )));
        }
        let mut fields = Vec::with_capacity(args.len());
        for (&(name, field_ty), &arg) in names.iter().zip(&args) {
            let field = match *self.arena.node(arg) {
                Node::Parameter(var) if self.range_vars.contains(&var) => Current::Var(var),
                _ => match self.record_of(arg)? {
                    Some(nested) => nested,
                    None => {
                        let variable = self.arena.declare_variable(name, field_ty);
                        self.range_vars.insert(variable);
                        self.clauses.push(Clause::Let {
                            variable,
                            value: arg,
                        });
                        Current::Var(variable)
                    }
                },
            };
            fields.push((name, field));
        }
        Ok(Some(Current::Record { ty, fields }))
    }

    /// Substitute lambda parameters with what they stand for.
    fn bind(&mut self, body: NodeId, bindings: &[(VarId, Current)]) -> IrResult<NodeId> {
        let mut subst = Substitution::new();
        let mut path = Vec::new();
        for (param, current) in bindings {
            self.add_binding(&mut subst, *param, &mut path, current)?;
        }
        subst.apply(self.arena, body)
    }

    fn add_binding(
        &mut self,
        subst: &mut Substitution,
        param: VarId,
        path: &mut Vec<Name>,
        current: &Current,
    ) -> IrResult<()> {
        match current {
            Current::Var(var) if !var.is_valid() => {
                return Err(malformed("operator applied after the final projection"));
            }
            Current::Var(var) => {
                let replacement = self.arena.parameter(*var);
                subst.replace_path(param, path, replacement);
            }
            Current::Record { fields, .. } => {
                let whole = self.value_of(current)?;
                subst.replace_path(param, path, whole);
                for (name, field) in fields {
                    path.push(*name);
                    self.add_binding(subst, param, path, field)?;
                    path.pop();
                }
            }
        }
        Ok(())
    }

    /// The current element as a value.
    fn value_of(&mut self, current: &Current) -> IrResult<NodeId> {
        match current {
            Current::Var(var) if !var.is_valid() => {
                Err(malformed("operator applied after the final projection"))
            }
            Current::Var(var) => Ok(self.arena.parameter(*var)),
            Current::Record { ty, fields } => {
                let mut values = Vec::with_capacity(fields.len());
                for (_, field) in fields {
                    values.push(self.value_of(field)?);
                }
                self.arena.new_object(*ty, &values)
            }
        }
    }

    /// A range variable for `select_many` without a result selector.
    fn fresh_like(&mut self, param: VarId, source: NodeId) -> IrResult<VarId> {
        let source_ty = self.arena.ty(source);
        let Some(element) = self.arena.pool().element_type(source_ty) else {
            return Err(IrError::NotEnumerable {
                param: "source",
                ty: self.arena.display_type(source_ty),
            });
        };
        let name = self.arena.variable(param).name;
        let variable = self.arena.declare_variable(name, element);
        self.range_vars.insert(variable);
        Ok(variable)
    }
}
