//! Query lowering.
//!
//! A query lowers to a block that declares every variable up front:
//!
//! ```text
//! {
//!     $result = new List<T>          // Lookup<K, E> for `group by`
//!     <stage>
//!     ...
//!     $result
//! }
//! ```
//!
//! A stage is a run of clauses lowered by continuation: each clause builds
//! its construct around the lowering of the clauses after it, so `from`
//! becomes a `foreach` whose body is the rest of the stage.
//!
//! `orderby` ends a stage. The stage buffers one tuple per row holding the
//! live range variables and the sort keys, the buffer is sorted with
//! `sort_by_keys(key_offset, descending...)`, and the next stage starts with a
//! `foreach` over the buffer that restores the range variables.

use arbor_ir::{
    BinaryOp, Children, IrError, IrResult, KnownNames, LabelId, NodeArena, NodeId, TypeId, VarId,
};

use crate::clause::{Clause, Direction, Ordering};
use crate::query::Query;

/// Where the last clause of a stage delivers.
enum Sink<'s> {
    /// `select`/`group by` write into the result; reaching the sink is a bug.
    Result,
    Buffer {
        rows: VarId,
        live: &'s [VarId],
        orderings: &'s [Ordering],
    },
}

/// A sorted buffer the next stage iterates.
struct Resume {
    rows: VarId,
    row_ty: TypeId,
    live: Vec<VarId>,
}

struct Lowerer<'a> {
    arena: &'a mut NodeArena,
    names: KnownNames,
    /// Variables of the outer block.
    declared: Vec<VarId>,
    result: VarId,
}

#[tracing::instrument(level = "trace", skip_all, fields(clauses = query.clauses().len()))]
pub(crate) fn lower(arena: &mut NodeArena, query: &Query, id: NodeId) -> IrResult<NodeId> {
    let clauses = query.clauses();
    let result_ty = match clauses.last() {
        Some(&Clause::GroupBy { key, element }) => {
            let (key, element) = (arena.ty(key), arena.ty(element));
            arena.pool_mut().lookup(key, element)
        }
        _ => arena.pool_mut().list(query.element_type()),
    };
    let names = *arena.names();
    let result = arena.local("$result", result_ty);
    let mut declared: Vec<VarId> = clauses.iter().flat_map(Clause::declared).collect();
    declared.push(result);
    let mut lw = Lowerer {
        arena,
        names,
        declared,
        result,
    };

    let result_ref = lw.arena.parameter(result);
    let create = lw.arena.new_object(result_ty, &[])?;
    let mut body = vec![lw.arena.assign(result_ref, create)?];

    let mut live: Vec<VarId> = Vec::new();
    let mut resume: Option<Resume> = None;
    let mut start = 0;
    for (i, clause) in clauses.iter().enumerate() {
        let Clause::OrderBy { orderings } = clause else {
            continue;
        };
        let stage = &clauses[start..i];
        live.extend(stage.iter().filter_map(Clause::introduced));
        let row_ty = lw.row_type(&live, orderings);
        let rows_ty = lw.arena.pool_mut().list(row_ty);
        let rows = lw.temp("$rows", rows_ty);
        let rows_ref = lw.arena.parameter(rows);
        let fresh = lw.arena.new_object(rows_ty, &[])?;
        body.push(lw.arena.assign(rows_ref, fresh)?);
        let sink = Sink::Buffer {
            rows,
            live: &live,
            orderings,
        };
        body.push(lw.stage(resume.take(), stage, &sink)?);
        body.push(lw.sort(rows, live.len(), orderings)?);
        resume = Some(Resume {
            rows,
            row_ty,
            live: live.clone(),
        });
        start = i + 1;
    }
    body.push(lw.stage(resume, &clauses[start..], &Sink::Result)?);
    body.push(result_ref);

    tracing::debug!(
        stages = clauses.iter().filter(|c| matches!(c, Clause::OrderBy { .. })).count() + 1,
        "query lowered"
    );
    let ty = lw.arena.ty(id);
    let declared = std::mem::take(&mut lw.declared);
    lw.arena.block_typed(ty, &declared, &body)
}

impl Lowerer<'_> {
    fn temp(&mut self, name: &str, ty: TypeId) -> VarId {
        let var = self.arena.local(name, ty);
        self.declared.push(var);
        var
    }

    fn row_type(&mut self, live: &[VarId], orderings: &[Ordering]) -> TypeId {
        let mut fields: Vec<TypeId> = live.iter().map(|&v| self.arena.variable(v).ty).collect();
        fields.extend(orderings.iter().map(|o| self.arena.ty(o.key)));
        self.arena.pool_mut().tuple(&fields)
    }

    /// One stage, optionally preceded by iteration over a sorted buffer.
    fn stage(
        &mut self,
        resume: Option<Resume>,
        clauses: &[Clause],
        sink: &Sink<'_>,
    ) -> IrResult<NodeId> {
        let Some(resume) = resume else {
            return self.chain(clauses, sink);
        };
        let row = self.temp("$row", resume.row_ty);
        let row_ref = self.arena.parameter(row);
        let fields = self.arena.pool().fields(resume.row_ty).unwrap_or_default();
        let mut stmts = Vec::with_capacity(resume.live.len() + 1);
        for (&var, &(field, _)) in resume.live.iter().zip(&fields) {
            let value = self.arena.field(row_ref, field)?;
            let target = self.arena.parameter(var);
            stmts.push(self.arena.assign(target, value)?);
        }
        stmts.push(self.chain(clauses, sink)?);
        let body = self.arena.block_typed(TypeId::UNIT, &[], &stmts)?;
        let rows_ref = self.arena.parameter(resume.rows);
        self.arena
            .for_each(row, rows_ref, body, LabelId::INVALID, LabelId::INVALID)
    }

    /// Lower `clauses[0]` around the lowering of `clauses[1..]`.
    fn chain(&mut self, clauses: &[Clause], sink: &Sink<'_>) -> IrResult<NodeId> {
        let Some((clause, rest)) = clauses.split_first() else {
            return self.sink(sink);
        };
        match *clause {
            Clause::From { variable, source } => {
                let body = self.chain(rest, sink)?;
                self.arena
                    .for_each(variable, source, body, LabelId::INVALID, LabelId::INVALID)
            }
            Clause::Let { variable, value } => {
                let target = self.arena.parameter(variable);
                let store = self.arena.assign(target, value)?;
                let next = self.chain(rest, sink)?;
                self.arena.block_typed(TypeId::UNIT, &[], &[store, next])
            }
            Clause::Where { predicate } => {
                let next = self.chain(rest, sink)?;
                self.arena.if_then(predicate, next, NodeId::INVALID)
            }
            Clause::Join {
                variable,
                source,
                outer_key,
                inner_key,
            } => {
                let next = self.chain(rest, sink)?;
                let matched = self.arena.binary(BinaryOp::Equal, outer_key, inner_key)?;
                let guarded = self.arena.if_then(matched, next, NodeId::INVALID)?;
                self.arena
                    .for_each(variable, source, guarded, LabelId::INVALID, LabelId::INVALID)
            }
            Clause::GroupJoin {
                variable,
                source,
                outer_key,
                inner_key,
                into,
            } => {
                let element = self.arena.variable(variable).ty;
                let group_ty = self.arena.pool_mut().list(element);
                let group = self.temp("$group", group_ty);
                let group_ref = self.arena.parameter(group);
                let fresh = self.arena.new_object(group_ty, &[])?;
                let create = self.arena.assign(group_ref, fresh)?;

                let item = self.arena.parameter(variable);
                let add = self
                    .arena
                    .call(group_ref, self.names.add, &[item], TypeId::UNIT)?;
                let matched = self.arena.binary(BinaryOp::Equal, outer_key, inner_key)?;
                let guarded = self.arena.if_then(matched, add, NodeId::INVALID)?;
                let collect =
                    self.arena
                        .for_each(variable, source, guarded, LabelId::INVALID, LabelId::INVALID)?;

                let into_ref = self.arena.parameter(into);
                let publish = self.arena.assign(into_ref, group_ref)?;
                let next = self.chain(rest, sink)?;
                self.arena
                    .block_typed(TypeId::UNIT, &[], &[create, collect, publish, next])
            }
            Clause::OrderBy { .. } => Err(IrError::invariant("`orderby` inside a query stage")),
            Clause::Select { value } => {
                let result_ref = self.arena.parameter(self.result);
                self.arena
                    .call(result_ref, self.names.add, &[value], TypeId::UNIT)
            }
            Clause::GroupBy { key, element } => {
                let result_ref = self.arena.parameter(self.result);
                self.arena
                    .call(result_ref, self.names.add, &[key, element], TypeId::UNIT)
            }
        }
    }

    fn sink(&mut self, sink: &Sink<'_>) -> IrResult<NodeId> {
        match *sink {
            Sink::Result => Err(IrError::invariant("query stage ended without a termination")),
            Sink::Buffer {
                rows,
                live,
                orderings,
            } => {
                let mut elements: Children = live.iter().map(|&v| self.arena.parameter(v)).collect();
                elements.extend(orderings.iter().map(|o| o.key));
                let row = self.arena.tuple(&elements)?;
                let rows_ref = self.arena.parameter(rows);
                self.arena.call(rows_ref, self.names.add, &[row], TypeId::UNIT)
            }
        }
    }

    /// `rows.sort_by_keys(key_offset, descending...)`
    fn sort(&mut self, rows: VarId, key_offset: usize, orderings: &[Ordering]) -> IrResult<NodeId> {
        let offset = i64::try_from(key_offset)
            .map_err(|_| IrError::invariant("too many range variables to buffer"))?;
        let mut args = vec![self.arena.int(offset)];
        for ordering in orderings {
            args.push(
                self.arena
                    .boolean(ordering.direction == Direction::Descending),
            );
        }
        let rows_ref = self.arena.parameter(rows);
        self.arena
            .call(rows_ref, self.names.sort_by_keys, &args, TypeId::UNIT)
    }
}
