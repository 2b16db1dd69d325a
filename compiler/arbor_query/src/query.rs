//! Validated clause chains and their registration as custom nodes.

use std::any::Any;
use std::sync::Arc;

use arbor_ir::{CustomNode, IrError, IrResult, NodeArena, NodeId, TypeData, TypeId, VarId};

use crate::clause::{Clause, ClauseKind};
use crate::lower::lower;

/// A query expression.
///
/// Invariants, checked by [`Query::new`]:
/// - the first clause is `from`
/// - the last clause is `select` or `group by`, and no other clause is
/// - every clause expression is well typed against its range variables
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    clauses: Vec<Clause>,
    element: TypeId,
    ty: TypeId,
}

impl Query {
    #[tracing::instrument(level = "trace", skip_all, fields(clauses = clauses.len()))]
    pub fn new(arena: &mut NodeArena, clauses: Vec<Clause>) -> IrResult<Query> {
        check_shape(&clauses)?;
        for clause in &clauses {
            check_clause(arena, clause)?;
        }
        let element = match clauses.last() {
            Some(Clause::Select { value }) => arena.ty(*value),
            Some(Clause::GroupBy { key, element }) => {
                let (key, element) = (arena.ty(*key), arena.ty(*element));
                arena.pool_mut().grouping(key, element)
            }
            _ => return Err(IrError::invariant("validated query without a termination")),
        };
        let ty = arena.pool_mut().sequence(element);
        Ok(Query {
            clauses,
            element,
            ty,
        })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Element type of the produced sequence: the projected type, or a
    /// grouping for `group by`.
    pub fn element_type(&self) -> TypeId {
        self.element
    }

    /// `Sequence<element>`.
    pub fn ty(&self) -> TypeId {
        self.ty
    }

    /// Register as a custom node of type [`Query::ty`].
    pub fn into_node(self, arena: &mut NodeArena) -> IrResult<NodeId> {
        let ty = self.ty;
        arena.custom(Arc::new(self), ty)
    }
}

impl CustomNode for Query {
    fn kind_name(&self) -> &'static str {
        "query"
    }

    fn children(&self) -> Vec<NodeId> {
        self.clauses.iter().flat_map(Clause::children).collect()
    }

    fn with_children(
        &self,
        arena: &mut NodeArena,
        children: &[NodeId],
    ) -> Result<Arc<dyn CustomNode>, IrError> {
        let mut next = children.iter().copied();
        let clauses = self
            .clauses
            .iter()
            .map(|clause| clause.rebuild(&mut next))
            .collect::<IrResult<Vec<_>>>()?;
        if next.next().is_some() {
            return Err(IrError::invalid("children", "too many children for the query"));
        }
        Ok(Arc::new(Query::new(arena, clauses)?))
    }

    fn reduce(&self, arena: &mut NodeArena, id: NodeId) -> Result<NodeId, IrError> {
        lower(arena, self, id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn malformed(message: impl Into<String>) -> IrError {
    IrError::MalformedQuery(message.into())
}

/// Clause ordering rules.
fn check_shape(clauses: &[Clause]) -> IrResult<()> {
    let (Some(first), Some(last)) = (clauses.first(), clauses.last()) else {
        return Err(malformed("a query needs at least one clause"));
    };
    if first.kind() != ClauseKind::From {
        return Err(malformed(format!(
            "a query must start with `from`, found `{}`",
            first.kind()
        )));
    }
    if !last.is_termination() {
        return Err(malformed(format!(
            "a query must end with `select` or `group by`, found `{}`",
            last.kind()
        )));
    }
    let interior = &clauses[..clauses.len() - 1];
    if let Some(pos) = interior.iter().position(Clause::is_termination) {
        return Err(malformed(format!(
            "`{}` at clause {pos} ends the query early",
            interior[pos].kind()
        )));
    }
    Ok(())
}

fn check_clause(arena: &mut NodeArena, clause: &Clause) -> IrResult<()> {
    for child in clause.children() {
        arena.check_node("clauses", child)?;
    }
    for var in clause.declared() {
        arena.check_var("clauses", var)?;
    }
    match *clause {
        Clause::From { variable, source } => check_source(arena, variable, source),
        Clause::Let { variable, value } => {
            let var_ty = arena.variable(variable).ty;
            arena.check_assignable("value", value, var_ty)
        }
        Clause::Where { predicate } => expect_bool(arena, predicate),
        Clause::Join {
            variable,
            source,
            outer_key,
            inner_key,
        } => {
            check_source(arena, variable, source)?;
            check_keys(arena, outer_key, inner_key)
        }
        Clause::GroupJoin {
            variable,
            source,
            outer_key,
            inner_key,
            into,
        } => {
            check_source(arena, variable, source)?;
            check_keys(arena, outer_key, inner_key)?;
            let element = arena.variable(variable).ty;
            let group = arena.pool_mut().list(element);
            let into_ty = arena.variable(into).ty;
            if arena.pool().is_assignable(group, into_ty) {
                Ok(())
            } else {
                Err(IrError::TypeMismatch {
                    param: "into",
                    expected: arena.display_type(into_ty),
                    found: arena.display_type(group),
                })
            }
        }
        Clause::OrderBy { ref orderings } => {
            if orderings.is_empty() {
                return Err(malformed("`orderby` needs at least one key"));
            }
            for ordering in orderings {
                let ty = arena.ty(ordering.key);
                if !arena.pool().is_numeric(ty) && ty != TypeId::STR && ty != TypeId::BOOL {
                    return Err(IrError::TypeMismatch {
                        param: "orderings",
                        expected: "a numeric, string or bool key".to_owned(),
                        found: arena.display_type(ty),
                    });
                }
            }
            Ok(())
        }
        Clause::Select { .. } => Ok(()),
        Clause::GroupBy { key, .. } => {
            let ty = arena.ty(key);
            if matches!(arena.pool().get(ty), TypeData::Unit | TypeData::Never) {
                return Err(IrError::invalid("key", "grouping key has no value"));
            }
            Ok(())
        }
    }
}

/// `source` is enumerable and its elements fit `variable`.
fn check_source(arena: &mut NodeArena, variable: VarId, source: NodeId) -> IrResult<()> {
    let source_ty = arena.ty(source);
    let Some(shape) = arena.pool_mut().enumerator_shape(source_ty) else {
        return Err(IrError::NotEnumerable {
            param: "source",
            ty: arena.display_type(source_ty),
        });
    };
    let var_ty = arena.variable(variable).ty;
    if arena.pool().is_assignable(shape.element, var_ty) {
        Ok(())
    } else {
        Err(IrError::TypeMismatch {
            param: "variable",
            expected: arena.display_type(var_ty),
            found: arena.display_type(shape.element),
        })
    }
}

fn check_keys(arena: &NodeArena, outer: NodeId, inner: NodeId) -> IrResult<()> {
    let (outer_ty, inner_ty) = (arena.ty(outer), arena.ty(inner));
    if outer_ty == inner_ty {
        Ok(())
    } else {
        Err(IrError::TypeMismatch {
            param: "inner_key",
            expected: arena.display_type(outer_ty),
            found: arena.display_type(inner_ty),
        })
    }
}

fn expect_bool(arena: &NodeArena, predicate: NodeId) -> IrResult<()> {
    if arena.ty(predicate) == TypeId::BOOL {
        Ok(())
    } else {
        Err(IrError::TypeMismatch {
            param: "predicate",
            expected: "bool".to_owned(),
            found: arena.display_type(arena.ty(predicate)),
        })
    }
}
