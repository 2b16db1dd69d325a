//! Query clauses.
//!
//! Clauses are plain values. They hold no reference to the query that owns
//! them; the lowering pass hands each clause its successors explicitly.

use std::fmt;

use smallvec::SmallVec;

use arbor_ir::{IrError, IrResult, NodeId, VarId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One key of an `orderby` clause.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ordering {
    pub key: NodeId,
    pub direction: Direction,
}

impl Ordering {
    pub fn ascending(key: NodeId) -> Self {
        Ordering {
            key,
            direction: Direction::Ascending,
        }
    }

    pub fn descending(key: NodeId) -> Self {
        Ordering {
            key,
            direction: Direction::Descending,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    From,
    Let,
    Where,
    Join,
    GroupJoin,
    OrderBy,
    Select,
    GroupBy,
}

impl ClauseKind {
    /// `select` and `group by` end a query.
    pub fn is_termination(self) -> bool {
        matches!(self, ClauseKind::Select | ClauseKind::GroupBy)
    }
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClauseKind::From => "from",
            ClauseKind::Let => "let",
            ClauseKind::Where => "where",
            ClauseKind::Join => "join",
            ClauseKind::GroupJoin => "join into",
            ClauseKind::OrderBy => "orderby",
            ClauseKind::Select => "select",
            ClauseKind::GroupBy => "group by",
        })
    }
}

/// A single query clause.
///
/// Range variables are arena variables; clause expressions read them through
/// [`NodeArena::parameter`](arbor_ir::NodeArena::parameter).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Clause {
    /// `from variable in source`
    From { variable: VarId, source: NodeId },
    /// `let variable = value`
    Let { variable: VarId, value: NodeId },
    /// `where predicate`
    Where { predicate: NodeId },
    /// `join variable in source on outer_key equals inner_key`
    Join {
        variable: VarId,
        source: NodeId,
        outer_key: NodeId,
        inner_key: NodeId,
    },
    /// `join variable in source on outer_key equals inner_key into into`
    ///
    /// Only `into` is visible to later clauses.
    GroupJoin {
        variable: VarId,
        source: NodeId,
        outer_key: NodeId,
        inner_key: NodeId,
        into: VarId,
    },
    /// `orderby key1 [descending], key2 ...`
    OrderBy { orderings: SmallVec<[Ordering; 2]> },
    /// `select value`
    Select { value: NodeId },
    /// `group element by key`
    GroupBy { key: NodeId, element: NodeId },
}

impl Clause {
    pub fn kind(&self) -> ClauseKind {
        match self {
            Clause::From { .. } => ClauseKind::From,
            Clause::Let { .. } => ClauseKind::Let,
            Clause::Where { .. } => ClauseKind::Where,
            Clause::Join { .. } => ClauseKind::Join,
            Clause::GroupJoin { .. } => ClauseKind::GroupJoin,
            Clause::OrderBy { .. } => ClauseKind::OrderBy,
            Clause::Select { .. } => ClauseKind::Select,
            Clause::GroupBy { .. } => ClauseKind::GroupBy,
        }
    }

    pub fn is_termination(&self) -> bool {
        self.kind().is_termination()
    }

    /// The range variable visible to the clauses after this one.
    pub fn introduced(&self) -> Option<VarId> {
        match *self {
            Clause::From { variable, .. }
            | Clause::Let { variable, .. }
            | Clause::Join { variable, .. } => Some(variable),
            Clause::GroupJoin { into, .. } => Some(into),
            Clause::Where { .. }
            | Clause::OrderBy { .. }
            | Clause::Select { .. }
            | Clause::GroupBy { .. } => None,
        }
    }

    /// Every variable the clause declares, including ones private to it.
    pub fn declared(&self) -> SmallVec<[VarId; 2]> {
        match *self {
            Clause::GroupJoin { variable, into, .. } => SmallVec::from_buf([variable, into]),
            _ => self.introduced().into_iter().collect(),
        }
    }

    /// Expression children in a fixed order.
    pub fn children(&self) -> SmallVec<[NodeId; 4]> {
        match self {
            Clause::From { source, .. } => smallvec::smallvec![*source],
            Clause::Let { value, .. } => smallvec::smallvec![*value],
            Clause::Where { predicate } => smallvec::smallvec![*predicate],
            Clause::Join {
                source,
                outer_key,
                inner_key,
                ..
            }
            | Clause::GroupJoin {
                source,
                outer_key,
                inner_key,
                ..
            } => smallvec::smallvec![*source, *outer_key, *inner_key],
            Clause::OrderBy { orderings } => orderings.iter().map(|o| o.key).collect(),
            Clause::Select { value } => smallvec::smallvec![*value],
            Clause::GroupBy { key, element } => smallvec::smallvec![*key, *element],
        }
    }

    /// Rebuild over children taken in [`children`](Self::children) order.
    pub(crate) fn rebuild(&self, next: &mut impl Iterator<Item = NodeId>) -> IrResult<Clause> {
        let mut take = || {
            next.next()
                .ok_or_else(|| IrError::invalid("children", "too few children for the query"))
        };
        Ok(match self {
            Clause::From { variable, .. } => Clause::From {
                variable: *variable,
                source: take()?,
            },
            Clause::Let { variable, .. } => Clause::Let {
                variable: *variable,
                value: take()?,
            },
            Clause::Where { .. } => Clause::Where { predicate: take()? },
            Clause::Join { variable, .. } => Clause::Join {
                variable: *variable,
                source: take()?,
                outer_key: take()?,
                inner_key: take()?,
            },
            Clause::GroupJoin { variable, into, .. } => Clause::GroupJoin {
                variable: *variable,
                source: take()?,
                outer_key: take()?,
                inner_key: take()?,
                into: *into,
            },
            Clause::OrderBy { orderings } => {
                let mut rebuilt = SmallVec::with_capacity(orderings.len());
                for ordering in orderings {
                    rebuilt.push(Ordering {
                        key: take()?,
                        direction: ordering.direction,
                    });
                }
                Clause::OrderBy { orderings: rebuilt }
            }
            Clause::Select { .. } => Clause::Select { value: take()? },
            Clause::GroupBy { .. } => Clause::GroupBy {
                key: take()?,
                element: take()?,
            },
        })
    }
}
