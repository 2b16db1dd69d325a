//! Arbor Query - Comprehension Clauses as a Custom Node Kind
//!
//! A [`Query`] is a validated chain of clauses (`from`, `let`, `where`,
//! `join`, `join into`, `orderby`, `select`, `group by`) registered in a
//! [`NodeArena`](arbor_ir::NodeArena) as a custom extension node. It reduces
//! to nested `foreach` loops that fill a result collection, so any consumer
//! that handles primitive nodes handles queries.
//!
//! [`parse_call_chain`] goes the other way: it recovers the clause form from
//! a compiled chain of `select`/`where`/`join`/... static calls, unwrapping
//! the pass-through records the compiler uses to carry range variables.

mod clause;
mod lower;
mod parse;
mod query;

pub use clause::{Clause, ClauseKind, Direction, Ordering};
pub use parse::parse_call_chain;
pub use query::Query;
