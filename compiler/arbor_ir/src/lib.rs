//! Arbor IR - Expression-Tree Node Algebra
//!
//! This crate contains the core of the Arbor tree engine:
//! - Interned names and resolved types ([`TypePool`])
//! - The closed set of primitive node kinds plus an open extension kind
//! - Validating factories, identity-preserving update and reduction
//! - The generic visitor, structural rewriting and the outbound contract check
//!
//! # Design Philosophy
//!
//! - **Flatten Everything**: nodes live in a [`NodeArena`] and refer to each
//!   other by [`NodeId`]; lists are ranges into flat side tables
//! - **Immutable Nodes**: a node never changes after allocation, so identity
//!   is id equality and "nothing changed" is cheap to detect
//! - **Reduce, Don't Extend the Backend**: every extension kind lowers to
//!   primitive kinds one step at a time
//!
//! Constants store floats as u64 bits so nodes stay `Eq + Hash`.

mod arena;
mod build;
mod error;
pub mod extension;
mod ids;
mod interner;
mod known;
mod name;
pub mod node;
pub mod reduce;
pub mod rewrite;
#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod test_support;
pub mod types;
mod update;
pub mod validate;
pub mod visitor;

pub use arena::NodeArena;
pub use error::{ErrorCategory, IrError, IrResult};
pub use extension::{CustomNode, Extension};
pub use ids::{CatchRange, ExtId, LabelId, NodeId, NodeRange, SlotId, VarId, VarRange};
pub use interner::{SharedInterner, StringInterner};
pub use known::KnownNames;
pub use name::Name;
pub use node::{
    AssignOp, BinaryFamily, BinaryOp, CatchBlock, ConstValue, GotoKind, LabelTarget, Node,
    NodeTag, UnaryOp, Variable,
};
pub use reduce::MAX_REDUCTION_STEPS;
pub use rewrite::{reduce_fully, Rewriter, Substitution};
pub use types::{Member, MemberKind, TypeData, TypeFlags, TypeId, TypePool};
pub use update::Children;
pub use visitor::{visit, DispatchTable, ScopeStack, Visitor};
