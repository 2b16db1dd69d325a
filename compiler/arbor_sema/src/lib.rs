//! Arbor Sema - From the Host's Semantic Tree to the Node Algebra
//!
//! - [`Binder`]: persistent symbol-to-variable scopes
//! - [`Operation`]: the typed operation tree a host compiler hands over,
//!   with symbols resolved through a [`TypeResolver`]
//! - [`translate`]: maps operations onto primitive and extension nodes,
//!   including query expressions through `arbor_query`
//!
//! Constructs with no tree representation (`AddressOf`, `Fixed`, invalid
//! operations, `break` outside a loop) fail with
//! [`IrError::UnsupportedOperation`](arbor_ir::IrError::UnsupportedOperation).

mod binder;
mod operation;
mod translate;

pub use binder::Binder;
pub use operation::{
    CatchClause, Operation, OperationKind, QueryClause, SymbolId, SymbolTable, TypeResolver,
};
pub use translate::{translate, Translator};
