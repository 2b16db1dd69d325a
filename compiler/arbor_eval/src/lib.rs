//! Arbor Eval - Reference Evaluator for Reduced Trees
//!
//! Executes trees made only of primitive nodes, standing in for a backend
//! consuming fully reduced output. Any extension node left in the tree is
//! rejected with [`EvalError::Reducible`].
//!
//! - [`evaluate`] / [`evaluate_with`]: run a tree to a [`Value`]
//! - [`HostRegistry`]: host-provided methods on nominal types
//! - [`init_tracing`]: opt-in logging through `RUST_LOG`

mod environment;
mod errors;
mod host;
mod interpreter;
mod operators;
mod value;

use std::sync::Once;

use arbor_ir::{NodeArena, NodeId};

pub use environment::{Environment, LocalScope, Scope};
pub use errors::{EvalError, EvalResult};
pub use host::{HostMethod, HostRegistry};
pub use interpreter::Interpreter;
pub use operators::{evaluate_binary, evaluate_unary};
pub use value::{
    Closure, EnumeratorState, GroupingValue, ListValue, LookupValue, ObjectValue, Value,
};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=arbor_eval=debug`
/// or `RUST_LOG=arbor_ir=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Evaluate `root` with no host methods registered.
pub fn evaluate(arena: &NodeArena, root: NodeId) -> EvalResult<Value> {
    evaluate_with(arena, &HostRegistry::new(), root)
}

pub fn evaluate_with(arena: &NodeArena, host: &HostRegistry, root: NodeId) -> EvalResult<Value> {
    Interpreter::new(arena, host).run(root)
}
