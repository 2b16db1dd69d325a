//! Runtime failures of the reference evaluator.
//!
//! Exceptions thrown by the evaluated tree are values, not errors: they
//! unwind through `try` nodes and only become [`EvalError::Uncaught`] when
//! they escape the root.

use arbor_ir::NodeId;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// The tree still contains a node that must be reduced first.
    #[error("reducible node `{kind}` ({node:?}) reached the evaluator")]
    Reducible { node: NodeId, kind: &'static str },

    #[error("variable `{name}` is not bound")]
    UnboundVariable { name: String },

    #[error("{receiver} has no method `{method}`")]
    NoSuchMethod { receiver: String, method: String },

    #[error("{receiver} has no member `{member}`")]
    NoSuchMember { receiver: String, member: String },

    #[error("type error: {0}")]
    TypeError(String),

    #[error("division by zero")]
    DivideByZero,

    #[error("arithmetic overflow in `{op}`")]
    Overflow { op: &'static str },

    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("null reference: {0}")]
    NullReference(String),

    #[error("cannot convert {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("invalid enumerator state: {0}")]
    Enumerator(String),

    #[error("uncaught exception: {message}")]
    Uncaught { message: String },

    #[error("jump to label `{label}` escaped its scope")]
    UnhandledJump { label: String },

    /// Failure reported by a registered host method.
    #[error("host method failed: {0}")]
    Host(String),
}

pub type EvalResult<T> = Result<T, EvalError>;

pub(crate) fn type_error(message: impl Into<String>) -> EvalError {
    EvalError::TypeError(message.into())
}

pub(crate) fn null_reference(context: impl Into<String>) -> EvalError {
    EvalError::NullReference(context.into())
}
