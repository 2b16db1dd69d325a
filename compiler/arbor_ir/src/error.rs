//! Errors raised while building, reducing and visiting trees.
//!
//! Callers match on [`IrError::category`] rather than message text, and
//! attach source locations themselves before surfacing anything to a user.

use crate::{NodeId, NodeTag};

/// Broad error category.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A factory rejected its arguments. Always local to the call.
    Validation,
    /// A recognized construct that is intentionally not lowered.
    Unsupported,
    /// A symbol lookup walked off the end of the scope chain.
    Lookup,
    /// The algebra itself is inconsistent. Indicates a bug, not bad input.
    Invariant,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    #[error("invalid argument `{param}`: {reason}")]
    InvalidArgument { param: &'static str, reason: String },

    #[error("type mismatch for `{param}`: expected {expected}, found {found}")]
    TypeMismatch {
        param: &'static str,
        expected: String,
        found: String,
    },

    #[error("`{param}` of type {ty} does not implement the enumerable capability")]
    NotEnumerable { param: &'static str, ty: String },

    #[error("`{param}` of type {ty} does not implement the disposable capability")]
    NotDisposable { param: &'static str, ty: String },

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("unsupported node {tag} ({node:?}): {reason}")]
    Unsupported {
        node: NodeId,
        tag: NodeTag,
        reason: String,
    },

    #[error("unsupported operation `{construct}`: {reason}")]
    UnsupportedOperation { construct: String, reason: String },

    #[error("binding not found for `{symbol}`")]
    BindingNotFound { symbol: String },

    #[error("compiler invariant violated: {0}")]
    Invariant(String),
}

impl IrError {
    pub fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        IrError::InvalidArgument {
            param,
            reason: reason.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        IrError::Invariant(message.into())
    }

    pub fn unsupported(node: NodeId, tag: NodeTag, reason: impl Into<String>) -> Self {
        IrError::Unsupported {
            node,
            tag,
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            IrError::InvalidArgument { .. }
            | IrError::TypeMismatch { .. }
            | IrError::NotEnumerable { .. }
            | IrError::NotDisposable { .. }
            | IrError::MalformedQuery(_) => ErrorCategory::Validation,
            IrError::Unsupported { .. } | IrError::UnsupportedOperation { .. } => {
                ErrorCategory::Unsupported
            }
            IrError::BindingNotFound { .. } => ErrorCategory::Lookup,
            IrError::Invariant(_) => ErrorCategory::Invariant,
        }
    }
}

pub type IrResult<T> = Result<T, IrError>;
