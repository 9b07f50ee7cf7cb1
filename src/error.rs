//! Error types for gradient construction
//!
//! Every failure in this crate is local and synchronous: nothing is retried,
//! and each variant carries the operator kind plus the values needed to
//! diagnose the problem.

use thiserror::Error;

use crate::ir::{OpKind, Type};

/// Errors raised while building IR expressions or applying gradient rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradError {
    /// Layout attribute outside the set a convolution or pooling operator supports.
    #[error("{op}: unsupported {role} layout `{layout}` (supported: {supported})")]
    UnsupportedLayout {
        op: OpKind,
        role: &'static str,
        layout: String,
        supported: &'static str,
    },

    /// Registry lookup miss, including kinds marked as non-differentiable.
    #[error("no gradient rule registered for operator `{op}`")]
    MissingGradientRule { op: String },

    /// A second registration for an operator kind that already has an entry.
    #[error("operator `{op}` already has a gradient registration")]
    DuplicateRegistration { op: OpKind },

    /// A derived window extent came out smaller than the kernel it must cover.
    #[error("{op}: derived {quantity} is {derived}, expected at least {minimum}")]
    ShapeArithmeticViolation {
        op: OpKind,
        quantity: &'static str,
        derived: i64,
        minimum: i64,
    },

    /// Attribute missing, of the wrong kind, or out of range.
    #[error("{op}: invalid attribute `{name}`: {reason}")]
    InvalidAttribute {
        op: OpKind,
        name: &'static str,
        reason: String,
    },

    /// Operand shapes that cannot be broadcast, collapsed or combined.
    #[error("{op}: incompatible shapes {lhs:?} and {rhs:?}")]
    IncompatibleShapes {
        op: OpKind,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    /// Wrong number of operands, or a rule returning the wrong number of gradients.
    #[error("{op}: expected {expected} {what}, got {actual}")]
    ArityMismatch {
        op: OpKind,
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Operand of the wrong type (tuple where a tensor is needed, dtype clash, ...).
    #[error("{op}: expected {expected}, got {actual}")]
    TypeMismatch {
        op: OpKind,
        expected: String,
        actual: String,
    },

    /// Tuple projection out of range, or applied to a tensor.
    #[error("cannot project field {index} out of {ty}")]
    TupleProjection { index: usize, ty: Type },

    /// A rule produced a gradient whose type differs from its argument's type.
    #[error("{op}: gradient for argument {index} has type {actual}, expected {expected}")]
    GradientTypeMismatch {
        op: OpKind,
        index: usize,
        expected: Type,
        actual: Type,
    },
}

impl GradError {
    pub(crate) fn invalid_attribute(
        op: OpKind,
        name: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        GradError::InvalidAttribute {
            op,
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn type_mismatch(
        op: OpKind,
        expected: impl Into<String>,
        actual: impl ToString,
    ) -> Self {
        GradError::TypeMismatch {
            op,
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    /// Returns `true` for registry misses, which a traversal driver usually
    /// reports as "operator is not differentiable".
    pub fn is_missing_rule(&self) -> bool {
        matches!(self, GradError::MissingGradientRule { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GradError>;
