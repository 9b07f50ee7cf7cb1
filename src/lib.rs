//! Harp-grad: reverse-mode gradient rules for the harp tensor IR
//!
//! Given a forward operator call and the gradient of its output, harp-grad
//! builds the gradients of the call's arguments as ordinary IR expressions,
//! so backward graphs go through the same optimization and code generation
//! as forward ones.
//!
//! # Architecture
//!
//! - **ir**: expressions, operator kinds, attributes and types
//! - **ops**: builder primitives with shape and dtype inference
//! - **shape**: broadcasting, gradient collapse and window arithmetic
//! - **grad**: gradient rule library and the registry that dispatches it
//! - **error**: error kinds shared by all of the above
//!
//! Walking a whole graph in reverse and accumulating gradients is left to the
//! caller. It looks up one rule per call through
//! [`grad::lookup_gradient_rule`] or [`grad::gradient`].

// ============================================================================
// Core Modules
// ============================================================================

pub mod error;
pub mod grad;
pub mod ir;
pub mod ops;
pub mod shape;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{GradError, Result};
pub use grad::{GradientRegistry, GradientRule, RegistryConfig, gradient, lookup_gradient_rule};
pub use ir::{DType, Expr, OpKind, TensorType, Type};

// ============================================================================
// Prelude
// ============================================================================

/// Prelude module with commonly used types and functions
pub mod prelude {
    pub use crate::error::{GradError, Result};
    pub use crate::grad::{
        GradientRegistry, GradientRule, RegistryBuilder, RegistryConfig, RuleStatus,
        global_registry, gradient, lookup_gradient_rule,
    };
    pub use crate::ir::{
        Attrs, Call, ClipAttrs, Conv2dAttrs, DType, Expr, OpKind, Padding, Pool2dAttrs,
        TensorType, Type,
    };
    pub use crate::ops;
    pub use crate::shape::{broadcast_to_like, collapse_sum_like};
}
