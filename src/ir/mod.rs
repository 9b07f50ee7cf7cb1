//! Tensor IR node model
//!
//! The data model every gradient rule consumes and produces:
//!
//! - [`Expr`]: shared, immutable expression handle (variable, constant,
//!   call, tuple, tuple projection) carrying its checked [`Type`]
//! - [`Call`]: operator application with an [`OpKind`] and an [`Attrs`] record
//! - [`Type`] / [`TensorType`] / [`DType`]: fixed shapes and element types
//!
//! Types of calls built through [`crate::ops`] are inferred on construction.
//! Calls coming from an upstream front-end can be built with [`Expr::call`]
//! and an already inferred type.

mod attrs;
mod expr;
mod op;
mod types;

pub use attrs::{
    Attrs, ClipAttrs, ConcatenateAttrs, Conv2dAttrs, Conv2dTransposeAttrs, Padding, Pool2dAttrs,
    ReduceAttrs, ReshapeAttrs, StridedSliceAttrs, TileAttrs, TransposeAttrs,
};
pub use expr::{Call, Expr, ExprKind, ExprNode, Literal};
pub use op::OpKind;
pub use types::{DType, TensorType, Type};
