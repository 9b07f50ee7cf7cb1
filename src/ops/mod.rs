//! Tensor-graph builder primitives
//!
//! Every builder validates its operands, infers the result type and returns
//! the new call as an [`Expr`]. Gradient rules are written entirely in terms
//! of these functions, so a gradient graph is ordinary IR.
//!
//! - [`tensor`]: elementwise arithmetic, comparison and selection
//! - [`init`]: constant-producing operators
//! - [`transform`]: reshape, transpose, tile, slice, concatenate, tuples
//! - [`reduce`]: reductions
//! - [`nn`]: convolution and pooling

pub mod init;
pub mod nn;
pub mod reduce;
pub mod tensor;
pub mod transform;

pub use init::{ones, ones_like, scalar, zeros, zeros_like};
pub use nn::{
    avg_pool2d, avg_pool2d_grad, conv2d, conv2d_transpose, max_pool2d, max_pool2d_grad,
};
pub use reduce::sum;
pub use tensor::{
    abs, add, clip, cos, divide, exp, less, log, multiply, negative, power, relu, sigmoid, sin,
    sqrt, subtract, tanh, where_,
};
pub use transform::{concatenate, reshape, strided_slice, tile, transpose, tuple, tuple_get_item};

use crate::ir::{Attrs, Call, Expr, OpKind, TensorType};

/// Wraps an already type-checked call.
fn build(op: OpKind, args: Vec<Expr>, attrs: impl Into<Attrs>, ty: TensorType) -> Expr {
    Expr::call(Call::new(op, args, attrs.into()), ty)
}
