//! Constant-producing operators.

use super::build;
use crate::error::Result;
use crate::ir::{Attrs, DType, Expr, OpKind, TensorType};

/// Rank-0 constant.
pub fn scalar(value: f64, dtype: DType) -> Expr {
    Expr::scalar(value, dtype)
}

pub fn zeros(shape: impl Into<Vec<usize>>, dtype: DType) -> Expr {
    build(OpKind::Zeros, vec![], Attrs::None, TensorType::new(shape, dtype))
}

pub fn ones(shape: impl Into<Vec<usize>>, dtype: DType) -> Expr {
    build(OpKind::Ones, vec![], Attrs::None, TensorType::new(shape, dtype))
}

/// Zeros with the shape and dtype of `x`.
pub fn zeros_like(x: &Expr) -> Result<Expr> {
    let ty = x.tensor_type(OpKind::ZerosLike)?.clone();
    Ok(build(OpKind::ZerosLike, vec![x.clone()], Attrs::None, ty))
}

/// Ones with the shape and dtype of `x`.
pub fn ones_like(x: &Expr) -> Result<Expr> {
    let ty = x.tensor_type(OpKind::OnesLike)?.clone();
    Ok(build(OpKind::OnesLike, vec![x.clone()], Attrs::None, ty))
}
