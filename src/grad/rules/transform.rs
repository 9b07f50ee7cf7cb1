//! Shape, broadcast and reduction rules.

use super::unpack;
use crate::error::Result;
use crate::grad::registry::RegistryBuilder;
use crate::ir::{Attrs, Expr, OpKind};
use crate::ops;
use crate::ops::reduce::{reduced_shape, resolve_axes};
use crate::ops::transform::{resolve_permutation, tuple_field_types};
use crate::shape::{broadcast_to_like, collapse_sum_like};

pub(super) fn register(builder: &mut RegistryBuilder) -> Result<()> {
    builder
        .register(OpKind::CollapseSumLike, collapse_sum_like_grad)?
        .register(OpKind::BroadcastToLike, broadcast_to_like_grad)?
        .register(OpKind::Reshape, reshape_grad)?
        .register(OpKind::Transpose, transpose_grad)?
        .register(OpKind::Sum, sum_grad)?
        .register_placeholder(OpKind::Concatenate, concatenate_grad)?
        .mark_non_differentiable(OpKind::Tile, "no gradient rule for tile")?
        .mark_non_differentiable(OpKind::StridedSlice, "no gradient rule for strided_slice")?;
    Ok(())
}

fn as_i64(shape: &[usize]) -> Vec<i64> {
    shape.iter().map(|&d| d as i64).collect()
}

/// `y` is only a shape template.
fn collapse_sum_like_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x, y]) = unpack::<2>(orig, OpKind::CollapseSumLike)?;
    Ok(vec![broadcast_to_like(grad, x)?, ops::zeros_like(y)?])
}

fn broadcast_to_like_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x, y]) = unpack::<2>(orig, OpKind::BroadcastToLike)?;
    Ok(vec![collapse_sum_like(grad, x)?, ops::zeros_like(y)?])
}

fn reshape_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Reshape;
    let (_, [x]) = unpack::<1>(orig, op)?;
    Ok(vec![ops::reshape(grad, &as_i64(x.shape(op)?))?])
}

/// Transposes back with the inverse permutation.
fn transpose_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Transpose;
    let (call, [x]) = unpack::<1>(orig, op)?;
    let attrs = call.expect_attrs("transpose", Attrs::transpose)?;

    let perm = resolve_permutation(x.tensor_type(op)?.ndim(), attrs.axes.as_deref())?;
    let mut inverse = vec![0i64; perm.len()];
    for (i, &axis) in perm.iter().enumerate() {
        inverse[axis] = i as i64;
    }
    Ok(vec![ops::transpose(grad, Some(inverse.as_slice()))?])
}

/// Restores the reduced axes as size 1, then broadcasts back up to `x`.
fn sum_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Sum;
    let (call, [x]) = unpack::<1>(orig, op)?;
    let attrs = call.expect_attrs("reduce", Attrs::reduce)?;

    let x_ty = x.tensor_type(op)?;
    let axes = resolve_axes(op, x_ty.ndim(), attrs.axes.as_deref())?;
    let kept = reduced_shape(&x_ty.shape, &axes, true);
    let grad = if grad.shape(op)? == kept.as_slice() {
        grad.clone()
    } else {
        ops::reshape(grad, &as_i64(&kept))?
    };
    Ok(vec![broadcast_to_like(&grad, x)?])
}

/// Zero gradient for every tuple field.
///
/// This does not split `grad` along the concatenation axis, so the result
/// disagrees with the operator's kernel. The registry flags the rule as a
/// placeholder.
fn concatenate_grad(orig: &Expr, _grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Concatenate;
    let (_, [fields]) = unpack::<1>(orig, op)?;
    let arity = tuple_field_types(op, fields.ty())?.len();
    let zeros = (0..arity)
        .map(|i| ops::zeros_like(&ops::tuple_get_item(fields, i)?))
        .collect::<Result<Vec<_>>>()?;
    Ok(vec![ops::tuple(zeros)])
}
