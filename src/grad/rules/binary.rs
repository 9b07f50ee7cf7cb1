//! Broadcasting binary rules.
//!
//! Each rule computes its gradients at the output (broadcast) shape and
//! collapses them back to the operand shapes.

use super::{scalar_like, unpack};
use crate::error::Result;
use crate::grad::registry::RegistryBuilder;
use crate::ir::{Expr, OpKind};
use crate::ops;
use crate::shape::collapse_sum_like;

pub(super) fn register(builder: &mut RegistryBuilder) -> Result<()> {
    builder
        .register(OpKind::Add, add_grad)?
        .register(OpKind::Subtract, subtract_grad)?
        .register(OpKind::Multiply, multiply_grad)?
        .register(OpKind::Divide, divide_grad)?
        .register(OpKind::Power, power_grad)?
        .register(OpKind::Where, where_grad)?
        .mark_non_differentiable(OpKind::Less, "comparison result is piecewise constant")?;
    Ok(())
}

fn add_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x, y]) = unpack::<2>(orig, OpKind::Add)?;
    Ok(vec![collapse_sum_like(grad, x)?, collapse_sum_like(grad, y)?])
}

fn subtract_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x, y]) = unpack::<2>(orig, OpKind::Subtract)?;
    Ok(vec![
        collapse_sum_like(grad, x)?,
        collapse_sum_like(&ops::negative(grad)?, y)?,
    ])
}

fn multiply_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x, y]) = unpack::<2>(orig, OpKind::Multiply)?;
    Ok(vec![
        collapse_sum_like(&ops::multiply(grad, y)?, x)?,
        collapse_sum_like(&ops::multiply(grad, x)?, y)?,
    ])
}

/// `d/dy (x / y) = -orig / y`
fn divide_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x, y]) = unpack::<2>(orig, OpKind::Divide)?;
    let dy = ops::divide(&ops::multiply(&ops::negative(grad)?, orig)?, y)?;
    Ok(vec![
        collapse_sum_like(&ops::divide(grad, y)?, x)?,
        collapse_sum_like(&dy, y)?,
    ])
}

/// `d/dx = y * x^(y - 1)`, `d/dy = orig * log(x)`
fn power_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Power;
    let (_, [x, y]) = unpack::<2>(orig, op)?;
    let y_minus_one = ops::subtract(y, &scalar_like(1.0, y, op)?)?;
    let dx = ops::multiply(&ops::multiply(grad, y)?, &ops::power(x, &y_minus_one)?)?;
    let dy = ops::multiply(&ops::multiply(grad, orig)?, &ops::log(x)?)?;
    Ok(vec![collapse_sum_like(&dx, x)?, collapse_sum_like(&dy, y)?])
}

/// The condition gets a zero gradient; each branch receives `grad` where it
/// was selected.
fn where_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Where;
    let (_, [cond, x, y]) = unpack::<3>(orig, op)?;
    let zero = scalar_like(0.0, grad, op)?;
    Ok(vec![
        ops::zeros_like(cond)?,
        collapse_sum_like(&ops::where_(cond, grad, &zero)?, x)?,
        collapse_sum_like(&ops::where_(cond, &zero, grad)?, y)?,
    ])
}
