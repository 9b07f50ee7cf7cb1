//! Rules for constant-producing operators. Their gradients are always zero.

use super::unpack;
use crate::error::Result;
use crate::grad::registry::RegistryBuilder;
use crate::ir::{Expr, OpKind};
use crate::ops;

pub(super) fn register(builder: &mut RegistryBuilder) -> Result<()> {
    builder
        .register(OpKind::Zeros, zeros_grad)?
        .register(OpKind::Ones, ones_grad)?
        .register(OpKind::ZerosLike, zeros_like_grad)?
        .register(OpKind::OnesLike, ones_like_grad)?;
    Ok(())
}

fn zeros_grad(orig: &Expr, _grad: &Expr) -> Result<Vec<Expr>> {
    unpack::<0>(orig, OpKind::Zeros)?;
    Ok(vec![])
}

fn ones_grad(orig: &Expr, _grad: &Expr) -> Result<Vec<Expr>> {
    unpack::<0>(orig, OpKind::Ones)?;
    Ok(vec![])
}

/// The result is itself a zero tensor shaped like `x`.
fn zeros_like_grad(orig: &Expr, _grad: &Expr) -> Result<Vec<Expr>> {
    unpack::<1>(orig, OpKind::ZerosLike)?;
    Ok(vec![orig.clone()])
}

fn ones_like_grad(orig: &Expr, _grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x]) = unpack::<1>(orig, OpKind::OnesLike)?;
    Ok(vec![ops::zeros_like(x)?])
}
