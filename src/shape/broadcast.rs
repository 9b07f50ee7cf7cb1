//! Broadcasting and broadcast-aware gradient reduction.
//!
//! Binary rules compute their gradients at the broadcast (output) shape and
//! route them through [`collapse_sum_like`] to get back to each operand's
//! shape. Keeping that reduction here means every rule shares exactly the same
//! semantics.

use crate::error::{GradError, Result};
use crate::ir::{Attrs, Call, Expr, OpKind, TensorType};

/// Right-aligned (NumPy) broadcast of two shapes.
pub fn broadcast_shapes(op: OpKind, lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let mut result = Vec::with_capacity(rank);

    for i in 0..rank {
        let d1 = if i < rank - lhs.len() {
            1
        } else {
            lhs[i - (rank - lhs.len())]
        };
        let d2 = if i < rank - rhs.len() {
            1
        } else {
            rhs[i - (rank - rhs.len())]
        };

        if d1 == d2 || d2 == 1 {
            result.push(d1);
        } else if d1 == 1 {
            result.push(d2);
        } else {
            return Err(GradError::IncompatibleShapes {
                op,
                lhs: lhs.to_vec(),
                rhs: rhs.to_vec(),
            });
        }
    }

    Ok(result)
}

/// Axes to sum when reducing a broadcast-shaped value back to an operand shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsePlan {
    /// Axes of the source shape to sum over, ascending. The first `leading`
    /// entries are the extra leading axes, the rest are axes where the target
    /// has size 1.
    pub axes: Vec<usize>,
    /// Number of leading source axes absent from the target.
    pub leading: usize,
}

impl CollapsePlan {
    /// Plans the reduction of `from` down to `to`.
    ///
    /// `to` must be a shape `from` could have been broadcast from.
    pub fn new(from: &[usize], to: &[usize]) -> Result<Self> {
        let incompatible = || GradError::IncompatibleShapes {
            op: OpKind::CollapseSumLike,
            lhs: from.to_vec(),
            rhs: to.to_vec(),
        };

        if to.len() > from.len() {
            return Err(incompatible());
        }

        let leading = from.len() - to.len();
        let mut axes: Vec<usize> = (0..leading).collect();
        for (i, (&src, &dst)) in from[leading..].iter().zip(to).enumerate() {
            if src == dst {
                continue;
            }
            if dst != 1 {
                return Err(incompatible());
            }
            axes.push(leading + i);
        }

        Ok(Self { axes, leading })
    }

    /// `true` when nothing needs to be summed.
    pub fn is_identity(&self) -> bool {
        self.axes.is_empty()
    }
}

/// Sums `grad` over the axes that were broadcast when producing it from a
/// value shaped like `reference`. The result has `reference`'s shape and
/// `grad`'s dtype.
///
/// Returns `grad` itself when the shapes already match.
pub fn collapse_sum_like(grad: &Expr, reference: &Expr) -> Result<Expr> {
    let op = OpKind::CollapseSumLike;
    let grad_ty = grad.tensor_type(op)?;
    let ref_ty = reference.tensor_type(op)?;

    let plan = CollapsePlan::new(&grad_ty.shape, &ref_ty.shape)?;
    if plan.is_identity() && grad_ty.shape == ref_ty.shape {
        return Ok(grad.clone());
    }

    let ty = TensorType::new(ref_ty.shape.clone(), grad_ty.dtype);
    Ok(Expr::call(
        Call::new(op, vec![grad.clone(), reference.clone()], Attrs::None),
        ty,
    ))
}

/// Broadcasts `expr` up to `reference`'s shape, keeping `expr`'s dtype.
///
/// Returns `expr` itself when the shapes already match.
pub fn broadcast_to_like(expr: &Expr, reference: &Expr) -> Result<Expr> {
    let op = OpKind::BroadcastToLike;
    let expr_ty = expr.tensor_type(op)?;
    let ref_ty = reference.tensor_type(op)?;

    if expr_ty.shape == ref_ty.shape {
        return Ok(expr.clone());
    }

    let out = broadcast_shapes(op, &expr_ty.shape, &ref_ty.shape)?;
    if out != ref_ty.shape {
        return Err(GradError::IncompatibleShapes {
            op,
            lhs: expr_ty.shape.clone(),
            rhs: ref_ty.shape.clone(),
        });
    }

    let ty = TensorType::new(out, expr_ty.dtype);
    Ok(Expr::call(
        Call::new(op, vec![expr.clone(), reference.clone()], Attrs::None),
        ty,
    ))
}
