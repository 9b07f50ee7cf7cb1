//! Reductions.

use super::build;
use crate::error::{GradError, Result};
use crate::ir::{Expr, OpKind, ReduceAttrs, TensorType};
use crate::shape::normalize_axis;

/// Normalized, ascending reduction axes; `None` selects every axis.
pub(crate) fn resolve_axes(op: OpKind, ndim: usize, axes: Option<&[i64]>) -> Result<Vec<usize>> {
    let Some(axes) = axes else {
        return Ok((0..ndim).collect());
    };
    let mut resolved = axes
        .iter()
        .map(|&a| {
            normalize_axis(a, ndim).ok_or_else(|| {
                GradError::invalid_attribute(op, "axes", format!("axis {a} out of range for rank {ndim}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    resolved.sort_unstable();
    if resolved.windows(2).any(|w| w[0] == w[1]) {
        return Err(GradError::invalid_attribute(op, "axes", format!("repeated axis in {axes:?}")));
    }
    Ok(resolved)
}

/// Shape of `input` reduced over `axes`, keeping them as size 1 when
/// `keepdims` is set.
pub(crate) fn reduced_shape(input: &[usize], axes: &[usize], keepdims: bool) -> Vec<usize> {
    input
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| match (axes.contains(&i), keepdims) {
            (false, _) => Some(d),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect()
}

/// Sums `x` over `axes` (every axis when `None`).
pub fn sum(x: &Expr, axes: Option<&[i64]>, keepdims: bool) -> Result<Expr> {
    let op = OpKind::Sum;
    let ty = x.tensor_type(op)?;
    let resolved = resolve_axes(op, ty.ndim(), axes)?;
    let shape = reduced_shape(&ty.shape, &resolved, keepdims);
    Ok(build(
        op,
        vec![x.clone()],
        ReduceAttrs {
            axes: axes.map(<[i64]>::to_vec),
            keepdims,
        },
        TensorType::new(shape, ty.dtype),
    ))
}
