//! Shape-transforming operators and tuples.

use super::build;
use crate::error::{GradError, Result};
use crate::ir::{
    ConcatenateAttrs, Expr, OpKind, ReshapeAttrs, StridedSliceAttrs, TensorType, TileAttrs,
    TransposeAttrs, Type,
};
use crate::shape::normalize_axis;

/// Resolves a `reshape` target against the input shape.
///
/// `0` copies the input dimension at the same position and a single `-1` is
/// inferred from the element count.
pub(crate) fn infer_reshape(input: &[usize], newshape: &[i64]) -> Result<Vec<usize>> {
    let op = OpKind::Reshape;
    let invalid = |reason: String| GradError::invalid_attribute(op, "newshape", reason);

    let mut shape = Vec::with_capacity(newshape.len());
    let mut inferred = None;
    for (i, &dim) in newshape.iter().enumerate() {
        match dim {
            -1 => {
                if inferred.replace(i).is_some() {
                    return Err(invalid("more than one -1".to_string()));
                }
                shape.push(1);
            }
            0 => {
                let copied = input
                    .get(i)
                    .ok_or_else(|| invalid(format!("0 at position {i} has no input dimension")))?;
                shape.push(*copied);
            }
            d if d > 0 => shape.push(d as usize),
            d => return Err(invalid(format!("negative dimension {d}"))),
        }
    }

    let total: usize = input.iter().product();
    let known: usize = shape.iter().product();
    if let Some(i) = inferred {
        if known == 0 || total % known != 0 {
            return Err(invalid(format!(
                "cannot infer -1 for {} elements from {newshape:?}",
                total
            )));
        }
        shape[i] = total / known;
    } else if known != total {
        return Err(GradError::IncompatibleShapes {
            op,
            lhs: input.to_vec(),
            rhs: shape,
        });
    }
    Ok(shape)
}

pub fn reshape(x: &Expr, newshape: &[i64]) -> Result<Expr> {
    let ty = x.tensor_type(OpKind::Reshape)?;
    let shape = infer_reshape(&ty.shape, newshape)?;
    Ok(build(
        OpKind::Reshape,
        vec![x.clone()],
        ReshapeAttrs {
            newshape: newshape.to_vec(),
        },
        TensorType::new(shape, ty.dtype),
    ))
}

/// Normalized permutation for `transpose`; `None` reverses the axes.
pub(crate) fn resolve_permutation(ndim: usize, axes: Option<&[i64]>) -> Result<Vec<usize>> {
    let op = OpKind::Transpose;
    let Some(axes) = axes else {
        return Ok((0..ndim).rev().collect());
    };
    if axes.len() != ndim {
        return Err(GradError::ArityMismatch {
            op,
            what: "axes",
            expected: ndim,
            actual: axes.len(),
        });
    }

    let mut seen = vec![false; ndim];
    let mut perm = Vec::with_capacity(ndim);
    for &axis in axes {
        let axis = normalize_axis(axis, ndim)
            .ok_or_else(|| GradError::invalid_attribute(op, "axes", format!("axis {axis} out of range")))?;
        if std::mem::replace(&mut seen[axis], true) {
            return Err(GradError::invalid_attribute(
                op,
                "axes",
                format!("axis {axis} repeated"),
            ));
        }
        perm.push(axis);
    }
    Ok(perm)
}

/// Permutes the axes of `x`; `None` reverses them.
pub fn transpose(x: &Expr, axes: Option<&[i64]>) -> Result<Expr> {
    let ty = x.tensor_type(OpKind::Transpose)?;
    let perm = resolve_permutation(ty.ndim(), axes)?;
    let shape = perm.iter().map(|&a| ty.shape[a]).collect::<Vec<_>>();
    Ok(build(
        OpKind::Transpose,
        vec![x.clone()],
        TransposeAttrs {
            axes: axes.map(<[i64]>::to_vec),
        },
        TensorType::new(shape, ty.dtype),
    ))
}

/// Repeats `x` `reps[i]` times along axis `i`. The shorter of shape and
/// `reps` is padded with leading ones.
pub fn tile(x: &Expr, reps: &[usize]) -> Result<Expr> {
    let ty = x.tensor_type(OpKind::Tile)?;
    let rank = ty.ndim().max(reps.len());
    let pad = |v: &[usize]| {
        let mut padded = vec![1; rank - v.len()];
        padded.extend_from_slice(v);
        padded
    };
    let shape = pad(&ty.shape)
        .into_iter()
        .zip(pad(reps))
        .map(|(d, r)| d * r)
        .collect::<Vec<_>>();
    Ok(build(
        OpKind::Tile,
        vec![x.clone()],
        TileAttrs {
            reps: reps.to_vec(),
        },
        TensorType::new(shape, ty.dtype),
    ))
}

/// Output shape of a strided slice. Axes past `begin.len()` are kept whole.
pub(crate) fn infer_strided_slice(input: &[usize], attrs: &StridedSliceAttrs) -> Result<Vec<usize>> {
    let op = OpKind::StridedSlice;
    let n = attrs.begin.len();
    if n > input.len() {
        return Err(GradError::ArityMismatch {
            op,
            what: "begin indices",
            expected: input.len(),
            actual: n,
        });
    }
    if attrs.end.len() != n {
        return Err(GradError::ArityMismatch {
            op,
            what: "end indices",
            expected: n,
            actual: attrs.end.len(),
        });
    }
    if !attrs.strides.is_empty() && attrs.strides.len() != n {
        return Err(GradError::ArityMismatch {
            op,
            what: "strides",
            expected: n,
            actual: attrs.strides.len(),
        });
    }

    let mut shape = input.to_vec();
    for axis in 0..n {
        let dim = input[axis];
        let begin = attrs.begin[axis];
        let end = attrs.end[axis].map_or(dim, |e| e.min(dim));
        let stride = attrs.strides.get(axis).copied().unwrap_or(1);
        if stride == 0 {
            return Err(GradError::invalid_attribute(op, "strides", "must be positive"));
        }
        if begin > end {
            return Err(GradError::invalid_attribute(
                op,
                "begin",
                format!("axis {axis}: begin {begin} past end {end}"),
            ));
        }
        shape[axis] = (end - begin).div_ceil(stride);
    }
    Ok(shape)
}

pub fn strided_slice(x: &Expr, attrs: StridedSliceAttrs) -> Result<Expr> {
    let ty = x.tensor_type(OpKind::StridedSlice)?;
    let shape = infer_strided_slice(&ty.shape, &attrs)?;
    Ok(build(
        OpKind::StridedSlice,
        vec![x.clone()],
        attrs,
        TensorType::new(shape, ty.dtype),
    ))
}

/// Joins the fields of a tuple along `axis`.
pub fn concatenate(fields: &Expr, axis: i64) -> Result<Expr> {
    let op = OpKind::Concatenate;
    let types = fields
        .ty()
        .as_tuple()
        .ok_or_else(|| GradError::type_mismatch(op, "a tuple operand", fields.ty()))?;
    let Some((first, rest)) = types.split_first() else {
        return Err(GradError::invalid_attribute(
            op,
            "fields",
            "need at least one tensor to concatenate",
        ));
    };

    let first = first
        .as_tensor()
        .ok_or_else(|| GradError::type_mismatch(op, "tensor fields", first))?;
    let axis_idx = normalize_axis(axis, first.ndim()).ok_or_else(|| {
        GradError::invalid_attribute(op, "axis", format!("axis {axis} out of range"))
    })?;

    let mut shape = first.shape.clone();
    for field in rest {
        let t = field
            .as_tensor()
            .ok_or_else(|| GradError::type_mismatch(op, "tensor fields", field))?;
        if t.dtype != first.dtype {
            return Err(GradError::type_mismatch(
                op,
                format!("fields of dtype {}", first.dtype),
                t,
            ));
        }
        let compatible = t.ndim() == first.ndim()
            && (0..t.ndim()).all(|i| i == axis_idx || t.shape[i] == first.shape[i]);
        if !compatible {
            return Err(GradError::IncompatibleShapes {
                op,
                lhs: first.shape.clone(),
                rhs: t.shape.clone(),
            });
        }
        shape[axis_idx] += t.shape[axis_idx];
    }

    Ok(build(
        op,
        vec![fields.clone()],
        ConcatenateAttrs { axis },
        TensorType::new(shape, first.dtype),
    ))
}

pub fn tuple(fields: Vec<Expr>) -> Expr {
    Expr::tuple(fields)
}

pub fn tuple_get_item(tuple: &Expr, index: usize) -> Result<Expr> {
    Expr::tuple_get_item(tuple, index)
}

/// Shape list of a tuple type, for rules that build one value per field.
pub(crate) fn tuple_field_types(op: OpKind, ty: &Type) -> Result<Vec<TensorType>> {
    let fields = ty
        .as_tuple()
        .ok_or_else(|| GradError::type_mismatch(op, "a tuple", ty))?;
    fields
        .iter()
        .map(|f| {
            f.as_tensor()
                .cloned()
                .ok_or_else(|| GradError::type_mismatch(op, "tensor fields", f))
        })
        .collect()
}
