//! Convolution and pooling operators.
//!
//! Convolutions only accept `NCHW` data with `OIHW` kernels. Pooling accepts
//! `NCHW` and `NHWC`.

use super::build;
use crate::error::{GradError, Result};
use crate::ir::{Conv2dAttrs, Conv2dTransposeAttrs, DType, Expr, OpKind, Pool2dAttrs, TensorType};
use crate::shape::Window2d;

fn require_layout(
    op: OpKind,
    role: &'static str,
    layout: &str,
    accepted: &[&str],
    supported: &'static str,
) -> Result<()> {
    if accepted.contains(&layout) {
        return Ok(());
    }
    Err(GradError::UnsupportedLayout {
        op,
        role,
        layout: layout.to_string(),
        supported,
    })
}

pub(crate) fn rank4(op: OpKind, role: &str, ty: &TensorType) -> Result<[usize; 4]> {
    <[usize; 4]>::try_from(ty.shape.as_slice())
        .map_err(|_| GradError::type_mismatch(op, format!("a 4-D {role} tensor"), ty))
}

fn float_pair(op: OpKind, data: &TensorType, weight: &TensorType) -> Result<DType> {
    if !data.dtype.is_float() {
        return Err(GradError::type_mismatch(op, "floating-point data", data));
    }
    if weight.dtype != data.dtype {
        return Err(GradError::type_mismatch(
            op,
            format!("a weight of dtype {}", data.dtype),
            weight,
        ));
    }
    Ok(data.dtype)
}

fn check_groups(op: OpKind, channels: usize, groups: usize) -> Result<()> {
    if groups == 0 || channels % groups != 0 {
        return Err(GradError::invalid_attribute(
            op,
            "groups",
            format!("{groups} groups do not divide {channels} channels"),
        ));
    }
    Ok(())
}

// ============================================================================
// Convolution
// ============================================================================

/// Rejects every layout combination other than `NCHW` / `OIHW` / (`""` | `NCHW`).
pub(crate) fn check_conv2d_layouts(attrs: &Conv2dAttrs) -> Result<()> {
    let op = OpKind::Conv2d;
    require_layout(op, "data", &attrs.data_layout, &["NCHW"], "NCHW")?;
    require_layout(op, "kernel", &attrs.kernel_layout, &["OIHW"], "OIHW")?;
    require_layout(op, "output", &attrs.out_layout, &["", "NCHW"], "\"\" or NCHW")
}

/// `conv2d(data, weight)` with `data: (N, Cin, H, W)` and
/// `weight: (Cout, Cin / groups, Kh, Kw)`.
pub fn conv2d(data: &Expr, weight: &Expr, attrs: Conv2dAttrs) -> Result<Expr> {
    let op = OpKind::Conv2d;
    check_conv2d_layouts(&attrs)?;

    let data_ty = data.tensor_type(op)?;
    let weight_ty = weight.tensor_type(op)?;
    let dtype = float_pair(op, data_ty, weight_ty)?;
    let [n, c_in, h, w] = rank4(op, "data", data_ty)?;
    let [c_out, c_in_group, kh, kw] = rank4(op, "weight", weight_ty)?;

    check_groups(op, c_in, attrs.groups)?;
    check_groups(op, c_out, attrs.groups)?;
    if c_in_group * attrs.groups != c_in {
        return Err(GradError::IncompatibleShapes {
            op,
            lhs: data_ty.shape.clone(),
            rhs: weight_ty.shape.clone(),
        });
    }
    if let Some(size) = attrs.kernel_size.filter(|s| *s != [kh, kw]) {
        return Err(GradError::invalid_attribute(
            op,
            "kernel_size",
            format!("{size:?} disagrees with weight {:?}", weight_ty.shape),
        ));
    }
    if let Some(channels) = attrs.channels.filter(|&c| c != c_out) {
        return Err(GradError::invalid_attribute(
            op,
            "channels",
            format!("{channels} disagrees with weight {:?}", weight_ty.shape),
        ));
    }

    let window = Window2d::new(op, [kh, kw], attrs.strides, attrs.dilation, &attrs.padding)?;
    let [ho, wo] = window.output_size(op, [h, w], false)?;
    Ok(build(
        op,
        vec![data.clone(), weight.clone()],
        attrs,
        TensorType::new(vec![n, c_out, ho, wo], dtype),
    ))
}

/// `conv2d_transpose(data, weight)` with `data: (N, Cin, H, W)` and
/// `weight: (Cin, Cout / groups, Kh, Kw)`.
pub fn conv2d_transpose(data: &Expr, weight: &Expr, attrs: Conv2dTransposeAttrs) -> Result<Expr> {
    let op = OpKind::Conv2dTranspose;
    require_layout(op, "data", &attrs.data_layout, &["NCHW"], "NCHW")?;
    require_layout(op, "kernel", &attrs.kernel_layout, &["OIHW"], "OIHW")?;

    let data_ty = data.tensor_type(op)?;
    let weight_ty = weight.tensor_type(op)?;
    let dtype = float_pair(op, data_ty, weight_ty)?;
    let [n, c_in, h, w] = rank4(op, "data", data_ty)?;
    let [w_in, c_out_group, kh, kw] = rank4(op, "weight", weight_ty)?;

    check_groups(op, c_in, attrs.groups)?;
    if w_in != c_in {
        return Err(GradError::IncompatibleShapes {
            op,
            lhs: data_ty.shape.clone(),
            rhs: weight_ty.shape.clone(),
        });
    }

    let window = Window2d::new(op, [kh, kw], attrs.strides, attrs.dilation, &attrs.padding)?;
    for i in 0..2 {
        if attrs.output_padding[i] >= attrs.strides[i].max(attrs.dilation[i]) {
            return Err(GradError::invalid_attribute(
                op,
                "output_padding",
                format!(
                    "{:?} must be smaller than stride or dilation",
                    attrs.output_padding
                ),
            ));
        }
    }
    let [ho, wo] = window.transposed_size(op, [h, w])?;
    let shape = vec![
        n,
        c_out_group * attrs.groups,
        ho + attrs.output_padding[0],
        wo + attrs.output_padding[1],
    ];
    Ok(build(
        op,
        vec![data.clone(), weight.clone()],
        attrs,
        TensorType::new(shape, dtype),
    ))
}

// ============================================================================
// Pooling
// ============================================================================

/// Positions of the spatial axes for a pooling layout.
fn spatial_axes(op: OpKind, layout: &str) -> Result<[usize; 2]> {
    match layout {
        "NCHW" => Ok([2, 3]),
        "NHWC" => Ok([1, 2]),
        other => Err(GradError::UnsupportedLayout {
            op,
            role: "data",
            layout: other.to_string(),
            supported: "NCHW or NHWC",
        }),
    }
}

fn pool_output(op: OpKind, data: &TensorType, attrs: &Pool2dAttrs) -> Result<Vec<usize>> {
    let axes = spatial_axes(op, &attrs.layout)?;
    rank4(op, "data", data)?;
    let window = Window2d::new(op, attrs.pool_size, attrs.strides, [1, 1], &attrs.padding)?;
    let out = window.output_size(op, axes.map(|a| data.shape[a]), attrs.ceil_mode)?;
    let mut shape = data.shape.clone();
    shape[axes[0]] = out[0];
    shape[axes[1]] = out[1];
    Ok(shape)
}

fn pool2d(op: OpKind, data: &Expr, attrs: Pool2dAttrs) -> Result<Expr> {
    let ty = data.tensor_type(op)?;
    let shape = pool_output(op, ty, &attrs)?;
    Ok(build(
        op,
        vec![data.clone()],
        attrs,
        TensorType::new(shape, ty.dtype),
    ))
}

/// Backward primitive of a pooling operator: `(grad, data) -> d data`.
fn pool2d_grad(op: OpKind, grad: &Expr, data: &Expr, attrs: Pool2dAttrs) -> Result<Expr> {
    let data_ty = data.tensor_type(op)?;
    let grad_ty = grad.tensor_type(op)?;
    let expected = pool_output(op, data_ty, &attrs)?;
    if grad_ty.shape != expected || grad_ty.dtype != data_ty.dtype {
        return Err(GradError::type_mismatch(
            op,
            TensorType::new(expected, data_ty.dtype).to_string(),
            grad_ty,
        ));
    }
    Ok(build(
        op,
        vec![grad.clone(), data.clone()],
        attrs,
        data_ty.clone(),
    ))
}

pub fn max_pool2d(data: &Expr, attrs: Pool2dAttrs) -> Result<Expr> {
    pool2d(OpKind::MaxPool2d, data, attrs)
}

pub fn avg_pool2d(data: &Expr, attrs: Pool2dAttrs) -> Result<Expr> {
    pool2d(OpKind::AvgPool2d, data, attrs)
}

pub fn max_pool2d_grad(grad: &Expr, data: &Expr, attrs: Pool2dAttrs) -> Result<Expr> {
    pool2d_grad(OpKind::MaxPool2dGrad, grad, data, attrs)
}

pub fn avg_pool2d_grad(grad: &Expr, data: &Expr, attrs: Pool2dAttrs) -> Result<Expr> {
    pool2d_grad(OpKind::AvgPool2dGrad, grad, data, attrs)
}
