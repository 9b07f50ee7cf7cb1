//! Convolution and pooling rules.
//!
//! The `conv2d` rule needs no dedicated backward kernel:
//!
//! - the data gradient is a `conv2d_transpose` of `grad` with the forward
//!   weight, plus the output padding needed to land exactly on the input size
//! - the weight gradient correlates `data` with `grad`. Batch is folded into
//!   channels, every input channel becomes its own group, and strides and
//!   dilation swap roles. The result is summed over the batch, brought into
//!   `OIHW` order and cropped to the kernel size
//!
//! Pooling rules only thread their attributes through to the matching
//! backward primitive.

use log::debug;

use super::unpack;
use crate::error::{GradError, Result};
use crate::grad::registry::RegistryBuilder;
use crate::ir::{Attrs, Conv2dAttrs, Conv2dTransposeAttrs, Expr, OpKind, StridedSliceAttrs};
use crate::ops;
use crate::ops::nn::{check_conv2d_layouts, rank4};
use crate::shape::Window2d;

pub(super) fn register(builder: &mut RegistryBuilder) -> Result<()> {
    builder
        .register(OpKind::Conv2d, conv2d_grad)?
        .register(OpKind::MaxPool2d, max_pool2d_grad)?
        .register(OpKind::AvgPool2d, avg_pool2d_grad)?
        .mark_non_differentiable(OpKind::Conv2dTranspose, "no gradient rule for conv2d_transpose")?
        .mark_non_differentiable(OpKind::MaxPool2dGrad, "backward primitive")?
        .mark_non_differentiable(OpKind::AvgPool2dGrad, "backward primitive")?;
    Ok(())
}

fn as_i64<const N: usize>(dims: [usize; N]) -> [i64; N] {
    dims.map(|d| d as i64)
}

// ============================================================================
// Convolution
// ============================================================================

/// Forward geometry of a `conv2d` call.
struct ConvGeometry {
    batch: usize,
    in_channels: usize,
    out_channels: usize,
    groups: usize,
    input: [usize; 2],
    kernel: [usize; 2],
    grad: [usize; 2],
    window: Window2d,
}

impl ConvGeometry {
    fn new(attrs: &Conv2dAttrs, data: &Expr, weight: &Expr, grad: &Expr) -> Result<Self> {
        let op = OpKind::Conv2d;
        let [batch, in_channels, h, w] = rank4(op, "data", data.tensor_type(op)?)?;
        let [out_channels, in_per_group, kh, kw] = rank4(op, "weight", weight.tensor_type(op)?)?;
        let [_, _, gh, gw] = rank4(op, "output gradient", grad.tensor_type(op)?)?;

        let groups = attrs.groups;
        if groups == 0
            || out_channels % groups != 0
            || in_per_group * groups != in_channels
        {
            return Err(GradError::invalid_attribute(
                op,
                "groups",
                format!(
                    "{groups} groups inconsistent with {in_channels} input and {out_channels} output channels"
                ),
            ));
        }

        let window = Window2d::new(op, [kh, kw], attrs.strides, attrs.dilation, &attrs.padding)?;
        debug!(
            "{op}: padding {:?} over kernel {:?} decomposes to {:?}",
            attrs.padding, [kh, kw], window.pad
        );
        Ok(Self {
            batch,
            in_channels,
            out_channels,
            groups,
            input: [h, w],
            kernel: [kh, kw],
            grad: [gh, gw],
            window,
        })
    }

    fn in_per_group(&self) -> usize {
        self.in_channels / self.groups
    }

    fn out_per_group(&self) -> usize {
        self.out_channels / self.groups
    }
}

fn conv2d_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Conv2d;
    let (call, [data, weight]) = unpack::<2>(orig, op)?;
    let attrs = call.expect_attrs("conv2d", Attrs::conv2d)?;
    check_conv2d_layouts(attrs)?;

    let geometry = ConvGeometry::new(attrs, data, weight, grad)?;
    let data_grad = conv2d_data_grad(attrs, &geometry, grad, weight)?;
    let weight_grad = conv2d_weight_grad(attrs, &geometry, grad, data)?;
    Ok(vec![data_grad, weight_grad])
}

/// `conv2d_transpose(grad, weight)` with the forward window and the output
/// padding that restores the input height and width.
fn conv2d_data_grad(
    attrs: &Conv2dAttrs,
    geometry: &ConvGeometry,
    grad: &Expr,
    weight: &Expr,
) -> Result<Expr> {
    let op = OpKind::Conv2d;
    let window = &geometry.window;
    let output_padding = window.output_padding(op, geometry.grad, geometry.input)?;
    debug!(
        "{op}: data gradient {:?} -> {:?} with output padding {output_padding:?}",
        geometry.grad, geometry.input
    );

    let transpose_attrs = Conv2dTransposeAttrs::builder()
        .strides(attrs.strides)
        .padding(window.pad.to_padding())
        .dilation(attrs.dilation)
        .groups(geometry.groups)
        .output_padding(output_padding)
        .build();
    ops::conv2d_transpose(grad, weight, transpose_attrs)
}

/// Grouped correlation of `data` with `grad`, reduced to `OIHW`.
fn conv2d_weight_grad(
    attrs: &Conv2dAttrs,
    geometry: &ConvGeometry,
    grad: &Expr,
    data: &Expr,
) -> Result<Expr> {
    let op = OpKind::Conv2d;
    let ConvGeometry {
        batch,
        in_channels,
        out_channels,
        groups,
        input: [h, w],
        kernel: [kh, kw],
        grad: [gh, gw],
        window,
    } = *geometry;
    let in_per_group = geometry.in_per_group();
    let out_per_group = geometry.out_per_group();

    let [ph, pw] = window.weight_grad_extent(op, [h, w], [gh, gw])?;
    debug!("{op}: weight gradient extent {:?} for kernel {:?}", [ph, pw], [kh, kw]);

    // One filter per (batch, input channel, output channel of its group):
    // (N, G, 1, Cout/G, Ho, Wo) -> (N, G, Cin/G, Cout/G, Ho, Wo) -> (N*Cin*Cout/G, 1, Ho, Wo)
    let grad = ops::reshape(grad, &as_i64([batch, groups, 1, out_per_group, gh, gw]))?;
    let grad = ops::tile(&grad, &[1, 1, in_per_group, 1, 1, 1])?;
    let filters = ops::reshape(&grad, &as_i64([batch * in_channels * out_per_group, 1, gh, gw]))?;

    // (N, Cin, H, W) -> (1, N*Cin, H, W)
    let data = ops::reshape(data, &as_i64([1, batch * in_channels, h, w]))?;

    let correlation = Conv2dAttrs::builder()
        .strides(attrs.dilation)
        .padding(window.pad.to_padding())
        .dilation(attrs.strides)
        .groups(batch * in_channels)
        .build();
    let raw = ops::conv2d(&data, &filters, correlation)?;

    // (1, N*Cin*Cout/G, ph, pw) -> (G, Cin/G, Cout/G, ph, pw) -> (Cout, Cin/G, ph, pw)
    let raw = ops::reshape(&raw, &as_i64([batch, groups, in_per_group, out_per_group, ph, pw]))?;
    let summed = ops::sum(&raw, Some(&[0][..]), false)?;
    let swapped = ops::transpose(&summed, Some(&[0, 2, 1, 3, 4][..]))?;
    let weight_grad = ops::reshape(&swapped, &as_i64([out_channels, in_per_group, ph, pw]))?;

    if ph == kh && pw == kw {
        return Ok(weight_grad);
    }
    let crop = StridedSliceAttrs::builder()
        .begin(vec![0, 0, 0, 0])
        .end(vec![None, None, Some(kh), Some(kw)])
        .build();
    ops::strided_slice(&weight_grad, crop)
}

// ============================================================================
// Pooling
// ============================================================================

fn max_pool2d_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (call, [x]) = unpack::<1>(orig, OpKind::MaxPool2d)?;
    let attrs = call.expect_attrs("pool2d", Attrs::pool2d)?;
    Ok(vec![ops::max_pool2d_grad(grad, x, attrs.clone())?])
}

fn avg_pool2d_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (call, [x]) = unpack::<1>(orig, OpKind::AvgPool2d)?;
    let attrs = call.expect_attrs("pool2d", Attrs::pool2d)?;
    Ok(vec![ops::avg_pool2d_grad(grad, x, attrs.clone())?])
}
