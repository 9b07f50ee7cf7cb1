//! Unary elementwise rules.
//!
//! Rules for `sigmoid` and `tanh` are expressed through the forward result
//! (`orig`) so nothing is recomputed.

use super::{scalar_like, unpack};
use crate::error::Result;
use crate::grad::registry::RegistryBuilder;
use crate::ir::{Attrs, Expr, OpKind};
use crate::ops;

pub(super) fn register(builder: &mut RegistryBuilder) -> Result<()> {
    builder
        .register(OpKind::Negative, negative_grad)?
        .register(OpKind::Log, log_grad)?
        .register(OpKind::Exp, exp_grad)?
        .register(OpKind::Sqrt, sqrt_grad)?
        .register(OpKind::Sin, sin_grad)?
        .register(OpKind::Cos, cos_grad)?
        .register(OpKind::Sigmoid, sigmoid_grad)?
        .register(OpKind::Tanh, tanh_grad)?
        .register(OpKind::Relu, relu_grad)?
        .register(OpKind::Abs, abs_grad)?
        .register(OpKind::Clip, clip_grad)?;
    Ok(())
}

fn negative_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    unpack::<1>(orig, OpKind::Negative)?;
    Ok(vec![ops::negative(grad)?])
}

/// `grad * (1 / x)`
fn log_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x]) = unpack::<1>(orig, OpKind::Log)?;
    let recip = ops::divide(&ops::ones_like(x)?, x)?;
    Ok(vec![ops::multiply(grad, &recip)?])
}

/// `grad * exp(x)`
fn exp_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x]) = unpack::<1>(orig, OpKind::Exp)?;
    Ok(vec![ops::multiply(grad, &ops::exp(x)?)?])
}

/// `grad * 0.5 * x^-0.5`
fn sqrt_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Sqrt;
    let (_, [x]) = unpack::<1>(orig, op)?;
    let half = scalar_like(0.5, x, op)?;
    let rsqrt = ops::power(x, &scalar_like(-0.5, x, op)?)?;
    Ok(vec![ops::multiply(grad, &ops::multiply(&half, &rsqrt)?)?])
}

/// `grad * cos(x)`
fn sin_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x]) = unpack::<1>(orig, OpKind::Sin)?;
    Ok(vec![ops::multiply(grad, &ops::cos(x)?)?])
}

/// `grad * -sin(x)`
fn cos_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let (_, [x]) = unpack::<1>(orig, OpKind::Cos)?;
    let neg_sin = ops::negative(&ops::sin(x)?)?;
    Ok(vec![ops::multiply(grad, &neg_sin)?])
}

/// `grad * orig * (1 - orig)`
fn sigmoid_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    unpack::<1>(orig, OpKind::Sigmoid)?;
    let one_minus = ops::subtract(&ops::ones_like(orig)?, orig)?;
    let local = ops::multiply(orig, &one_minus)?;
    Ok(vec![ops::multiply(grad, &local)?])
}

/// `grad * (1 - orig^2)`
fn tanh_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    unpack::<1>(orig, OpKind::Tanh)?;
    let squared = ops::multiply(orig, orig)?;
    let local = ops::subtract(&ops::ones_like(orig)?, &squared)?;
    Ok(vec![ops::multiply(grad, &local)?])
}

/// `where(x < 0, 0, grad)`
fn relu_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Relu;
    let (_, [x]) = unpack::<1>(orig, op)?;
    let negative = ops::less(x, &scalar_like(0.0, x, op)?)?;
    Ok(vec![ops::where_(&negative, &ops::zeros_like(grad)?, grad)?])
}

/// `where(x < 0, -grad, grad)`
fn abs_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Abs;
    let (_, [x]) = unpack::<1>(orig, op)?;
    let negative = ops::less(x, &scalar_like(0.0, x, op)?)?;
    Ok(vec![ops::where_(&negative, &ops::negative(grad)?, grad)?])
}

/// `grad` where `a_min <= x <= a_max`, `0` elsewhere.
fn clip_grad(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    let op = OpKind::Clip;
    let (call, [x]) = unpack::<1>(orig, op)?;
    let attrs = call.expect_attrs("clip", Attrs::clip)?;

    let zeros = ops::zeros_like(grad)?;
    let below = ops::less(x, &scalar_like(attrs.a_min, x, op)?)?;
    let above = ops::less(&scalar_like(attrs.a_max, x, op)?, x)?;
    let upper = ops::where_(&above, &zeros, grad)?;
    Ok(vec![ops::where_(&below, &zeros, &upper)?])
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{grads_of, var};
    use super::*;
    use crate::ir::{DType, TensorType};
    use rstest::rstest;

    #[rstest]
    #[case(OpKind::Negative)]
    #[case(OpKind::Log)]
    #[case(OpKind::Exp)]
    #[case(OpKind::Sqrt)]
    #[case(OpKind::Sin)]
    #[case(OpKind::Cos)]
    #[case(OpKind::Sigmoid)]
    #[case(OpKind::Tanh)]
    #[case(OpKind::Relu)]
    #[case(OpKind::Abs)]
    fn test_unary_gradient_type(#[case] op: OpKind) {
        let x = var("x", &[2, 3]);
        let builder: fn(&Expr) -> Result<Expr> = match op {
            OpKind::Negative => ops::negative,
            OpKind::Log => ops::log,
            OpKind::Exp => ops::exp,
            OpKind::Sqrt => ops::sqrt,
            OpKind::Sin => ops::sin,
            OpKind::Cos => ops::cos,
            OpKind::Sigmoid => ops::sigmoid,
            OpKind::Tanh => ops::tanh,
            OpKind::Relu => ops::relu,
            OpKind::Abs => ops::abs,
            _ => unreachable!(),
        };
        let orig = builder(&x).unwrap();
        let grads = grads_of(&orig).unwrap();
        assert_eq!(grads.len(), 1);
        assert_eq!(grads[0].ty(), x.ty());
    }

    #[test]
    fn test_sigmoid_reuses_forward_result() {
        let x = var("x", &[4]);
        let orig = ops::sigmoid(&x).unwrap();
        let grad = var("grad", &[4]);
        let dx = sigmoid_grad(&orig, &grad).unwrap().remove(0);
        assert_eq!(
            dx.to_string(),
            "multiply(%grad, multiply(sigmoid(%x), subtract(ones_like(sigmoid(%x)), sigmoid(%x))))"
        );
        // `orig` is shared, not rebuilt
        let local = &dx.as_call().unwrap().args()[1];
        assert!(local.as_call().unwrap().args()[0].ptr_eq(&orig));
    }

    #[test]
    fn test_sqrt_constants_follow_dtype() {
        let x = Expr::var("x", TensorType::new(vec![3], DType::F64));
        let orig = ops::sqrt(&x).unwrap();
        let dx = grads_of(&orig).unwrap().remove(0);
        assert_eq!(dx.to_string(), "multiply(%grad, multiply(0.5f64, power(%x, -0.5f64)))");
    }

    #[test]
    fn test_clip_reads_bounds() {
        let x = var("x", &[3]);
        let orig = ops::clip(&x, 0.0, 1.0).unwrap();
        let dx = grads_of(&orig).unwrap().remove(0);
        assert_eq!(
            dx.to_string(),
            "where(less(%x, 0f32), zeros_like(%grad), where(less(1f32, %x), zeros_like(%grad), %grad))"
        );
    }

    #[test]
    fn test_relu_shape() {
        let x = var("x", &[2, 2]);
        let orig = ops::relu(&x).unwrap();
        let dx = grads_of(&orig).unwrap().remove(0);
        assert_eq!(dx.to_string(), "where(less(%x, 0f32), zeros_like(%grad), %grad)");
    }
}
