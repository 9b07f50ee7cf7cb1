//! Elementwise operators.
//!
//! Binary operators broadcast their operands NumPy-style. Operands must share
//! a dtype; there is no implicit promotion.

use super::build;
use crate::error::{GradError, Result};
use crate::ir::{Attrs, ClipAttrs, DType, Expr, OpKind, TensorType};
use crate::shape::broadcast_shapes;

// ============================================================================
// Unary
// ============================================================================

fn unary(op: OpKind, x: &Expr, attrs: Attrs, float_only: bool) -> Result<Expr> {
    let ty = x.tensor_type(op)?;
    if ty.dtype == DType::Bool || (float_only && !ty.dtype.is_float()) {
        let expected = if float_only {
            "a floating-point tensor"
        } else {
            "a numeric tensor"
        };
        return Err(GradError::type_mismatch(op, expected, ty));
    }
    Ok(build(op, vec![x.clone()], attrs, ty.clone()))
}

pub fn negative(x: &Expr) -> Result<Expr> {
    unary(OpKind::Negative, x, Attrs::None, false)
}

pub fn exp(x: &Expr) -> Result<Expr> {
    unary(OpKind::Exp, x, Attrs::None, true)
}

pub fn log(x: &Expr) -> Result<Expr> {
    unary(OpKind::Log, x, Attrs::None, true)
}

pub fn sqrt(x: &Expr) -> Result<Expr> {
    unary(OpKind::Sqrt, x, Attrs::None, true)
}

pub fn sin(x: &Expr) -> Result<Expr> {
    unary(OpKind::Sin, x, Attrs::None, true)
}

pub fn cos(x: &Expr) -> Result<Expr> {
    unary(OpKind::Cos, x, Attrs::None, true)
}

pub fn sigmoid(x: &Expr) -> Result<Expr> {
    unary(OpKind::Sigmoid, x, Attrs::None, true)
}

pub fn tanh(x: &Expr) -> Result<Expr> {
    unary(OpKind::Tanh, x, Attrs::None, true)
}

pub fn relu(x: &Expr) -> Result<Expr> {
    unary(OpKind::Relu, x, Attrs::None, false)
}

pub fn abs(x: &Expr) -> Result<Expr> {
    unary(OpKind::Abs, x, Attrs::None, false)
}

/// Clamps `x` into the closed interval `[a_min, a_max]`.
pub fn clip(x: &Expr, a_min: f64, a_max: f64) -> Result<Expr> {
    if a_min.is_nan() || a_max.is_nan() || a_min > a_max {
        return Err(GradError::invalid_attribute(
            OpKind::Clip,
            "a_min",
            format!("expected a_min <= a_max, got [{a_min}, {a_max}]"),
        ));
    }
    unary(
        OpKind::Clip,
        x,
        ClipAttrs { a_min, a_max }.into(),
        false,
    )
}

// ============================================================================
// Binary
// ============================================================================

fn check_same_dtype(op: OpKind, lhs: &TensorType, rhs: &TensorType) -> Result<DType> {
    if lhs.dtype != rhs.dtype {
        return Err(GradError::type_mismatch(
            op,
            format!("operands of dtype {}", lhs.dtype),
            rhs,
        ));
    }
    Ok(lhs.dtype)
}

fn binary(op: OpKind, lhs: &Expr, rhs: &Expr) -> Result<Expr> {
    let l = lhs.tensor_type(op)?;
    let r = rhs.tensor_type(op)?;
    let dtype = check_same_dtype(op, l, r)?;
    if dtype == DType::Bool {
        return Err(GradError::type_mismatch(op, "numeric operands", l));
    }
    if op == OpKind::Power && !dtype.is_float() {
        return Err(GradError::type_mismatch(op, "floating-point operands", l));
    }

    let shape = broadcast_shapes(op, &l.shape, &r.shape)?;
    let dtype = if op == OpKind::Less { DType::Bool } else { dtype };
    Ok(build(
        op,
        vec![lhs.clone(), rhs.clone()],
        Attrs::None,
        TensorType::new(shape, dtype),
    ))
}

pub fn add(lhs: &Expr, rhs: &Expr) -> Result<Expr> {
    binary(OpKind::Add, lhs, rhs)
}

pub fn subtract(lhs: &Expr, rhs: &Expr) -> Result<Expr> {
    binary(OpKind::Subtract, lhs, rhs)
}

pub fn multiply(lhs: &Expr, rhs: &Expr) -> Result<Expr> {
    binary(OpKind::Multiply, lhs, rhs)
}

pub fn divide(lhs: &Expr, rhs: &Expr) -> Result<Expr> {
    binary(OpKind::Divide, lhs, rhs)
}

/// Floating-point operands only.
pub fn power(lhs: &Expr, rhs: &Expr) -> Result<Expr> {
    binary(OpKind::Power, lhs, rhs)
}

/// `lhs < rhs`, producing a `bool` tensor.
pub fn less(lhs: &Expr, rhs: &Expr) -> Result<Expr> {
    binary(OpKind::Less, lhs, rhs)
}

/// Selects `then` where `cond` holds and `otherwise` elsewhere. All three
/// operands broadcast together.
pub fn where_(cond: &Expr, then: &Expr, otherwise: &Expr) -> Result<Expr> {
    let op = OpKind::Where;
    let c = cond.tensor_type(op)?;
    if c.dtype != DType::Bool {
        return Err(GradError::type_mismatch(op, "a bool condition", c));
    }
    let t = then.tensor_type(op)?;
    let e = otherwise.tensor_type(op)?;
    let dtype = check_same_dtype(op, t, e)?;

    let shape = broadcast_shapes(op, &c.shape, &t.shape)?;
    let shape = broadcast_shapes(op, &shape, &e.shape)?;
    Ok(build(
        op,
        vec![cond.clone(), then.clone(), otherwise.clone()],
        Attrs::None,
        TensorType::new(shape, dtype),
    ))
}
