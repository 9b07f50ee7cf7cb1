//! Gradient rules
//!
//! A gradient rule maps a forward call and the gradient of its output to one
//! gradient expression per argument, built from ordinary IR operators. The
//! result can be optimized and compiled like any forward graph.
//!
//! # Overview
//!
//! - [`GradientRegistry`] maps each [`OpKind`](crate::ir::OpKind) to exactly
//!   one rule, or to an explicit non-differentiable marker
//! - [`global_registry`] is the process-wide registry, built once with the
//!   default rules and read-only afterwards
//! - [`gradient`] dispatches a call to its rule and checks the result
//!
//! # Example
//!
//! ```
//! use harp_grad::grad::gradient;
//! use harp_grad::ir::{DType, Expr, TensorType};
//! use harp_grad::ops;
//!
//! let x = Expr::var("x", TensorType::new(vec![2, 3], DType::F32));
//! let y = Expr::var("y", TensorType::new(vec![3], DType::F32));
//! let out = ops::multiply(&x, &y)?;
//!
//! let seed = Expr::var("grad", out.ty().clone());
//! let grads = gradient(&out, &seed)?;
//! assert_eq!(grads[0].ty(), x.ty());
//! assert_eq!(grads[1].ty(), y.ty());
//! # Ok::<(), harp_grad::GradError>(())
//! ```
//!
//! # Supported Operations
//!
//! `grad` is the output gradient, `orig` the call's own result and
//! `collapse` is [`collapse_sum_like`](crate::shape::collapse_sum_like).
//!
//! ## Elementwise
//! - `negative(x)`: `∂x = -grad`
//! - `log(x)`: `∂x = grad * (1 / x)`
//! - `exp(x)`: `∂x = grad * exp(x)`
//! - `sqrt(x)`: `∂x = grad * 0.5 * x^-0.5`
//! - `sin(x)`: `∂x = grad * cos(x)`
//! - `cos(x)`: `∂x = grad * -sin(x)`
//! - `sigmoid(x)`: `∂x = grad * orig * (1 - orig)`
//! - `tanh(x)`: `∂x = grad * (1 - orig²)`
//! - `relu(x)`: `∂x = where(x < 0, 0, grad)`
//! - `abs(x)`: `∂x = where(x < 0, -grad, grad)`
//! - `clip(x)`: `∂x = grad` inside `[a_min, a_max]`, `0` outside
//!
//! ## Broadcasting
//! - `add(x, y)`: `(collapse(grad, x), collapse(grad, y))`
//! - `subtract(x, y)`: `(collapse(grad, x), collapse(-grad, y))`
//! - `multiply(x, y)`: `(collapse(grad * y, x), collapse(grad * x, y))`
//! - `divide(x, y)`: `(collapse(grad / y, x), collapse(-grad * orig / y, y))`
//! - `power(x, y)`: `(collapse(grad * y * x^(y-1), x), collapse(grad * orig * log(x), y))`
//! - `where(c, x, y)`: `(0, collapse(where(c, grad, 0), x), collapse(where(c, 0, grad), y))`
//!
//! ## Creation
//! - `zeros`, `ones`: no arguments
//! - `zeros_like(x)`: `∂x = orig`
//! - `ones_like(x)`: `∂x = zeros_like(x)`
//!
//! ## Shape
//! - `collapse_sum_like(x, y)`: `(broadcast_to_like(grad, x), 0)`
//! - `broadcast_to_like(x, y)`: `(collapse_sum_like(grad, x), 0)`
//! - `reshape(x)`: `∂x = reshape(grad, shape(x))`
//! - `transpose(x, axes)`: `∂x = transpose(grad, inverse(axes))`
//! - `sum(x, axes)`: `∂x = broadcast_to_like(grad with kept dims, x)`
//! - `concatenate(t)`: zeros for every field. This is a placeholder rule and
//!   logs a warning every time it is applied
//!
//! ## Neural network
//! - `max_pool2d`, `avg_pool2d`: the matching `*_pool2d_grad` primitive
//! - `conv2d(data, weight)`: `conv2d_transpose` for `data`, a grouped
//!   correlation of `data` with `grad` for `weight`
//!
//! `less`, `tile`, `strided_slice`, `conv2d_transpose` and the pooling
//! gradient primitives are registered as non-differentiable.

mod registry;
mod rules;

pub use registry::{
    GradientFn, GradientRegistry, GradientRule, Registration, RegistryBuilder, RegistryConfig,
    RuleStatus, global_registry, gradient, lookup_gradient_rule,
};
pub use rules::register_defaults;
