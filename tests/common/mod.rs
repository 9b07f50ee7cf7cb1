//! Reference interpreter for the IR, used to check gradient rules
//! numerically.
//!
//! Every tensor is evaluated as an `ndarray::ArrayD<f64>` regardless of its
//! dtype; booleans are `0.0` / `1.0`. Pooling is not interpreted.

#![allow(dead_code)]

use std::collections::HashMap;

use harp_grad::ir::{Call, Conv2dAttrs, Conv2dTransposeAttrs, Expr, ExprKind, OpKind};
use harp_grad::shape::Window2d;
use ndarray::{Array4, ArrayD, Axis, Ix4, IxDyn, Zip};

pub const EPSILON: f64 = 1e-6;

// ============================================================================
// Helpers
// ============================================================================

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol * (1.0 + a.abs().max(b.abs()))
}

pub fn vec_approx_eq(a: &[f64], b: &[f64], tol: f64) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| approx_eq(*x, *y, tol))
}

pub fn assert_close(actual: &ArrayD<f64>, expected: &ArrayD<f64>, tol: f64) {
    assert_eq!(actual.shape(), expected.shape(), "shape mismatch");
    let a: Vec<f64> = actual.iter().copied().collect();
    let e: Vec<f64> = expected.iter().copied().collect();
    assert!(vec_approx_eq(&a, &e, tol), "values differ:\n  actual   {a:?}\n  expected {e:?}");
}

pub fn tensor(shape: &[usize], data: Vec<f64>) -> ArrayD<f64> {
    ArrayD::from_shape_vec(IxDyn(shape), data).expect("data does not match shape")
}

/// Deterministic values in `[-1, 1)`.
pub fn seeded(shape: &[usize], seed: u64) -> ArrayD<f64> {
    const MUL: u64 = 6364136223846793005;
    const INC: u64 = 1442695040888963407;
    let mut state = seed.wrapping_mul(MUL).wrapping_add(INC);
    ArrayD::from_shape_fn(IxDyn(shape), |_| {
        state = state.wrapping_mul(MUL).wrapping_add(INC);
        ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    })
}

/// Deterministic values in `[0.5, 1.5)`.
pub fn seeded_positive(shape: &[usize], seed: u64) -> ArrayD<f64> {
    seeded(shape, seed).mapv(|v| v.abs() + 0.5)
}

// ============================================================================
// Values
// ============================================================================

#[derive(Debug, Clone)]
pub enum Value {
    Tensor(ArrayD<f64>),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn into_tensor(self) -> ArrayD<f64> {
        match self {
            Value::Tensor(t) => t,
            Value::Tuple(_) => panic!("expected a tensor value, got a tuple"),
        }
    }
}

// ============================================================================
// Interpreter
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    bindings: HashMap<String, Value>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &str, value: ArrayD<f64>) -> &mut Self {
        self.bindings.insert(name.to_string(), Value::Tensor(value));
        self
    }

    pub fn eval_tensor(&self, expr: &Expr) -> ArrayD<f64> {
        self.eval(expr).into_tensor()
    }

    pub fn eval(&self, expr: &Expr) -> Value {
        let value = match expr.kind() {
            ExprKind::Var(name) => self
                .bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| panic!("unbound variable %{name}")),
            ExprKind::Constant(lit) => Value::Tensor(tensor(&lit.ty.shape, lit.data.clone())),
            ExprKind::Tuple(fields) => Value::Tuple(fields.iter().map(|f| self.eval(f)).collect()),
            ExprKind::TupleGetItem { tuple, index } => match self.eval(tuple) {
                Value::Tuple(mut fields) => fields.swap_remove(*index),
                Value::Tensor(_) => panic!("projection out of a tensor"),
            },
            ExprKind::Call(call) => Value::Tensor(self.eval_call(expr, call)),
        };
        // 形状推論と実際の計算結果が一致しているか
        if let (Value::Tensor(t), Some(ty)) = (&value, expr.ty().as_tensor()) {
            assert_eq!(t.shape(), ty.shape.as_slice(), "inferred shape disagrees for {expr}");
        }
        value
    }

    fn eval_call(&self, expr: &Expr, call: &Call) -> ArrayD<f64> {
        let out_shape = expr.ty().as_tensor().expect("call must produce a tensor").shape.clone();
        let arg = |i: usize| self.eval_tensor(&call.args()[i]);
        let unary = |f: fn(f64) -> f64| arg(0).mapv(f);
        let binary = |f: fn(f64, f64) -> f64| {
            let (a, b) = (arg(0), arg(1));
            let a = a.broadcast(IxDyn(&out_shape)).expect("lhs does not broadcast");
            let b = b.broadcast(IxDyn(&out_shape)).expect("rhs does not broadcast");
            Zip::from(&a).and(&b).map_collect(|&x, &y| f(x, y))
        };

        match call.op() {
            OpKind::Negative => unary(|x| -x),
            OpKind::Exp => unary(f64::exp),
            OpKind::Log => unary(f64::ln),
            OpKind::Sqrt => unary(f64::sqrt),
            OpKind::Sin => unary(f64::sin),
            OpKind::Cos => unary(f64::cos),
            OpKind::Sigmoid => unary(|x| 1.0 / (1.0 + (-x).exp())),
            OpKind::Tanh => unary(f64::tanh),
            OpKind::Relu => unary(|x| x.max(0.0)),
            OpKind::Abs => unary(f64::abs),
            OpKind::Clip => {
                let attrs = *call.attrs().clip().expect("clip attrs");
                arg(0).mapv(|x| x.clamp(attrs.a_min, attrs.a_max))
            }

            OpKind::Add => binary(|x, y| x + y),
            OpKind::Subtract => binary(|x, y| x - y),
            OpKind::Multiply => binary(|x, y| x * y),
            OpKind::Divide => binary(|x, y| x / y),
            OpKind::Power => binary(f64::powf),
            OpKind::Less => binary(|x, y| if x < y { 1.0 } else { 0.0 }),
            OpKind::Where => {
                let (c, x, y) = (arg(0), arg(1), arg(2));
                let shape = IxDyn(&out_shape);
                let c = c.broadcast(shape.clone()).expect("cond does not broadcast");
                let x = x.broadcast(shape.clone()).expect("then does not broadcast");
                let y = y.broadcast(shape).expect("else does not broadcast");
                Zip::from(&c)
                    .and(&x)
                    .and(&y)
                    .map_collect(|&c, &x, &y| if c != 0.0 { x } else { y })
            }

            OpKind::Zeros | OpKind::ZerosLike => ArrayD::zeros(IxDyn(&out_shape)),
            OpKind::Ones | OpKind::OnesLike => ArrayD::ones(IxDyn(&out_shape)),

            OpKind::CollapseSumLike => collapse_to(arg(0), &out_shape),
            OpKind::BroadcastToLike => arg(0)
                .broadcast(IxDyn(&out_shape))
                .expect("operand does not broadcast")
                .to_owned(),
            OpKind::Reshape => reshape_to(&arg(0), &out_shape),
            OpKind::Transpose => {
                let x = arg(0);
                let attrs = call.attrs().transpose().expect("transpose attrs");
                let perm: Vec<usize> = match &attrs.axes {
                    Some(axes) => axes.iter().map(|&a| axis(a, x.ndim())).collect(),
                    None => (0..x.ndim()).rev().collect(),
                };
                x.permuted_axes(IxDyn(&perm))
            }
            OpKind::Tile => {
                let x = arg(0);
                let rank = out_shape.len();
                let mut padded = vec![1; rank - x.ndim()];
                padded.extend_from_slice(x.shape());
                let x = reshape_to(&x, &padded);
                ArrayD::from_shape_fn(IxDyn(&out_shape), |ix| {
                    let src: Vec<usize> = (0..rank).map(|i| ix[i] % padded[i]).collect();
                    x[src.as_slice()]
                })
            }
            OpKind::StridedSlice => {
                let x = arg(0);
                let attrs = call.attrs().strided_slice().expect("strided_slice attrs");
                ArrayD::from_shape_fn(IxDyn(&out_shape), |ix| {
                    let src: Vec<usize> = (0..out_shape.len())
                        .map(|i| match attrs.begin.get(i) {
                            Some(&begin) => begin + ix[i] * attrs.strides.get(i).copied().unwrap_or(1),
                            None => ix[i],
                        })
                        .collect();
                    x[src.as_slice()]
                })
            }
            OpKind::Concatenate => {
                let attrs = call.attrs().concatenate().expect("concatenate attrs");
                let Value::Tuple(fields) = self.eval(&call.args()[0]) else {
                    panic!("concatenate expects a tuple");
                };
                let fields: Vec<ArrayD<f64>> = fields.into_iter().map(Value::into_tensor).collect();
                let ax = axis(attrs.axis, out_shape.len());
                let views: Vec<_> = fields.iter().map(|f| f.view()).collect();
                ndarray::concatenate(Axis(ax), &views).expect("fields do not concatenate")
            }

            OpKind::Sum => {
                let x = arg(0);
                let attrs = call.attrs().reduce().expect("reduce attrs");
                let mut axes: Vec<usize> = match &attrs.axes {
                    Some(axes) => axes.iter().map(|&a| axis(a, x.ndim())).collect(),
                    None => (0..x.ndim()).collect(),
                };
                axes.sort_unstable();
                let mut out = x;
                for &a in axes.iter().rev() {
                    out = out.sum_axis(Axis(a));
                    if attrs.keepdims {
                        out = out.insert_axis(Axis(a));
                    }
                }
                out
            }

            OpKind::Conv2d => {
                let attrs = call.attrs().conv2d().expect("conv2d attrs");
                conv2d(&arg(0), &arg(1), attrs, &out_shape)
            }
            OpKind::Conv2dTranspose => {
                let attrs = call.attrs().conv2d_transpose().expect("conv2d_transpose attrs");
                conv2d_transpose(&arg(0), &arg(1), attrs, &out_shape)
            }
            OpKind::MaxPool2d
            | OpKind::AvgPool2d
            | OpKind::MaxPool2dGrad
            | OpKind::AvgPool2dGrad => panic!("pooling is not interpreted"),
        }
    }
}

fn axis(a: i64, ndim: usize) -> usize {
    if a < 0 { (a + ndim as i64) as usize } else { a as usize }
}

fn reshape_to(x: &ArrayD<f64>, shape: &[usize]) -> ArrayD<f64> {
    x.to_shape(IxDyn(shape)).expect("element count mismatch").into_owned()
}

/// Sums away leading axes, then every axis where the target has size 1.
fn collapse_to(x: ArrayD<f64>, target: &[usize]) -> ArrayD<f64> {
    let mut out = x;
    while out.ndim() > target.len() {
        out = out.sum_axis(Axis(0));
    }
    for (i, &t) in target.iter().enumerate() {
        if t == 1 && out.shape()[i] != 1 {
            out = out.sum_axis(Axis(i)).insert_axis(Axis(i));
        }
    }
    out
}

// ============================================================================
// Convolution kernels (direct loops)
// ============================================================================

fn conv2d(x: &ArrayD<f64>, w: &ArrayD<f64>, attrs: &Conv2dAttrs, out_shape: &[usize]) -> ArrayD<f64> {
    let x = x.view().into_dimensionality::<Ix4>().expect("rank-4 data");
    let w = w.view().into_dimensionality::<Ix4>().expect("rank-4 weight");
    let (cout, cin_g, kh, kw) = w.dim();
    let (_, _, h, wd) = x.dim();
    let cout_g = cout / attrs.groups;
    let window = Window2d::new(OpKind::Conv2d, [kh, kw], attrs.strides, attrs.dilation, &attrs.padding)
        .expect("valid window");
    let ([sh, sw], [dh, dw]) = (attrs.strides, attrs.dilation);

    let mut out = Array4::<f64>::zeros((out_shape[0], out_shape[1], out_shape[2], out_shape[3]));
    for ((n, oc, oh, ow), v) in out.indexed_iter_mut() {
        let g = oc / cout_g;
        let mut acc = 0.0;
        for ic in 0..cin_g {
            for i in 0..kh {
                for j in 0..kw {
                    let ih = (oh * sh + i * dh) as isize - window.pad.top as isize;
                    let iw = (ow * sw + j * dw) as isize - window.pad.left as isize;
                    if ih < 0 || iw < 0 || ih >= h as isize || iw >= wd as isize {
                        continue;
                    }
                    acc += x[[n, g * cin_g + ic, ih as usize, iw as usize]] * w[[oc, ic, i, j]];
                }
            }
        }
        *v = acc;
    }
    out.into_dyn()
}

/// Scatters every input element through the kernel; the adjoint of
/// [`conv2d`] with the same window.
fn conv2d_transpose(
    x: &ArrayD<f64>,
    w: &ArrayD<f64>,
    attrs: &Conv2dTransposeAttrs,
    out_shape: &[usize],
) -> ArrayD<f64> {
    let x = x.view().into_dimensionality::<Ix4>().expect("rank-4 data");
    let w = w.view().into_dimensionality::<Ix4>().expect("rank-4 weight");
    let (cin, cout_g, kh, kw) = w.dim();
    let cin_g = cin / attrs.groups;
    let window = Window2d::new(
        OpKind::Conv2dTranspose,
        [kh, kw],
        attrs.strides,
        attrs.dilation,
        &attrs.padding,
    )
    .expect("valid window");
    let ([sh, sw], [dh, dw]) = (attrs.strides, attrs.dilation);
    let (oh_max, ow_max) = (out_shape[2] as isize, out_shape[3] as isize);

    let mut out = Array4::<f64>::zeros((out_shape[0], out_shape[1], out_shape[2], out_shape[3]));
    for ((n, ic, ih, iw), &v) in x.indexed_iter() {
        let g = ic / cin_g;
        for oc in 0..cout_g {
            for i in 0..kh {
                for j in 0..kw {
                    let oh = (ih * sh + i * dh) as isize - window.pad.top as isize;
                    let ow = (iw * sw + j * dw) as isize - window.pad.left as isize;
                    if oh < 0 || ow < 0 || oh >= oh_max || ow >= ow_max {
                        continue;
                    }
                    out[[n, g * cout_g + oc, oh as usize, ow as usize]] += v * w[[ic, oc, i, j]];
                }
            }
        }
    }
    out.into_dyn()
}

// ============================================================================
// Finite differences
// ============================================================================

/// Checks every gradient of the call `orig` against central differences of
/// `sum(orig * seed)` for a fixed random `seed`.
///
/// `inputs` binds the free variables of `orig`; only arguments that are
/// variables are checked.
pub fn check_gradients(orig: &Expr, inputs: &[(&str, ArrayD<f64>)], tol: f64) {
    let call = orig.as_call().expect("orig must be a call");
    let out_ty = orig.ty().as_tensor().expect("orig must produce a tensor");
    let seed = seeded(&out_ty.shape, 0x5eed);

    let mut interp = Interpreter::new();
    for (name, value) in inputs {
        interp.bind(name, value.clone());
    }
    let grad = Expr::var("grad", out_ty.clone());
    let grads = harp_grad::gradient(orig, &grad).expect("gradient rule applies");
    assert_eq!(grads.len(), call.args().len());
    interp.bind("grad", seed.clone());

    let loss = |interp: &Interpreter| (interp.eval_tensor(orig) * &seed).sum();

    for (index, arg) in call.args().iter().enumerate() {
        let ExprKind::Var(name) = arg.kind() else {
            continue;
        };
        let analytic = interp.eval_tensor(&grads[index]);
        let base = interp.bindings[name.as_str()].clone().into_tensor();

        let mut numeric = ArrayD::<f64>::zeros(base.raw_dim());
        for (ix, slot) in numeric.indexed_iter_mut() {
            let mut probe = interp.clone();
            let mut plus = base.clone();
            plus[&ix] += EPSILON;
            probe.bind(name, plus);
            let up = loss(&probe);

            let mut minus = base.clone();
            minus[&ix] -= EPSILON;
            probe.bind(name, minus);
            let down = loss(&probe);

            *slot = (up - down) / (2.0 * EPSILON);
        }

        log::debug!("{}: checked gradient of %{name} ({} elements)", call.op(), numeric.len());
        assert_close(&analytic, &numeric, tol);
    }
}

