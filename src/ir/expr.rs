//! Tensor expressions.
//!
//! An [`Expr`] is a shared handle to an immutable node. Building a new
//! expression never touches the nodes it refers to, so sub-expressions can be
//! shared freely between forward and gradient graphs (the result is a DAG)
//! and across threads.

use std::fmt;
use std::sync::Arc;

use crate::error::{GradError, Result};
use crate::ir::{Attrs, DType, OpKind, TensorType, Type};

/// Literal tensor baked into the graph, stored as `f64` regardless of dtype.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub data: Vec<f64>,
    pub ty: TensorType,
}

impl Literal {
    /// Rank-0 literal.
    pub fn scalar(value: f64, dtype: DType) -> Self {
        Self {
            data: vec![value],
            ty: TensorType::scalar(dtype),
        }
    }

    /// Tensor literal; `data` must hold exactly `shape.product()` values.
    pub fn tensor(data: Vec<f64>, shape: Vec<usize>, dtype: DType) -> Option<Self> {
        let ty = TensorType::new(shape, dtype);
        (data.len() == ty.numel()).then_some(Self { data, ty })
    }
}

/// Operator application.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    op: OpKind,
    args: Vec<Expr>,
    attrs: Attrs,
}

impl Call {
    pub fn new(op: OpKind, args: Vec<Expr>, attrs: Attrs) -> Self {
        Self { op, args, attrs }
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn args(&self) -> &[Expr] {
        &self.args
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    /// Argument `index`, or `ArityMismatch` when the call has too few.
    pub fn arg(&self, index: usize) -> Result<&Expr> {
        self.args.get(index).ok_or(GradError::ArityMismatch {
            op: self.op,
            what: "arguments",
            expected: index + 1,
            actual: self.args.len(),
        })
    }

    /// Checks the call has exactly `n` arguments.
    pub fn expect_arity(&self, n: usize) -> Result<&[Expr]> {
        if self.args.len() != n {
            return Err(GradError::ArityMismatch {
                op: self.op,
                what: "arguments",
                expected: n,
                actual: self.args.len(),
            });
        }
        Ok(&self.args)
    }

    /// Typed view of the attribute record, or `InvalidAttribute` when the
    /// call carries a different record.
    pub fn expect_attrs<'a, T>(
        &'a self,
        expected: &'static str,
        get: impl FnOnce(&'a Attrs) -> Option<&'a T>,
    ) -> Result<&'a T> {
        get(&self.attrs).ok_or_else(|| {
            GradError::invalid_attribute(
                self.op,
                "attrs",
                format!("expected {expected} attributes, found {}", self.attrs.kind_name()),
            )
        })
    }
}

/// Expression variants.
#[derive(Debug, PartialEq)]
pub enum ExprKind {
    Var(String),
    Constant(Literal),
    Call(Call),
    Tuple(Vec<Expr>),
    TupleGetItem { tuple: Expr, index: usize },
}

#[derive(Debug, PartialEq)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub ty: Type,
}

/// Shared, immutable tensor expression.
#[derive(Clone, PartialEq)]
pub struct Expr(Arc<ExprNode>);

impl Expr {
    fn from_node(kind: ExprKind, ty: Type) -> Self {
        Expr(Arc::new(ExprNode { kind, ty }))
    }

    /// Free variable (graph input).
    pub fn var(name: impl Into<String>, ty: impl Into<Type>) -> Self {
        Self::from_node(ExprKind::Var(name.into()), ty.into())
    }

    pub fn constant(literal: Literal) -> Self {
        let ty = Type::Tensor(literal.ty.clone());
        Self::from_node(ExprKind::Constant(literal), ty)
    }

    /// Rank-0 constant.
    pub fn scalar(value: f64, dtype: DType) -> Self {
        Self::constant(Literal::scalar(value, dtype))
    }

    /// Call whose type has already been inferred elsewhere.
    ///
    /// The builders in [`crate::ops`] infer types themselves; this constructor
    /// trusts `ty` as given.
    pub fn call(call: Call, ty: impl Into<Type>) -> Self {
        Self::from_node(ExprKind::Call(call), ty.into())
    }

    pub fn tuple(fields: Vec<Expr>) -> Self {
        let ty = Type::Tuple(fields.iter().map(|f| f.ty().clone()).collect());
        Self::from_node(ExprKind::Tuple(fields), ty)
    }

    /// Projects field `index` out of a tuple-typed expression.
    pub fn tuple_get_item(tuple: &Expr, index: usize) -> Result<Self> {
        let field_ty = tuple
            .ty()
            .as_tuple()
            .and_then(|fields| fields.get(index))
            .cloned()
            .ok_or_else(|| GradError::TupleProjection {
                index,
                ty: tuple.ty().clone(),
            })?;
        Ok(Self::from_node(
            ExprKind::TupleGetItem {
                tuple: tuple.clone(),
                index,
            },
            field_ty,
        ))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    pub fn as_call(&self) -> Option<&Call> {
        match &self.0.kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Tensor type, or `TypeMismatch` (reported against `op`) for tuples.
    pub fn tensor_type(&self, op: OpKind) -> Result<&TensorType> {
        self.0
            .ty
            .as_tensor()
            .ok_or_else(|| GradError::type_mismatch(op, "a tensor", &self.0.ty))
    }

    pub fn shape(&self, op: OpKind) -> Result<&[usize]> {
        Ok(&self.tensor_type(op)?.shape)
    }

    pub fn dtype(&self, op: OpKind) -> Result<DType> {
        Ok(self.tensor_type(op)?.dtype)
    }

    /// Identity comparison: `true` when both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self} : {}", self.ty())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Var(name) => write!(f, "%{name}"),
            ExprKind::Constant(lit) => {
                if lit.data.len() == 1 {
                    write!(f, "{}{}", lit.data[0], lit.ty.dtype)
                } else {
                    write!(f, "const{:?}", lit.ty.shape)
                }
            }
            ExprKind::Call(call) => {
                write!(f, "{}(", call.op())?;
                for (i, arg) in call.args().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            ExprKind::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, ")")
            }
            ExprKind::TupleGetItem { tuple, index } => write!(f, "{tuple}.{index}"),
        }
    }
}
