//! Default gradient rules, grouped by operator family.

mod binary;
mod elementwise;
mod init;
mod nn;
mod transform;

use crate::error::{GradError, Result};
use crate::grad::registry::RegistryBuilder;
use crate::ir::{Call, Expr, OpKind};

/// Registers every default rule and non-differentiable marker.
pub fn register_defaults(builder: &mut RegistryBuilder) -> Result<()> {
    elementwise::register(builder)?;
    binary::register(builder)?;
    init::register(builder)?;
    transform::register(builder)?;
    nn::register(builder)?;
    Ok(())
}

/// The call behind `orig` together with its `N` arguments.
fn unpack<const N: usize>(orig: &Expr, op: OpKind) -> Result<(&Call, [&Expr; N])> {
    let call = orig
        .as_call()
        .filter(|call| call.op() == op)
        .ok_or_else(|| GradError::type_mismatch(op, format!("a `{op}` call"), orig))?;
    let args = call.expect_arity(N)?;
    Ok((call, std::array::from_fn(|i| &args[i])))
}

/// Rank-0 constant with the dtype of `like`.
fn scalar_like(value: f64, like: &Expr, op: OpKind) -> Result<Expr> {
    Ok(Expr::scalar(value, like.dtype(op)?))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DType, TensorType};

    #[test]
    fn test_unpack_checks_op_and_arity() {
        let x = test_util::var("x", &[2]);
        let e = crate::ops::exp(&x).unwrap();
        let (call, [arg]) = unpack::<1>(&e, OpKind::Exp).unwrap();
        assert_eq!(call.op(), OpKind::Exp);
        assert!(arg.ptr_eq(&x));

        assert!(unpack::<1>(&e, OpKind::Log).is_err());
        assert!(unpack::<2>(&e, OpKind::Exp).is_err());
        assert!(unpack::<0>(&x, OpKind::Zeros).is_err());
    }

    #[test]
    fn test_scalar_like() {
        let x = Expr::var("x", TensorType::new(vec![3], DType::F64));
        let half = scalar_like(0.5, &x, OpKind::Sqrt).unwrap();
        assert_eq!(half.dtype(OpKind::Sqrt).unwrap(), DType::F64);
    }
}
