//! Operator kinds of the tensor IR.

use std::fmt;
use std::str::FromStr;

use crate::error::GradError;

macro_rules! define_ops {
    ($($(#[$doc:meta])* $variant:ident => $name:literal,)*) => {
        /// Closed set of operator kinds a `Call` can carry.
        ///
        /// Each kind has a stable textual name, which is what error messages
        /// and `OpKind::from_str` use.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OpKind {
            $($(#[$doc])* $variant,)*
        }

        impl OpKind {
            /// Every operator kind, in declaration order.
            pub const ALL: &'static [OpKind] = &[$(OpKind::$variant,)*];

            /// Stable textual name of the operator.
            pub fn name(self) -> &'static str {
                match self {
                    $(OpKind::$variant => $name,)*
                }
            }

            /// Looks an operator kind up by its textual name.
            pub fn from_name(name: &str) -> Option<OpKind> {
                match name {
                    $($name => Some(OpKind::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

define_ops! {
    // elementwise, unary
    Negative => "negative",
    Exp => "exp",
    Log => "log",
    Sqrt => "sqrt",
    Sin => "sin",
    Cos => "cos",
    Sigmoid => "sigmoid",
    Tanh => "tanh",
    Relu => "relu",
    Abs => "abs",
    Clip => "clip",

    // elementwise, broadcasting
    Add => "add",
    Subtract => "subtract",
    Multiply => "multiply",
    Divide => "divide",
    Power => "power",
    Less => "less",
    /// `where(cond, then, else)`
    Where => "where",

    // tensor creation
    Zeros => "zeros",
    Ones => "ones",
    ZerosLike => "zeros_like",
    OnesLike => "ones_like",

    // shape and broadcast
    CollapseSumLike => "collapse_sum_like",
    BroadcastToLike => "broadcast_to_like",
    Reshape => "reshape",
    Transpose => "transpose",
    Tile => "tile",
    StridedSlice => "strided_slice",
    Concatenate => "concatenate",

    // reduction
    Sum => "sum",

    // neural network
    Conv2d => "conv2d",
    Conv2dTranspose => "conv2d_transpose",
    MaxPool2d => "max_pool2d",
    AvgPool2d => "avg_pool2d",
    MaxPool2dGrad => "max_pool2d_grad",
    AvgPool2dGrad => "avg_pool2d_grad",
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpKind {
    type Err = GradError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpKind::from_name(s).ok_or_else(|| GradError::MissingGradientRule { op: s.to_string() })
    }
}
