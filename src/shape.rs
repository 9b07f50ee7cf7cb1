//! Shape arithmetic
//!
//! - [`broadcast`]: NumPy-style broadcasting and its gradient-direction
//!   counterpart (`collapse_sum_like` / `broadcast_to_like`)
//! - [`conv`]: padding decomposition and window-size arithmetic for 2-D
//!   convolution and pooling

pub mod broadcast;
pub mod conv;

pub use broadcast::{CollapsePlan, broadcast_shapes, broadcast_to_like, collapse_sum_like};
pub use conv::{PadBox, Window2d, decompose_padding};

/// Resolves a possibly negative axis against `ndim`.
pub(crate) fn normalize_axis(axis: i64, ndim: usize) -> Option<usize> {
    let ndim = ndim as i64;
    let axis = if axis < 0 { axis + ndim } else { axis };
    (0..ndim).contains(&axis).then_some(axis as usize)
}
