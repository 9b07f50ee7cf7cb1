//! 2-D window arithmetic shared by convolution and pooling.
//!
//! Everything works on `[height, width]` pairs. Intermediate values are
//! computed in `i64` so that an inconsistent configuration surfaces as a
//! `ShapeArithmeticViolation` instead of an unsigned underflow.

use crate::error::{GradError, Result};
use crate::ir::{OpKind, Padding};

/// Four-sided padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PadBox {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl PadBox {
    /// Total padding per axis, `[top + bottom, left + right]`.
    pub fn totals(&self) -> [usize; 2] {
        [self.top + self.bottom, self.left + self.right]
    }

    /// Explicit `[top, left, bottom, right]` padding.
    pub fn to_padding(self) -> Padding {
        Padding::Explicit(vec![self.top, self.left, self.bottom, self.right])
    }
}

/// Splits a padding attribute into its four sides.
///
/// `window` is only consulted for [`Padding::Same`].
pub fn decompose_padding(op: OpKind, padding: &Padding, window: [usize; 2]) -> Result<PadBox> {
    match padding {
        Padding::Valid => Ok(PadBox::default()),
        Padding::Same => {
            let total_h = window[0].saturating_sub(1);
            let total_w = window[1].saturating_sub(1);
            let top = total_h.div_ceil(2);
            let left = total_w.div_ceil(2);
            Ok(PadBox {
                top,
                left,
                bottom: total_h - top,
                right: total_w - left,
            })
        }
        Padding::Explicit(values) => match values.as_slice() {
            &[p] => Ok(PadBox {
                top: p,
                left: p,
                bottom: p,
                right: p,
            }),
            &[h, w] => Ok(PadBox {
                top: h,
                left: w,
                bottom: h,
                right: w,
            }),
            &[top, left, bottom, right] => Ok(PadBox {
                top,
                left,
                bottom,
                right,
            }),
            other => Err(GradError::invalid_attribute(
                op,
                "padding",
                format!("expected 1, 2 or 4 values, got {}", other.len()),
            )),
        },
    }
}

/// Sliding-window configuration over the two spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window2d {
    pub size: [usize; 2],
    pub strides: [usize; 2],
    pub dilation: [usize; 2],
    pub pad: PadBox,
}

impl Window2d {
    pub fn new(
        op: OpKind,
        size: [usize; 2],
        strides: [usize; 2],
        dilation: [usize; 2],
        padding: &Padding,
    ) -> Result<Self> {
        if strides.contains(&0) {
            return Err(GradError::invalid_attribute(op, "strides", "must be positive"));
        }
        if dilation.contains(&0) {
            return Err(GradError::invalid_attribute(op, "dilation", "must be positive"));
        }
        if size.contains(&0) {
            return Err(GradError::invalid_attribute(op, "window", "must be non-empty"));
        }
        let mut window = Self {
            size,
            strides,
            dilation,
            pad: PadBox::default(),
        };
        window.pad = decompose_padding(op, padding, window.dilated_size())?;
        Ok(window)
    }

    /// Extent covered by the window once dilated: `(k - 1) * d + 1`.
    pub fn dilated_size(&self) -> [usize; 2] {
        [0, 1].map(|i| (self.size[i] - 1) * self.dilation[i] + 1)
    }

    /// Output extent of the forward window operator over `input`.
    ///
    /// `ceil_mode` rounds the last partial window up (pooling only).
    pub fn output_size(&self, op: OpKind, input: [usize; 2], ceil_mode: bool) -> Result<[usize; 2]> {
        let totals = self.pad.totals();
        let dilated = self.dilated_size();
        let mut out = [0; 2];
        for i in 0..2 {
            let padded = (input[i] + totals[i]) as i64;
            let extent = dilated[i] as i64;
            if padded < extent {
                return Err(GradError::ShapeArithmeticViolation {
                    op,
                    quantity: "padded input extent",
                    derived: padded,
                    minimum: extent,
                });
            }
            let stride = self.strides[i] as i64;
            let span = padded - extent + if ceil_mode { stride - 1 } else { 0 };
            out[i] = (span / stride + 1) as usize;
        }
        Ok(out)
    }

    /// Natural output extent of the transposed window operator, before any
    /// output padding: `(g - 1) * s - pad_begin - pad_end + (k - 1) * d + 1`.
    pub fn transposed_size(&self, op: OpKind, input: [usize; 2]) -> Result<[usize; 2]> {
        let totals = self.pad.totals();
        let dilated = self.dilated_size();
        let mut out = [0; 2];
        for i in 0..2 {
            let size = (input[i] as i64 - 1) * self.strides[i] as i64 - totals[i] as i64
                + dilated[i] as i64;
            if size < 1 {
                return Err(GradError::ShapeArithmeticViolation {
                    op,
                    quantity: "transposed output extent",
                    derived: size,
                    minimum: 1,
                });
            }
            out[i] = size as usize;
        }
        Ok(out)
    }

    /// Output padding that makes the transposed operator over `grad_size`
    /// reproduce `input_size` exactly.
    pub fn output_padding(
        &self,
        op: OpKind,
        grad_size: [usize; 2],
        input_size: [usize; 2],
    ) -> Result<[usize; 2]> {
        let natural = self.transposed_size(op, grad_size)?;
        let mut padding = [0; 2];
        for i in 0..2 {
            let diff = input_size[i] as i64 - natural[i] as i64;
            if diff < 0 {
                return Err(GradError::ShapeArithmeticViolation {
                    op,
                    quantity: "output padding",
                    derived: diff,
                    minimum: 0,
                });
            }
            padding[i] = diff as usize;
        }
        Ok(padding)
    }

    /// Spatial extent of the weight gradient produced by correlating the
    /// padded input with the output gradient (strides and dilation swapped):
    /// `(in - (g - 1) * s - 1 + pad_begin + pad_end) / d + 1`.
    ///
    /// The result is at least the kernel size; anything smaller means the
    /// forward configuration was inconsistent.
    pub fn weight_grad_extent(
        &self,
        op: OpKind,
        input_size: [usize; 2],
        grad_size: [usize; 2],
    ) -> Result<[usize; 2]> {
        let totals = self.pad.totals();
        let mut extent = [0; 2];
        for i in 0..2 {
            let span = input_size[i] as i64 - (grad_size[i] as i64 - 1) * self.strides[i] as i64
                - 1
                + totals[i] as i64;
            let padded = span.div_euclid(self.dilation[i] as i64) + 1;
            if padded < self.size[i] as i64 {
                return Err(GradError::ShapeArithmeticViolation {
                    op,
                    quantity: "padded weight gradient extent",
                    derived: padded,
                    minimum: self.size[i] as i64,
                });
            }
            extent[i] = padded as usize;
        }
        Ok(extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const OP: OpKind = OpKind::Conv2d;

    #[rstest]
    #[case(Padding::Explicit(vec![1]), [3, 3], PadBox { top: 1, left: 1, bottom: 1, right: 1 })]
    #[case(Padding::Explicit(vec![1, 2]), [3, 3], PadBox { top: 1, left: 2, bottom: 1, right: 2 })]
    #[case(Padding::Explicit(vec![0, 1, 2, 3]), [3, 3], PadBox { top: 0, left: 1, bottom: 2, right: 3 })]
    #[case(Padding::Same, [3, 3], PadBox { top: 1, left: 1, bottom: 1, right: 1 })]
    #[case(Padding::Same, [4, 2], PadBox { top: 2, left: 1, bottom: 1, right: 0 })]
    #[case(Padding::Valid, [5, 5], PadBox::default())]
    fn test_decompose_padding(#[case] padding: Padding, #[case] window: [usize; 2], #[case] expected: PadBox) {
        assert_eq!(decompose_padding(OP, &padding, window).unwrap(), expected);
    }

    #[test]
    fn test_decompose_padding_rejects_three_values() {
        let err = decompose_padding(OP, &Padding::Explicit(vec![1, 2, 3]), [3, 3]).unwrap_err();
        assert!(matches!(err, GradError::InvalidAttribute { name: "padding", .. }));
    }

    #[rstest]
    // input 8, kernel 3, pad 1, stride 1: same size
    #[case([3, 3], [1, 1], [1, 1], Padding::Explicit(vec![1, 1]), [8, 8], [8, 8])]
    // stride 2
    #[case([3, 3], [2, 2], [1, 1], Padding::Explicit(vec![1, 1]), [8, 8], [4, 4])]
    // dilation 2: effective kernel 5
    #[case([3, 3], [1, 1], [2, 2], Padding::Valid, [10, 10], [6, 6])]
    // asymmetric
    #[case([3, 5], [1, 2], [1, 1], Padding::Valid, [7, 9], [5, 3])]
    fn test_output_size(
        #[case] size: [usize; 2],
        #[case] strides: [usize; 2],
        #[case] dilation: [usize; 2],
        #[case] padding: Padding,
        #[case] input: [usize; 2],
        #[case] expected: [usize; 2],
    ) {
        let window = Window2d::new(OP, size, strides, dilation, &padding).unwrap();
        assert_eq!(window.output_size(OP, input, false).unwrap(), expected);
    }

    #[test]
    fn test_output_size_ceil_mode() {
        let window = Window2d::new(OpKind::MaxPool2d, [2, 2], [2, 2], [1, 1], &Padding::Valid).unwrap();
        assert_eq!(window.output_size(OpKind::MaxPool2d, [5, 5], false).unwrap(), [2, 2]);
        assert_eq!(window.output_size(OpKind::MaxPool2d, [5, 5], true).unwrap(), [3, 3]);
    }

    #[test]
    fn test_output_size_window_too_large() {
        let window = Window2d::new(OP, [5, 5], [1, 1], [1, 1], &Padding::Valid).unwrap();
        let err = window.output_size(OP, [3, 3], false).unwrap_err();
        assert_eq!(
            err,
            GradError::ShapeArithmeticViolation {
                op: OP,
                quantity: "padded input extent",
                derived: 3,
                minimum: 5,
            }
        );
    }

    #[test]
    fn test_same_padding_uses_dilated_extent() {
        let window = Window2d::new(OP, [3, 3], [1, 1], [2, 2], &Padding::Same).unwrap();
        assert_eq!(window.pad, PadBox { top: 2, left: 2, bottom: 2, right: 2 });
        assert_eq!(window.output_size(OP, [7, 7], false).unwrap(), [7, 7]);
    }

    #[test]
    fn test_zero_stride_rejected() {
        assert!(Window2d::new(OP, [3, 3], [0, 1], [1, 1], &Padding::Valid).is_err());
    }

    #[rstest]
    // exactly invertible
    #[case([3, 3], [1, 1], [1, 1], Padding::Explicit(vec![1, 1]), [8, 8])]
    // stride 2 over an even input loses a row
    #[case([3, 3], [2, 2], [1, 1], Padding::Explicit(vec![1, 1]), [8, 8])]
    // stride 3, odd input
    #[case([3, 3], [3, 3], [1, 1], Padding::Valid, [11, 10])]
    // dilated
    #[case([3, 3], [2, 1], [2, 2], Padding::Explicit(vec![2, 1]), [9, 9])]
    fn test_output_padding_restores_input(
        #[case] size: [usize; 2],
        #[case] strides: [usize; 2],
        #[case] dilation: [usize; 2],
        #[case] padding: Padding,
        #[case] input: [usize; 2],
    ) {
        let window = Window2d::new(OP, size, strides, dilation, &padding).unwrap();
        let grad = window.output_size(OP, input, false).unwrap();
        let output_padding = window.output_padding(OP, grad, input).unwrap();
        let natural = window.transposed_size(OP, grad).unwrap();
        for i in 0..2 {
            assert_eq!(natural[i] + output_padding[i], input[i]);
            assert!(output_padding[i] < strides[i]);
        }
    }

    #[rstest]
    // stride 1 reproduces the kernel exactly
    #[case([3, 3], [1, 1], [1, 1], Padding::Explicit(vec![1, 1]), [8, 8], [3, 3])]
    // stride 2 over an even input: one extra row/column to crop
    #[case([3, 3], [2, 2], [1, 1], Padding::Explicit(vec![1, 1]), [8, 8], [4, 4])]
    // dilation divides the span
    #[case([3, 3], [1, 1], [2, 2], Padding::Valid, [10, 10], [3, 3])]
    fn test_weight_grad_extent(
        #[case] size: [usize; 2],
        #[case] strides: [usize; 2],
        #[case] dilation: [usize; 2],
        #[case] padding: Padding,
        #[case] input: [usize; 2],
        #[case] expected: [usize; 2],
    ) {
        let window = Window2d::new(OP, size, strides, dilation, &padding).unwrap();
        let grad = window.output_size(OP, input, false).unwrap();
        assert_eq!(window.weight_grad_extent(OP, input, grad).unwrap(), expected);
    }

    #[test]
    fn test_weight_grad_extent_violation() {
        let window = Window2d::new(OP, [3, 3], [1, 1], [1, 1], &Padding::Valid).unwrap();
        // a gradient one row too tall for this input
        let err = window.weight_grad_extent(OP, [8, 8], [7, 6]).unwrap_err();
        assert!(matches!(
            err,
            GradError::ShapeArithmeticViolation {
                quantity: "padded weight gradient extent",
                derived: 2,
                minimum: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_output_padding_violation() {
        let window = Window2d::new(OP, [3, 3], [1, 1], [1, 1], &Padding::Valid).unwrap();
        // gradient larger than any valid forward output for this input
        let err = window.output_padding(OP, [8, 8], [8, 8]).unwrap_err();
        assert!(matches!(
            err,
            GradError::ShapeArithmeticViolation {
                quantity: "output padding",
                derived: -2,
                ..
            }
        ));
    }
}
