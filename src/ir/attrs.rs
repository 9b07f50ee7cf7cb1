//! Operator attribute records.
//!
//! Attributes are immutable once attached to a `Call`. Records with several
//! optional fields use typed builders with the usual defaults (unit stride,
//! unit dilation, a single group, `NCHW` data and `OIHW` kernels).

use typed_builder::TypedBuilder;

/// Spatial padding of a 2-D window operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Padding {
    /// One value (all sides), two values (`[h, w]`, both sides each) or four
    /// values (`[top, left, bottom, right]`).
    Explicit(Vec<usize>),
    /// Total padding `window - 1` per axis, larger half at the start.
    Same,
    /// No padding.
    Valid,
}

impl Default for Padding {
    fn default() -> Self {
        Padding::Explicit(vec![0, 0])
    }
}

impl From<[usize; 2]> for Padding {
    fn from(p: [usize; 2]) -> Self {
        Padding::Explicit(p.to_vec())
    }
}

impl From<[usize; 4]> for Padding {
    fn from(p: [usize; 4]) -> Self {
        Padding::Explicit(p.to_vec())
    }
}

/// `clip(x; a_min, a_max)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipAttrs {
    pub a_min: f64,
    pub a_max: f64,
}

/// 2-D convolution.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct Conv2dAttrs {
    #[builder(default = [1, 1])]
    pub strides: [usize; 2],
    #[builder(default, setter(into))]
    pub padding: Padding,
    #[builder(default = [1, 1])]
    pub dilation: [usize; 2],
    #[builder(default = 1)]
    pub groups: usize,
    #[builder(default, setter(strip_option))]
    pub channels: Option<usize>,
    #[builder(default, setter(strip_option))]
    pub kernel_size: Option<[usize; 2]>,
    #[builder(default = "NCHW".to_string(), setter(into))]
    pub data_layout: String,
    #[builder(default = "OIHW".to_string(), setter(into))]
    pub kernel_layout: String,
    /// Empty means "same as `data_layout`".
    #[builder(default, setter(into))]
    pub out_layout: String,
}

/// 2-D transposed convolution.
///
/// The weight keeps the orientation of the convolution it transposes:
/// `(in_channels, out_channels / groups, kh, kw)`.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct Conv2dTransposeAttrs {
    #[builder(default = [1, 1])]
    pub strides: [usize; 2],
    #[builder(default, setter(into))]
    pub padding: Padding,
    #[builder(default = [1, 1])]
    pub dilation: [usize; 2],
    #[builder(default = 1)]
    pub groups: usize,
    #[builder(default = [0, 0])]
    pub output_padding: [usize; 2],
    #[builder(default = "NCHW".to_string(), setter(into))]
    pub data_layout: String,
    #[builder(default = "OIHW".to_string(), setter(into))]
    pub kernel_layout: String,
}

/// 2-D pooling and its backward primitives.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct Pool2dAttrs {
    pub pool_size: [usize; 2],
    #[builder(default = [1, 1])]
    pub strides: [usize; 2],
    #[builder(default, setter(into))]
    pub padding: Padding,
    #[builder(default = "NCHW".to_string(), setter(into))]
    pub layout: String,
    #[builder(default = false)]
    pub ceil_mode: bool,
    /// Only meaningful for average pooling.
    #[builder(default = false)]
    pub count_include_pad: bool,
}

/// `reshape(x; newshape)`. `0` copies the input dimension at the same
/// position, a single `-1` is inferred from the element count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReshapeAttrs {
    pub newshape: Vec<i64>,
}

/// `transpose(x; axes)`. `None` reverses the axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransposeAttrs {
    pub axes: Option<Vec<i64>>,
}

/// `tile(x; reps)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileAttrs {
    pub reps: Vec<usize>,
}

/// `strided_slice(x; begin, end, strides)`
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct StridedSliceAttrs {
    pub begin: Vec<usize>,
    /// `None` runs to the end of the axis.
    pub end: Vec<Option<usize>>,
    /// Empty means unit strides.
    #[builder(default)]
    pub strides: Vec<usize>,
}

/// Reductions such as `sum`.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct ReduceAttrs {
    /// `None` reduces over every axis.
    #[builder(default, setter(strip_option))]
    pub axes: Option<Vec<i64>>,
    #[builder(default = false)]
    pub keepdims: bool,
}

/// `concatenate(tuple; axis)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatenateAttrs {
    pub axis: i64,
}

/// Attribute set of a call.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Attrs {
    #[default]
    None,
    Clip(ClipAttrs),
    Conv2d(Conv2dAttrs),
    Conv2dTranspose(Conv2dTransposeAttrs),
    Pool2d(Pool2dAttrs),
    Reshape(ReshapeAttrs),
    Transpose(TransposeAttrs),
    Tile(TileAttrs),
    StridedSlice(StridedSliceAttrs),
    Reduce(ReduceAttrs),
    Concatenate(ConcatenateAttrs),
}

macro_rules! attrs_accessors {
    ($($method:ident => $variant:ident($ty:ty),)*) => {
        impl Attrs {
            $(
                pub fn $method(&self) -> Option<&$ty> {
                    match self {
                        Attrs::$variant(attrs) => Some(attrs),
                        _ => None,
                    }
                }
            )*

            /// Name of the attribute record, for error messages.
            pub fn kind_name(&self) -> &'static str {
                match self {
                    Attrs::None => "none",
                    $(Attrs::$variant(_) => stringify!($method),)*
                }
            }
        }

        $(
            impl From<$ty> for Attrs {
                fn from(attrs: $ty) -> Self {
                    Attrs::$variant(attrs)
                }
            }
        )*
    };
}

attrs_accessors! {
    clip => Clip(ClipAttrs),
    conv2d => Conv2d(Conv2dAttrs),
    conv2d_transpose => Conv2dTranspose(Conv2dTransposeAttrs),
    pool2d => Pool2d(Pool2dAttrs),
    reshape => Reshape(ReshapeAttrs),
    transpose => Transpose(TransposeAttrs),
    tile => Tile(TileAttrs),
    strided_slice => StridedSlice(StridedSliceAttrs),
    reduce => Reduce(ReduceAttrs),
    concatenate => Concatenate(ConcatenateAttrs),
}
