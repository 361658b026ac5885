//! Building blocks shared by the MobileNet models.
use std::borrow::Borrow;

use tch::nn::{self, Path};
use tch::Tensor;

/// Default divisor used when rounding channel counts.
pub const CHANNEL_DIVISOR: i64 = 8;

/// Rounds a (width-scaled) channel count to a multiple of [`CHANNEL_DIVISOR`].
///
/// The result is never below 90% of `value`.
pub fn round_channels(value: f64) -> i64 {
    round_channels_with(value, CHANNEL_DIVISOR, None)
}

/// Rounds `value` to the nearest multiple of `divisor`, at least `min_value`
/// (which defaults to `divisor`).
pub fn round_channels_with(value: f64, divisor: i64, min_value: Option<i64>) -> i64 {
    let min_value = min_value.unwrap_or(divisor);
    let d = divisor as f64;
    let rounded = ((value + d / 2.) / d).floor() as i64 * divisor;
    let mut candidate = std::cmp::max(min_value, rounded);
    if (candidate as f64) < 0.9 * value {
        candidate += divisor;
    }
    candidate
}

/// H-Swish activation, `x * relu6(x + 3) / 6`.
pub fn hard_swish(xs: &Tensor) -> Tensor {
    xs * ((xs + 3.).clamp(0., 6.) / 6.)
}

/// ReLU clamped to `[0, 6]`.
pub fn relu6(xs: &Tensor) -> Tensor {
    xs.relu().clamp_max(6.)
}

/// Non-linearity used inside a block, resolved when the block is built.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Activation {
    Relu6,
    HardSwish,
}

impl Activation {
    pub fn forward(self, xs: &Tensor) -> Tensor {
        match self {
            Activation::Relu6 => relu6(xs),
            Activation::HardSwish => hard_swish(xs),
        }
    }
}

/// Convolution layer.
pub(crate) fn conv<'a, P: Borrow<Path<'a>>>(
    path: P,
    c_in: i64,
    c_out: i64,
    ks: i64,
    stride: i64,
    groups: i64,
    bias: bool,
) -> nn::Conv2D {
    let config = nn::ConvConfig { stride, padding: ks / 2, groups, bias, ..Default::default() };
    nn::conv2d(path, c_in, c_out, ks, config)
}

/// Batch-norm layer.
pub(crate) fn norm<'a, P: Borrow<Path<'a>>>(path: P, channels: i64) -> nn::BatchNorm {
    nn::batch_norm2d(path, channels, Default::default())
}
