//! MobileNetV3 implementation.
//!
//! See "Searching for MobileNetV3" Andrew Howard et al. 2019
//! https://arxiv.org/abs/1905.02244
//!
//! The stem and head follow a CIFAR-10 sized variant: the head expands the
//! last stage by a factor 6, pools and then applies two 1x1 convolutions.
use tch::nn::{self, Module, ModuleT, Path};
use tch::Tensor;

use super::layers::{conv, hard_swish, norm, relu6, round_channels, Activation};

/// A row of a MobileNetV3 schedule.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BlockConfig {
    pub expand_ratio: f64,
    pub out_channels: i64,
    pub kernel: i64,
    pub stride: i64,
    pub activation: Activation,
    pub squeeze_excite: bool,
}

const fn row(
    expand_ratio: f64,
    out_channels: i64,
    kernel: i64,
    stride: i64,
    relu: bool,
    squeeze_excite: bool,
) -> BlockConfig {
    let activation = if relu { Activation::Relu6 } else { Activation::HardSwish };
    BlockConfig { expand_ratio, out_channels, kernel, stride, activation, squeeze_excite }
}

/// Schedule of the large variant.
pub const LARGE: [BlockConfig; 15] = [
    // t, c, k, s, relu, se
    row(1., 16, 3, 1, false, false),
    row(4., 24, 3, 2, false, false),
    row(3., 24, 3, 1, false, false),
    row(3., 40, 5, 2, false, true),
    row(3., 40, 5, 1, false, true),
    row(3., 40, 5, 1, false, true),
    row(6., 80, 3, 2, true, false),
    row(2.5, 80, 3, 1, true, false),
    row(2.4, 80, 3, 1, true, false),
    row(2.4, 80, 3, 1, true, false),
    row(6., 112, 3, 1, true, true),
    row(6., 112, 3, 1, true, true),
    row(6., 160, 5, 2, true, true),
    row(6., 160, 5, 1, true, true),
    row(6., 160, 5, 1, true, true),
];

/// Schedule of the small variant.
pub const SMALL: [BlockConfig; 11] = [
    // t, c, k, s, relu, se
    row(1., 16, 3, 2, false, true),
    row(4., 24, 3, 2, false, false),
    row(11. / 3., 24, 3, 1, false, false),
    row(4., 40, 5, 2, true, true),
    row(6., 40, 5, 1, true, true),
    row(6., 40, 5, 1, true, true),
    row(3., 48, 5, 1, true, true),
    row(3., 48, 5, 1, true, true),
    row(6., 96, 5, 2, true, true),
    row(6., 96, 5, 1, true, true),
    row(6., 96, 5, 1, true, true),
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MobileNetV3Variant {
    Large,
    Small,
}

impl MobileNetV3Variant {
    /// `0` selects the large variant, anything else the small one.
    pub fn from_ver(ver: i64) -> Self {
        if ver == 0 {
            MobileNetV3Variant::Large
        } else {
            MobileNetV3Variant::Small
        }
    }

    pub fn schedule(self) -> &'static [BlockConfig] {
        match self {
            MobileNetV3Variant::Large => &LARGE,
            MobileNetV3Variant::Small => &SMALL,
        }
    }

    /// Width of the penultimate 1x1 convolution, not affected by the width multiplier.
    pub fn last_dim(self) -> i64 {
        match self {
            MobileNetV3Variant::Large => 1280,
            MobileNetV3Variant::Small => 1024,
        }
    }
}

/// Channel attention producing a per-channel multiplicative gate.
#[derive(Debug)]
pub struct SqueezeExcitation {
    reduce: nn::Conv2D,
    expand: nn::Conv2D,
}

impl SqueezeExcitation {
    pub fn new(p: &Path, channels: i64) -> SqueezeExcitation {
        let squeezed = round_channels((channels / 4) as f64);
        let reduce = conv(p / "reduce", channels, squeezed, 1, 1, 1, true);
        let expand = conv(p / "expand", squeezed, channels, 1, 1, 1, true);
        SqueezeExcitation { reduce, expand }
    }

    /// Returns the `(batch, channels, 1, 1)` gate for `xs`.
    pub fn gate(&self, xs: &Tensor) -> Tensor {
        let ys = xs.adaptive_avg_pool2d(&[1, 1]).apply(&self.reduce).relu().apply(&self.expand);
        hard_swish(&ys)
    }
}

impl Module for SqueezeExcitation {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs * self.gate(xs)
    }
}

/// Inverted residual block with optional squeeze-excitation.
#[derive(Debug)]
pub struct InvertedResidual {
    expand_conv: nn::Conv2D,
    expand_bn: nn::BatchNorm,
    depthwise_conv: nn::Conv2D,
    depthwise_bn: nn::BatchNorm,
    se: Option<SqueezeExcitation>,
    project_conv: nn::Conv2D,
    project_bn: nn::BatchNorm,
    activation: Activation,
    c_in: i64,
    c_out: i64,
    use_residual: bool,
}

impl InvertedResidual {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        p: &Path,
        c_in: i64,
        expand_ratio: f64,
        c_out: i64,
        kernel: i64,
        stride: i64,
        activation: Activation,
        squeeze_excite: bool,
    ) -> InvertedResidual {
        assert!(stride == 1 || stride == 2, "stride should be either 1 or 2, got {stride}");
        assert!(c_in > 0 && c_out > 0, "channels must be positive, got {c_in} -> {c_out}");
        let c_exp = (c_in as f64 * expand_ratio) as i64;
        assert!(c_exp > 0, "expansion of {c_in} by {expand_ratio} is empty");
        let se =
            if squeeze_excite { Some(SqueezeExcitation::new(&(p / "se"), c_exp)) } else { None };
        InvertedResidual {
            expand_conv: conv(p / "expand_conv", c_in, c_exp, 1, 1, 1, true),
            expand_bn: norm(p / "expand_bn", c_exp),
            depthwise_conv: conv(p / "depthwise_conv", c_exp, c_exp, kernel, stride, c_exp, true),
            depthwise_bn: norm(p / "depthwise_bn", c_exp),
            se,
            project_conv: conv(p / "project_conv", c_exp, c_out, 1, 1, 1, true),
            project_bn: norm(p / "project_bn", c_out),
            activation,
            c_in,
            c_out,
            use_residual: stride == 1 && c_in == c_out,
        }
    }

    pub fn in_channels(&self) -> i64 {
        self.c_in
    }

    pub fn out_channels(&self) -> i64 {
        self.c_out
    }

    pub fn has_residual(&self) -> bool {
        self.use_residual
    }

    pub fn has_squeeze_excitation(&self) -> bool {
        self.se.is_some()
    }
}

impl ModuleT for InvertedResidual {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let ys = xs.apply(&self.expand_conv).apply_t(&self.expand_bn, train);
        let ys = self.activation.forward(&ys);
        let ys = ys.apply(&self.depthwise_conv).apply_t(&self.depthwise_bn, train);
        let mut ys = self.activation.forward(&ys);
        if let Some(se) = &self.se {
            ys = ys.apply(se);
        }
        let ys = ys.apply(&self.project_conv).apply_t(&self.project_bn, train);
        if self.use_residual {
            xs + ys
        } else {
            ys
        }
    }
}

#[derive(Debug)]
pub struct MobileNetV3 {
    stem_conv: nn::Conv2D,
    stem_bn: nn::BatchNorm,
    blocks: Vec<InvertedResidual>,
    head_conv: nn::Conv2D,
    head_bn: nn::BatchNorm,
    pre_classifier: nn::Conv2D,
    classifier: nn::Conv2D,
    head_channels: i64,
}

impl MobileNetV3 {
    pub fn new(
        p: &Path,
        variant: MobileNetV3Variant,
        width_mult: f64,
        n_classes: i64,
    ) -> MobileNetV3 {
        assert!(width_mult > 0., "width_mult should be positive, got {width_mult}");
        assert!(n_classes > 0, "n_classes should be positive, got {n_classes}");
        let schedule = variant.schedule();

        let stem_p = p / "stem";
        let mut c_in = round_channels(16. * width_mult);
        let stem_conv = conv(&stem_p / "conv", 3, c_in, 3, 2, 1, true);
        let stem_bn = norm(&stem_p / "bn", c_in);

        let blocks_p = p / "blocks";
        let mut blocks = Vec::with_capacity(schedule.len());
        for (index, cfg) in schedule.iter().enumerate() {
            let c_out = round_channels(cfg.out_channels as f64 * width_mult);
            blocks.push(InvertedResidual::new(
                &(&blocks_p / index),
                c_in,
                cfg.expand_ratio,
                c_out,
                cfg.kernel,
                cfg.stride,
                cfg.activation,
                cfg.squeeze_excite,
            ));
            c_in = c_out;
        }

        let last = schedule[schedule.len() - 1];
        let head_channels = 6 * round_channels(last.out_channels as f64 * width_mult);
        let head_p = p / "head";
        let head_conv = conv(&head_p / "conv", c_in, head_channels, 1, 1, 1, true);
        let head_bn = norm(&head_p / "bn", head_channels);
        let pre_classifier =
            conv(&head_p / "pre_classifier", head_channels, variant.last_dim(), 1, 1, 1, true);
        let classifier = conv(&head_p / "classifier", variant.last_dim(), n_classes, 1, 1, 1, true);
        MobileNetV3 {
            stem_conv,
            stem_bn,
            blocks,
            head_conv,
            head_bn,
            pre_classifier,
            classifier,
            head_channels,
        }
    }

    pub fn blocks(&self) -> &[InvertedResidual] {
        &self.blocks
    }

    /// Number of channels produced by the first head convolution.
    pub fn head_channels(&self) -> i64 {
        self.head_channels
    }
}

impl ModuleT for MobileNetV3 {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let mut ys = relu6(&xs.apply(&self.stem_conv).apply_t(&self.stem_bn, train));
        for block in self.blocks.iter() {
            ys = ys.apply_t(block, train);
        }
        let ys = hard_swish(&ys.apply(&self.head_conv).apply_t(&self.head_bn, train));
        let ys = hard_swish(&ys.adaptive_avg_pool2d(&[1, 1]).apply(&self.pre_classifier));
        ys.apply(&self.classifier).flatten(1, -1)
    }
}

/// Builds a MobileNetV3 network, `ver == 0` selecting the large variant.
pub fn mobilenet_v3(p: &Path, ver: i64, width_mult: f64) -> MobileNetV3 {
    MobileNetV3::new(p, MobileNetV3Variant::from_ver(ver), width_mult, 10)
}

/// Build large MobileNetV3 model
pub fn v3_large(p: &Path, n_classes: i64, width_mult: f64) -> MobileNetV3 {
    MobileNetV3::new(p, MobileNetV3Variant::Large, width_mult, n_classes)
}

/// Build small MobileNetV3 model
pub fn v3_small(p: &Path, n_classes: i64, width_mult: f64) -> MobileNetV3 {
    MobileNetV3::new(p, MobileNetV3Variant::Small, width_mult, n_classes)
}
