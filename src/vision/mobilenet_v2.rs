//! MobileNet V2 implementation.
//! <https://ai.googleblog.com/2018/04/mobilenetv2-next-generation-of-on.html>
use tch::nn::{self, ModuleT, Path};
use tch::Tensor;

use super::layers::{conv, norm, relu6};

// Conv2D + BatchNorm2D + ReLU6
fn cbr(p: &Path, c_in: i64, c_out: i64, ks: i64, stride: i64, g: i64) -> nn::SequentialT {
    nn::seq_t()
        .add(conv(p / "conv", c_in, c_out, ks, stride, g, false))
        .add(norm(p / "bn", c_out))
        .add_fn(relu6)
}

/// Inverted residual block, every convolution being followed by a ReLU6
/// including the projection.
#[derive(Debug)]
pub struct InvertedBlock {
    layers: nn::SequentialT,
    use_residual: bool,
}

impl InvertedBlock {
    pub fn new(p: &Path, c_in: i64, c_out: i64, expand_ratio: i64, stride: i64) -> InvertedBlock {
        assert!(stride == 1 || stride == 2, "stride should be either 1 or 2, got {stride}");
        let c_hidden = c_in * expand_ratio;
        let mut layers = nn::seq_t();
        if expand_ratio != 1 {
            layers = layers.add(cbr(&(p / "expand"), c_in, c_hidden, 1, 1, 1));
        }
        layers = layers
            .add(cbr(&(p / "depthwise"), c_hidden, c_hidden, 3, stride, c_hidden))
            .add(cbr(&(p / "project"), c_hidden, c_out, 1, 1, 1));
        InvertedBlock { layers, use_residual: stride == 1 && c_in == c_out }
    }

    pub fn has_residual(&self) -> bool {
        self.use_residual
    }
}

impl ModuleT for InvertedBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let ys = xs.apply_t(&self.layers, train);
        if self.use_residual {
            xs + ys
        } else {
            ys
        }
    }
}

/// A stage of the network: `repeats` blocks, the first one using `stride`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StageConfig {
    pub expand_ratio: i64,
    pub out_channels: i64,
    pub repeats: i64,
    pub stride: i64,
}

const fn stage(expand_ratio: i64, out_channels: i64, repeats: i64, stride: i64) -> StageConfig {
    StageConfig { expand_ratio, out_channels, repeats, stride }
}

pub const INVERTED_RESIDUAL_SETTINGS: [StageConfig; 7] = [
    stage(1, 16, 1, 1),
    stage(6, 24, 2, 2),
    stage(6, 32, 3, 2),
    stage(6, 64, 4, 2),
    stage(6, 96, 3, 1),
    stage(6, 160, 3, 2),
    stage(6, 320, 1, 1),
];

/// Builds a MobileNetV2 where every channel count is scaled by `alpha` and
/// truncated.
pub fn v2(p: &Path, n_classes: i64, alpha: f64) -> impl ModuleT {
    assert!(alpha > 0., "alpha should be positive, got {alpha}");
    let f_p = p / "features";
    let mut c_in = (32. * alpha) as i64;
    let last_channel = (1280. * alpha) as i64;
    let mut features = nn::seq_t().add(cbr(&(&f_p / "stem"), 3, c_in, 3, 2, 1));
    let mut layer_id = 0;
    for cfg in INVERTED_RESIDUAL_SETTINGS.iter() {
        let c_out = (cfg.out_channels as f64 * alpha) as i64;
        for i in 0..cfg.repeats {
            let stride = if i == 0 { cfg.stride } else { 1 };
            let block_p = &f_p / layer_id;
            features =
                features.add(InvertedBlock::new(&block_p, c_in, c_out, cfg.expand_ratio, stride));
            c_in = c_out;
            layer_id += 1;
        }
    }
    features = features.add(cbr(&(&f_p / "last"), c_in, last_channel, 1, 1, 1));
    let classifier = nn::linear(p / "classifier", last_channel, n_classes, Default::default());
    nn::func_t(move |xs, train| {
        xs.apply_t(&features, train)
            .adaptive_avg_pool2d(&[1, 1])
            .flatten(1, -1)
            .dropout(0.2, train)
            .apply(&classifier)
    })
}
