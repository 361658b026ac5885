use mobilenet_search::vision::layers::{hard_swish, round_channels, round_channels_with, Activation};
use mobilenet_search::vision::mobilenet_v2::{self, InvertedBlock};
use mobilenet_search::vision::mobilenet_v3::{
    self, InvertedResidual, MobileNetV3, MobileNetV3Variant, SqueezeExcitation, LARGE, SMALL,
};
use mobilenet_search::vision::Architecture;
use tch::nn::{self, Module, ModuleT};
use tch::{Device, Kind, Tensor};

use test_utils::*;

fn zero_vars(vs: &nn::VarStore, suffix: &str) {
    tch::no_grad(|| {
        for (name, mut var) in vs.variables() {
            if name.ends_with(suffix) {
                let _ = var.zero_();
            }
        }
    });
}

#[test]
fn round_channels_examples() {
    assert_eq!(round_channels(10.), 16);
    assert_eq!(round_channels(16.), 16);
    assert_eq!(round_channels(8.), 8);
    assert_eq!(round_channels(3.), 8);
    assert_eq!(round_channels(24.), 24);
    assert_eq!(round_channels(12.), 16);
    assert_eq!(round_channels(1280.), 1280);
    assert_eq!(round_channels_with(10., 4, None), 12);
    assert_eq!(round_channels_with(3., 8, Some(16)), 16);
}

#[test]
fn round_channels_properties() {
    for i in 0..4000 {
        let v = i as f64 * 0.37;
        let r = round_channels(v);
        assert_eq!(r % 8, 0, "{v} -> {r}");
        assert!(r >= 8, "{v} -> {r}");
        assert!(r as f64 >= 0.9 * v, "{v} -> {r}");
    }
}

#[test]
fn hard_swish_values() {
    let xs = Tensor::from_slice(&[-4f32, -3., -1., 0., 1., 3., 4.]);
    let ys = Vec::<f32>::try_from(&hard_swish(&xs)).unwrap();
    let expected = [0., 0., -1. / 3., 0., 2. / 3., 3., 4.];
    for (y, e) in ys.iter().zip(expected.iter()) {
        assert!((y - e).abs() < 1e-6, "{ys:?}");
    }
    let relu6 = Vec::<f32>::try_from(&Activation::Relu6.forward(&(xs * 2.))).unwrap();
    assert_eq!(relu6, [0., 0., 0., 0., 2., 6., 6.]);
}

#[test]
fn squeeze_excitation_gates_channels() {
    let vs = nn::VarStore::new(Device::Cpu);
    let se = SqueezeExcitation::new(&(vs.root() / "se"), 32);
    let xs = Tensor::randn([2, 32, 8, 8], (Kind::Float, Device::Cpu));
    assert_eq!(se.gate(&xs).size(), [2, 32, 1, 1]);
    assert_eq!(se.forward(&xs).size(), [2, 32, 8, 8]);
}

#[test]
fn v3_block_residual_is_identity_with_zero_branch() {
    let vs = nn::VarStore::new(Device::Cpu);
    let p = vs.root() / "block";
    let block = InvertedResidual::new(&p, 16, 4., 16, 3, 1, Activation::HardSwish, true);
    assert!(block.has_residual());
    assert!(block.has_squeeze_excitation());
    zero_vars(&vs, "project_bn.weight");
    let xs = Tensor::randn([2, 16, 8, 8], (Kind::Float, Device::Cpu));
    let ys = block.forward_t(&xs, false);
    assert_eq!(ys.size(), xs.size());
    assert!(max_abs_diff(&ys, &xs) < 1e-6);
}

#[test]
fn v3_block_without_residual_ignores_input() {
    let vs = nn::VarStore::new(Device::Cpu);
    let root = vs.root();
    let widen =
        InvertedResidual::new(&(&root / "widen"), 16, 3., 24, 5, 1, Activation::Relu6, false);
    let strided =
        InvertedResidual::new(&(&root / "strided"), 16, 3., 16, 3, 2, Activation::HardSwish, true);
    assert!(!widen.has_residual());
    assert!(!strided.has_residual());
    zero_vars(&vs, "project_bn.weight");
    let xs = Tensor::randn([2, 16, 8, 8], (Kind::Float, Device::Cpu));
    let ys = widen.forward_t(&xs, false);
    assert_eq!(ys.size(), [2, 24, 8, 8]);
    assert_eq!(f64_from(&ys.abs().max()), 0.);
    let ys = strided.forward_t(&xs, false);
    assert_eq!(ys.size(), [2, 16, 4, 4]);
    assert_eq!(f64_from(&ys.abs().max()), 0.);
}

#[test]
#[should_panic(expected = "stride should be either 1 or 2")]
fn v3_block_rejects_stride() {
    let vs = nn::VarStore::new(Device::Cpu);
    InvertedResidual::new(&vs.root(), 16, 1., 16, 3, 3, Activation::Relu6, false);
}

#[test]
fn v2_block_residual_is_identity_with_zero_branch() {
    let vs = nn::VarStore::new(Device::Cpu);
    let block = InvertedBlock::new(&(vs.root() / "block"), 16, 16, 6, 1);
    assert!(block.has_residual());
    zero_vars(&vs, "project.bn.weight");
    let xs = Tensor::randn([2, 16, 8, 8], (Kind::Float, Device::Cpu));
    let ys = block.forward_t(&xs, false);
    assert!(max_abs_diff(&ys, &xs) < 1e-6);

    let vs = nn::VarStore::new(Device::Cpu);
    let block = InvertedBlock::new(&(vs.root() / "block"), 16, 24, 1, 2);
    assert!(!block.has_residual());
    zero_vars(&vs, "project.bn.weight");
    let ys = block.forward_t(&xs, false);
    assert_eq!(ys.size(), [2, 24, 4, 4]);
    assert_eq!(f64_from(&ys.abs().max()), 0.);
}

#[test]
#[should_panic(expected = "stride should be either 1 or 2")]
fn v2_block_rejects_stride() {
    let vs = nn::VarStore::new(Device::Cpu);
    InvertedBlock::new(&vs.root(), 16, 16, 6, 4);
}

#[test]
fn mobilenet_v3_zeros() {
    let vs = nn::VarStore::new(Device::Cpu);
    let net = mobilenet_v3::mobilenet_v3(&vs.root(), 0, 1.0);
    let img = Tensor::zeros([4, 3, 32, 32], (Kind::Float, Device::Cpu));
    let logits = img.apply_t(&net, false);
    assert_eq!(logits.size(), [4, 10]);
}

#[test]
fn mobilenet_v3_output_shapes() {
    for (variant, width_mult) in [
        (MobileNetV3Variant::Large, 1.0),
        (MobileNetV3Variant::Large, 0.5),
        (MobileNetV3Variant::Small, 1.0),
        (MobileNetV3Variant::Small, 1.35),
    ] {
        let vs = nn::VarStore::new(Device::Cpu);
        let net = MobileNetV3::new(&vs.root(), variant, width_mult, 10);
        for batch in [1, 3] {
            let img = Tensor::randn([batch, 3, 32, 32], (Kind::Float, Device::Cpu));
            assert_eq!(net.forward_t(&img, false).size(), [batch, 10]);
        }
        let img = Tensor::randn([2, 3, 32, 32], (Kind::Float, Device::Cpu));
        assert_eq!(net.forward_t(&img, true).size(), [2, 10]);
    }
}

#[test]
fn mobilenet_v3_channels() {
    assert_eq!(MobileNetV3Variant::from_ver(0), MobileNetV3Variant::Large);
    assert_eq!(MobileNetV3Variant::from_ver(1), MobileNetV3Variant::Small);
    assert_eq!(LARGE.len(), 15);
    assert_eq!(SMALL.len(), 11);

    let vs = nn::VarStore::new(Device::Cpu);
    let net = MobileNetV3::new(&vs.root(), MobileNetV3Variant::Large, 1.0, 10);
    let blocks = net.blocks();
    assert_eq!(blocks.len(), 15);
    assert_eq!(blocks[0].in_channels(), 16);
    assert!(blocks[0].has_residual());
    assert!(blocks[3].has_squeeze_excitation());
    assert!(!blocks[6].has_squeeze_excitation());
    for pair in blocks.windows(2) {
        assert_eq!(pair[0].out_channels(), pair[1].in_channels());
    }
    assert_eq!(blocks[14].out_channels(), 160);
    assert_eq!(net.head_channels(), 960);

    let vs = nn::VarStore::new(Device::Cpu);
    let net = MobileNetV3::new(&vs.root(), MobileNetV3Variant::Large, 0.5, 10);
    let outs: Vec<i64> = net.blocks().iter().map(|b| b.out_channels()).collect();
    assert!(outs.iter().all(|c| c % 8 == 0));
    assert_eq!(outs[1], 16);
    assert_eq!(net.head_channels(), 480);

    let vs = nn::VarStore::new(Device::Cpu);
    let net = MobileNetV3::new(&vs.root(), MobileNetV3Variant::Small, 1.0, 10);
    assert_eq!(net.head_channels(), 576);
}

#[test]
fn mobilenet_v2() {
    for alpha in [1.0, 0.5] {
        let vs = nn::VarStore::new(Device::Cpu);
        let net = mobilenet_v2::v2(&vs.root(), 10, alpha);
        let img = Tensor::randn([2, 3, 32, 32], (Kind::Float, Device::Cpu));
        assert_eq!(img.apply_t(&net, false).size(), [2, 10]);
        assert_eq!(img.apply_t(&net, true).size(), [2, 10]);
    }
}

#[test]
fn mobilenet_v3_builders() {
    let vs = nn::VarStore::new(Device::Cpu);
    let large = mobilenet_v3::v3_large(&(vs.root() / "large"), 100, 1.0);
    let small = mobilenet_v3::v3_small(&(vs.root() / "small"), 100, 1.0);
    assert_eq!(large.blocks().len(), 15);
    assert_eq!(small.blocks().len(), 11);
    let img = Tensor::randn([2, 3, 32, 32], (Kind::Float, Device::Cpu));
    assert_eq!(large.forward_t(&img, false).size(), [2, 100]);
    assert_eq!(small.forward_t(&img, false).size(), [2, 100]);
}

#[test]
fn architectures_build() {
    for architecture in [Architecture::V3Large, Architecture::V3Small, Architecture::V2] {
        let vs = nn::VarStore::new(Device::Cpu);
        let net = architecture.build(&vs.root(), 0.75, 10);
        let img = Tensor::zeros([2, 3, 32, 32], (Kind::Float, Device::Cpu));
        assert_eq!(net.forward_t(&img, false).size(), [2, 10]);
    }
}
