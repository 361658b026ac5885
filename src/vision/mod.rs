//! The `vision` module groups the MobileNet models and the CIFAR-10 data
//! pipeline.
use std::fmt;

use serde::{Deserialize, Serialize};
use tch::nn::{ModuleT, Path};

pub mod cifar;

pub mod dataset;

pub mod layers;

pub mod mobilenet_v2;

pub mod mobilenet_v3;

use mobilenet_v3::{MobileNetV3, MobileNetV3Variant};

/// Network trained for each trial.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    #[default]
    V3Large,
    V3Small,
    V2,
}

impl Architecture {
    /// Builds the network under `p`, scaling channels by `width_mult`.
    pub fn build(self, p: &Path, width_mult: f64, n_classes: i64) -> Box<dyn ModuleT> {
        let variant = match self {
            Architecture::V3Large => MobileNetV3Variant::Large,
            Architecture::V3Small => MobileNetV3Variant::Small,
            Architecture::V2 => return Box::new(mobilenet_v2::v2(p, n_classes, width_mult)),
        };
        Box::new(MobileNetV3::new(p, variant, width_mult, n_classes))
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Architecture::V3Large => "mobilenet-v3-large",
            Architecture::V3Small => "mobilenet-v3-small",
            Architecture::V2 => "mobilenet-v2",
        };
        f.write_str(name)
    }
}
