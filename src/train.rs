//! Training and evaluation of one network for one set of hyperparameters.
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tch::nn::{self, ModuleT, OptimizerConfig};
use tch::{Device, Kind, Tensor};
use tracing::{debug, info};

use crate::error::{Result, SearchError};
use crate::search::HyperParams;
use crate::vision::dataset::{augmentation, normalize, Dataset};
use crate::vision::Architecture;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum OptimizerKind {
    Adam,
    #[serde(rename = "SGD")]
    Sgd,
}

impl OptimizerKind {
    pub const ALL: [OptimizerKind; 2] = [OptimizerKind::Adam, OptimizerKind::Sgd];

    /// Builds the optimizer over every trainable variable of `vs`.
    pub fn build(self, vs: &nn::VarStore, lr: f64, momentum: f64) -> Result<nn::Optimizer> {
        let opt = match self {
            OptimizerKind::Adam => nn::Adam::default().build(vs, lr)?,
            OptimizerKind::Sgd => nn::Sgd { momentum, ..Default::default() }.build(vs, lr)?,
        };
        Ok(opt)
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Adam => f.write_str("Adam"),
            OptimizerKind::Sgd => f.write_str("SGD"),
        }
    }
}

/// Fixed settings of the training procedure, shared by all trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub architecture: Architecture,
    pub epochs: usize,
    pub train_batch_size: i64,
    pub test_batch_size: i64,
    pub sgd_momentum: f64,
    /// Zero padding used by the random crop, 0 disables cropping.
    pub crop_padding: i64,
    pub random_flip: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            architecture: Architecture::V3Large,
            epochs: 10,
            train_batch_size: 128,
            test_batch_size: 100,
            sgd_momentum: 0.9,
            crop_padding: 4,
            random_flip: true,
        }
    }
}

impl TrainConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |name, value: String| Err(SearchError::InvalidParameter { name, value });
        if self.train_batch_size <= 0 {
            return invalid("train_batch_size", self.train_batch_size.to_string());
        }
        if self.test_batch_size <= 0 {
            return invalid("test_batch_size", self.test_batch_size.to_string());
        }
        if !(self.sgd_momentum.is_finite() && self.sgd_momentum >= 0.) {
            return invalid("sgd_momentum", self.sgd_momentum.to_string());
        }
        if self.crop_padding < 0 {
            return invalid("crop_padding", self.crop_padding.to_string());
        }
        Ok(())
    }
}

/// Trains a freshly initialized network on a dataset and reports its test accuracy.
pub struct Trainer<'a> {
    dataset: &'a Dataset,
    config: TrainConfig,
    device: Device,
}

impl<'a> Trainer<'a> {
    pub fn new(dataset: &'a Dataset, config: TrainConfig, device: Device) -> Trainer<'a> {
        Trainer { dataset, config, device }
    }

    /// Runs the full procedure and returns the top-1 test accuracy in percent.
    pub fn train_and_evaluate(&self, params: &HyperParams) -> Result<f64> {
        self.config.validate()?;
        params.validate()?;
        let start = Instant::now();
        let vs = nn::VarStore::new(self.device);
        let model =
            self.config.architecture.build(&vs.root(), params.width_mult, self.dataset.labels);
        let mut opt = params.optimizer.build(&vs, params.learning_rate, self.config.sgd_momentum)?;

        for epoch in 1..=self.config.epochs {
            let loss = self.train_epoch(model.as_ref(), &mut opt)?;
            debug!(epoch, loss, "epoch done");
        }

        let accuracy = self.evaluate(model.as_ref())?;
        info!(
            %params,
            architecture = %self.config.architecture,
            accuracy,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "trained and evaluated"
        );
        Ok(accuracy)
    }

    /// One pass over the shuffled training split, returns the mean loss.
    fn train_epoch(&self, model: &dyn ModuleT, opt: &mut nn::Optimizer) -> Result<f64> {
        let mut total_loss = 0.;
        let mut samples = 0;
        for (images, labels) in self.dataset.train_iter(self.config.train_batch_size, self.device) {
            let images = augmentation(&images, self.config.crop_padding, self.config.random_flip);
            let logits = model.forward_t(&normalize(&images), true);
            let loss = logits.cross_entropy_for_logits(&labels);
            opt.backward_step(&loss);
            let bsize = labels.size()[0];
            total_loss += f64::try_from(&loss)? * bsize as f64;
            samples += bsize;
        }
        if samples == 0 {
            return Err(SearchError::EmptySplit("train"));
        }
        Ok(total_loss / samples as f64)
    }

    /// Top-1 accuracy in percent over the test split, in evaluation mode and
    /// without tracking gradients.
    pub fn evaluate(&self, model: &dyn ModuleT) -> Result<f64> {
        let (correct, total) = tch::no_grad(|| -> Result<(i64, i64)> {
            let mut correct = 0;
            let mut total = 0;
            let batches = self.dataset.test_iter(self.config.test_batch_size, self.device);
            for (images, labels) in batches {
                let logits = model.forward_t(&normalize(&images), false);
                correct += count_correct(&logits, &labels)?;
                total += labels.size()[0];
            }
            Ok((correct, total))
        })?;
        if total == 0 {
            return Err(SearchError::EmptySplit("test"));
        }
        Ok(100. * correct as f64 / total as f64)
    }
}

/// Number of samples whose arg-max class matches the label.
pub fn count_correct(logits: &Tensor, labels: &Tensor) -> Result<i64> {
    let predicted = logits.argmax(-1, false);
    let hits = predicted.eq_tensor(labels).sum(Kind::Int64);
    Ok(i64::try_from(&hits)?)
}
