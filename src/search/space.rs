//! Hyperparameters of a trial and the space they are drawn from.
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::train::OptimizerKind;

/// The values a trial is trained with.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub width_mult: f64,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
}

impl HyperParams {
    pub fn new(width_mult: f64, learning_rate: f64, optimizer: OptimizerKind) -> Self {
        HyperParams { width_mult, learning_rate, optimizer }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.width_mult.is_finite() && self.width_mult > 0.) {
            return Err(SearchError::InvalidParameter {
                name: "width_mult",
                value: self.width_mult.to_string(),
            });
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return Err(SearchError::InvalidParameter {
                name: "learning_rate",
                value: self.learning_rate.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{width_mult: {}, lr: {}, optimizer: {}}}",
            self.width_mult, self.learning_rate, self.optimizer
        )
    }
}

/// A closed interval, optionally sampled in log space.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub low: f64,
    pub high: f64,
    #[serde(default)]
    pub log: bool,
}

impl FloatRange {
    pub const fn uniform(low: f64, high: f64) -> Self {
        FloatRange { low, high, log: false }
    }

    pub const fn log_uniform(low: f64, high: f64) -> Self {
        FloatRange { low, high, log: true }
    }

    pub fn contains(&self, v: f64) -> bool {
        self.low <= v && v <= self.high
    }

    /// Maps a value to the space samplers work in (log space when `log` is set).
    pub fn to_internal(&self, v: f64) -> f64 {
        if self.log {
            v.ln()
        } else {
            v
        }
    }

    /// Inverse of [`FloatRange::to_internal`], clamped to the interval.
    pub fn from_internal(&self, v: f64) -> f64 {
        let v = if self.log { v.exp() } else { v };
        v.clamp(self.low, self.high)
    }

    /// Bounds in internal space.
    pub fn internal_bounds(&self) -> (f64, f64) {
        (self.to_internal(self.low), self.to_internal(self.high))
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let (low, high) = self.internal_bounds();
        self.from_internal(rng.gen_range(low..=high))
    }

    fn validate(&self, name: &'static str) -> Result<()> {
        let valid = self.low.is_finite()
            && self.high.is_finite()
            && self.low <= self.high
            && (!self.log || self.low > 0.);
        if valid {
            Ok(())
        } else {
            Err(SearchError::InvalidParameter { name, value: format!("{self:?}") })
        }
    }
}

/// Ranges the samplers draw trial hyperparameters from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSpace {
    pub width_mult: FloatRange,
    pub learning_rate: FloatRange,
    pub optimizers: Vec<OptimizerKind>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        SearchSpace {
            width_mult: FloatRange::uniform(0.5, 1.5),
            learning_rate: FloatRange::log_uniform(1e-4, 1e-2),
            optimizers: OptimizerKind::ALL.to_vec(),
        }
    }
}

impl SearchSpace {
    pub fn validate(&self) -> Result<()> {
        self.width_mult.validate("width_mult")?;
        self.learning_rate.validate("learning_rate")?;
        if self.optimizers.is_empty() {
            return Err(SearchError::InvalidParameter {
                name: "optimizers",
                value: "[]".to_string(),
            });
        }
        Ok(())
    }

    /// Draws every parameter independently: uniform width, log-uniform
    /// learning rate and a uniformly chosen optimizer.
    pub fn sample_random<R: Rng>(&self, rng: &mut R) -> HyperParams {
        let width_mult = self.width_mult.sample(rng);
        let learning_rate = self.learning_rate.sample(rng);
        let optimizer = self.optimizers[rng.gen_range(0..self.optimizers.len())];
        HyperParams { width_mult, learning_rate, optimizer }
    }

    pub fn contains(&self, params: &HyperParams) -> bool {
        self.width_mult.contains(params.width_mult)
            && self.learning_rate.contains(params.learning_rate)
            && self.optimizers.contains(&params.optimizer)
    }
}
