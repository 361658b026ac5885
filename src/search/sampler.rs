//! Strategies proposing the hyperparameters of the next trial.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::space::{FloatRange, HyperParams, SearchSpace};
use super::study::TrialResult;
use crate::train::OptimizerKind;

/// Proposes a point of the search space given the trials run so far.
pub trait Sampler {
    fn sample(&mut self, space: &SearchSpace, history: &[TrialResult]) -> HyperParams;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerKind {
    #[default]
    Tpe,
    Random,
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

pub fn create_sampler(
    kind: SamplerKind,
    seed: Option<u64>,
    n_startup_trials: usize,
) -> Box<dyn Sampler> {
    match kind {
        SamplerKind::Tpe => Box::new(TpeSampler::new(seed).with_n_startup(n_startup_trials)),
        SamplerKind::Random => Box::new(RandomSampler::new(seed)),
    }
}

/// Independent uniform / log-uniform / categorical draws.
#[derive(Debug)]
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: Option<u64>) -> Self {
        RandomSampler { rng: rng_from_seed(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, space: &SearchSpace, _history: &[TrialResult]) -> HyperParams {
        space.sample_random(&mut self.rng)
    }
}

/// Tree-structured Parzen Estimator.
///
/// Complete trials are split into a good and a bad group by accuracy, each
/// parameter is then drawn independently so as to maximize the ratio of the
/// good density l(x) to the bad density g(x). The first `n_startup` proposals
/// are random.
#[derive(Debug)]
pub struct TpeSampler {
    rng: StdRng,
    n_startup: usize,
    n_candidates: usize,
}

impl TpeSampler {
    pub fn new(seed: Option<u64>) -> Self {
        TpeSampler { rng: rng_from_seed(seed), n_startup: 10, n_candidates: 24 }
    }

    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup = n.max(1);
        self
    }

    pub fn with_n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n.max(1);
        self
    }

    /// Size of the good group: 10% of the trials, at least one and at most 25.
    fn n_good(n_trials: usize) -> usize {
        ((n_trials as f64 * 0.1).ceil() as usize).clamp(1, 25)
    }

    fn sample_float(&mut self, range: &FloatRange, good: &[f64], bad: &[f64]) -> f64 {
        let (low, high) = range.internal_bounds();
        let good: Vec<f64> = good.iter().map(|&v| range.to_internal(v)).collect();
        let bad: Vec<f64> = bad.iter().map(|&v| range.to_internal(v)).collect();
        let bandwidth = ((high - low) / 10.).max(f64::EPSILON);

        let mut best_value = good[0];
        let mut best_ratio = f64::NEG_INFINITY;
        for _ in 0..self.n_candidates {
            let center = good[self.rng.gen_range(0..good.len())];
            let candidate = (center + bandwidth * standard_normal(&mut self.rng)).clamp(low, high);
            let ratio =
                kde(candidate, &good, bandwidth) / (kde(candidate, &bad, bandwidth) + 1e-12);
            if ratio > best_ratio {
                best_ratio = ratio;
                best_value = candidate;
            }
        }
        range.from_internal(best_value)
    }

    fn sample_optimizer(
        &mut self,
        choices: &[OptimizerKind],
        good: &[OptimizerKind],
        bad: &[OptimizerKind],
    ) -> OptimizerKind {
        let count =
            |group: &[OptimizerKind], c: OptimizerKind| group.iter().filter(|&&o| o == c).count();
        // Laplace smoothing keeps unseen choices reachable.
        let weights: Vec<f64> = choices
            .iter()
            .map(|&c| (count(good, c) + 1) as f64 / (count(bad, c) + 1) as f64)
            .collect();
        let total: f64 = weights.iter().sum();
        let mut r = self.rng.gen::<f64>() * total;
        for (&choice, w) in choices.iter().zip(weights.iter()) {
            if r < *w {
                return choice;
            }
            r -= w;
        }
        choices[choices.len() - 1]
    }
}

impl Sampler for TpeSampler {
    fn sample(&mut self, space: &SearchSpace, history: &[TrialResult]) -> HyperParams {
        let mut completed: Vec<(&HyperParams, f64)> = history
            .iter()
            .filter(|t| t.is_complete())
            .filter_map(|t| t.value.filter(|v| v.is_finite()).map(|v| (&t.params, v)))
            .collect();
        if completed.len() < self.n_startup.max(2) {
            return space.sample_random(&mut self.rng);
        }

        // Highest accuracy first.
        completed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let n_good = Self::n_good(completed.len()).min(completed.len() - 1);
        let (good, bad) = completed.split_at(n_good);

        let widths = |group: &[(&HyperParams, f64)]| -> Vec<f64> {
            group.iter().map(|(p, _)| p.width_mult).collect()
        };
        let lrs = |group: &[(&HyperParams, f64)]| -> Vec<f64> {
            group.iter().map(|(p, _)| p.learning_rate).collect()
        };
        let opts = |group: &[(&HyperParams, f64)]| -> Vec<OptimizerKind> {
            group.iter().map(|(p, _)| p.optimizer).collect()
        };

        let width_mult = self.sample_float(&space.width_mult, &widths(good), &widths(bad));
        let learning_rate = self.sample_float(&space.learning_rate, &lrs(good), &lrs(bad));
        let optimizer = self.sample_optimizer(&space.optimizers, &opts(good), &opts(bad));
        HyperParams { width_mult, learning_rate, optimizer }
    }
}

/// Gaussian kernel density estimate at `x`.
fn kde(x: f64, values: &[f64], bandwidth: f64) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    values.iter().map(|&v| (-(x - v).powi(2) / (2. * bandwidth.powi(2))).exp()).sum::<f64>()
        / values.len() as f64
}

/// Box-Muller transform.
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-10);
    let u2: f64 = rng.gen();
    (-2. * u1.ln()).sqrt() * (2. * std::f64::consts::PI * u2).cos()
}
