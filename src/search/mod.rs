//! Hyperparameter search: propose, evaluate, record, for a fixed number of
//! trials, then report the most accurate trial.
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};

mod sampler;
mod space;
mod study;

pub use sampler::{create_sampler, RandomSampler, Sampler, SamplerKind, TpeSampler};
pub use space::{FloatRange, HyperParams, SearchSpace};
pub use study::{Study, TrialResult, TrialState};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SearchState {
    Running,
    Done,
}

pub struct Search {
    n_trials: usize,
    space: SearchSpace,
    sampler: Box<dyn Sampler>,
    study: Study,
    state: SearchState,
}

impl Search {
    pub fn new(config: &SearchConfig) -> Result<Search> {
        let sampler = create_sampler(config.sampler, config.seed, config.n_startup_trials);
        Search::with_sampler(config.n_trials, config.space.clone(), sampler)
    }

    pub fn with_sampler(
        n_trials: usize,
        space: SearchSpace,
        sampler: Box<dyn Sampler>,
    ) -> Result<Search> {
        space.validate()?;
        Ok(Search { n_trials, space, sampler, study: Study::new(), state: SearchState::Running })
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn study(&self) -> &Study {
        &self.study
    }

    pub fn into_study(self) -> Study {
        self.study
    }

    /// Runs every remaining trial sequentially. A trial whose objective
    /// returns an error or panics is recorded as failed and the search goes on.
    pub fn optimize<F>(&mut self, mut objective: F) -> &Study
    where
        F: FnMut(&HyperParams) -> Result<f64>,
    {
        while self.study.n_trials() < self.n_trials {
            let number = self.study.n_trials();
            let params = self.sampler.sample(&self.space, self.study.trials());
            let start = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| objective(&params)))
                .unwrap_or_else(|payload| Err(SearchError::Panicked(panic_message(payload))));
            let result = match outcome {
                Ok(value) => {
                    let duration = start.elapsed().as_secs_f64();
                    info!(trial = number, %params, value, duration, "trial complete");
                    TrialResult::complete(number, params, value, duration)
                }
                Err(err) => {
                    let duration = start.elapsed().as_secs_f64();
                    warn!(trial = number, %params, %err, "trial failed");
                    TrialResult::failed(number, params, err.to_string(), duration)
                }
            };
            self.study.add_trial(result);
            if let Some(best) = self.study.best_value() {
                info!(best, n_trials = self.study.n_trials(), "best so far");
            }
        }
        self.state = SearchState::Done;
        &self.study
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => msg.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}
