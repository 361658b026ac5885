//! Search configuration
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::search::{SamplerKind, SearchSpace};
use crate::train::TrainConfig;

/// Everything a search run needs besides the objective itself. Defaults
/// reproduce the reference procedure: 50 TPE trials of 10 epochs each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Directory holding the CIFAR-10 binary files.
    pub data_dir: PathBuf,
    pub n_trials: usize,
    pub sampler: SamplerKind,
    /// Random proposals before TPE starts modelling the history.
    pub n_startup_trials: usize,
    /// Seeds the sampler and the torch generator when set.
    pub seed: Option<u64>,
    pub space: SearchSpace,
    pub train: TrainConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            n_trials: 50,
            sampler: SamplerKind::Tpe,
            n_startup_trials: 10,
            seed: None,
            space: SearchSpace::default(),
            train: TrainConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Loads a JSON configuration, missing fields taking their default value.
    pub fn from_file<T: AsRef<Path>>(path: T) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| SearchError::from(e).path_context(&format!("{path:?}")))?;
        let config: SearchConfig = serde_json::from_reader(BufReader::new(file))?;
        config.space.validate()?;
        config.train.validate()?;
        Ok(config)
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerKind) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }
}
