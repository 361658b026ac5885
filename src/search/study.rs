//! Record of the trials of one search run.
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::space::HyperParams;
use crate::error::{Result, SearchError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Complete,
    Failed,
}

/// Result of a single trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub number: usize,
    pub params: HyperParams,
    pub state: TrialState,
    /// Test accuracy in percent, only set for complete trials.
    pub value: Option<f64>,
    /// Error message of a failed trial.
    pub error: Option<String>,
    pub duration_secs: f64,
}

impl TrialResult {
    pub fn complete(number: usize, params: HyperParams, value: f64, duration_secs: f64) -> Self {
        TrialResult {
            number,
            params,
            state: TrialState::Complete,
            value: Some(value),
            error: None,
            duration_secs,
        }
    }

    pub fn failed(number: usize, params: HyperParams, error: String, duration_secs: f64) -> Self {
        TrialResult {
            number,
            params,
            state: TrialState::Failed,
            value: None,
            error: Some(error),
            duration_secs,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == TrialState::Complete
    }
}

/// All the trials of a search in the order they ran, tracking the one with
/// the highest accuracy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Study {
    trials: Vec<TrialResult>,
    best_trial_idx: Option<usize>,
}

impl Study {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trials(&self) -> &[TrialResult] {
        &self.trials
    }

    pub fn n_trials(&self) -> usize {
        self.trials.len()
    }

    /// Complete trials paired with their accuracy.
    pub fn completed(&self) -> impl Iterator<Item = (&TrialResult, f64)> {
        self.trials.iter().filter_map(|t| match (t.state, t.value) {
            (TrialState::Complete, Some(v)) => Some((t, v)),
            _ => None,
        })
    }

    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();
        if let (TrialState::Complete, Some(value)) = (result.state, result.value) {
            if value.is_finite() && self.best_value().map_or(true, |best| value > best) {
                self.best_trial_idx = Some(idx);
            }
        }
        self.trials.push(result);
    }

    pub fn best_trial(&self) -> Result<&TrialResult> {
        self.best_trial_idx
            .and_then(|idx| self.trials.get(idx))
            .ok_or(SearchError::NoCompletedTrials)
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial_idx.and_then(|idx| self.trials.get(idx)?.value)
    }

    pub fn best_params(&self) -> Option<&HyperParams> {
        self.best_trial_idx.and_then(|idx| self.trials.get(idx)).map(|t| &t.params)
    }

    /// Writes the study as pretty-printed JSON.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| SearchError::from(e).path_context(&format!("{path:?}")))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
