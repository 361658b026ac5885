//! MobileNet V2/V3 models for CIFAR-10 and a hyperparameter search over
//! their width multiplier, learning rate and optimizer, built on `tch`.
pub mod config;
pub use config::SearchConfig;

mod error;
pub use error::{Result, SearchError};

pub mod search;
pub use search::{HyperParams, Search, SearchState, Study, TrialResult};

pub mod train;
pub use train::{OptimizerKind, TrainConfig, Trainer};

pub mod vision;
