use std::io;

use tch::TchError;
use thiserror::Error;

/// Main library error type.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Errors returned by the Torch C++ API.
    #[error(transparent)]
    Torch(#[from] TchError),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Invalid shape.
    #[error("invalid shape: {0}")]
    Shape(String),

    /// A split without any sample cannot be evaluated.
    #[error("the {0} split is empty")]
    EmptySplit(&'static str),

    /// Unknown or out of range parameter value.
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    /// A trial objective panicked, usually inside the Torch C++ API.
    #[error("trial panicked: {0}")]
    Panicked(String),

    /// The study has no successfully completed trial.
    #[error("no trial completed successfully")]
    NoCompletedTrials,
}

impl SearchError {
    pub fn path_context(self, path_name: &str) -> Self {
        match self {
            SearchError::Io(error) => {
                SearchError::Io(io::Error::new(error.kind(), format!("{path_name}: {error}")))
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
