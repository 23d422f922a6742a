// Error taxonomy shared by the loaders and the analysis pipelines.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    /// A numeric or percentage cell that could not be converted.
    #[error("parse error in column `{column}` at line {line}: {value:?} is not numeric")]
    Parse {
        column: String,
        line: u64,
        value: String,
    },

    #[error("validation error: {0}")]
    Validation(String),

    /// A similarity query for a (Name, Season) that is not in the dataset.
    #[error("player {name} not found in the dataset for season {season}")]
    NotFound { name: String, season: i32 },

    #[error("no node labelled {0:?} in the similarity graph")]
    UnknownNode(String),
}

impl AnalysisError {
    /// Shorthand for building a `Validation` error from anything printable.
    pub fn validation(message: impl Into<String>) -> Self {
        AnalysisError::Validation(message.into())
    }

    /// Whether a batch may continue after this error (per-query misses only).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AnalysisError::NotFound { .. } | AnalysisError::UnknownNode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
