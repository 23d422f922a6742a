// Shared plumbing for the dugout analyses: configuration, the error
// taxonomy, and stat-record loading.

pub mod config;
pub mod error;
pub mod records;

pub use error::{AnalysisError, Result};
