use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Unknown ticker, or the provider yielded nothing within the retry budget.
    #[error("No data found for {0}")]
    NotFound(String),

    #[error("Insufficient history: need {required} bars, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    /// Empty, malformed or failed provider response. Retried internally.
    #[error("Provider error: {0}")]
    TransientProvider(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl AnalysisError {
    pub fn insufficient(required: usize, available: usize) -> Self {
        AnalysisError::InsufficientHistory { required, available }
    }
}
