use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{what}: expected {expected} values, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("inflation-linked return source sampled without an inflation sequence")]
    MissingInflation,

    #[error("portfolio weights must sum to 1, got {0}")]
    InvalidWeights(f64),

    #[error("numerical domain error in {operation} at month {month}")]
    NumericalDomain {
        operation: &'static str,
        month: usize,
    },

    #[error("unknown country: {0}")]
    UnknownCountry(String),

    #[error("market data unavailable: {0}")]
    MarketData(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
